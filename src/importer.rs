//! Catalog import from exported game data
//!
//! Walks a directory for `products*.json`, `processes*.json`, `ships*.json`
//! and `buildings*.json` files and upserts their records into the catalog
//! tables.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::db;
use crate::models::{
    BuildingType, ProcessDescriptor, ProcessId, ProcessorKind, ProductClass, ProductDescriptor, ProductId,
    ShipType, SpectralType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogFile {
    Products,
    Processes,
    Ships,
    Buildings,
}

impl CatalogFile {
    fn classify(path: &Path) -> Option<Self> {
        if path.extension().is_none_or(|ext| ext != "json") {
            return None;
        }
        let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
        [
            ("products", CatalogFile::Products),
            ("processes", CatalogFile::Processes),
            ("ships", CatalogFile::Ships),
            ("buildings", CatalogFile::Buildings),
        ]
        .into_iter()
        .find(|(prefix, _)| stem.starts_with(prefix))
        .map(|(_, kind)| kind)
    }
}

#[derive(Debug, Deserialize)]
struct ProductRecord {
    id: ProductId,
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    class: Option<ProductClass>,
    #[serde(default)]
    mass_kg: Option<f64>,
    #[serde(default)]
    volume_m3: Option<f64>,
    /// Compact form such as "CIS"
    #[serde(default)]
    spectral_types: String,
}

impl From<ProductRecord> for ProductDescriptor {
    fn from(r: ProductRecord) -> Self {
        ProductDescriptor {
            id: r.id,
            name: r.name,
            category: r.category,
            class: r.class,
            mass_kg: r.mass_kg,
            volume_m3: r.volume_m3,
            spectral_types: SpectralType::parse_list(&r.spectral_types),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuantityRecord {
    product: ProductId,
    quantity: f64,
}

#[derive(Debug, Deserialize)]
struct ProcessRecord {
    id: u32,
    name: String,
    processor: ProcessorKind,
    #[serde(default)]
    inputs: Vec<QuantityRecord>,
    outputs: Vec<QuantityRecord>,
    #[serde(default)]
    batched: bool,
}

impl From<ProcessRecord> for ProcessDescriptor {
    fn from(r: ProcessRecord) -> Self {
        let pairs = |list: Vec<QuantityRecord>| -> Vec<(ProductId, f64)> {
            list.into_iter().map(|q| (q.product, q.quantity)).collect()
        };
        ProcessDescriptor {
            id: ProcessId(r.id),
            name: r.name,
            processor: r.processor,
            inputs: pairs(r.inputs),
            outputs: pairs(r.outputs),
            batched: r.batched,
        }
    }
}

/// Find every catalog file under `dir`, sorted for a stable import order
pub fn find_catalog_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| CatalogFile::classify(p).is_some())
        .collect();
    files.sort();
    files
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Import every catalog file under `dir` into the database
pub fn import_directory(conn: &Connection, dir: &Path) -> Result<ImportStats> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let mut stats = ImportStats::default();
    for path in find_catalog_files(dir) {
        let Some(kind) = CatalogFile::classify(&path) else {
            continue;
        };
        debug!(file = %path.display(), ?kind, "importing");

        let imported = match kind {
            CatalogFile::Products => read_records::<ProductRecord>(&path).and_then(|records| {
                for r in records {
                    db::upsert_product(conn, &r.into())?;
                    stats.products += 1;
                }
                Ok(())
            }),
            CatalogFile::Processes => read_records::<ProcessRecord>(&path).and_then(|records| {
                for r in records {
                    let process: ProcessDescriptor = r.into();
                    if process.outputs.is_empty() {
                        warn!(id = %process.id, "process without outputs skipped");
                        stats.skipped += 1;
                        continue;
                    }
                    db::upsert_process(conn, &process)?;
                    stats.processes += 1;
                }
                Ok(())
            }),
            CatalogFile::Ships => read_records::<ShipType>(&path).and_then(|records| {
                for s in records {
                    db::upsert_ship(conn, &s)?;
                    stats.ships += 1;
                }
                Ok(())
            }),
            CatalogFile::Buildings => read_records::<BuildingType>(&path).and_then(|records| {
                for b in records {
                    db::upsert_building(conn, &b)?;
                    stats.buildings += 1;
                }
                Ok(())
            }),
        };

        stats.files += 1;
        if let Err(e) = imported {
            warn!("{e:#}");
            stats.errors += 1;
        }
    }

    Ok(stats)
}

#[derive(Debug, Default)]
pub struct ImportStats {
    pub files: usize,
    pub products: usize,
    pub processes: usize,
    pub ships: usize,
    pub buildings: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} products, {} processes, {} ships, {} buildings from {} files. Skipped: {}, Errors: {}",
            self.products, self.processes, self.ships, self.buildings, self.files, self.skipped, self.errors
        )
    }
}
