//! Built-in sample catalog for trying the planner without imported data

use rusqlite::Connection;

use crate::catalog::Catalog;
use crate::db;
use crate::error::Result;
use crate::models::{
    BuildingType, ProcessDescriptor, ProcessId, ProcessorKind, ProductClass, ProductDescriptor,
    ProductId, ShipType, SpectralType,
};

fn product(id: &str, name: &str, class: ProductClass, spectral: &str) -> ProductDescriptor {
    ProductDescriptor {
        id: ProductId::from(id),
        name: name.to_string(),
        category: None,
        class: Some(class),
        mass_kg: Some(1.0),
        volume_m3: None,
        spectral_types: SpectralType::parse_list(spectral),
    }
}

fn process(
    id: u32,
    name: &str,
    processor: ProcessorKind,
    inputs: &[(&str, f64)],
    outputs: &[(&str, f64)],
) -> ProcessDescriptor {
    ProcessDescriptor {
        id: ProcessId(id),
        name: name.to_string(),
        processor,
        inputs: inputs.iter().map(|(p, q)| (ProductId::from(*p), *q)).collect(),
        outputs: outputs.iter().map(|(p, q)| (ProductId::from(*p), *q)).collect(),
        batched: false,
    }
}

pub fn sample_products() -> Vec<ProductDescriptor> {
    use ProductClass::*;
    vec![
        product("1", "Water", RawMaterial, "CI"),
        product("3", "Ammonia", RawMaterial, "I"),
        product("4", "Carbon Dioxide", RawMaterial, "C"),
        product("5", "Olivine", RawMaterial, "S"),
        product("6", "Feldspar", RawMaterial, "MS"),
        product("7", "Taenite", RawMaterial, "M"),
        product("8", "Oxygen", RefinedMaterial, ""),
        product("9", "Hydrogen", RefinedMaterial, ""),
        product("10", "Iron", RefinedMaterial, ""),
        product("11", "Nickel", RefinedMaterial, ""),
        product("12", "Silica", RefinedMaterial, ""),
        product("13", "Steel Beam", Component, ""),
        product("14", "Glass", Component, ""),
        product("15", "Food", FinishedGood, ""),
        product("16", "Hydrogen Propellant", FinishedGood, ""),
    ]
}

pub fn sample_processes() -> Vec<ProcessDescriptor> {
    use ProcessorKind::*;
    vec![
        process(1, "Water Mining", Extractor, &[], &[("1", 1000.0)]),
        process(2, "Ammonia Mining", Extractor, &[], &[("3", 1000.0)]),
        process(3, "Carbon Dioxide Mining", Extractor, &[], &[("4", 1000.0)]),
        process(4, "Olivine Mining", Extractor, &[], &[("5", 1000.0)]),
        process(5, "Feldspar Mining", Extractor, &[], &[("6", 1000.0)]),
        process(6, "Taenite Mining", Extractor, &[], &[("7", 1000.0)]),
        process(10, "Water Electrolysis", Refinery, &[("1", 1000.0)], &[("8", 888.0), ("9", 112.0)]),
        process(11, "Taenite Smelting", Refinery, &[("7", 1000.0)], &[("10", 900.0), ("11", 100.0)]),
        process(
            12,
            "Olivine Leaching",
            Refinery,
            &[("5", 1000.0), ("1", 200.0)],
            &[("12", 400.0), ("10", 150.0)],
        ),
        process(
            20,
            "Food Cultivation",
            Bioreactor,
            &[("1", 50.0), ("3", 10.0), ("4", 20.0)],
            &[("15", 100.0)],
        ),
        process(30, "Steel Beam Fabrication", Factory, &[("10", 1000.0), ("11", 50.0)], &[("13", 10.0)]),
        process(31, "Glass Forming", Factory, &[("12", 800.0), ("6", 100.0)], &[("14", 500.0)]),
        process(32, "Hydrogen Propellant Compression", Factory, &[("9", 100.0)], &[("16", 100.0)]),
        process(40, "Warehouse Construction", EmptyLot, &[("13", 20.0), ("14", 5.0)], &[("B1", 1.0)]),
        process(
            41,
            "Light Transport Integration",
            Shipyard,
            &[("13", 50.0), ("14", 20.0), ("16", 10.0)],
            &[("S1", 1.0)],
        ),
    ]
}

pub fn sample_ships() -> Vec<ShipType> {
    vec![
        ShipType { id: 1, name: "Light Transport".to_string() },
        ShipType { id: 2, name: "Heavy Transport".to_string() },
    ]
}

pub fn sample_buildings() -> Vec<BuildingType> {
    ["Warehouse", "Extractor", "Refinery", "Bioreactor", "Factory", "Shipyard"]
        .iter()
        .enumerate()
        .map(|(n, name)| BuildingType { id: n as u32 + 1, name: name.to_string() })
        .collect()
}

/// Sample catalog without touching a database
pub fn sample_catalog() -> Catalog {
    Catalog::new(sample_products(), sample_processes(), sample_ships(), sample_buildings())
}

/// Replace the catalog tables with the sample data
pub fn load_sample_data(conn: &Connection) -> Result<usize> {
    db::clear_catalog(conn)?;

    for p in sample_products() {
        db::upsert_product(conn, &p)?;
    }
    for s in sample_ships() {
        db::upsert_ship(conn, &s)?;
    }
    for b in sample_buildings() {
        db::upsert_building(conn, &b)?;
    }
    let processes = sample_processes();
    for p in &processes {
        db::upsert_process(conn, p)?;
    }
    Ok(processes.len())
}
