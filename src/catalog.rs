//! Static product and process catalog
//!
//! Loaded once at startup and never mutated afterwards. Ships and buildings
//! are folded into the product namespace as pseudo-products so they can show
//! up as process outputs (ship integration, construction).

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;
use tracing::debug;

use crate::db;
use crate::error::{PlannerError, Result};
use crate::models::{
    BuildingType, ProcessDescriptor, ProcessId, ProcessorKind, ProductClass, ProductDescriptor,
    ProductId, ShipType,
};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: BTreeMap<ProductId, ProductDescriptor>,
    processes: BTreeMap<ProcessId, ProcessDescriptor>,
    ships: Vec<ShipType>,
    buildings: Vec<BuildingType>,
    input_eligible: BTreeSet<ProductId>,
}

impl Catalog {
    /// Build a catalog from descriptor tables, synthesizing ship and building
    /// pseudo-products
    pub fn new(
        products: Vec<ProductDescriptor>,
        processes: Vec<ProcessDescriptor>,
        mut ships: Vec<ShipType>,
        mut buildings: Vec<BuildingType>,
    ) -> Self {
        let mut by_id: BTreeMap<ProductId, ProductDescriptor> =
            products.into_iter().map(|p| (p.id.clone(), p)).collect();

        ships.sort_by_key(|s| s.id);
        buildings.sort_by_key(|b| b.id);

        // Sequential ids, 1-based, in id order
        for (n, ship) in ships.iter().enumerate() {
            let id = ProductId::ship(n as u32 + 1);
            by_id.entry(id.clone()).or_insert_with(|| ProductDescriptor {
                id,
                name: ship.name.clone(),
                category: Some("Ship".to_string()),
                class: Some(ProductClass::Ship),
                mass_kg: None,
                volume_m3: None,
                spectral_types: Vec::new(),
            });
        }
        for (n, building) in buildings.iter().enumerate() {
            let id = ProductId::building(n as u32 + 1);
            by_id.entry(id.clone()).or_insert_with(|| ProductDescriptor {
                id,
                name: building.name.clone(),
                category: Some("Building".to_string()),
                class: Some(ProductClass::Building),
                mass_kg: None,
                volume_m3: None,
                spectral_types: Vec::new(),
            });
        }

        let input_eligible = processes
            .iter()
            .flat_map(|p| p.inputs.iter().map(|(id, _)| id.clone()))
            .collect();

        let processes = processes.into_iter().map(|p| (p.id, p)).collect();

        Catalog {
            products: by_id,
            processes,
            ships,
            buildings,
            input_eligible,
        }
    }

    /// Load the catalog tables from the database
    pub fn load(conn: &Connection) -> Result<Self> {
        let products = db::list_products(conn)?;
        let processes = db::list_processes(conn)?;
        let ships = db::list_ships(conn)?;
        let buildings = db::list_buildings(conn)?;
        let catalog = Catalog::new(products, processes, ships, buildings);
        debug!(
            products = catalog.products.len(),
            processes = catalog.processes.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    pub fn product(&self, id: &ProductId) -> Result<&ProductDescriptor> {
        self.products
            .get(id)
            .ok_or_else(|| PlannerError::not_found(format!("product '{id}'")))
    }

    pub fn process(&self, id: ProcessId) -> Result<&ProcessDescriptor> {
        self.processes
            .get(&id)
            .ok_or_else(|| PlannerError::not_found(format!("process {id}")))
    }

    /// Display name for a product, falling back to its id
    pub fn product_name(&self, id: &ProductId) -> String {
        self.products
            .get(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn products(&self) -> impl Iterator<Item = &ProductDescriptor> {
        self.products.values()
    }

    pub fn processes(&self) -> impl Iterator<Item = &ProcessDescriptor> {
        self.processes.values()
    }

    pub fn ships(&self) -> &[ShipType] {
        &self.ships
    }

    pub fn buildings(&self) -> &[BuildingType] {
        &self.buildings
    }

    /// All processes that run on the given processor kind
    pub fn processes_for(&self, kind: ProcessorKind) -> Vec<&ProcessDescriptor> {
        self.processes
            .values()
            .filter(|p| p.processor == kind)
            .collect()
    }

    /// All processes that list `product` among their outputs
    pub fn producers_of(&self, product: &ProductId) -> Vec<&ProcessDescriptor> {
        self.processes
            .values()
            .filter(|p| p.output_quantity(product).is_some())
            .collect()
    }

    /// A product is input-eligible when at least one process consumes it
    pub fn is_input_eligible(&self, product: &ProductId) -> bool {
        self.input_eligible.contains(product)
    }

    pub fn input_eligible(&self) -> impl Iterator<Item = &ProductId> {
        self.input_eligible.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.processes.is_empty()
    }
}
