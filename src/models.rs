//! Data models for catalog products, processes and processor kinds

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// Product identifier. Numeric products are stringified numbers, ships are
/// `S<n>` and buildings are `B<n>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub const SHIP_PREFIX: char = 'S';
    pub const BUILDING_PREFIX: char = 'B';

    pub fn new(id: impl Into<String>) -> Self {
        ProductId(id.into())
    }

    pub fn ship(n: u32) -> Self {
        ProductId(format!("{}{}", Self::SHIP_PREFIX, n))
    }

    pub fn building(n: u32) -> Self {
        ProductId(format!("{}{}", Self::BUILDING_PREFIX, n))
    }

    pub fn is_ship(&self) -> bool {
        self.0.starts_with(Self::SHIP_PREFIX)
    }

    pub fn is_building(&self) -> bool {
        self.0.starts_with(Self::BUILDING_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        ProductId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductClass {
    RawMaterial,
    RefinedMaterial,
    Component,
    FinishedGood,
    Ship,
    Building,
}

impl ProductClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductClass::RawMaterial => "raw_material",
            ProductClass::RefinedMaterial => "refined_material",
            ProductClass::Component => "component",
            ProductClass::FinishedGood => "finished_good",
            ProductClass::Ship => "ship",
            ProductClass::Building => "building",
        }
    }
}

impl FromStr for ProductClass {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw_material" => Ok(ProductClass::RawMaterial),
            "refined_material" => Ok(ProductClass::RefinedMaterial),
            "component" => Ok(ProductClass::Component),
            "finished_good" => Ok(ProductClass::FinishedGood),
            "ship" => Ok(ProductClass::Ship),
            "building" => Ok(ProductClass::Building),
            other => Err(PlannerError::not_found(format!("product class '{other}'"))),
        }
    }
}

/// Asteroid spectral types a raw material can be extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SpectralType {
    C,
    I,
    M,
    S,
}

impl SpectralType {
    /// Parse a compact spectral string such as "CIS", ignoring unknown letters
    pub fn parse_list(s: &str) -> Vec<SpectralType> {
        let mut types: Vec<SpectralType> = s
            .chars()
            .filter_map(|c| match c.to_ascii_uppercase() {
                'C' => Some(SpectralType::C),
                'I' => Some(SpectralType::I),
                'M' => Some(SpectralType::M),
                'S' => Some(SpectralType::S),
                _ => None,
            })
            .collect();
        types.sort();
        types.dedup();
        types
    }

    pub fn format_list(types: &[SpectralType]) -> String {
        types.iter().map(|t| t.to_string()).collect()
    }
}

impl fmt::Display for SpectralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            SpectralType::C => "C",
            SpectralType::I => "I",
            SpectralType::M => "M",
            SpectralType::S => "S",
        };
        f.write_str(c)
    }
}

/// Building types that can host processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProcessorKind {
    #[serde(rename = "EMPTY_LOT")]
    EmptyLot,
    #[serde(rename = "EXTRACTOR")]
    Extractor,
    #[serde(rename = "REFINERY")]
    Refinery,
    #[serde(rename = "BIOREACTOR")]
    Bioreactor,
    #[serde(rename = "FACTORY")]
    Factory,
    #[serde(rename = "SHIPYARD")]
    Shipyard,
}

impl ProcessorKind {
    pub const ALL: [ProcessorKind; 6] = [
        ProcessorKind::EmptyLot,
        ProcessorKind::Extractor,
        ProcessorKind::Refinery,
        ProcessorKind::Bioreactor,
        ProcessorKind::Factory,
        ProcessorKind::Shipyard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::EmptyLot => "EMPTY_LOT",
            ProcessorKind::Extractor => "EXTRACTOR",
            ProcessorKind::Refinery => "REFINERY",
            ProcessorKind::Bioreactor => "BIOREACTOR",
            ProcessorKind::Factory => "FACTORY",
            ProcessorKind::Shipyard => "SHIPYARD",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProcessorKind::EmptyLot => "Empty Lot",
            ProcessorKind::Extractor => "Extractor",
            ProcessorKind::Refinery => "Refinery",
            ProcessorKind::Bioreactor => "Bioreactor",
            ProcessorKind::Factory => "Factory",
            ProcessorKind::Shipyard => "Shipyard",
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorKind {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        ProcessorKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| PlannerError::not_found(format!("processor kind '{s}'")))
    }
}

/// Immutable catalog entry for a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDescriptor {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub class: Option<ProductClass>,
    #[serde(default)]
    pub mass_kg: Option<f64>,
    #[serde(default)]
    pub volume_m3: Option<f64>,
    #[serde(default)]
    pub spectral_types: Vec<SpectralType>,
}

impl ProductDescriptor {
    pub fn is_raw_material(&self) -> bool {
        self.class == Some(ProductClass::RawMaterial)
    }
}

/// Immutable catalog entry for a process recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub id: ProcessId,
    pub name: String,
    pub processor: ProcessorKind,
    /// Input product id -> required quantity, in catalog order
    #[serde(default)]
    pub inputs: Vec<(ProductId, f64)>,
    /// Output product id -> nominal quantity, in catalog order
    pub outputs: Vec<(ProductId, f64)>,
    #[serde(default)]
    pub batched: bool,
}

impl ProcessDescriptor {
    /// Extraction processes take nothing and yield exactly one product
    pub fn is_extraction(&self) -> bool {
        self.inputs.is_empty() && self.outputs.len() == 1
    }

    pub fn output_quantity(&self, product: &ProductId) -> Option<f64> {
        self.outputs
            .iter()
            .find(|(id, _)| id == product)
            .map(|(_, qty)| *qty)
    }

    pub fn consumes(&self, product: &ProductId) -> bool {
        self.inputs.iter().any(|(id, _)| id == product)
    }
}

/// Ship hull types; synthesized into the product namespace as `S<id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipType {
    pub id: u32,
    pub name: String,
}

/// Building types; synthesized into the product namespace as `B<id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingType {
    pub id: u32,
    pub name: String,
}

/// A lot on an asteroid that a processor may be tied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LotLocation {
    pub asteroid_id: u64,
    pub lot_index: u64,
}

impl fmt::Display for LotLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asteroid_id, self.lot_index)
    }
}

impl FromStr for LotLocation {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlannerError::invalid(format!("location '{s}' is not <asteroid>/<lot>"));
        let (asteroid, lot) = s.split_once('/').ok_or_else(invalid)?;
        Ok(LotLocation {
            asteroid_id: asteroid.trim().parse().map_err(|_| invalid())?,
            lot_index: lot.trim().parse().map_err(|_| invalid())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_product_prefixes() {
        assert_eq!(ProductId::ship(3).as_str(), "S3");
        assert!(ProductId::ship(3).is_ship());
        assert!(ProductId::building(12).is_building());
        assert!(!ProductId::from("42").is_ship());
    }

    #[test]
    fn processor_kind_parses_loosely() {
        assert_eq!("refinery".parse::<ProcessorKind>().unwrap(), ProcessorKind::Refinery);
        assert_eq!("empty-lot".parse::<ProcessorKind>().unwrap(), ProcessorKind::EmptyLot);
        assert!("smelter".parse::<ProcessorKind>().is_err());
    }

    #[test]
    fn spectral_list_is_sorted_and_deduplicated() {
        let types = SpectralType::parse_list("sicx c");
        assert_eq!(types, vec![SpectralType::C, SpectralType::I, SpectralType::S]);
        assert_eq!(SpectralType::format_list(&types), "CIS");
    }

    #[test]
    fn lot_location_round_trips_through_text() {
        let lot: LotLocation = "1/2045".parse().unwrap();
        assert_eq!(lot, LotLocation { asteroid_id: 1, lot_index: 2045 });
        assert_eq!(lot.to_string(), "1/2045");
        assert!("1-2045".parse::<LotLocation>().is_err());
    }

    #[test]
    fn extraction_detection() {
        let extraction = ProcessDescriptor {
            id: ProcessId(1),
            name: "Water Mining".to_string(),
            processor: ProcessorKind::Extractor,
            inputs: vec![],
            outputs: vec![(ProductId::from("1"), 1.0)],
            batched: false,
        };
        assert!(extraction.is_extraction());
        assert_eq!(extraction.output_quantity(&ProductId::from("1")), Some(1.0));
        assert!(!extraction.consumes(&ProductId::from("1")));
    }
}
