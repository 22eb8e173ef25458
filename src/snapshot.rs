//! Persistable plan snapshots
//!
//! A snapshot holds the structure of a plan only. Links are derived state
//! and start empty after a restore.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::models::{LotLocation, ProcessId, ProcessorKind, ProductId};
use crate::plan::IndustryPlan;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub id: Uuid,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub scientists_in_crew: u32,
    pub startup_products: Vec<ProductId>,
    /// Non-empty tiers in order; the trailing empty tier is implied
    pub tiers: Vec<TierSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSnapshot {
    pub processors: Vec<ProcessorSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSnapshot {
    pub kind: ProcessorKind,
    #[serde(default)]
    pub location: Option<LotLocation>,
    pub processes: Vec<ProcessSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub process: ProcessId,
    #[serde(default)]
    pub primary_output: Option<ProductId>,
}

impl PlanSnapshot {
    pub fn capture(plan: &IndustryPlan) -> Self {
        let tiers = plan
            .tiers()
            .iter()
            .filter(|t| !t.is_empty())
            .map(|tier| TierSnapshot {
                processors: tier
                    .processors
                    .iter()
                    .map(|processor| ProcessorSnapshot {
                        kind: processor.kind,
                        location: processor.location,
                        processes: processor
                            .processes
                            .iter()
                            .map(|p| ProcessSnapshot {
                                process: p.process,
                                primary_output: p.primary_output().map(|o| o.product.clone()),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        PlanSnapshot {
            id: plan.id(),
            title: plan.title().to_string(),
            updated_at: plan.updated_at(),
            scientists_in_crew: plan.scientists_in_crew(),
            startup_products: plan
                .startup_products()
                .iter()
                .map(|s| s.product.clone())
                .collect(),
            tiers,
        }
    }

    /// Rebuild the plan against the catalog. The result counts as saved.
    pub fn restore(&self, catalog: &Catalog) -> Result<IndustryPlan> {
        let mut plan = IndustryPlan::with_identity(self.id, &self.title, self.updated_at)?;
        plan.set_scientists_in_crew(self.scientists_in_crew)?;

        for product in &self.startup_products {
            plan.add_startup_product(catalog, product)?;
        }

        for tier in self.tiers.iter().filter(|t| !t.processors.is_empty()) {
            // The trailing empty tier receives this tier's processors
            let ordinal = plan.tiers().len();
            for processor in &tier.processors {
                let node = plan.add_processor(ordinal, processor.kind)?;
                if processor.location.is_some() {
                    plan.set_processor_location(node, processor.location)?;
                }
                for process in &processor.processes {
                    let process_node = plan.add_process(catalog, node, process.process)?;
                    if let Some(primary) = &process.primary_output {
                        plan.set_primary_product(process_node, primary)?;
                    }
                }
            }
        }

        plan.mark_saved(self.updated_at);
        Ok(plan)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_file(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample;

    #[test]
    fn restore_rebuilds_structure_without_links() {
        let catalog = sample::sample_catalog();
        let mut plan = IndustryPlan::new("Round trip").unwrap();
        plan.set_scientists_in_crew(3).unwrap();
        let water = plan.add_startup_product(&catalog, &ProductId::from("1")).unwrap();
        let refinery = plan.add_processor(1, ProcessorKind::Refinery).unwrap();
        plan.set_processor_location(refinery, Some(LotLocation { asteroid_id: 1, lot_index: 77 }))
            .unwrap();
        let electrolysis = plan.add_process(&catalog, refinery, ProcessId(10)).unwrap();
        plan.set_primary_product(electrolysis, &ProductId::from("9")).unwrap();
        crate::links::toggle_source(&mut plan, water).unwrap();
        assert_eq!(plan.links().len(), 1);

        let snapshot = PlanSnapshot::capture(&plan);
        assert_eq!(snapshot.tiers.len(), 1);
        let restored = snapshot.restore(&catalog).unwrap();

        assert!(restored.is_saved());
        assert!(restored.links().is_empty());
        assert_eq!(PlanSnapshot::capture(&restored), snapshot);
        let process = restored.process_at(1, 0, 0).unwrap();
        assert_eq!(process.primary_output().unwrap().product, ProductId::from("9"));
        assert_eq!(restored.tiers().len(), 2);
        assert_eq!(restored.secondary_output_penalty(), plan.secondary_output_penalty());
    }

    #[test]
    fn json_round_trip() {
        let catalog = sample::sample_catalog();
        let mut plan = IndustryPlan::new("Json").unwrap();
        plan.add_startup_product(&catalog, &ProductId::from("3")).unwrap();
        let snapshot = PlanSnapshot::capture(&plan);
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"startup_products\""));
        assert_eq!(PlanSnapshot::from_json(&json).unwrap(), snapshot);
    }
}
