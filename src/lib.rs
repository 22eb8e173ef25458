//! Industry Planner
//!
//! Plans tiered production chains for a space-industry game: startup
//! products feed processes grouped under processors, processors sit in
//! ordered tiers, and derived links show which source supplies which input.

pub mod calculator;
pub mod catalog;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod importer;
pub mod links;
pub mod location;
pub mod models;
pub mod plan;
pub mod render;
pub mod sample;
pub mod snapshot;

pub use catalog::Catalog;
pub use context::PlannerContext;
pub use error::{PlannerError, Result};
pub use events::{NodeFlag, PlanEvent};
pub use links::{LinkHandle, LinkOrigin, LinkToggle, RefreshReport};
pub use models::{LotLocation, ProcessId, ProcessorKind, ProductId};
pub use plan::{IndustryPlan, NodeId, Placement};
pub use render::RenderSink;
pub use snapshot::PlanSnapshot;
