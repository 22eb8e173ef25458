//! Change notifications published by an industry plan

use crate::links::LinkHandle;
use crate::models::{LotLocation, ProcessId, ProcessorKind, ProductId};
use crate::plan::NodeId;

/// Visual state flags a presentation layer mirrors per node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeFlag {
    /// Source node currently owns at least one link
    HasLines,
    /// Process is the focus of a traced chain
    ActiveLines,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanEvent {
    StartupProductAdded { node: NodeId, product: ProductId },
    StartupProductRemoved { node: NodeId, product: ProductId },
    TierAdded { ordinal: usize },
    TierRemoved { ordinal: usize },
    TiersRenumbered { count: usize },
    ProcessorAdded { node: NodeId, tier: usize, kind: ProcessorKind },
    ProcessorRemoved { node: NodeId },
    ProcessorLocated { node: NodeId, location: Option<LotLocation> },
    ProcessAdded { node: NodeId, processor: NodeId, process: ProcessId },
    ProcessRemoved { node: NodeId },
    QuantityChanged { node: NodeId, quantity: Option<f64> },
    PrimaryOutputChanged { process: NodeId, output: NodeId },
    PenaltyChanged { scientists: u32, penalty: f64 },
    TitleChanged { title: String },
    LinkCreated { link: LinkHandle, source: NodeId, target: NodeId },
    LinkRemoved { link: LinkHandle, source: NodeId, target: NodeId },
    LinkRepositioned { link: LinkHandle },
    LinkEmphasis { link: LinkHandle, emphasized: bool },
    FlagChanged { node: NodeId, flag: NodeFlag, on: bool },
}

impl PlanEvent {
    /// Whether the event changes persisted state. Links and flags are derived
    /// and never saved.
    pub fn marks_dirty(&self) -> bool {
        !matches!(
            self,
            PlanEvent::LinkCreated { .. }
                | PlanEvent::LinkRemoved { .. }
                | PlanEvent::LinkRepositioned { .. }
                | PlanEvent::LinkEmphasis { .. }
                | PlanEvent::FlagChanged { .. }
                | PlanEvent::QuantityChanged { .. }
        )
    }
}
