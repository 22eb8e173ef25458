//! Industry plan graph
//!
//! The plan owns its tiers, tiers own processors, processors own processes
//! and processes own their placed input/output products. Nothing points back
//! up; every mutation goes through [`IndustryPlan`] and is published as a
//! [`PlanEvent`]. A liveness index maps every placed product to its owner so
//! link reconciliation can tell whether an endpoint still exists.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::calculator;
use crate::catalog::Catalog;
use crate::error::{PlannerError, Result};
use crate::events::{NodeFlag, PlanEvent};
use crate::links::{Link, LinkHandle, LinkOrigin, LinkTable};
use crate::models::{LotLocation, ProcessId, ProcessorKind, ProductId, SpectralType};

/// Handle for any node placed in a plan. Allocated per plan, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Role of a placed product inside the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Startup,
    ProcessInput,
    ProcessOutput,
}

/// A product instance placed in the plan
#[derive(Debug, Clone)]
pub struct PlacedProduct {
    pub node: NodeId,
    pub product: ProductId,
    pub name: String,
    pub placement: Placement,
    /// Catalog quantity; unset for startup products
    pub nominal: Option<f64>,
    /// Effective quantity after the secondary output penalty
    pub quantity: Option<f64>,
    pub primary: bool,
}

impl PlacedProduct {
    /// Startup products and process outputs can feed later tiers
    pub fn is_source(&self) -> bool {
        matches!(self.placement, Placement::Startup | Placement::ProcessOutput)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessNode {
    pub node: NodeId,
    pub process: ProcessId,
    pub name: String,
    pub inputs: Vec<PlacedProduct>,
    /// Sorted by product name
    pub outputs: Vec<PlacedProduct>,
    /// Display-only inputs for extraction processes
    pub spectral_inputs: Vec<SpectralType>,
    pub broken: bool,
    pub active_lines: bool,
}

impl ProcessNode {
    pub fn primary_output(&self) -> Option<&PlacedProduct> {
        self.outputs.iter().find(|o| o.primary)
    }

    pub fn output_for(&self, product: &ProductId) -> Option<&PlacedProduct> {
        self.outputs.iter().find(|o| &o.product == product)
    }

    fn icon_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs.iter().chain(self.outputs.iter()).map(|p| p.node)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorNode {
    pub node: NodeId,
    pub kind: ProcessorKind,
    pub processes: Vec<ProcessNode>,
    pub location: Option<LotLocation>,
}

#[derive(Debug, Clone)]
pub struct IndustryTier {
    /// 1-based, contiguous
    pub ordinal: usize,
    pub processors: Vec<ProcessorNode>,
}

impl IndustryTier {
    fn new(ordinal: usize) -> Self {
        IndustryTier {
            ordinal,
            processors: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Union of every product produced in this tier
    pub fn output_products(&self) -> BTreeSet<ProductId> {
        self.processors
            .iter()
            .flat_map(|p| p.processes.iter())
            .flat_map(|p| p.outputs.iter().map(|o| o.product.clone()))
            .collect()
    }
}

/// Liveness index entry for a placed product
#[derive(Debug, Clone)]
pub struct LiveNode {
    pub product: ProductId,
    pub placement: Placement,
    /// Owning process node; `None` for startup products
    pub process: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct IndustryPlan {
    id: Uuid,
    title: String,
    updated_at: DateTime<Utc>,
    scientists_in_crew: u32,
    penalty: f64,
    startup_products: Vec<PlacedProduct>,
    tiers: Vec<IndustryTier>,
    saved: bool,
    next_node: u64,
    live: HashMap<NodeId, LiveNode>,
    links: LinkTable,
    events: Vec<PlanEvent>,
}

pub(crate) fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PlannerError::invalid("plan title must not be empty"));
    }
    Ok(title.to_string())
}

impl IndustryPlan {
    pub fn new(title: &str) -> Result<Self> {
        Self::with_identity(Uuid::new_v4(), title, Utc::now())
    }

    pub(crate) fn with_identity(id: Uuid, title: &str, updated_at: DateTime<Utc>) -> Result<Self> {
        Ok(IndustryPlan {
            id,
            title: validate_title(title)?,
            updated_at,
            scientists_in_crew: 0,
            penalty: calculator::secondary_output_penalty(0),
            startup_products: Vec::new(),
            tiers: vec![IndustryTier::new(1)],
            saved: false,
            next_node: 0,
            live: HashMap::new(),
            links: LinkTable::default(),
            events: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        let title = validate_title(title)?;
        if title != self.title {
            self.title = title.clone();
            self.emit(PlanEvent::TitleChanged { title });
        }
        Ok(())
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn scientists_in_crew(&self) -> u32 {
        self.scientists_in_crew
    }

    pub fn secondary_output_penalty(&self) -> f64 {
        self.penalty
    }

    pub fn startup_products(&self) -> &[PlacedProduct] {
        &self.startup_products
    }

    pub fn tiers(&self) -> &[IndustryTier] {
        &self.tiers
    }

    pub fn tier(&self, ordinal: usize) -> Option<&IndustryTier> {
        ordinal.checked_sub(1).and_then(|i| self.tiers.get(i))
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub(crate) fn mark_saved(&mut self, at: DateTime<Utc>) {
        self.saved = true;
        self.updated_at = at;
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Take every event published since the last drain
    pub fn drain_events(&mut self) -> Vec<PlanEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_events(&self) -> &[PlanEvent] {
        &self.events
    }

    fn emit(&mut self, event: PlanEvent) {
        if event.marks_dirty() {
            self.saved = false;
        }
        self.events.push(event);
    }

    fn alloc(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId(self.next_node)
    }

    fn register(&mut self, placed: &PlacedProduct, process: Option<NodeId>) {
        self.live.insert(
            placed.node,
            LiveNode {
                product: placed.product.clone(),
                placement: placed.placement,
                process,
            },
        );
    }

    fn deregister_process(&mut self, process: &ProcessNode) {
        for node in process.icon_nodes() {
            self.live.remove(&node);
        }
    }

    // ---------------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------------

    pub fn live_node(&self, node: NodeId) -> Option<&LiveNode> {
        self.live.get(&node)
    }

    pub fn is_live(&self, node: NodeId) -> bool {
        self.live.contains_key(&node)
    }

    /// Every process with the ordinal of the tier it sits in
    pub fn processes(&self) -> impl Iterator<Item = (usize, &ProcessorNode, &ProcessNode)> {
        self.tiers.iter().flat_map(|tier| {
            tier.processors
                .iter()
                .flat_map(move |processor| processor.processes.iter().map(move |p| (tier.ordinal, processor, p)))
        })
    }

    pub fn processors(&self) -> impl Iterator<Item = (usize, &ProcessorNode)> {
        self.tiers
            .iter()
            .flat_map(|tier| tier.processors.iter().map(move |p| (tier.ordinal, p)))
    }

    pub fn processor(&self, node: NodeId) -> Option<&ProcessorNode> {
        self.processors().map(|(_, p)| p).find(|p| p.node == node)
    }

    pub fn process(&self, node: NodeId) -> Option<&ProcessNode> {
        self.processes().map(|(_, _, p)| p).find(|p| p.node == node)
    }

    pub fn tier_of_process(&self, node: NodeId) -> Option<usize> {
        self.processes().find(|(_, _, p)| p.node == node).map(|(t, _, _)| t)
    }

    /// Tier a placed product sits in; startup products count as tier 0
    pub fn node_tier(&self, node: NodeId) -> Option<usize> {
        let live = self.live.get(&node)?;
        match live.process {
            None => Some(0),
            Some(process) => self.tier_of_process(process),
        }
    }

    pub fn placed(&self, node: NodeId) -> Option<&PlacedProduct> {
        let live = self.live.get(&node)?;
        match live.process {
            None => self.startup_products.iter().find(|s| s.node == node),
            Some(process) => {
                let process = self.process(process)?;
                process.inputs.iter().chain(process.outputs.iter()).find(|p| p.node == node)
            }
        }
    }

    pub fn startup_node(&self, product: &ProductId) -> Option<NodeId> {
        self.startup_products
            .iter()
            .find(|s| &s.product == product)
            .map(|s| s.node)
    }

    /// Processor by tier ordinal and 0-based position
    pub fn processor_at(&self, tier: usize, index: usize) -> Result<&ProcessorNode> {
        self.tier(tier)
            .and_then(|t| t.processors.get(index))
            .ok_or_else(|| PlannerError::not_found(format!("processor {index} in tier {tier}")))
    }

    pub fn process_at(&self, tier: usize, processor: usize, index: usize) -> Result<&ProcessNode> {
        self.processor_at(tier, processor)?
            .processes
            .get(index)
            .ok_or_else(|| {
                PlannerError::not_found(format!("process {index} of processor {processor} in tier {tier}"))
            })
    }

    /// Input-eligible products not yet used as startup products
    pub fn startup_candidates<'a>(&self, catalog: &'a Catalog) -> Vec<&'a ProductId> {
        catalog
            .input_eligible()
            .filter(|id| self.startup_node(id).is_none())
            .collect()
    }

    fn locate_processor(&self, node: NodeId) -> Result<(usize, usize)> {
        for (t, tier) in self.tiers.iter().enumerate() {
            if let Some(p) = tier.processors.iter().position(|p| p.node == node) {
                return Ok((t, p));
            }
        }
        Err(PlannerError::not_found(format!("processor {node}")))
    }

    fn locate_process(&self, node: NodeId) -> Result<(usize, usize, usize)> {
        for (t, tier) in self.tiers.iter().enumerate() {
            for (p, processor) in tier.processors.iter().enumerate() {
                if let Some(q) = processor.processes.iter().position(|q| q.node == node) {
                    return Ok((t, p, q));
                }
            }
        }
        Err(PlannerError::not_found(format!("process {node}")))
    }

    // ---------------------------------------------------------------------
    // Startup products
    // ---------------------------------------------------------------------

    pub fn add_startup_product(&mut self, catalog: &Catalog, product: &ProductId) -> Result<NodeId> {
        let descriptor = catalog.product(product)?;
        if !catalog.is_input_eligible(product) {
            return Err(PlannerError::invalid(format!(
                "{} ({product}) is not an input of any process",
                descriptor.name
            )));
        }
        if self.startup_node(product).is_some() {
            return Err(PlannerError::invalid(format!(
                "{} ({product}) is already a startup product",
                descriptor.name
            )));
        }

        let node = self.alloc();
        let placed = PlacedProduct {
            node,
            product: product.clone(),
            name: descriptor.name.clone(),
            placement: Placement::Startup,
            nominal: None,
            quantity: None,
            primary: false,
        };
        self.register(&placed, None);
        self.startup_products.push(placed);
        self.startup_products
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.product.cmp(&b.product)));

        debug!(%node, %product, "startup product added");
        self.emit(PlanEvent::StartupProductAdded {
            node,
            product: product.clone(),
        });
        Ok(node)
    }

    pub fn remove_startup_product(&mut self, node: NodeId) -> Result<()> {
        let pos = self
            .startup_products
            .iter()
            .position(|s| s.node == node)
            .ok_or_else(|| PlannerError::not_found(format!("startup product {node}")))?;

        self.drop_links_touching(&[node]);
        let removed = self.startup_products.remove(pos);
        self.live.remove(&node);
        self.emit(PlanEvent::StartupProductRemoved {
            node,
            product: removed.product,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Tiers and processors
    // ---------------------------------------------------------------------

    /// Append an empty tier. Only called when the trailing tier gains its
    /// first processor, so exactly one empty tier stays at the end.
    fn add_industry_tier(&mut self) -> usize {
        let ordinal = self.tiers.len() + 1;
        self.tiers.push(IndustryTier::new(ordinal));
        self.emit(PlanEvent::TierAdded { ordinal });
        ordinal
    }

    fn renumber_tiers(&mut self) {
        for (i, tier) in self.tiers.iter_mut().enumerate() {
            tier.ordinal = i + 1;
        }
        let count = self.tiers.len();
        self.emit(PlanEvent::TiersRenumbered { count });
    }

    pub fn add_processor(&mut self, tier: usize, kind: ProcessorKind) -> Result<NodeId> {
        let idx = tier
            .checked_sub(1)
            .filter(|i| *i < self.tiers.len())
            .ok_or_else(|| PlannerError::not_found(format!("tier {tier}")))?;

        let node = self.alloc();
        let first = self.tiers[idx].is_empty();
        self.tiers[idx].processors.push(ProcessorNode {
            node,
            kind,
            processes: Vec::new(),
            location: None,
        });
        self.emit(PlanEvent::ProcessorAdded { node, tier, kind });

        if first && idx + 1 == self.tiers.len() {
            self.add_industry_tier();
        }
        Ok(node)
    }

    /// Remove a processor and all of its processes. A tier left without
    /// processors is removed and the remaining tiers are renumbered.
    pub fn remove_processor(&mut self, node: NodeId) -> Result<()> {
        let (t, p) = self.locate_processor(node)?;

        let mut doomed: Vec<NodeId> = Vec::new();
        for process in &self.tiers[t].processors[p].processes {
            doomed.push(process.node);
            doomed.extend(process.icon_nodes());
        }
        self.drop_links_touching(&doomed);

        let processor = self.tiers[t].processors.remove(p);
        for process in &processor.processes {
            self.deregister_process(process);
            self.emit(PlanEvent::ProcessRemoved { node: process.node });
        }
        self.emit(PlanEvent::ProcessorRemoved { node });

        if self.tiers[t].is_empty() && t + 1 < self.tiers.len() {
            let removed = self.tiers.remove(t);
            debug!(ordinal = removed.ordinal, "tier emptied and removed");
            self.emit(PlanEvent::TierRemoved {
                ordinal: removed.ordinal,
            });
            self.renumber_tiers();
        }
        Ok(())
    }

    pub fn set_processor_location(&mut self, node: NodeId, location: Option<LotLocation>) -> Result<()> {
        let (t, p) = self.locate_processor(node)?;
        self.tiers[t].processors[p].location = location;
        self.emit(PlanEvent::ProcessorLocated { node, location });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Processes
    // ---------------------------------------------------------------------

    pub fn add_process(&mut self, catalog: &Catalog, processor: NodeId, process: ProcessId) -> Result<NodeId> {
        let descriptor = catalog.process(process)?;
        let (t, p) = self.locate_processor(processor)?;
        let kind = self.tiers[t].processors[p].kind;
        if descriptor.processor != kind {
            return Err(PlannerError::invalid(format!(
                "{} runs on {} but the processor is a {}",
                descriptor.name,
                descriptor.processor.display_name(),
                kind.display_name()
            )));
        }
        if descriptor.outputs.is_empty() {
            return Err(PlannerError::invalid(format!("{} has no outputs", descriptor.name)));
        }

        let node = self.alloc();
        let mut broken = false;
        let mut inputs = Vec::with_capacity(descriptor.inputs.len());
        for (product, qty) in &descriptor.inputs {
            broken |= catalog.product(product).is_err();
            inputs.push(PlacedProduct {
                node: self.alloc(),
                product: product.clone(),
                name: catalog.product_name(product),
                placement: Placement::ProcessInput,
                nominal: Some(*qty),
                quantity: Some(*qty),
                primary: false,
            });
        }
        let mut outputs = Vec::with_capacity(descriptor.outputs.len());
        for (i, (product, qty)) in descriptor.outputs.iter().enumerate() {
            broken |= catalog.product(product).is_err();
            outputs.push(PlacedProduct {
                node: self.alloc(),
                product: product.clone(),
                name: catalog.product_name(product),
                placement: Placement::ProcessOutput,
                nominal: Some(*qty),
                quantity: Some(*qty),
                // First catalog output is primary by default
                primary: i == 0,
            });
        }
        calculator::apply_output_quantities(&mut outputs, self.penalty);
        outputs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.product.cmp(&b.product)));

        let spectral_inputs = if descriptor.is_extraction() {
            catalog
                .product(&descriptor.outputs[0].0)
                .map(|d| d.spectral_types.clone())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let process_node = ProcessNode {
            node,
            process,
            name: descriptor.name.clone(),
            inputs,
            outputs,
            spectral_inputs,
            broken,
            active_lines: false,
        };
        for placed in process_node.inputs.iter().chain(process_node.outputs.iter()) {
            self.register(placed, Some(node));
        }
        self.tiers[t].processors[p].processes.push(process_node);

        debug!(%node, %process, tier = t + 1, "process added");
        self.emit(PlanEvent::ProcessAdded {
            node,
            processor,
            process,
        });
        Ok(node)
    }

    /// Remove a process and every link touching its inputs or outputs. The
    /// owning processor stays even when it ends up empty.
    pub fn remove_process(&mut self, node: NodeId) -> Result<()> {
        let (t, p, q) = self.locate_process(node)?;
        let mut doomed: Vec<NodeId> = vec![node];
        doomed.extend(self.tiers[t].processors[p].processes[q].icon_nodes());
        self.drop_links_touching(&doomed);

        let removed = self.tiers[t].processors[p].processes.remove(q);
        self.deregister_process(&removed);
        self.emit(PlanEvent::ProcessRemoved { node });
        Ok(())
    }

    /// Make `output` the primary output of `process` and recompute every
    /// output quantity. Returns false when nothing changed.
    pub fn set_primary_output(&mut self, process: NodeId, output: NodeId, force: bool) -> Result<bool> {
        let (t, p, q) = self.locate_process(process)?;
        let penalty = self.penalty;
        let outputs = &mut self.tiers[t].processors[p].processes[q].outputs;
        let idx = outputs
            .iter()
            .position(|o| o.node == output)
            .ok_or_else(|| PlannerError::not_found(format!("output {output} of process {process}")))?;

        if outputs[idx].primary && !force {
            return Ok(false);
        }
        for (i, o) in outputs.iter_mut().enumerate() {
            o.primary = i == idx;
        }
        calculator::apply_output_quantities(outputs, penalty);
        let quantities: Vec<(NodeId, Option<f64>)> = outputs.iter().map(|o| (o.node, o.quantity)).collect();

        self.emit(PlanEvent::PrimaryOutputChanged { process, output });
        for (node, quantity) in quantities {
            self.emit(PlanEvent::QuantityChanged { node, quantity });
        }
        Ok(true)
    }

    /// Convenience wrapper selecting the primary output by product id
    pub fn set_primary_product(&mut self, process: NodeId, product: &ProductId) -> Result<bool> {
        let output = self
            .process(process)
            .ok_or_else(|| PlannerError::not_found(format!("process {process}")))?
            .output_for(product)
            .map(|o| o.node)
            .ok_or_else(|| PlannerError::not_found(format!("output {product} of process {process}")))?;
        self.set_primary_output(process, output, false)
    }

    /// Update crew science and refresh every multi-output process
    pub fn set_scientists_in_crew(&mut self, scientists: u32) -> Result<()> {
        self.scientists_in_crew = scientists;
        self.penalty = calculator::secondary_output_penalty(scientists);
        self.emit(PlanEvent::PenaltyChanged {
            scientists,
            penalty: self.penalty,
        });

        let targets: Vec<(NodeId, NodeId)> = self
            .processes()
            .filter(|(_, _, p)| p.outputs.len() >= 2)
            .filter_map(|(_, _, p)| p.primary_output().map(|o| (p.node, o.node)))
            .collect();
        for (process, output) in targets {
            self.set_primary_output(process, output, true)?;
        }
        Ok(())
    }

    pub(crate) fn set_active_lines(&mut self, process: NodeId, on: bool) -> Result<()> {
        let at = self.locate_process(process)?;
        self.apply_active_lines(at, process, on);
        Ok(())
    }

    fn apply_active_lines(&mut self, (t, p, q): (usize, usize, usize), process: NodeId, on: bool) {
        let node = &mut self.tiers[t].processors[p].processes[q];
        if node.active_lines != on {
            node.active_lines = on;
            self.emit(PlanEvent::FlagChanged {
                node: process,
                flag: NodeFlag::ActiveLines,
                on,
            });
        }
    }

    // ---------------------------------------------------------------------
    // Link bookkeeping
    // ---------------------------------------------------------------------

    /// Create a link unless one already joins `source` and `target`
    pub(crate) fn create_link(&mut self, source: NodeId, target: NodeId, origin: LinkOrigin) -> bool {
        let first = !self.links.has_links(source);
        match self.links.insert(source, target, origin) {
            Some(link) => {
                self.emit(PlanEvent::LinkCreated { link, source, target });
                if first {
                    self.emit(PlanEvent::FlagChanged {
                        node: source,
                        flag: NodeFlag::HasLines,
                        on: true,
                    });
                }
                true
            }
            None => false,
        }
    }

    /// Remove every link matching `pred`, clearing the has-lines flag of
    /// sources left without links and the active-lines flag of traced
    /// processes left without trace links
    pub(crate) fn destroy_links(&mut self, pred: impl Fn(&Link) -> bool) -> usize {
        let removed = self.links.remove_where(pred);
        let mut emptied = BTreeSet::new();
        let mut traced = BTreeSet::new();
        for link in &removed {
            self.emit(PlanEvent::LinkRemoved {
                link: link.handle,
                source: link.source,
                target: link.target,
            });
            emptied.insert(link.source);
            if let LinkOrigin::Trace(root) = link.origin {
                traced.insert(root);
            }
        }
        for source in emptied {
            if !self.links.has_links(source) {
                self.emit(PlanEvent::FlagChanged {
                    node: source,
                    flag: NodeFlag::HasLines,
                    on: false,
                });
            }
        }
        for root in traced {
            if self.links.iter().any(|l| l.origin == LinkOrigin::Trace(root)) {
                continue;
            }
            if let Ok(at) = self.locate_process(root) {
                self.apply_active_lines(at, root, false);
            }
        }
        removed.len()
    }

    fn drop_links_touching(&mut self, nodes: &[NodeId]) {
        let set: HashSet<NodeId> = nodes.iter().copied().collect();
        let n = self.destroy_links(|l| {
            set.contains(&l.source)
                || set.contains(&l.target)
                || matches!(l.origin, LinkOrigin::Trace(p) if set.contains(&p))
        });
        if n > 0 {
            debug!(removed = n, "cascaded link removal");
        }
    }

    pub(crate) fn reposition_link(&mut self, link: LinkHandle) {
        self.emit(PlanEvent::LinkRepositioned { link });
    }

    pub(crate) fn emphasize_link(&mut self, link: LinkHandle, emphasized: bool) -> bool {
        if self.links.set_emphasis(link, emphasized) {
            self.emit(PlanEvent::LinkEmphasis { link, emphasized });
            true
        } else {
            false
        }
    }
}
