//! Link reconciliation engine
//!
//! Links are derived, visual edges from a source (startup product or
//! process output) to a process input sitting in a strictly higher tier.
//! They are never persisted. The functions here compute candidate sets and
//! add, remove or reposition links against the current plan structure.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::error::{PlannerError, Result};
use crate::models::ProcessId;
use crate::plan::{IndustryPlan, NodeId, Placement};

/// Opaque handle a presentation layer can key its drawing on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkHandle(pub u64);

impl fmt::Display for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// What created a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkOrigin {
    /// Explicit toggle on a source or target
    Toggle,
    /// Preferred-chain trace rooted at the given process
    Trace(NodeId),
    /// Added by a refresh pass
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub handle: LinkHandle,
    pub source: NodeId,
    pub target: NodeId,
    pub origin: LinkOrigin,
    pub emphasized: bool,
}

/// Links grouped by their source node
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    by_source: BTreeMap<NodeId, Vec<Link>>,
    next_handle: u64,
}

impl LinkTable {
    pub fn outgoing(&self, source: NodeId) -> &[Link] {
        self.by_source.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_links(&self, source: NodeId) -> bool {
        !self.outgoing(source).is_empty()
    }

    pub fn contains(&self, source: NodeId, target: NodeId) -> bool {
        self.outgoing(source).iter().any(|l| l.target == target)
    }

    pub fn sources(&self) -> Vec<NodeId> {
        self.by_source.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.by_source.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// (source, target) pairs in a stable order
    pub fn pairs(&self) -> Vec<(NodeId, NodeId)> {
        let mut pairs: Vec<_> = self.iter().map(|l| (l.source, l.target)).collect();
        pairs.sort();
        pairs
    }

    pub(crate) fn insert(&mut self, source: NodeId, target: NodeId, origin: LinkOrigin) -> Option<LinkHandle> {
        if self.contains(source, target) {
            return None;
        }
        self.next_handle += 1;
        let handle = LinkHandle(self.next_handle);
        self.by_source.entry(source).or_default().push(Link {
            handle,
            source,
            target,
            origin,
            emphasized: false,
        });
        Some(handle)
    }

    pub(crate) fn remove_where(&mut self, pred: impl Fn(&Link) -> bool) -> Vec<Link> {
        let mut removed = Vec::new();
        for links in self.by_source.values_mut() {
            let (gone, kept): (Vec<Link>, Vec<Link>) = links.drain(..).partition(|l| pred(l));
            *links = kept;
            removed.extend(gone);
        }
        self.by_source.retain(|_, links| !links.is_empty());
        removed
    }

    pub(crate) fn set_emphasis(&mut self, handle: LinkHandle, emphasized: bool) -> bool {
        match self
            .by_source
            .values_mut()
            .flatten()
            .find(|l| l.handle == handle)
        {
            Some(link) if link.emphasized != emphasized => {
                link.emphasized = emphasized;
                true
            }
            _ => false,
        }
    }
}

/// Outcome of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkToggle {
    Added(usize),
    Removed(usize),
    /// Nothing qualifies; the node stays without links
    NoCandidates,
}

/// Counts from one refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub pruned: usize,
    pub added: usize,
    pub repositioned: usize,
}

impl RefreshReport {
    pub fn is_noop(&self) -> bool {
        self.pruned == 0 && self.added == 0
    }
}

/// Every input in a strictly higher tier that consumes the source's product
pub fn candidate_targets(plan: &IndustryPlan, source: NodeId) -> Vec<NodeId> {
    let Some(live) = plan.live_node(source) else {
        return Vec::new();
    };
    if live.placement == Placement::ProcessInput {
        return Vec::new();
    }
    let Some(source_tier) = plan.node_tier(source) else {
        return Vec::new();
    };

    plan.processes()
        .filter(|(tier, _, _)| *tier > source_tier)
        .flat_map(|(_, _, process)| process.inputs.iter())
        .filter(|input| input.product == live.product)
        .map(|input| input.node)
        .collect()
}

/// Every startup product and lower-tier output providing the target's product
pub fn candidate_sources(plan: &IndustryPlan, target: NodeId) -> Vec<NodeId> {
    let Some(live) = plan.live_node(target) else {
        return Vec::new();
    };
    if live.placement != Placement::ProcessInput {
        return Vec::new();
    }
    let Some(target_tier) = plan.node_tier(target) else {
        return Vec::new();
    };

    let startup = plan
        .startup_products()
        .iter()
        .filter(|s| s.product == live.product)
        .map(|s| s.node);
    let outputs = plan
        .processes()
        .filter(|(tier, _, _)| *tier < target_tier)
        .flat_map(|(_, _, process)| process.outputs.iter())
        .filter(|o| o.product == live.product)
        .map(|o| o.node);
    startup.chain(outputs).collect()
}

fn require_placement(plan: &IndustryPlan, node: NodeId, wanted: &[Placement]) -> Result<()> {
    let live = plan
        .live_node(node)
        .ok_or_else(|| PlannerError::not_found(format!("node {node}")))?;
    if wanted.contains(&live.placement) {
        Ok(())
    } else {
        Err(PlannerError::invalid(format!(
            "node {node} is a {:?}, expected one of {:?}",
            live.placement, wanted
        )))
    }
}

/// Toggle all links of a source: remove them if it has any, otherwise link
/// it to every candidate target
pub fn toggle_source(plan: &mut IndustryPlan, source: NodeId) -> Result<LinkToggle> {
    require_placement(plan, source, &[Placement::Startup, Placement::ProcessOutput])?;

    if plan.links().has_links(source) {
        let removed = plan.destroy_links(|l| l.source == source);
        debug!(%source, removed, "source lines off");
        return Ok(LinkToggle::Removed(removed));
    }

    let targets = candidate_targets(plan, source);
    if targets.is_empty() {
        return Ok(LinkToggle::NoCandidates);
    }
    let added = targets
        .into_iter()
        .filter(|target| plan.create_link(source, *target, LinkOrigin::Toggle))
        .count();
    debug!(%source, added, "source lines on");
    Ok(LinkToggle::Added(added))
}

/// Toggle the links into an input. Every candidate source is linked or
/// unlinked together since several lower tiers may supply the product.
pub fn toggle_target(plan: &mut IndustryPlan, target: NodeId) -> Result<LinkToggle> {
    require_placement(plan, target, &[Placement::ProcessInput])?;

    let sources = candidate_sources(plan, target);
    if sources.is_empty() {
        return Ok(LinkToggle::NoCandidates);
    }

    if sources.iter().any(|s| plan.links().contains(*s, target)) {
        let removed = plan.destroy_links(|l| l.target == target && sources.contains(&l.source));
        debug!(%target, removed, "target lines off");
        return Ok(LinkToggle::Removed(removed));
    }

    let added = sources
        .iter()
        .filter(|source| plan.create_link(**source, target, LinkOrigin::Toggle))
        .count();
    debug!(%target, added, "target lines on");
    Ok(LinkToggle::Added(added))
}

/// Picks one source among several candidates when tracing a chain
pub trait SourcePreference {
    fn choose(&self, plan: &IndustryPlan, target: NodeId, candidates: &[NodeId]) -> Option<NodeId>;
}

/// Takes the first candidate: startup products, then outputs in tier order
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstFound;

impl SourcePreference for FirstFound {
    fn choose(&self, _plan: &IndustryPlan, _target: NodeId, candidates: &[NodeId]) -> Option<NodeId> {
        candidates.first().copied()
    }
}

/// Startup products first. Among process outputs: highest effective
/// quantity, then lowest tier, then lowest process id, then lowest node id.
#[derive(Debug, Default, Clone, Copy)]
pub struct HighestThroughput;

struct SourceRank {
    startup: bool,
    quantity: f64,
    tier: usize,
    process: Option<ProcessId>,
}

impl SourceRank {
    fn of(plan: &IndustryPlan, node: NodeId) -> SourceRank {
        let live = plan.live_node(node);
        let process = live
            .and_then(|l| l.process)
            .and_then(|p| plan.process(p))
            .map(|p| p.process);
        SourceRank {
            startup: live.is_some_and(|l| l.placement == Placement::Startup),
            quantity: plan.placed(node).and_then(|p| p.quantity).unwrap_or(0.0),
            tier: plan.node_tier(node).unwrap_or(usize::MAX),
            process,
        }
    }

    fn compare(&self, other: &SourceRank) -> Ordering {
        other
            .startup
            .cmp(&self.startup)
            .then_with(|| other.quantity.total_cmp(&self.quantity))
            .then_with(|| self.tier.cmp(&other.tier))
            .then_with(|| self.process.cmp(&other.process))
    }
}

impl SourcePreference for HighestThroughput {
    fn choose(&self, plan: &IndustryPlan, _target: NodeId, candidates: &[NodeId]) -> Option<NodeId> {
        candidates.iter().copied().min_by(|a, b| {
            SourceRank::of(plan, *a)
                .compare(&SourceRank::of(plan, *b))
                .then_with(|| a.cmp(b))
        })
    }
}

/// Toggle the preferred-chain trace for a process. Turning it on clears any
/// other traced process first, so at most one process is the focus.
pub fn toggle_process_lines(
    plan: &mut IndustryPlan,
    process: NodeId,
    preference: &dyn SourcePreference,
) -> Result<LinkToggle> {
    let active = plan
        .process(process)
        .ok_or_else(|| PlannerError::not_found(format!("process {process}")))?
        .active_lines;

    if active {
        let removed = plan.destroy_links(|l| l.origin == LinkOrigin::Trace(process));
        plan.set_active_lines(process, false)?;
        return Ok(LinkToggle::Removed(removed));
    }

    let others: Vec<NodeId> = plan
        .processes()
        .filter(|(_, _, p)| p.active_lines && p.node != process)
        .map(|(_, _, p)| p.node)
        .collect();
    for other in others {
        plan.destroy_links(|l| l.origin == LinkOrigin::Trace(other));
        plan.set_active_lines(other, false)?;
    }

    let has_candidates = plan
        .process(process)
        .map(|p| p.inputs.iter().any(|i| !candidate_sources(plan, i.node).is_empty()))
        .unwrap_or(false);
    if !has_candidates {
        return Ok(LinkToggle::NoCandidates);
    }

    let mut visited = HashSet::new();
    let added = trace_chain(plan, process, process, preference, &mut visited);
    plan.set_active_lines(process, true)?;
    debug!(%process, added, "process chain traced");
    Ok(LinkToggle::Added(added))
}

// Terminates because every step moves to a strictly lower tier. Links that
// already exist are not counted but their upstream chain is still followed.
fn trace_chain(
    plan: &mut IndustryPlan,
    root: NodeId,
    process: NodeId,
    preference: &dyn SourcePreference,
    visited: &mut HashSet<NodeId>,
) -> usize {
    if !visited.insert(process) {
        return 0;
    }
    let inputs: Vec<NodeId> = match plan.process(process) {
        Some(p) => p.inputs.iter().map(|i| i.node).collect(),
        None => return 0,
    };

    let mut added = 0;
    for input in inputs {
        let candidates = candidate_sources(plan, input);
        let Some(source) = preference.choose(plan, input, &candidates) else {
            continue;
        };
        if plan.create_link(source, input, LinkOrigin::Trace(root)) {
            added += 1;
        }
        if let Some(upstream) = plan.live_node(source).and_then(|l| l.process) {
            added += trace_chain(plan, root, upstream, preference, visited);
        }
    }
    added
}

/// Self-healing sweep over every source that owns links: prune links whose
/// target is gone or no longer qualifies, add links to new candidates and
/// reposition the survivors. Sources that keep any link never pass through
/// an empty state during the sweep.
pub fn refresh(plan: &mut IndustryPlan) -> RefreshReport {
    let mut report = RefreshReport::default();

    let sources = plan.links().sources();
    for source in sources {
        if !plan.is_live(source) {
            report.pruned += plan.destroy_links(|l| l.source == source);
            continue;
        }

        let candidates = candidate_targets(plan, source);
        let existing: Vec<NodeId> = plan.links().outgoing(source).iter().map(|l| l.target).collect();
        let stale: HashSet<NodeId> = existing
            .iter()
            .copied()
            .filter(|t| !plan.is_live(*t) || !candidates.contains(t))
            .collect();

        for target in candidates.iter().copied().filter(|t| !existing.contains(t)) {
            if plan.create_link(source, target, LinkOrigin::Refresh) {
                report.added += 1;
            }
        }
        if !stale.is_empty() {
            report.pruned += plan.destroy_links(|l| l.source == source && stale.contains(&l.target));
        }

        let survivors: Vec<LinkHandle> = plan
            .links()
            .outgoing(source)
            .iter()
            .filter(|l| existing.contains(&l.target))
            .map(|l| l.handle)
            .collect();
        for handle in survivors {
            plan.reposition_link(handle);
            report.repositioned += 1;
        }
    }

    if !report.is_noop() {
        debug!(pruned = report.pruned, added = report.added, "links refreshed");
    }
    report
}

/// Raise or lower the visual weight of every link touching `node`
pub fn set_hover(plan: &mut IndustryPlan, node: NodeId, hovered: bool) -> usize {
    let handles: Vec<LinkHandle> = plan
        .links()
        .iter()
        .filter(|l| l.source == node || l.target == node)
        .map(|l| l.handle)
        .collect();
    handles
        .into_iter()
        .filter(|h| plan.emphasize_link(*h, hovered))
        .count()
}
