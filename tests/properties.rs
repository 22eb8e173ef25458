use proptest::prelude::*;

use industry_planner::links::{self, HighestThroughput, LinkToggle};
use industry_planner::sample;
use industry_planner::{Catalog, IndustryPlan, NodeId, ProcessId};

/// One user action, with picks reduced modulo whatever is available
#[derive(Debug, Clone, Copy)]
enum Op {
    AddProcess(usize, usize),
    AddStartup(usize),
    ToggleSource(usize),
    ToggleTarget(usize),
    Trace(usize),
    RemoveProcess(usize),
    RemoveProcessor(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0usize..64, 0usize..64).prop_map(|(a, b)| Op::AddProcess(a, b)),
        2 => (0usize..64).prop_map(Op::AddStartup),
        2 => (0usize..64).prop_map(Op::ToggleSource),
        2 => (0usize..64).prop_map(Op::ToggleTarget),
        1 => (0usize..64).prop_map(Op::Trace),
        1 => (0usize..64).prop_map(Op::RemoveProcess),
        1 => (0usize..64).prop_map(Op::RemoveProcessor),
    ]
}

fn sources(plan: &IndustryPlan) -> Vec<NodeId> {
    plan.startup_products()
        .iter()
        .map(|s| s.node)
        .chain(plan.processes().flat_map(|(_, _, p)| p.outputs.iter().map(|o| o.node)))
        .collect()
}

fn inputs(plan: &IndustryPlan) -> Vec<NodeId> {
    plan.processes()
        .flat_map(|(_, _, p)| p.inputs.iter().map(|i| i.node))
        .collect()
}

fn apply(plan: &mut IndustryPlan, catalog: &Catalog, op: Op) {
    match op {
        Op::AddProcess(which, tier) => {
            let ids: Vec<ProcessId> = catalog.processes().map(|p| p.id).collect();
            let id = ids[which % ids.len()];
            let kind = catalog.process(id).unwrap().processor;
            let tier = 1 + tier % plan.tiers().len();
            let processor = plan.add_processor(tier, kind).unwrap();
            plan.add_process(catalog, processor, id).unwrap();
        }
        Op::AddStartup(which) => {
            let candidates: Vec<_> = plan.startup_candidates(catalog).into_iter().cloned().collect();
            if !candidates.is_empty() {
                plan.add_startup_product(catalog, &candidates[which % candidates.len()])
                    .unwrap();
            }
        }
        Op::ToggleSource(which) => {
            let all = sources(plan);
            if !all.is_empty() {
                links::toggle_source(plan, all[which % all.len()]).unwrap();
            }
        }
        Op::ToggleTarget(which) => {
            let all = inputs(plan);
            if !all.is_empty() {
                links::toggle_target(plan, all[which % all.len()]).unwrap();
            }
        }
        Op::Trace(which) => {
            let all: Vec<NodeId> = plan.processes().map(|(_, _, p)| p.node).collect();
            if !all.is_empty() {
                links::toggle_process_lines(plan, all[which % all.len()], &HighestThroughput).unwrap();
            }
        }
        Op::RemoveProcess(which) => {
            let all: Vec<NodeId> = plan.processes().map(|(_, _, p)| p.node).collect();
            if !all.is_empty() {
                plan.remove_process(all[which % all.len()]).unwrap();
            }
        }
        Op::RemoveProcessor(which) => {
            let all: Vec<NodeId> = plan.processors().map(|(_, p)| p.node).collect();
            if !all.is_empty() {
                plan.remove_processor(all[which % all.len()]).unwrap();
            }
        }
    }
}

fn assert_tier_shape(plan: &IndustryPlan) -> Result<(), TestCaseError> {
    let tiers = plan.tiers();
    prop_assert!(!tiers.is_empty());
    for (i, tier) in tiers.iter().enumerate() {
        prop_assert_eq!(tier.ordinal, i + 1);
        prop_assert_eq!(tier.is_empty(), i + 1 == tiers.len());
    }
    Ok(())
}

fn assert_links_climb(plan: &IndustryPlan) -> Result<(), TestCaseError> {
    for link in plan.links().iter() {
        prop_assert!(plan.is_live(link.source) && plan.is_live(link.target));
        let source = plan.node_tier(link.source).unwrap();
        let target = plan.node_tier(link.target).unwrap();
        prop_assert!(source < target, "link {} -> {} goes from tier {} to {}", link.source, link.target, source, target);
    }
    Ok(())
}

proptest! {
    #[test]
    fn links_always_climb_tiers(ops in proptest::collection::vec(op(), 1..40)) {
        let catalog = sample::sample_catalog();
        let mut plan = IndustryPlan::new("Prop").unwrap();
        for op in ops {
            apply(&mut plan, &catalog, op);
            assert_tier_shape(&plan)?;
            assert_links_climb(&plan)?;
        }
        links::refresh(&mut plan);
        assert_links_climb(&plan)?;
    }

    #[test]
    fn refresh_reaches_a_fixed_point(ops in proptest::collection::vec(op(), 1..40)) {
        let catalog = sample::sample_catalog();
        let mut plan = IndustryPlan::new("Prop").unwrap();
        for op in ops {
            apply(&mut plan, &catalog, op);
        }

        links::refresh(&mut plan);
        let settled = plan.links().pairs();
        let again = links::refresh(&mut plan);
        prop_assert!(again.is_noop());
        prop_assert_eq!(plan.links().pairs(), settled);
    }

    #[test]
    fn toggling_a_source_twice_restores_its_targets(
        ops in proptest::collection::vec(op(), 1..30),
        pick in 0usize..64,
    ) {
        let catalog = sample::sample_catalog();
        let mut plan = IndustryPlan::new("Prop").unwrap();
        for op in ops {
            apply(&mut plan, &catalog, op);
        }
        let all = sources(&plan);
        prop_assume!(!all.is_empty());
        let source = all[pick % all.len()];

        // Start from a clean slate for this source
        if plan.links().has_links(source) {
            links::toggle_source(&mut plan, source).unwrap();
        }
        let first = links::toggle_source(&mut plan, source).unwrap();
        let mut targets: Vec<NodeId> = plan.links().outgoing(source).iter().map(|l| l.target).collect();
        targets.sort();

        links::toggle_source(&mut plan, source).unwrap();
        prop_assert!(!plan.links().has_links(source));
        let second = links::toggle_source(&mut plan, source).unwrap();
        let mut again: Vec<NodeId> = plan.links().outgoing(source).iter().map(|l| l.target).collect();
        again.sort();

        prop_assert_eq!(first, second);
        prop_assert_eq!(targets, again);
    }
}

#[test]
fn trailing_tier_survives_additions_anywhere() {
    let catalog = sample::sample_catalog();
    let mut plan = IndustryPlan::new("Tiers").unwrap();
    for tier in [1, 2, 2, 1, 3, 4, 4] {
        let processor = plan.add_processor(tier, industry_planner::ProcessorKind::Factory).unwrap();
        plan.add_process(&catalog, processor, ProcessId(30)).unwrap();
        let last = plan.tiers().last().unwrap();
        assert!(last.is_empty());
        assert_eq!(plan.tiers().iter().filter(|t| t.is_empty()).count(), 1);
    }
    assert_eq!(plan.tiers().len(), 5);
    assert!(matches!(
        links::toggle_source(&mut plan, NodeId(u64::MAX)),
        Err(industry_planner::PlannerError::NotFound(_))
    ));
    // Nothing in the plan supplies iron
    let iron_input = inputs(&plan)[0];
    assert_eq!(links::toggle_target(&mut plan, iron_input).unwrap(), LinkToggle::NoCandidates);
}
