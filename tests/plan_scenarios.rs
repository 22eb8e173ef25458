use industry_planner::calculator;
use industry_planner::links::{self, HighestThroughput, LinkToggle};
use industry_planner::models::{ProcessDescriptor, ProductClass, ProductDescriptor};
use industry_planner::{Catalog, IndustryPlan, NodeId, PlannerError, ProcessId, ProcessorKind, ProductId};

fn product(id: &str, name: &str, raw: bool) -> ProductDescriptor {
    ProductDescriptor {
        id: ProductId::from(id),
        name: name.to_string(),
        category: None,
        class: Some(if raw { ProductClass::RawMaterial } else { ProductClass::RefinedMaterial }),
        mass_kg: None,
        volume_m3: None,
        spectral_types: Vec::new(),
    }
}

fn process(id: u32, processor: ProcessorKind, inputs: &[(&str, f64)], outputs: &[(&str, f64)]) -> ProcessDescriptor {
    ProcessDescriptor {
        id: ProcessId(id),
        name: format!("Process {id}"),
        processor,
        inputs: inputs.iter().map(|(p, q)| (ProductId::from(*p), *q)).collect(),
        outputs: outputs.iter().map(|(p, q)| (ProductId::from(*p), *q)).collect(),
        batched: false,
    }
}

fn catalog() -> Catalog {
    Catalog::new(
        vec![
            product("P1", "Water", true),
            product("P7", "Oxygen", false),
            product("P9", "Hydrogen", false),
            product("P10", "Propellant", false),
        ],
        vec![
            process(42, ProcessorKind::Refinery, &[("P1", 10.0)], &[("P7", 5.0), ("P9", 2.0)]),
            process(43, ProcessorKind::Factory, &[("P7", 1.0)], &[("P10", 1.0)]),
            process(44, ProcessorKind::Factory, &[("P7", 2.0), ("P9", 1.0)], &[("P10", 3.0)]),
        ],
        Vec::new(),
        Vec::new(),
    )
}

struct Fixture {
    catalog: Catalog,
    plan: IndustryPlan,
    water: NodeId,
    refining: NodeId,
}

impl Fixture {
    fn new() -> Self {
        let catalog = catalog();
        let mut plan = IndustryPlan::new("Scenario").unwrap();
        plan.set_scientists_in_crew(2).unwrap();
        let water = plan.add_startup_product(&catalog, &ProductId::from("P1")).unwrap();
        let refinery = plan.add_processor(1, ProcessorKind::Refinery).unwrap();
        let refining = plan.add_process(&catalog, refinery, ProcessId(42)).unwrap();
        Fixture {
            catalog,
            plan,
            water,
            refining,
        }
    }

    fn output(&self, product: &str) -> NodeId {
        self.plan
            .process(self.refining)
            .unwrap()
            .output_for(&ProductId::from(product))
            .unwrap()
            .node
    }

    fn quantity(&self, product: &str) -> f64 {
        self.plan
            .process(self.refining)
            .unwrap()
            .output_for(&ProductId::from(product))
            .unwrap()
            .quantity
            .unwrap()
    }

    fn add_consumer(&mut self, process: u32) -> (NodeId, NodeId) {
        let factory = self.plan.add_processor(2, ProcessorKind::Factory).unwrap();
        let node = self.plan.add_process(&self.catalog, factory, ProcessId(process)).unwrap();
        (factory, node)
    }

    fn input_of(&self, process: NodeId, product: &str) -> NodeId {
        self.plan
            .process(process)
            .unwrap()
            .inputs
            .iter()
            .find(|i| i.product == ProductId::from(product))
            .unwrap()
            .node
    }
}

#[test]
fn first_catalog_output_is_primary_with_penalized_secondary() {
    let f = Fixture::new();
    assert_eq!(f.plan.secondary_output_penalty(), 0.375);

    let process = f.plan.process(f.refining).unwrap();
    assert_eq!(process.primary_output().unwrap().product, ProductId::from("P7"));
    // Display order is alphabetical, independent of which output is primary
    let names: Vec<&str> = process.outputs.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["Hydrogen", "Oxygen"]);

    assert_eq!(f.quantity("P7"), 5.0);
    assert_eq!(f.quantity("P9"), 1.25);
}

#[test]
fn tracing_a_process_links_its_only_source() {
    let mut f = Fixture::new();
    let toggle = links::toggle_process_lines(&mut f.plan, f.refining, &HighestThroughput).unwrap();
    assert_eq!(toggle, LinkToggle::Added(1));

    let input = f.input_of(f.refining, "P1");
    assert_eq!(f.plan.links().pairs(), vec![(f.water, input)]);
    assert!(f.plan.process(f.refining).unwrap().active_lines);

    let off = links::toggle_process_lines(&mut f.plan, f.refining, &HighestThroughput).unwrap();
    assert_eq!(off, LinkToggle::Removed(1));
    assert!(f.plan.links().is_empty());
}

#[test]
fn refresh_adds_new_consumers_and_removal_prunes() {
    let mut f = Fixture::new();
    let (_, first) = f.add_consumer(43);
    let oxygen = f.output("P7");
    assert_eq!(links::toggle_source(&mut f.plan, oxygen).unwrap(), LinkToggle::Added(1));

    let (_, second) = f.add_consumer(44);
    let second_input = f.input_of(second, "P7");
    assert!(!f.plan.links().contains(oxygen, second_input));

    let report = links::refresh(&mut f.plan);
    assert_eq!(report.added, 1);
    assert_eq!(report.pruned, 0);
    assert!(f.plan.links().contains(oxygen, second_input));
    assert!(f.plan.links().contains(oxygen, f.input_of(first, "P7")));

    f.plan.remove_process(second).unwrap();
    links::refresh(&mut f.plan);
    assert!(!f.plan.links().contains(oxygen, second_input));
    assert_eq!(f.plan.links().outgoing(oxygen).len(), 1);
    assert!(links::refresh(&mut f.plan).is_noop());
}

#[test]
fn switching_primary_leaves_links_alone() {
    let mut f = Fixture::new();
    f.add_consumer(43);
    let oxygen = f.output("P7");
    links::toggle_source(&mut f.plan, oxygen).unwrap();
    let before = f.plan.links().pairs();

    assert!(f.plan.set_primary_product(f.refining, &ProductId::from("P9")).unwrap());
    assert_eq!(f.quantity("P9"), 2.0);
    assert_eq!(f.quantity("P7"), 3.125);
    assert_eq!(f.plan.links().pairs(), before);

    // Selecting the current primary again is a no-op
    assert!(!f.plan.set_primary_product(f.refining, &ProductId::from("P9")).unwrap());
}

#[test]
fn removing_last_processor_of_a_tier_renumbers() {
    let mut f = Fixture::new();
    let (factory, consumer) = f.add_consumer(43);
    let oxygen = f.output("P7");
    links::toggle_source(&mut f.plan, oxygen).unwrap();
    assert_eq!(f.plan.tiers().len(), 3);

    // Removing the only process keeps its processor
    f.plan.remove_process(consumer).unwrap();
    assert!(f.plan.processor(factory).is_some());
    assert!(f.plan.links().is_empty());
    assert_eq!(f.plan.tiers().len(), 3);

    f.plan.remove_processor(factory).unwrap();
    let ordinals: Vec<usize> = f.plan.tiers().iter().map(|t| t.ordinal).collect();
    assert_eq!(ordinals, [1, 2]);
    assert!(f.plan.tiers()[1].is_empty());

    // Removing the refinery collapses tier 1 as well
    let refinery = f.plan.processor_at(1, 0).unwrap().node;
    f.plan.remove_processor(refinery).unwrap();
    assert_eq!(f.plan.tiers().len(), 1);
    assert!(f.plan.process(f.refining).is_none());
}

#[test]
fn structural_errors_leave_plan_untouched() {
    let mut f = Fixture::new();
    let events_before = f.plan.pending_events().len();

    let dup = f.plan.add_startup_product(&f.catalog, &ProductId::from("P1"));
    assert!(matches!(dup, Err(PlannerError::InvalidOperation(_))));

    // P10 is never consumed, so it cannot be a startup product
    let ineligible = f.plan.add_startup_product(&f.catalog, &ProductId::from("P10"));
    assert!(matches!(ineligible, Err(PlannerError::InvalidOperation(_))));

    let refinery = f.plan.processor_at(1, 0).unwrap().node;
    let mismatch = f.plan.add_process(&f.catalog, refinery, ProcessId(43));
    assert!(matches!(mismatch, Err(PlannerError::InvalidOperation(_))));

    assert!(matches!(
        f.plan.add_processor(9, ProcessorKind::Factory),
        Err(PlannerError::NotFound(_))
    ));
    assert_eq!(f.plan.pending_events().len(), events_before);
}

#[test]
fn toggle_without_candidates_reports_it() {
    let mut f = Fixture::new();
    let hydrogen = f.output("P9");
    assert_eq!(links::toggle_source(&mut f.plan, hydrogen).unwrap(), LinkToggle::NoCandidates);
    assert!(f.plan.links().is_empty());
}

#[test]
fn summary_balances_follow_effective_quantities() {
    let f = Fixture::new();
    let summary = calculator::summarize_plan(&f.plan);
    let water = summary.balances.iter().find(|b| b.product == ProductId::from("P1")).unwrap();
    assert!(water.startup);
    assert_eq!(water.consumed, 10.0);
    let hydrogen = summary.balances.iter().find(|b| b.product == ProductId::from("P9")).unwrap();
    assert_eq!(hydrogen.produced, 1.25);
    assert!(summary.to_string().contains("Scenario"));
}
