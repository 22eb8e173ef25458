//! Quantity calculations, plan summaries and bulk chain generation

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::{PlannerError, Result};
use crate::models::{ProcessDescriptor, ProcessId, ProcessorKind, ProductId, SpectralType};
use crate::plan::{IndustryPlan, PlacedProduct};

/// Penalty applied to secondary outputs with no scientists in the crew
pub const BASE_SECONDARY_OUTPUT_PENALTY: f64 = 0.5;
/// Fractional penalty reduction per scientist
pub const SCIENTIST_PENALTY_REDUCTION: f64 = 0.125;
pub const MAX_CREW_SCIENTISTS: u32 = 5;

/// Plan-wide secondary output penalty in [0, 1)
pub fn secondary_output_penalty(scientists: u32) -> f64 {
    let n = scientists.min(MAX_CREW_SCIENTISTS) as f64;
    BASE_SECONDARY_OUTPUT_PENALTY * (1.0 - SCIENTIST_PENALTY_REDUCTION * n)
}

/// Primary outputs keep their nominal quantity; the rest lose `penalty`
pub fn output_quantity(nominal: f64, primary: bool, penalty: f64) -> f64 {
    if primary { nominal } else { nominal * (1.0 - penalty) }
}

pub fn apply_output_quantities(outputs: &mut [PlacedProduct], penalty: f64) {
    for output in outputs.iter_mut() {
        output.quantity = output
            .nominal
            .map(|nominal| output_quantity(nominal, output.primary, penalty));
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProductBalance {
    pub product: ProductId,
    pub name: String,
    pub produced: f64,
    pub consumed: f64,
    pub startup: bool,
}

impl ProductBalance {
    pub fn net(&self) -> f64 {
        self.produced - self.consumed
    }
}

/// Summary of a plan's structure and product flows
#[derive(Debug)]
pub struct PlanSummary {
    pub title: String,
    pub tiers: usize,
    pub processors: usize,
    pub processes: usize,
    pub penalty: f64,
    pub balances: Vec<ProductBalance>,
}

fn balance_entry<'a>(
    balances: &'a mut BTreeMap<ProductId, ProductBalance>,
    placed: &PlacedProduct,
) -> &'a mut ProductBalance {
    balances
        .entry(placed.product.clone())
        .or_insert_with(|| ProductBalance {
            product: placed.product.clone(),
            name: placed.name.clone(),
            produced: 0.0,
            consumed: 0.0,
            startup: false,
        })
}

pub fn summarize_plan(plan: &IndustryPlan) -> PlanSummary {
    let mut balances: BTreeMap<ProductId, ProductBalance> = BTreeMap::new();

    for startup in plan.startup_products() {
        balance_entry(&mut balances, startup).startup = true;
    }
    let mut processes = 0;
    for (_, _, process) in plan.processes() {
        processes += 1;
        for input in &process.inputs {
            balance_entry(&mut balances, input).consumed += input.quantity.unwrap_or(0.0);
        }
        for output in &process.outputs {
            balance_entry(&mut balances, output).produced += output.quantity.unwrap_or(0.0);
        }
    }

    let mut balances: Vec<ProductBalance> = balances.into_values().collect();
    balances.sort_by(|a, b| a.name.cmp(&b.name));

    PlanSummary {
        title: plan.title().to_string(),
        tiers: plan.tiers().iter().filter(|t| !t.is_empty()).count(),
        processors: plan.processors().count(),
        processes,
        penalty: plan.secondary_output_penalty(),
        balances,
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Plan Summary: {} ===", self.title)?;
        writeln!(
            f,
            "{} tiers, {} processors, {} processes",
            self.tiers, self.processors, self.processes
        )?;
        writeln!(f, "Secondary output penalty: {:.1}%", self.penalty * 100.0)?;
        writeln!(f)?;

        writeln!(f, "{:<28} {:>12} {:>12} {:>12}", "Product", "Produced", "Consumed", "Net")?;
        writeln!(f, "{}", "-".repeat(67))?;
        for b in &self.balances {
            let net = if b.startup && b.net() < 0.0 {
                "supplied".to_string()
            } else {
                format!("{:.3}", b.net())
            };
            writeln!(
                f,
                "{:<28} {:>12.3} {:>12.3} {:>12}",
                b.name, b.produced, b.consumed, net
            )?;
        }
        Ok(())
    }
}

/// Format a plan as an indented tree with node ids
pub fn format_plan(plan: &IndustryPlan) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "{} (crew scientists: {}, penalty {:.1}%)\n",
        plan.title(),
        plan.scientists_in_crew(),
        plan.secondary_output_penalty() * 100.0
    ));

    output.push_str("Startup products:\n");
    if plan.startup_products().is_empty() {
        output.push_str("  (none)\n");
    }
    for s in plan.startup_products() {
        output.push_str(&format!("  {} {} [{}]{}\n", s.node, s.name, s.product, lines_marker(plan, s)));
    }

    for tier in plan.tiers() {
        output.push_str(&format!("Tier {}:\n", tier.ordinal));
        if tier.is_empty() {
            output.push_str("  (empty)\n");
        }
        for (i, processor) in tier.processors.iter().enumerate() {
            let location = processor
                .location
                .map(|l| format!(" @ {l}"))
                .unwrap_or_default();
            output.push_str(&format!(
                "  [{}] {} {}{}\n",
                i,
                processor.node,
                processor.kind.display_name(),
                location
            ));
            for (j, process) in processor.processes.iter().enumerate() {
                let active = if process.active_lines { " *" } else { "" };
                output.push_str(&format!(
                    "    [{}] {} {} (process {}){}\n",
                    j, process.node, process.name, process.process, active
                ));
                if !process.spectral_inputs.is_empty() {
                    output.push_str(&format!(
                        "        spectral: {}\n",
                        SpectralType::format_list(&process.spectral_inputs)
                    ));
                }
                for input in &process.inputs {
                    output.push_str(&format!(
                        "        in  {} {} [{}] x{:.3}\n",
                        input.node,
                        input.name,
                        input.product,
                        input.quantity.unwrap_or(0.0)
                    ));
                }
                for out in &process.outputs {
                    let primary = if out.primary { " (primary)" } else { "" };
                    output.push_str(&format!(
                        "        out {} {} [{}] x{:.3}{}{}\n",
                        out.node,
                        out.name,
                        out.product,
                        out.quantity.unwrap_or(0.0),
                        primary,
                        lines_marker(plan, out)
                    ));
                }
            }
        }
    }

    output
}

fn lines_marker(plan: &IndustryPlan, placed: &PlacedProduct) -> String {
    let n = plan.links().outgoing(placed.node).len();
    if n == 0 { String::new() } else { format!(" -> {n} link(s)") }
}

// ---------------------------------------------------------------------------
// Chain generation
// ---------------------------------------------------------------------------

/// Shared flag used to abandon a running generation
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub max_depth: usize,
    pub scientists_in_crew: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        GenerateOptions {
            max_depth: 20,
            scientists_in_crew: 0,
        }
    }
}

/// Pick the process used to make `product`: processes whose first output is
/// the product win, then the highest nominal quantity, then the lowest id
fn choose_producer<'a>(catalog: &'a Catalog, product: &ProductId) -> Option<&'a ProcessDescriptor> {
    catalog.producers_of(product).into_iter().min_by(|a, b| {
        let a_first = a.outputs.first().is_some_and(|(id, _)| id == product);
        let b_first = b.outputs.first().is_some_and(|(id, _)| id == product);
        let a_qty = a.output_quantity(product).unwrap_or(0.0);
        let b_qty = b.output_quantity(product).unwrap_or(0.0);
        b_first
            .cmp(&a_first)
            .then_with(|| b_qty.total_cmp(&a_qty))
            .then_with(|| a.id.cmp(&b.id))
    })
}

struct ChainWalk<'a> {
    catalog: &'a Catalog,
    options: &'a GenerateOptions,
    cancel: &'a CancelFlag,
    depths: BTreeMap<ProcessId, usize>,
    startup: BTreeSet<ProductId>,
    path: Vec<ProductId>,
}

impl ChainWalk<'_> {
    fn visit(&mut self, product: &ProductId, depth: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }
        if depth > self.options.max_depth {
            return Err(PlannerError::invalid(
                "maximum recursion depth exceeded - possible cycle in production chain",
            ));
        }

        let descriptor = self.catalog.product(product)?;
        let given = depth > 0 && (descriptor.is_raw_material() || self.path.contains(product));
        if given {
            if self.catalog.is_input_eligible(product) {
                self.startup.insert(product.clone());
            }
            return Ok(());
        }

        let Some(producer) = choose_producer(self.catalog, product) else {
            if depth > 0 && self.catalog.is_input_eligible(product) {
                self.startup.insert(product.clone());
                return Ok(());
            }
            return Err(PlannerError::not_found(format!("no process produces {}", descriptor.name)));
        };

        // Deepest occurrence wins so producers always sit below consumers
        match self.depths.get(&producer.id) {
            Some(known) if *known >= depth => return Ok(()),
            _ => {
                self.depths.insert(producer.id, depth);
            }
        }

        self.path.push(product.clone());
        for (input, _) in &producer.inputs {
            self.visit(input, depth + 1)?;
        }
        self.path.pop();
        Ok(())
    }
}

/// Build a complete plan producing `target`, working backwards through the
/// catalog. Raw materials become startup products.
pub fn generate_plan(
    catalog: &Catalog,
    title: &str,
    target: &ProductId,
    options: &GenerateOptions,
    cancel: &CancelFlag,
) -> Result<IndustryPlan> {
    let mut walk = ChainWalk {
        catalog,
        options,
        cancel,
        depths: BTreeMap::new(),
        startup: BTreeSet::new(),
        path: Vec::new(),
    };
    walk.visit(target, 0)?;

    let mut plan = IndustryPlan::new(title)?;
    plan.set_scientists_in_crew(options.scientists_in_crew)?;
    for product in &walk.startup {
        plan.add_startup_product(catalog, product)?;
    }

    let deepest = walk.depths.values().copied().max().unwrap_or(0);
    let mut by_tier: BTreeMap<usize, BTreeMap<ProcessorKind, Vec<ProcessId>>> = BTreeMap::new();
    for (process, depth) in &walk.depths {
        let kind = catalog.process(*process)?.processor;
        by_tier
            .entry(deepest - depth + 1)
            .or_default()
            .entry(kind)
            .or_default()
            .push(*process);
    }

    for (tier, kinds) in by_tier {
        if cancel.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }
        for (kind, processes) in kinds {
            let processor = plan.add_processor(tier, kind)?;
            for process in processes {
                plan.add_process(catalog, processor, process)?;
            }
        }
        debug!(tier, "generated tier");
    }

    info!(
        title = plan.title(),
        %target,
        processes = walk.depths.len(),
        tiers = deepest + 1,
        "plan generated"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample;
    use proptest::prelude::*;

    #[test]
    fn two_scientists_give_three_eighths() {
        assert_eq!(secondary_output_penalty(0), 0.5);
        assert_eq!(secondary_output_penalty(2), 0.375);
        assert_eq!(secondary_output_penalty(50), secondary_output_penalty(MAX_CREW_SCIENTISTS));
    }

    proptest! {
        #[test]
        fn penalty_stays_in_unit_range(n in 0u32..1000) {
            let p = secondary_output_penalty(n);
            prop_assert!((0.0..1.0).contains(&p));
        }

        #[test]
        fn exactly_one_output_keeps_nominal(
            nominals in proptest::collection::vec(0.5f64..1000.0, 2..6),
            primary in 0usize..6,
            penalty in 0.0f64..0.999,
        ) {
            let primary = primary % nominals.len();
            let mut outputs: Vec<PlacedProduct> = nominals
                .iter()
                .enumerate()
                .map(|(i, n)| PlacedProduct {
                    node: crate::plan::NodeId(i as u64),
                    product: ProductId::new(i.to_string()),
                    name: i.to_string(),
                    placement: crate::plan::Placement::ProcessOutput,
                    nominal: Some(*n),
                    quantity: None,
                    primary: i == primary,
                })
                .collect();
            apply_output_quantities(&mut outputs, penalty);
            for (i, o) in outputs.iter().enumerate() {
                let expected = if i == primary { nominals[i] } else { nominals[i] * (1.0 - penalty) };
                prop_assert_eq!(o.quantity, Some(expected));
            }
        }
    }

    #[test]
    fn generated_plan_places_producers_below_consumers() {
        let catalog = sample::sample_catalog();
        let plan = generate_plan(
            &catalog,
            "Transport",
            &ProductId::ship(1),
            &GenerateOptions::default(),
            &CancelFlag::default(),
        )
        .unwrap();

        // Integration in the top tier, raw materials supplied up front
        let top = plan.tiers().iter().rev().find(|t| !t.is_empty()).unwrap();
        assert!(top.output_products().contains(&ProductId::ship(1)));
        assert!(plan.startup_node(&ProductId::from("7")).is_some());
        assert!(plan.tiers().last().unwrap().is_empty());

        for (tier, _, process) in plan.processes() {
            for input in &process.inputs {
                let supplied_below = plan.startup_node(&input.product).is_some()
                    || plan
                        .processes()
                        .any(|(t, _, p)| t < tier && p.output_for(&input.product).is_some());
                assert!(supplied_below, "{} lacks a supplier", input.name);
            }
        }
    }

    #[test]
    fn generation_honours_cancellation() {
        let catalog = sample::sample_catalog();
        let cancel = CancelFlag::default();
        cancel.cancel();
        let result = generate_plan(
            &catalog,
            "Cancelled",
            &ProductId::from("13"),
            &GenerateOptions::default(),
            &cancel,
        );
        assert!(matches!(result, Err(PlannerError::Cancelled)));
    }

    #[test]
    fn summary_balances_products() {
        let catalog = sample::sample_catalog();
        let mut plan = IndustryPlan::new("Water").unwrap();
        plan.add_startup_product(&catalog, &ProductId::from("1")).unwrap();
        let refinery = plan.add_processor(1, ProcessorKind::Refinery).unwrap();
        plan.add_process(&catalog, refinery, ProcessId(10)).unwrap();

        let summary = summarize_plan(&plan);
        assert_eq!(summary.tiers, 1);
        assert_eq!(summary.processes, 1);
        let water = summary.balances.iter().find(|b| b.name == "Water").unwrap();
        assert!(water.startup);
        assert_eq!(water.consumed, 1000.0);
        let hydrogen = summary.balances.iter().find(|b| b.name == "Hydrogen").unwrap();
        assert_eq!(hydrogen.produced, 56.0);
        assert!(summary.to_string().contains("supplied"));
        assert!(format_plan(&plan).contains("Water Electrolysis"));
    }
}
