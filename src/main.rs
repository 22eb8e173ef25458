//! Industry Planner
//!
//! Command-line front end for planning tiered production chains.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::info;
use tracing_subscriber::EnvFilter;

use industry_planner::calculator::{self, CancelFlag, GenerateOptions};
use industry_planner::config::PlannerConfig;
use industry_planner::links::{self, HighestThroughput};
use industry_planner::location::JsonFileSource;
use industry_planner::render::LogSink;
use industry_planner::{
    Catalog, IndustryPlan, LotLocation, NodeId, PlanSnapshot, PlannerContext, ProcessId, ProcessorKind,
    ProductId, db, importer, sample,
};

#[derive(Parser)]
#[command(name = "industry-planner")]
#[command(about = "Production chain planner for tiered space-industry builds")]
struct Cli {
    /// Path to the SQLite database (overrides the config file)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// `<tier>.<processor>` with a 1-based tier and 0-based processor index
#[derive(Debug, Clone, Copy)]
struct ProcessorPath {
    tier: usize,
    processor: usize,
}

/// `<tier>.<processor>.<process>`
#[derive(Debug, Clone, Copy)]
struct ProcessPath {
    tier: usize,
    processor: usize,
    process: usize,
}

fn split_indices(s: &str, n: usize) -> Result<Vec<usize>, String> {
    let parts: Vec<usize> = s
        .split('.')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("'{s}': {e}"))?;
    if parts.len() != n {
        return Err(format!("'{s}' should have {n} dot-separated indices"));
    }
    Ok(parts)
}

impl FromStr for ProcessorPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p = split_indices(s, 2)?;
        Ok(ProcessorPath { tier: p[0], processor: p[1] })
    }
}

impl FromStr for ProcessPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p = split_indices(s, 3)?;
        Ok(ProcessPath {
            tier: p[0],
            processor: p[1],
            process: p[2],
        })
    }
}

impl ProcessorPath {
    fn resolve(&self, plan: &IndustryPlan) -> industry_planner::Result<NodeId> {
        Ok(plan.processor_at(self.tier, self.processor)?.node)
    }
}

impl ProcessPath {
    fn resolve(&self, plan: &IndustryPlan) -> industry_planner::Result<NodeId> {
        Ok(plan.process_at(self.tier, self.processor, self.process)?.node)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Load the built-in sample catalog
    LoadSample,

    /// Import catalog JSON files from a directory
    Import {
        /// Directory containing products*.json, processes*.json, ships*.json, buildings*.json
        dir: PathBuf,

        /// Clear existing catalog data before import
        #[arg(long)]
        clear: bool,
    },

    /// List catalog products
    Products {
        /// Only products some process consumes
        #[arg(long)]
        eligible: bool,
    },

    /// List catalog processes
    Processes {
        /// Only processes run by this processor kind (e.g. REFINERY)
        #[arg(short, long)]
        kind: Option<ProcessorKind>,
    },

    /// List saved plans
    Plans,

    /// Create and save a new empty plan
    New { title: String },

    /// Show a plan as a tree
    Show {
        plan: String,

        /// Print the product balance instead of the tree
        #[arg(short, long)]
        summary: bool,
    },

    /// Delete a saved plan
    Delete { plan: String },

    /// Retitle a saved plan
    Rename { plan: String, title: String },

    /// Add a startup product
    AddStartup { plan: String, product: String },

    /// Remove a startup product
    RemoveStartup { plan: String, product: String },

    /// Add a processor to a tier
    AddProcessor {
        plan: String,
        tier: usize,
        kind: ProcessorKind,
    },

    /// Remove a processor (TIER.INDEX) and its processes
    RemoveProcessor { plan: String, processor: ProcessorPath },

    /// Add a process to a processor (TIER.INDEX)
    AddProcess {
        plan: String,
        processor: ProcessorPath,
        process: u32,
    },

    /// Remove a process (TIER.PROCESSOR.INDEX)
    RemoveProcess { plan: String, process: ProcessPath },

    /// Choose the primary output of a process
    SetPrimary {
        plan: String,
        process: ProcessPath,
        product: String,
    },

    /// Set the number of scientists in the crew
    Scientists { plan: String, count: u32 },

    /// Tie a processor to an asteroid lot (ASTEROID/LOT), or clear it
    Locate {
        plan: String,
        processor: ProcessorPath,
        location: Option<LotLocation>,
    },

    /// Fetch lot states for located processors from a JSON export
    SyncLocations { plan: String, source: PathBuf },

    /// Trace the preferred supply chain of a process
    Trace { plan: String, process: ProcessPath },

    /// Link every source to every eligible input and list the links
    Links { plan: String },

    /// Generate a complete plan for a target product
    Generate {
        title: String,
        target: String,

        #[arg(short, long)]
        scientists: Option<u32>,

        #[arg(long, default_value = "20")]
        max_depth: usize,
    },

    /// Export a plan to a JSON file
    Export { plan: String, file: PathBuf },

    /// Import a plan from a JSON file and save it
    ImportPlan { file: PathBuf },
}

fn open_context(conn: &Connection, config: &PlannerConfig) -> Result<PlannerContext> {
    let catalog = Catalog::load(conn).context("Failed to load catalog")?;
    if catalog.is_empty() {
        println!("Catalog is empty. Run 'import' or 'load-sample' first.");
    }
    Ok(PlannerContext::new(catalog, config))
}

fn open_plan(conn: &Connection, config: &PlannerConfig, title: &str) -> Result<PlannerContext> {
    let mut ctx = open_context(conn, config)?;
    ctx.open_plan(conn, title)?;
    Ok(ctx)
}

/// Push pending events to the log and save
fn commit(ctx: &mut PlannerContext, conn: &Connection) -> Result<()> {
    ctx.flush_events(&mut LogSink);
    ctx.save_active(conn)?;
    Ok(())
}

fn print_tree(ctx: &PlannerContext) {
    if let Some(plan) = ctx.active() {
        print!("{}", calculator::format_plan(plan));
    }
}

fn print_links(plan: &IndustryPlan) {
    if plan.links().is_empty() {
        println!("No links.");
        return;
    }
    for link in plan.links().iter() {
        let name = |node| plan.placed(node).map(|p| p.name.clone()).unwrap_or_default();
        println!(
            "  {} {} (tier {}) -> {} {} (tier {})",
            link.source,
            name(link.source),
            plan.node_tier(link.source).unwrap_or(0),
            link.target,
            name(link.target),
            plan.node_tier(link.target).unwrap_or(0),
        );
    }
}

fn import_plan_file(conn: &Connection, config: &PlannerConfig, file: &Path) -> Result<String> {
    let snapshot = PlanSnapshot::read_file(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let mut ctx = open_context(conn, config)?;
    ctx.import_snapshot(&snapshot)?;
    commit(&mut ctx, conn)?;
    Ok(snapshot.title)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = PlannerConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let database = cli.database.clone().unwrap_or_else(|| config.database.clone());
    let conn = Connection::open(&database).with_context(|| format!("Failed to open {}", database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", database.display());
        }

        Commands::LoadSample => {
            let processes = sample::load_sample_data(&conn)?;
            println!("Loaded {} sample processes", processes);
        }

        Commands::Import { dir, clear } => {
            if clear {
                println!("Clearing existing catalog...");
                db::clear_catalog(&conn)?;
            }
            let stats = importer::import_directory(&conn, &dir)?;
            println!("{}", stats);
        }

        Commands::Products { eligible } => {
            let ctx = open_context(&conn, &config)?;
            let catalog = ctx.catalog();
            println!("{:<8} {:<32} {:<18} {}", "Id", "Product", "Class", "Spectral");
            println!("{}", "-".repeat(66));
            for p in catalog.products() {
                if eligible && !catalog.is_input_eligible(&p.id) {
                    continue;
                }
                println!(
                    "{:<8} {:<32} {:<18} {}",
                    p.id.as_str(),
                    p.name,
                    p.class.map(|c| c.as_str()).unwrap_or("-"),
                    industry_planner::models::SpectralType::format_list(&p.spectral_types)
                );
            }
        }

        Commands::Processes { kind } => {
            let ctx = open_context(&conn, &config)?;
            let catalog = ctx.catalog();
            let processes = match kind {
                Some(kind) => catalog.processes_for(kind),
                None => catalog.processes().collect(),
            };
            for p in processes {
                let list = |items: &[(ProductId, f64)]| {
                    items
                        .iter()
                        .map(|(id, q)| format!("{} x{}", catalog.product_name(id), q))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                println!("{:>4} {} [{}]", p.id.0, p.name, p.processor.as_str());
                if !p.inputs.is_empty() {
                    println!("       in:  {}", list(&p.inputs));
                }
                println!("       out: {}", list(&p.outputs));
            }
        }

        Commands::Plans => {
            let plans = db::list_plans(&conn)?;
            if plans.is_empty() {
                println!("No saved plans.");
            }
            for p in plans {
                println!(
                    "{:<32} {:>3} scientists  updated {}",
                    p.title,
                    p.scientists,
                    p.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        Commands::New { title } => {
            let mut ctx = open_context(&conn, &config)?;
            ctx.new_plan(&conn, &title)?;
            commit(&mut ctx, &conn)?;
            info!(%title, "plan created");
            print_tree(&ctx);
        }

        Commands::Show { plan, summary } => {
            let ctx = open_plan(&conn, &config, &plan)?;
            if let Some(active) = ctx.active() {
                if summary {
                    println!("{}", calculator::summarize_plan(active));
                } else {
                    print!("{}", calculator::format_plan(active));
                }
            }
        }

        Commands::Delete { plan } => {
            if db::delete_plan(&conn, &plan)? {
                println!("Deleted '{}'", plan);
            } else {
                println!("Plan '{}' not found", plan);
            }
        }

        Commands::Rename { plan, title } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.rename_active(&conn, &title)?;
            commit(&mut ctx, &conn)?;
            println!("Renamed '{}' to '{}'", plan, title);
        }

        Commands::AddStartup { plan, product } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, catalog| p.add_startup_product(catalog, &ProductId::new(product)))?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::RemoveStartup { plan, product } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, _| {
                let product = ProductId::new(product);
                let node = p
                    .startup_node(&product)
                    .ok_or_else(|| industry_planner::PlannerError::not_found(format!("startup product {product}")))?;
                p.remove_startup_product(node)
            })?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::AddProcessor { plan, tier, kind } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, _| p.add_processor(tier, kind))?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::RemoveProcessor { plan, processor } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, _| {
                let node = processor.resolve(p)?;
                p.remove_processor(node)
            })?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::AddProcess { plan, processor, process } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, catalog| {
                let node = processor.resolve(p)?;
                p.add_process(catalog, node, ProcessId(process))
            })?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::RemoveProcess { plan, process } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, _| {
                let node = process.resolve(p)?;
                p.remove_process(node)
            })?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::SetPrimary { plan, process, product } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            let changed = ctx.edit_active(|p, _| {
                let node = process.resolve(p)?;
                p.set_primary_product(node, &ProductId::new(product))
            })?;
            if changed {
                commit(&mut ctx, &conn)?;
            } else {
                println!("Already primary.");
            }
            print_tree(&ctx);
        }

        Commands::Scientists { plan, count } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, _| p.set_scientists_in_crew(count))?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::Locate { plan, processor, location } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, _| {
                let node = processor.resolve(p)?;
                p.set_processor_location(node, location)
            })?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::SyncLocations { plan, source } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            let outcome = ctx.refresh_locations(&JsonFileSource::new(&source))?;
            if outcome.failed {
                println!("Location fetch failed; keeping previous state.");
            }
            let Some(active) = ctx.active() else {
                return Ok(());
            };
            for (tier, processor) in active.processors() {
                let Some(lot) = processor.location else {
                    continue;
                };
                let state = ctx.locations().get(&lot);
                println!(
                    "Tier {} {} @ {}: {}",
                    tier,
                    processor.kind.display_name(),
                    lot,
                    state
                        .and_then(|s| s.building.clone())
                        .unwrap_or_else(|| "unknown".to_string())
                );
            }
        }

        Commands::Trace { plan, process } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            let toggle = ctx.edit_active(|p, _| {
                let node = process.resolve(p)?;
                links::toggle_process_lines(p, node, &HighestThroughput)
            })?;
            ctx.flush_events(&mut LogSink);
            println!("{:?}", toggle);
            if let Some(active) = ctx.active() {
                print_links(active);
            }
        }

        Commands::Links { plan } => {
            let mut ctx = open_plan(&conn, &config, &plan)?;
            ctx.edit_active(|p, _| {
                let sources: Vec<NodeId> = p
                    .startup_products()
                    .iter()
                    .map(|s| s.node)
                    .chain(p.processes().flat_map(|(_, _, q)| q.outputs.iter().map(|o| o.node)))
                    .collect();
                for source in sources {
                    if !p.links().has_links(source) {
                        links::toggle_source(p, source)?;
                    }
                }
                Ok(links::refresh(p))
            })?;
            ctx.flush_events(&mut LogSink);
            if let Some(active) = ctx.active() {
                print_links(active);
            }
        }

        Commands::Generate {
            title,
            target,
            scientists,
            max_depth,
        } => {
            let mut ctx = open_context(&conn, &config)?;
            let options = GenerateOptions {
                max_depth,
                scientists_in_crew: scientists.unwrap_or(config.default_scientists),
            };
            ctx.generate(&conn, &title, &ProductId::new(target), options, CancelFlag::default())
                .await?;
            commit(&mut ctx, &conn)?;
            print_tree(&ctx);
        }

        Commands::Export { plan, file } => {
            let snapshot = db::load_plan(&conn, &plan)?;
            snapshot
                .write_file(&file)
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!("Exported '{}' to {}", plan, file.display());
        }

        Commands::ImportPlan { file } => {
            let title = import_plan_file(&conn, &config, &file)?;
            println!("Imported '{}'", title);
        }
    }

    Ok(())
}
