//! Database schema and operations

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{PlannerError, Result};
use crate::models::{
    BuildingType, LotLocation, ProcessDescriptor, ProcessId, ProductClass, ProductDescriptor, ProductId,
    ShipType, SpectralType,
};
use crate::snapshot::{PlanSnapshot, ProcessSnapshot, ProcessorSnapshot, TierSnapshot};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Catalog: products, including raw materials
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            category TEXT,
            class TEXT,
            mass_kg REAL,
            volume_m3 REAL,
            spectral_types TEXT
        );

        -- Ship and building types become S<n> / B<n> pseudo-products on load
        CREATE TABLE IF NOT EXISTS ships (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS buildings (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS processes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            processor TEXT NOT NULL,
            batched INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS process_inputs (
            process_id INTEGER,
            position INTEGER NOT NULL,
            product_id TEXT,
            quantity REAL NOT NULL,
            PRIMARY KEY (process_id, product_id)
        );

        CREATE TABLE IF NOT EXISTS process_outputs (
            process_id INTEGER,
            position INTEGER NOT NULL,
            product_id TEXT,
            quantity REAL NOT NULL,
            PRIMARY KEY (process_id, product_id)
        );

        -- Saved plans. Links are derived and never stored.
        CREATE TABLE IF NOT EXISTS plans (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL UNIQUE,
            updated_at TEXT NOT NULL,
            scientists INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS plan_startup_products (
            plan_id TEXT,
            position INTEGER,
            product_id TEXT NOT NULL,
            PRIMARY KEY (plan_id, position)
        );

        CREATE TABLE IF NOT EXISTS plan_processors (
            plan_id TEXT,
            tier INTEGER,
            position INTEGER,
            kind TEXT NOT NULL,
            asteroid_id INTEGER,
            lot_index INTEGER,
            PRIMARY KEY (plan_id, tier, position)
        );

        CREATE TABLE IF NOT EXISTS plan_processes (
            plan_id TEXT,
            tier INTEGER,
            processor INTEGER,
            position INTEGER,
            process_id INTEGER NOT NULL,
            primary_output TEXT,
            PRIMARY KEY (plan_id, tier, processor, position)
        );

        CREATE INDEX IF NOT EXISTS idx_process_outputs_product ON process_outputs(product_id);
        CREATE INDEX IF NOT EXISTS idx_process_inputs_product ON process_inputs(product_id);
        CREATE INDEX IF NOT EXISTS idx_processes_processor ON processes(processor);
        "#,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Insert or replace a product
pub fn upsert_product(conn: &Connection, product: &ProductDescriptor) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO products (id, name, category, class, mass_kg, volume_m3, spectral_types)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            product.id.as_str(),
            &product.name,
            &product.category,
            product.class.map(|c| c.as_str()),
            product.mass_kg,
            product.volume_m3,
            SpectralType::format_list(&product.spectral_types),
        ),
    )?;
    Ok(())
}

pub fn upsert_ship(conn: &Connection, ship: &ShipType) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO ships (id, name) VALUES (?1, ?2)",
        (ship.id, &ship.name),
    )?;
    Ok(())
}

pub fn upsert_building(conn: &Connection, building: &BuildingType) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO buildings (id, name) VALUES (?1, ?2)",
        (building.id, &building.name),
    )?;
    Ok(())
}

/// Insert or replace a process together with its input/output tables
pub fn upsert_process(conn: &Connection, process: &ProcessDescriptor) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT OR REPLACE INTO processes (id, name, processor, batched) VALUES (?1, ?2, ?3, ?4)",
        (process.id.0, &process.name, process.processor.as_str(), process.batched),
    )?;
    tx.execute("DELETE FROM process_inputs WHERE process_id = ?1", [process.id.0])?;
    tx.execute("DELETE FROM process_outputs WHERE process_id = ?1", [process.id.0])?;

    for (position, (product, quantity)) in process.inputs.iter().enumerate() {
        tx.execute(
            "INSERT INTO process_inputs (process_id, position, product_id, quantity) VALUES (?1, ?2, ?3, ?4)",
            (process.id.0, position as i64, product.as_str(), quantity),
        )?;
    }
    for (position, (product, quantity)) in process.outputs.iter().enumerate() {
        tx.execute(
            "INSERT INTO process_outputs (process_id, position, product_id, quantity) VALUES (?1, ?2, ?3, ?4)",
            (process.id.0, position as i64, product.as_str(), quantity),
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Clear catalog tables (for re-import). Saved plans are kept.
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM process_outputs;
        DELETE FROM process_inputs;
        DELETE FROM processes;
        DELETE FROM buildings;
        DELETE FROM ships;
        DELETE FROM products;
        "#,
    )?;
    Ok(())
}

pub fn list_products(conn: &Connection) -> Result<Vec<ProductDescriptor>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, class, mass_kg, volume_m3, spectral_types FROM products ORDER BY name",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            ProductDescriptor {
                id: ProductId(row.get(0)?),
                name: row.get(1)?,
                category: row.get(2)?,
                class: None,
                mass_kg: row.get(4)?,
                volume_m3: row.get(5)?,
                spectral_types: SpectralType::parse_list(&row.get::<_, Option<String>>(6)?.unwrap_or_default()),
            },
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (mut product, class) = row?;
        product.class = class.map(|c| c.parse::<ProductClass>()).transpose()?;
        results.push(product);
    }
    Ok(results)
}

pub fn list_ships(conn: &Connection) -> Result<Vec<ShipType>> {
    let mut stmt = conn.prepare("SELECT id, name FROM ships ORDER BY id")?;
    let rows = stmt.query_map([], |row| Ok(ShipType { id: row.get(0)?, name: row.get(1)? }))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn list_buildings(conn: &Connection) -> Result<Vec<BuildingType>> {
    let mut stmt = conn.prepare("SELECT id, name FROM buildings ORDER BY id")?;
    let rows = stmt.query_map([], |row| Ok(BuildingType { id: row.get(0)?, name: row.get(1)? }))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

fn process_products(conn: &Connection, table: &str, process: ProcessId) -> Result<Vec<(ProductId, f64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT product_id, quantity FROM {table} WHERE process_id = ?1 ORDER BY position"
    ))?;
    let rows = stmt.query_map([process.0], |row| Ok((ProductId(row.get(0)?), row.get(1)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn list_processes(conn: &Connection) -> Result<Vec<ProcessDescriptor>> {
    let mut stmt = conn.prepare("SELECT id, name, processor, batched FROM processes ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, u32>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut headers = Vec::new();
    for row in rows {
        headers.push(row?);
    }

    let mut results = Vec::with_capacity(headers.len());
    for (id, name, processor, batched) in headers {
        let id = ProcessId(id);
        results.push(ProcessDescriptor {
            id,
            name,
            processor: processor.parse()?,
            inputs: process_products(conn, "process_inputs", id)?,
            outputs: process_products(conn, "process_outputs", id)?,
            batched,
        });
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PlanRecord {
    pub id: Uuid,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub scientists: u32,
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| PlannerError::invalid(format!("corrupt plan id '{s}': {e}")))
}

/// Whether another plan already uses `title`
pub fn title_in_use(conn: &Connection, title: &str, except: Option<Uuid>) -> Result<bool> {
    let except = except.map(|id| id.to_string()).unwrap_or_default();
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM plans WHERE title = ?1 AND id != ?2",
            (title, &except),
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Save a plan snapshot, replacing any earlier save of the same plan
pub fn save_plan(conn: &Connection, snapshot: &PlanSnapshot) -> Result<()> {
    if title_in_use(conn, &snapshot.title, Some(snapshot.id))? {
        return Err(PlannerError::ReservedNameConflict(snapshot.title.clone()));
    }

    let id = snapshot.id.to_string();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT OR REPLACE INTO plans (id, title, updated_at, scientists) VALUES (?1, ?2, ?3, ?4)",
        (&id, &snapshot.title, snapshot.updated_at, snapshot.scientists_in_crew),
    )?;
    tx.execute("DELETE FROM plan_startup_products WHERE plan_id = ?1", [&id])?;
    tx.execute("DELETE FROM plan_processors WHERE plan_id = ?1", [&id])?;
    tx.execute("DELETE FROM plan_processes WHERE plan_id = ?1", [&id])?;

    for (position, product) in snapshot.startup_products.iter().enumerate() {
        tx.execute(
            "INSERT INTO plan_startup_products (plan_id, position, product_id) VALUES (?1, ?2, ?3)",
            (&id, position as i64, product.as_str()),
        )?;
    }
    for (t, tier) in snapshot.tiers.iter().enumerate() {
        for (p, processor) in tier.processors.iter().enumerate() {
            tx.execute(
                "INSERT INTO plan_processors (plan_id, tier, position, kind, asteroid_id, lot_index)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    &id,
                    t as i64 + 1,
                    p as i64,
                    processor.kind.as_str(),
                    processor.location.map(|l| l.asteroid_id as i64),
                    processor.location.map(|l| l.lot_index as i64),
                ),
            )?;
            for (q, process) in processor.processes.iter().enumerate() {
                tx.execute(
                    "INSERT INTO plan_processes (plan_id, tier, processor, position, process_id, primary_output)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    (
                        &id,
                        t as i64 + 1,
                        p as i64,
                        q as i64,
                        process.process.0,
                        process.primary_output.as_ref().map(|o| o.as_str()),
                    ),
                )?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn list_plans(conn: &Connection) -> Result<Vec<PlanRecord>> {
    let mut stmt = conn.prepare("SELECT id, title, updated_at, scientists FROM plans ORDER BY title")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, DateTime<Utc>>(2)?,
            row.get::<_, u32>(3)?,
        ))
    })?;

    let mut results = Vec::new();
    for row in rows {
        let (id, title, updated_at, scientists) = row?;
        results.push(PlanRecord {
            id: parse_uuid(&id)?,
            title,
            updated_at,
            scientists,
        });
    }
    Ok(results)
}

/// Load the snapshot of the plan titled `title`
pub fn load_plan(conn: &Connection, title: &str) -> Result<PlanSnapshot> {
    let record: Option<(String, DateTime<Utc>, u32)> = conn
        .query_row(
            "SELECT id, updated_at, scientists FROM plans WHERE title = ?1",
            [title],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let (id, updated_at, scientists) =
        record.ok_or_else(|| PlannerError::not_found(format!("plan '{title}'")))?;

    let mut stmt = conn.prepare(
        "SELECT product_id FROM plan_startup_products WHERE plan_id = ?1 ORDER BY position",
    )?;
    let startup_products = stmt
        .query_map([&id], |row| Ok(ProductId(row.get(0)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut tiers: Vec<TierSnapshot> = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT tier, kind, asteroid_id, lot_index FROM plan_processors
         WHERE plan_id = ?1 ORDER BY tier, position",
    )?;
    let processors = stmt
        .query_map([&id], |row| {
            Ok((
                row.get::<_, usize>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<u64>>(2)?,
                row.get::<_, Option<u64>>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (tier, kind, asteroid_id, lot_index) in processors {
        while tiers.len() < tier {
            tiers.push(TierSnapshot { processors: Vec::new() });
        }
        let location = match (asteroid_id, lot_index) {
            (Some(asteroid_id), Some(lot_index)) => Some(LotLocation { asteroid_id, lot_index }),
            _ => None,
        };
        tiers[tier - 1].processors.push(ProcessorSnapshot {
            kind: kind.parse()?,
            location,
            processes: Vec::new(),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT tier, processor, process_id, primary_output FROM plan_processes
         WHERE plan_id = ?1 ORDER BY tier, processor, position",
    )?;
    let processes = stmt
        .query_map([&id], |row| {
            Ok((
                row.get::<_, usize>(0)?,
                row.get::<_, usize>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for (tier, processor, process, primary) in processes {
        let slot = tier
            .checked_sub(1)
            .and_then(|t| tiers.get_mut(t))
            .and_then(|t| t.processors.get_mut(processor))
            .ok_or_else(|| PlannerError::invalid(format!("orphaned process row in plan '{title}'")))?;
        slot.processes.push(ProcessSnapshot {
            process: ProcessId(process),
            primary_output: primary.map(ProductId),
        });
    }

    Ok(PlanSnapshot {
        id: parse_uuid(&id)?,
        title: title.to_string(),
        updated_at,
        scientists_in_crew: scientists,
        startup_products,
        tiers,
    })
}

/// Delete a saved plan. Returns false if no plan had that title.
pub fn delete_plan(conn: &Connection, title: &str) -> Result<bool> {
    let id: Option<String> = conn
        .query_row("SELECT id FROM plans WHERE title = ?1", [title], |row| row.get(0))
        .optional()?;
    let Some(id) = id else {
        return Ok(false);
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM plan_processes WHERE plan_id = ?1", [&id])?;
    tx.execute("DELETE FROM plan_processors WHERE plan_id = ?1", [&id])?;
    tx.execute("DELETE FROM plan_startup_products WHERE plan_id = ?1", [&id])?;
    tx.execute("DELETE FROM plans WHERE id = ?1", [&id])?;
    tx.commit()?;
    Ok(true)
}
