//! Process-wide planner state: the catalog, the single active plan and the
//! location cache, passed explicitly to whatever needs them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::calculator::{self, CancelFlag, GenerateOptions};
use crate::catalog::Catalog;
use crate::config::PlannerConfig;
use crate::db;
use crate::error::{PlannerError, Result};
use crate::location::{self, LocationCache, LocationSource, SyncOutcome};
use crate::models::ProductId;
use crate::plan::{IndustryPlan, validate_title};
use crate::render::RenderSink;
use crate::snapshot::PlanSnapshot;

/// Clears the busy flag however the guarded work ends
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            return Err(PlannerError::invalid("planner is busy"));
        }
        Ok(BusyGuard(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct PlannerContext {
    catalog: Arc<Catalog>,
    active: Option<IndustryPlan>,
    locations: LocationCache,
    busy: Arc<AtomicBool>,
    default_scientists: u32,
}

impl PlannerContext {
    pub fn new(catalog: Catalog, config: &PlannerConfig) -> Self {
        PlannerContext {
            catalog: Arc::new(catalog),
            active: None,
            locations: LocationCache::new(config.location_freshness_secs),
            busy: Arc::new(AtomicBool::new(false)),
            default_scientists: config.default_scientists,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn locations(&self) -> &LocationCache {
        &self.locations
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Shared handle for observers that need to show a busy indicator
    pub fn busy_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.busy)
    }

    pub fn active(&self) -> Option<&IndustryPlan> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Result<&mut IndustryPlan> {
        self.active.as_mut().ok_or_else(|| PlannerError::not_found("active plan"))
    }

    /// Run `f` against the active plan with the catalog alongside
    pub fn edit_active<T>(&mut self, f: impl FnOnce(&mut IndustryPlan, &Catalog) -> Result<T>) -> Result<T> {
        let plan = self.active.as_mut().ok_or_else(|| PlannerError::not_found("active plan"))?;
        f(plan, &self.catalog)
    }

    /// Install `plan` as the active plan; the previous one is dropped whole.
    pub fn replace_active(&mut self, plan: IndustryPlan) -> &mut IndustryPlan {
        if let Some(old) = &self.active {
            if !old.is_saved() {
                warn!(title = old.title(), "discarding unsaved plan");
            }
        }
        info!(title = plan.title(), id = %plan.id(), "plan activated");
        self.active.insert(plan)
    }

    pub fn close(&mut self) -> Option<IndustryPlan> {
        self.active.take()
    }

    pub fn new_plan(&mut self, conn: &Connection, title: &str) -> Result<&mut IndustryPlan> {
        let title = validate_title(title)?;
        if db::title_in_use(conn, &title, None)? {
            return Err(PlannerError::ReservedNameConflict(title));
        }
        let mut plan = IndustryPlan::new(&title)?;
        plan.set_scientists_in_crew(self.default_scientists)?;
        Ok(self.replace_active(plan))
    }

    pub fn open_plan(&mut self, conn: &Connection, title: &str) -> Result<&mut IndustryPlan> {
        let snapshot = db::load_plan(conn, title)?;
        let plan = snapshot.restore(&self.catalog)?;
        Ok(self.replace_active(plan))
    }

    pub fn import_snapshot(&mut self, snapshot: &PlanSnapshot) -> Result<&mut IndustryPlan> {
        let plan = snapshot.restore(&self.catalog)?;
        Ok(self.replace_active(plan))
    }

    pub fn save_active(&mut self, conn: &Connection) -> Result<()> {
        let plan = self.active_mut()?;
        let now = Utc::now();
        let mut snapshot = PlanSnapshot::capture(plan);
        snapshot.updated_at = now;
        db::save_plan(conn, &snapshot)?;
        plan.mark_saved(now);
        info!(title = plan.title(), "plan saved");
        Ok(())
    }

    /// Retitle the active plan. Titles of other saved plans are reserved.
    pub fn rename_active(&mut self, conn: &Connection, title: &str) -> Result<()> {
        let title = validate_title(title)?;
        let plan = self.active_mut()?;
        if db::title_in_use(conn, &title, Some(plan.id()))? {
            return Err(PlannerError::ReservedNameConflict(title));
        }
        plan.set_title(&title)
    }

    /// Hand every pending plan event to `sink`
    pub fn flush_events(&mut self, sink: &mut dyn RenderSink) -> usize {
        let Some(plan) = self.active.as_mut() else {
            return 0;
        };
        let events = plan.drain_events();
        for event in &events {
            sink.on_event(event);
        }
        events.len()
    }

    /// Build a plan for `target` on a blocking worker and make it active.
    ///
    /// The title must be free among saved plans. The busy flag is raised
    /// before the worker starts and cleared when it finishes, fails or is
    /// cancelled through `cancel`.
    pub async fn generate(
        &mut self,
        conn: &Connection,
        title: &str,
        target: &ProductId,
        options: GenerateOptions,
        cancel: CancelFlag,
    ) -> Result<&mut IndustryPlan> {
        let title = validate_title(title)?;
        if db::title_in_use(conn, &title, None)? {
            return Err(PlannerError::ReservedNameConflict(title));
        }
        let _busy = BusyGuard::acquire(&self.busy)?;

        let catalog = Arc::clone(&self.catalog);
        let target = target.clone();
        let task = tokio::task::spawn_blocking(move || {
            calculator::generate_plan(&catalog, &title, &target, &options, &cancel)
        });

        let plan = task
            .await
            .map_err(|e| PlannerError::invalid(format!("generation task failed: {e}")))??;
        Ok(self.replace_active(plan))
    }

    /// Best-effort update of cached lot states for the active plan
    pub fn refresh_locations(&mut self, source: &dyn LocationSource) -> Result<SyncOutcome> {
        let plan = self.active.as_ref().ok_or_else(|| PlannerError::not_found("active plan"))?;
        let lots = location::plan_locations(plan);
        Ok(self.locations.refresh(source, &lots, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PlanEvent;
    use crate::models::ProcessorKind;
    use crate::render::RecordingSink;
    use crate::sample;

    fn context() -> (PlannerContext, Connection) {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let config = PlannerConfig {
            default_scientists: 2,
            ..Default::default()
        };
        (PlannerContext::new(sample::sample_catalog(), &config), conn)
    }

    #[test]
    fn new_plan_uses_configured_crew() {
        let (mut ctx, conn) = context();
        let plan = ctx.new_plan(&conn, "Base").unwrap();
        assert_eq!(plan.secondary_output_penalty(), 0.375);
        assert!(matches!(ctx.new_plan(&conn, "  "), Err(PlannerError::InvalidOperation(_))));
        // The failed call leaves the active plan alone
        assert_eq!(ctx.active().unwrap().title(), "Base");
    }

    #[test]
    fn save_open_and_rename() {
        let (mut ctx, conn) = context();
        ctx.new_plan(&conn, "First").unwrap();
        ctx.save_active(&conn).unwrap();
        assert!(ctx.active().unwrap().is_saved());

        ctx.new_plan(&conn, "Second").unwrap();
        ctx.active_mut().unwrap().add_processor(1, ProcessorKind::Factory).unwrap();
        ctx.save_active(&conn).unwrap();

        let err = ctx.rename_active(&conn, "First").unwrap_err();
        assert!(matches!(err, PlannerError::ReservedNameConflict(_)));
        assert_eq!(ctx.active().unwrap().title(), "Second");
        assert!(matches!(ctx.new_plan(&conn, "First"), Err(PlannerError::ReservedNameConflict(_))));

        let reopened = ctx.open_plan(&conn, "First").unwrap();
        assert_eq!(reopened.tiers().len(), 1);
        assert!(reopened.is_saved());
    }

    #[test]
    fn flush_forwards_events_to_sink() {
        let (mut ctx, conn) = context();
        let mut sink = RecordingSink::default();
        assert_eq!(ctx.flush_events(&mut sink), 0);

        ctx.new_plan(&conn, "Events").unwrap();
        ctx.active_mut().unwrap().add_processor(1, ProcessorKind::Refinery).unwrap();
        let flushed = ctx.flush_events(&mut sink);
        assert_eq!(flushed, sink.events.len());
        assert_eq!(sink.count(|e| matches!(e, PlanEvent::ProcessorAdded { .. })), 1);
        assert_eq!(ctx.flush_events(&mut sink), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn generation_toggles_busy_and_activates_plan() {
        let (mut ctx, conn) = context();
        let busy = ctx.busy_flag();
        let plan = ctx
            .generate(&conn, "Ship", &ProductId::ship(1), GenerateOptions::default(), CancelFlag::default())
            .await
            .unwrap();
        assert!(plan.processes().count() > 0);
        assert!(!busy.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_generation_keeps_previous_plan() {
        let (mut ctx, conn) = context();
        ctx.new_plan(&conn, "Keep").unwrap();
        let cancel = CancelFlag::default();
        cancel.cancel();

        let result = ctx
            .generate(&conn, "Ship", &ProductId::ship(1), GenerateOptions::default(), cancel)
            .await;
        assert!(matches!(result, Err(PlannerError::Cancelled)));
        assert_eq!(ctx.active().unwrap().title(), "Keep");
        assert!(!ctx.is_busy());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn generation_rejects_a_saved_title() {
        let (mut ctx, conn) = context();
        ctx.new_plan(&conn, "Taken").unwrap();
        ctx.save_active(&conn).unwrap();
        ctx.new_plan(&conn, "Keep").unwrap();

        let result = ctx
            .generate(&conn, "Taken", &ProductId::ship(1), GenerateOptions::default(), CancelFlag::default())
            .await;
        assert!(matches!(result, Err(PlannerError::ReservedNameConflict(_))));
        assert_eq!(ctx.active().unwrap().title(), "Keep");
        assert!(!ctx.is_busy());
    }
}
