//! Presentation sinks that consume plan events

use tracing::debug;

use crate::events::PlanEvent;

/// Anything that mirrors the plan on screen. The core never reads geometry
/// back; liveness is answered by the plan itself.
pub trait RenderSink {
    fn on_event(&mut self, event: &PlanEvent);
}

/// Logs every event at debug level
#[derive(Debug, Default)]
pub struct LogSink;

impl RenderSink for LogSink {
    fn on_event(&mut self, event: &PlanEvent) {
        debug!(?event, "render");
    }
}

/// Keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<PlanEvent>,
}

impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&PlanEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl RenderSink for RecordingSink {
    fn on_event(&mut self, event: &PlanEvent) {
        self.events.push(event.clone());
    }
}
