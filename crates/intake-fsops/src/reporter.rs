//! Event and metric fan-out shared by the pipeline tasks.

use intake_events::{Event, EventBus};
use intake_telemetry::Metrics;
use tracing::trace;

#[derive(Clone, Debug)]
pub(crate) struct Reporter {
    events: EventBus,
    metrics: Metrics,
}

impl Reporter {
    pub(crate) const fn new(events: EventBus, metrics: Metrics) -> Self {
        Self { events, metrics }
    }

    pub(crate) const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub(crate) fn publish(&self, event: Event) {
        let kind = event.kind();
        let id = self.events.publish(event);
        self.metrics.inc_event(kind);
        trace!(event_id = id, kind, "event published");
    }
}
