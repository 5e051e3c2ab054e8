// Probe report sink writing events to the structured log

use async_trait::async_trait;
use lifeguard_core::domain::{ProbeEvent, ReportKind};
use lifeguard_core::port::ProbeReportSink;
use tracing::{debug, info, warn};

/// Emits every probe event as a structured log record under the
/// `lifeguard::probe_report` target, with the event JSON attached.
#[derive(Debug, Default, Clone)]
pub struct TracingReportSink;

#[async_trait]
impl ProbeReportSink for TracingReportSink {
    async fn report(&self, event: ProbeEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(probe = %event.probe, error = %e, "Failed to encode probe event");
                return;
            }
        };

        match event.kind {
            ReportKind::Heartbeat => debug!(
                target: "lifeguard::probe_report",
                probe = %event.probe,
                status = %event.status,
                event = %payload,
                "Probe heartbeat"
            ),
            ReportKind::Transition | ReportKind::OutputChanged => info!(
                target: "lifeguard::probe_report",
                probe = %event.probe,
                status = %event.status,
                kind = ?event.kind,
                event = %payload,
                "Probe event"
            ),
        }
    }
}
