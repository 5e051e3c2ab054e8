// Probe Report Sink Port
// Destination for probe status changes and heartbeats

use crate::domain::ProbeEvent;
use async_trait::async_trait;

/// Receives probe events from the scheduler.
///
/// Injected into the scheduler; implementations must not block for long,
/// the calling probe task waits for `report` to return.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeReportSink: Send + Sync {
    async fn report(&self, event: ProbeEvent);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Sink keeping every event in memory
    #[derive(Default, Clone)]
    pub struct RecordingSink {
        events: Arc<Mutex<Vec<ProbeEvent>>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<ProbeEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProbeReportSink for RecordingSink {
        async fn report(&self, event: ProbeEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
