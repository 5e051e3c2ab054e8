// Application Layer - Use Cases and Business Logic

pub mod dispatch;
pub mod probe_scheduler;
pub mod registry;
pub mod retry;
pub mod shutdown;

// Re-exports
pub use dispatch::{CompletionHandle, Dispatched, Dispatcher};
pub use probe_scheduler::{ProbeScheduler, ProbeStatusBoard, RunningProbes};
pub use registry::{Registry, ResolvedProbe};
pub use retry::{RetryController, RetryDecision};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
