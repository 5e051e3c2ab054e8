// Port Layer - Interfaces for external dependencies

pub mod command_executor;
pub mod id_provider; // For deterministic testing
pub mod report_sink;
pub mod time_provider;

// Re-exports
pub use command_executor::{
    CommandExecutor, Completion, ExecHandle, ExecOptions, ExecSenders, ExecutionError,
    InvocationResult, StderrCapture, StreamKind,
};
pub use id_provider::IdProvider;
pub use report_sink::ProbeReportSink;
pub use time_provider::TimeProvider;
