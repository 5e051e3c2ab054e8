// Lifeguard Infrastructure - System Adapters
// Implements: CommandExecutor, ProbeReportSink

pub mod env;
pub mod report_sink;
pub mod subprocess_executor;

pub use report_sink::TracingReportSink;
pub use subprocess_executor::SubprocessExecutor;
