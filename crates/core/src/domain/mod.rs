// Domain Layer - Pure descriptors, state and invariants

pub mod action;
pub mod catalog;
pub mod error;
pub mod invocation;
pub mod probe;

// Re-exports
pub use action::{ActionHandler, ActionName, ActionSpec, ExecAction, RetryPolicySpec};
pub use catalog::Catalog;
pub use error::DomainError;
pub use invocation::{InvocationRequest, Parameters};
pub use probe::{ProbeEvent, ProbeOutcome, ProbeSpec, ProbeState, ProbeStatus, ReportKind};
