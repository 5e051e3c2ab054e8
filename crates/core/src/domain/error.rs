// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid descriptor for {name}: {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Probe {probe} references unknown action {action}")]
    UnknownAction { probe: String, action: String },

    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
