//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server of the Lifeguard agent:
//! action invocation, action listing and probe status.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
