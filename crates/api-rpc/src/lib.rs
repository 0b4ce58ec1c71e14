//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 control surface of the Vaultq job engine:
//! enqueue, status, cancel, per-queue stats and manual maintenance.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
