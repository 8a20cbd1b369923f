//! HTTP API module.
//!
//! Axum server, request/response types and the log broadcaster that also
//! backs the CLI output.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{router, start_server, AppState, SharedState};
pub use types::*;
