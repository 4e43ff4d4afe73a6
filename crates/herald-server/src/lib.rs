//! HTTP and WebSocket front end.
//!
//! Clients hold a socket on `/ws` and announce the execution they wait on;
//! producers `POST /dispatch` when an execution finishes and the result is
//! pushed down the matching socket.

pub mod config;
pub mod error;
pub mod health;
pub mod hub;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use hub::ConnectionHub;
pub use server::{build_router, start, AppState, ServerHandle, Services};
pub use shutdown::ShutdownCoordinator;
