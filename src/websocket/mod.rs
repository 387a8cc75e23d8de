// WebSocket module - organized into focused submodules
//
// - handler: handshake authentication and upgrade (entry point)
// - connection: per-connection read/write loops
// - sending: frame serialization
// - routes: HTTP route setup (ws, health, metrics)
// - metrics: JSON metrics endpoint

mod connection;
mod handler;
mod metrics;
mod routes;
mod sending;

pub use handler::{websocket_handler, HandshakeQuery};
pub use metrics::metrics_handler;
pub use routes::{create_router, run_server};
