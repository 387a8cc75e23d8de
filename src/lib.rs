#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Typing Arena Server
//!
//! Matchmaking queues and live race sessions for competitive typing
//! tournaments, served over a single WebSocket endpoint.
//!
//! Storage is in-memory behind the [`database::RaceStore`] trait and can be
//! seeded from a JSON file of users and race texts.

/// Access-token verification for the WebSocket handshake
pub mod auth;

/// Server configuration and environment variables
pub mod config;

/// Per-connection and per-room message fan-out
pub mod coordination;

/// Race store abstraction layer (in-memory implementation)
pub mod database;

/// Structured logging configuration
pub mod logging;

/// Queues, match formation, live sessions and settlement
pub mod matchmaking;

/// Metrics collection and reporting
pub mod metrics;

/// WebSocket message protocol definitions
pub mod protocol;

/// Main server orchestration
pub mod server;

/// WebSocket connection handling
pub mod websocket;
