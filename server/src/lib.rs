//! FormGate HTTP server.
//!
//! Public endpoints resolve share tokens through the intake pipeline; admin
//! endpoints manage templates, offerings, bindings, and inventory limits. All
//! storage access goes through the trait seams in `formgate-core`, so the
//! HTTP tests run against the in-memory fakes.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod health;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use routes::build_router;
pub use state::AppState;
