//! Reference facilitator service.
//!
//! Serves the facilitator HTTP API (`/verify`, `/settle`, `/supported`) in
//! front of any [`h402::Facilitator`]. The bundled [`LocalFacilitator`]
//! settles into an in-memory ledger, which is enough for development and
//! tests.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`error`] - HTTP error responses
//! - [`handlers`] - Axum route handlers and router builder
//! - [`local`] - In-process facilitator with an idempotent ledger

pub mod config;
pub mod error;
pub mod handlers;
pub mod local;

pub use handlers::facilitator_router;
pub use local::LocalFacilitator;
