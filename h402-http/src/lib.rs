#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for payment-gated routes.
//!
//! Provides header encoding/decoding, constants, and (feature-gated) the
//! server-side payment gate with its facilitator client.
//!
//! # Modules
//!
//! - [`constants`] - HTTP header names, status codes, default URLs
//! - [`headers`] - Base64 encoding/decoding for payment headers
//! - [`error`] - HTTP transport error types
//! - `server` - Tower payment gate and HTTP facilitator client (feature: `server`)

pub mod constants;
pub mod error;
pub mod headers;

#[cfg(feature = "server")]
pub mod server;
