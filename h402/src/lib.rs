#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for payment-gated HTTP routes.
//!
//! This crate holds everything a resource server needs to decide what a route
//! costs and whether a submitted payment satisfies it, without doing any I/O.
//! HTTP transport lives in `h402-http`; a reference facilitator service lives
//! in `h402-facilitator`.
//!
//! # Overview
//!
//! A route is priced with a [`route::RouteRule`]. For every request to a priced
//! route the server builds one [`proto::PaymentRequirements`] per accepted
//! network with a [`requirements::RequirementBuilder`]. Clients answer the
//! challenge with a signed [`proto::PaymentPayload`], which the
//! [`verify::PaymentVerifier`] checks locally before a
//! [`facilitator::Facilitator`] settles it.
//!
//! # Modules
//!
//! - [`amount`] - Human-readable currency amount parsing
//! - [`config`] - Serde-facing configuration for paywalls and routes
//! - [`facilitator`] - Core trait for remote payment verification and settlement
//! - [`networks`] - Registry of well-known networks and their default stablecoins
//! - [`nonce`] - Stateless, route-bound anti-replay nonces
//! - [`proto`] - Wire format types and reason codes
//! - [`requirements`] - Payment requirement construction
//! - [`route`] - Route table and price resolution
//! - [`timestamp`] - Unix timestamps for authorization windows
//! - [`verify`] - Local payment verification
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod amount;
pub mod config;
pub mod facilitator;
pub mod networks;
pub mod nonce;
pub mod proto;
pub mod requirements;
pub mod route;
pub mod timestamp;
pub mod verify;

pub use facilitator::{Facilitator, FacilitatorError};
pub use proto::{
    PaymentPayload, PaymentRequired, PaymentRequirements, SettleRequest, SettleResponse,
    SupportedResponse, VerifyRequest, VerifyResponse,
};
pub use route::{RouteKey, RouteRule, RouteTable};
