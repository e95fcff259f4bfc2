//! Server-side payment gate.
//!
//! [`PaymentGateLayer`] wraps an axum router. Requests to priced routes must
//! carry a signed payment in the `X-PAYMENT` header; without one they get a
//! `402 Payment Required` challenge listing what to pay. A payment is checked
//! locally, settled through a [`h402::Facilitator`], and only then is the
//! wrapped handler run. The handler can read the [`SettlementReceipt`] from
//! the request extensions.
//!
//! Talking to a remote facilitator goes through [`FacilitatorClient`], which
//! retries transient failures with bounded backoff. When the facilitator
//! cannot be reached the gate fails closed with `503`.

pub mod error;
pub mod facilitator_client;
pub mod layer;
pub mod paygate;

pub use error::PaygateError;
pub use facilitator_client::{FacilitatorClient, FacilitatorClientError, RetryPolicy};
pub use layer::{GateSetupError, PaymentGateLayer, PaymentGateService};
pub use paygate::{GateState, Paygate, SettlementReceipt};
