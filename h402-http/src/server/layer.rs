//! Tower layer that puts a [`Paygate`] in front of an axum router.
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use h402::config::PaywallConfig;
//! use h402_http::server::PaymentGateLayer;
//!
//! let config: PaywallConfig = serde_json::from_value(serde_json::json!({
//!     "payTo": "0.0.1234",
//!     "facilitator": { "url": "http://localhost:4022" },
//!     "routes": {
//!         "GET /hedera-usdc": { "price": "$0.001", "network": "hedera-testnet" }
//!     }
//! }))
//! .unwrap();
//!
//! let app: Router = Router::new()
//!     .route("/hedera-usdc", get(|| async { "paid content" }))
//!     .layer(PaymentGateLayer::from_config(&config).unwrap());
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::extract::Request;
use axum_core::response::Response;
use h402::config::{ConfigError, PaywallConfig};
use h402::facilitator::Facilitator;
use h402::networks::NetworkRegistry;
use h402::verify::PaymentVerifier;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use super::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use super::paygate::Paygate;

/// Failure assembling a [`PaymentGateLayer`].
#[derive(Debug, thiserror::Error)]
pub enum GateSetupError {
    /// The paywall configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The facilitator URL cannot be used.
    #[error(transparent)]
    Facilitator(#[from] FacilitatorClientError),
}

/// Layer that gates priced routes behind payment.
///
/// Routes that are not in the configuration pass through untouched.
pub struct PaymentGateLayer<F> {
    gate: Arc<Paygate<F>>,
}

impl<F> Clone for PaymentGateLayer<F> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<F: std::fmt::Debug> std::fmt::Debug for PaymentGateLayer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateLayer")
            .field("gate", &self.gate)
            .finish()
    }
}

impl<F: Facilitator> PaymentGateLayer<F> {
    /// Builds a layer from `config` using the built-in network registry.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration does not validate.
    pub fn new(config: &PaywallConfig, facilitator: F) -> Result<Self, ConfigError> {
        Self::with_registry(config, NetworkRegistry::known(), facilitator)
    }

    /// Builds a layer from `config`, resolving money prices with `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration does not validate.
    pub fn with_registry(
        config: &PaywallConfig,
        registry: NetworkRegistry,
        facilitator: F,
    ) -> Result<Self, ConfigError> {
        let (routes, requirements) = config.compile(registry)?;
        let gate = Paygate {
            facilitator,
            routes: Arc::new(routes),
            requirements: Arc::new(requirements),
            verifier: PaymentVerifier::new(),
            remote_verify: config.remote_verify,
            expose_receipt_header: config.expose_receipt_header,
        };
        Ok(Self {
            gate: Arc::new(gate),
        })
    }

    /// Returns the gate shared by every service this layer creates.
    #[must_use]
    pub fn paygate(&self) -> &Paygate<F> {
        &self.gate
    }
}

impl PaymentGateLayer<Arc<FacilitatorClient>> {
    /// Builds a layer that talks to the facilitator named in `config` over
    /// HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`GateSetupError`] if the configuration or the facilitator URL
    /// is invalid.
    pub fn from_config(config: &PaywallConfig) -> Result<Self, GateSetupError> {
        let client = FacilitatorClient::try_from(config.facilitator.url.as_str())?;
        Ok(Self::new(config, Arc::new(client))?)
    }
}

impl<S, F> Layer<S> for PaymentGateLayer<F>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PaymentGateService<F>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentGateService {
            gate: Arc::clone(&self.gate),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Service produced by [`PaymentGateLayer`].
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct PaymentGateService<F> {
    gate: Arc<Paygate<F>>,
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<F> Clone for PaymentGateService<F> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
            inner: self.inner.clone(),
        }
    }
}

impl<F> Service<Request> for PaymentGateService<F>
where
    F: Facilitator + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Arc::clone(&self.gate);
        let inner = self.inner.clone();
        Box::pin(async move { gate.handle_request(inner, req).await })
    }
}
