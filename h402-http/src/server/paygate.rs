//! Core payment gate logic.
//!
//! [`Paygate`] drives one request through an explicit state machine:
//!
//! ```text
//! AwaitingProof ──(no header)──────────────▶ Challenged
//!       │
//!       ▼
//!   Verifying ──▶ Settling ──▶ Forwarding
//!       │            │
//!       └────────────┴──(any failure)──────▶ Rejected
//! ```
//!
//! `Challenged` and `Rejected` answer without ever calling the wrapped
//! handler; `Forwarding` calls it exactly once.

use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use h402::facilitator::Facilitator;
use h402::proto::{PaymentRequired, SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};
use h402::requirements::{MatchError, RequirementBuilder};
use h402::route::{RouteKey, RouteRule, RouteTable};
use h402::verify::PaymentVerifier;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tower::{Service, ServiceExt};

#[cfg(feature = "telemetry")]
use tracing::{Instrument, instrument};

use super::error::PaygateError;
use crate::constants::{
    ACCESS_CONTROL_EXPOSE_HEADERS, PAYMENT_HEADER_REQUIRED, X_PAYMENT_HEADER,
    X_PAYMENT_RESPONSE_HEADER,
};
use crate::headers;

/// Proof of settlement handed to the wrapped handler.
///
/// Inserted into the request extensions before forwarding; axum handlers can
/// take it as `Extension<SettlementReceipt>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    /// Network transaction identifier.
    pub transaction: String,
    /// Network the payment settled on.
    pub network: String,
    /// Address that paid.
    pub payer: String,
}

/// Where a request stands in the payment flow.
#[derive(Debug)]
pub enum GateState {
    /// Looking for a payment header.
    AwaitingProof,
    /// A header arrived; decoding and checking it.
    Verifying {
        /// Raw `X-PAYMENT` header value.
        header: HeaderValue,
    },
    /// The payment checked out locally; asking the facilitator to settle.
    Settling {
        /// The payload paired with the requirement it satisfies.
        request: SettleRequest,
    },
    /// Settled; the handler may run.
    Forwarding {
        /// Receipt for the handler.
        receipt: SettlementReceipt,
        /// Raw facilitator answer, for the optional response header.
        settlement: SettleResponse,
    },
    /// No payment offered; answer with a challenge.
    Challenged(PaymentRequired),
    /// The payment failed.
    Rejected(PaygateError),
}

/// Payment gate shared by every request through one layer.
#[derive(Debug)]
pub struct Paygate<TFacilitator> {
    pub(crate) facilitator: TFacilitator,
    pub(crate) routes: Arc<RouteTable>,
    pub(crate) requirements: Arc<RequirementBuilder>,
    pub(crate) verifier: PaymentVerifier,
    pub(crate) remote_verify: bool,
    pub(crate) expose_receipt_header: bool,
}

impl<TFacilitator: Clone> Clone for Paygate<TFacilitator> {
    fn clone(&self) -> Self {
        Self {
            facilitator: self.facilitator.clone(),
            routes: Arc::clone(&self.routes),
            requirements: Arc::clone(&self.requirements),
            verifier: self.verifier,
            remote_verify: self.remote_verify,
            expose_receipt_header: self.expose_receipt_header,
        }
    }
}

impl<TFacilitator> Paygate<TFacilitator> {
    /// Returns the priced routes.
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Calls the inner service with telemetry instrumentation.
    async fn call_inner<S>(inner: S, req: Request) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
    {
        #[cfg(feature = "telemetry")]
        {
            inner
                .oneshot(req)
                .instrument(tracing::info_span!("inner"))
                .await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            inner.oneshot(req).await
        }
    }
}

impl<TFacilitator> Paygate<TFacilitator>
where
    TFacilitator: Facilitator,
{
    /// Handles an incoming request, gating it if its route is priced.
    ///
    /// Unpriced routes go straight to `inner`. Priced routes run the state
    /// machine; every failure is rendered as an HTTP response, so this never
    /// errors.
    ///
    /// # Errors
    ///
    /// This method is infallible (`Infallible` error type).
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "h402.handle_request",
            skip_all,
            fields(method = %req.method(), path = %req.uri().path())
        )
    )]
    pub async fn handle_request<S>(
        &self,
        inner: S,
        mut req: Request,
    ) -> Result<Response, Infallible>
    where
        S: Service<Request, Response = Response, Error = Infallible>,
    {
        let key = RouteKey::new(req.method().as_str(), req.uri().path());
        let Some(rule) = self.routes.resolve(&key).cloned() else {
            return Self::call_inner(inner, req).await;
        };
        let resource = self.requirements.resource_for(key.path());

        let mut state = GateState::AwaitingProof;
        loop {
            state = match state {
                GateState::AwaitingProof => self.await_proof(&rule, &resource, req.headers()),
                GateState::Verifying { header } => self.verify(&rule, &resource, &header).await,
                GateState::Settling { request } => self.settle(request).await,
                GateState::Forwarding {
                    receipt,
                    settlement,
                } => {
                    req.extensions_mut().insert(receipt);
                    let response = Self::call_inner(inner, req).await?;
                    return Ok(self.decorate(response, &settlement));
                }
                GateState::Challenged(required) => return Ok(challenge_response(&required)),
                GateState::Rejected(err) => {
                    #[cfg(feature = "telemetry")]
                    tracing::info!(code = err.code(), error = %err, "payment rejected");
                    return Ok(err.into_response());
                }
            };
        }
    }

    /// Looks for the payment header; without one, builds the challenge.
    fn await_proof(&self, rule: &RouteRule, resource: &str, headers: &HeaderMap) -> GateState {
        if let Some(header) = headers.get(X_PAYMENT_HEADER) {
            return GateState::Verifying {
                header: header.clone(),
            };
        }
        match self
            .requirements
            .challenge(rule, resource, PAYMENT_HEADER_REQUIRED)
        {
            Ok(required) => GateState::Challenged(required),
            Err(err) => GateState::Rejected(PaygateError::Configuration(err.to_string())),
        }
    }

    /// Decodes the header and checks the payment locally, and remotely when
    /// configured.
    async fn verify(&self, rule: &RouteRule, resource: &str, header: &HeaderValue) -> GateState {
        let payload = match headers::decode_x_payment(header.as_bytes()) {
            Ok(payload) => payload,
            Err(err) => return GateState::Rejected(PaygateError::InvalidPayload(err.to_string())),
        };
        let requirements = match self.requirements.requirement_for(rule, resource, &payload) {
            Ok(requirements) => requirements,
            Err(MatchError::Mismatch(err)) => return GateState::Rejected(err.into()),
            Err(MatchError::Build(err)) => {
                return GateState::Rejected(PaygateError::Configuration(err.to_string()));
            }
        };
        if let Err(err) = self.verifier.verify(&requirements, &payload) {
            return GateState::Rejected(err.into());
        }

        let request = VerifyRequest::new(payload, requirements);
        if self.remote_verify
            && let Err(err) = self.verify_remotely(&request).await
        {
            return GateState::Rejected(err);
        }
        GateState::Settling {
            request: request.into(),
        }
    }

    async fn verify_remotely(&self, request: &VerifyRequest) -> Result<(), PaygateError> {
        let response = self
            .facilitator
            .verify(request.clone())
            .await
            .map_err(|err| PaygateError::from_verify_failure(&err))?;
        match response {
            VerifyResponse::Valid { .. } => Ok(()),
            VerifyResponse::Invalid { reason, .. } => Err(PaygateError::VerificationFailed {
                details: format!("facilitator rejected the payment: {reason}"),
                reason,
            }),
            _ => Err(PaygateError::FacilitatorUnavailable(
                "unknown verify response variant".to_owned(),
            )),
        }
    }

    /// Asks the facilitator to settle.
    async fn settle(&self, request: SettleRequest) -> GateState {
        #[cfg(feature = "telemetry")]
        tracing::debug!(network = %request.payment_requirements.network, "settling payment");

        let settlement = match self.facilitator.settle(request).await {
            Ok(settlement) => settlement,
            Err(err) => return GateState::Rejected(PaygateError::from_settle_failure(&err)),
        };
        match &settlement {
            SettleResponse::Success {
                payer,
                transaction,
                network,
            } => GateState::Forwarding {
                receipt: SettlementReceipt {
                    transaction: transaction.clone(),
                    network: network.clone(),
                    payer: payer.clone(),
                },
                settlement,
            },
            SettleResponse::Error { reason, .. } => {
                GateState::Rejected(PaygateError::SettlementError {
                    reason: reason.clone(),
                })
            }
            _ => GateState::Rejected(PaygateError::SettlementError {
                reason: "unknown settle response variant".to_owned(),
            }),
        }
    }

    /// Adds the receipt header to a handler response when enabled.
    fn decorate(&self, mut response: Response, settlement: &SettleResponse) -> Response {
        if !self.expose_receipt_header {
            return response;
        }
        let header = headers::encode_payment_response(settlement)
            .ok()
            .and_then(|encoded| HeaderValue::from_str(&encoded).ok());
        if let Some(header) = header {
            let headers = response.headers_mut();
            headers.insert(X_PAYMENT_RESPONSE_HEADER, header);
            headers.insert(
                ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(X_PAYMENT_RESPONSE_HEADER),
            );
        }
        response
    }
}

/// Renders a `402 Payment Required` challenge.
fn challenge_response(required: &PaymentRequired) -> Response {
    match serde_json::to_string(required) {
        Ok(body) => (
            StatusCode::PAYMENT_REQUIRED,
            [(CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(err) => PaygateError::Configuration(err.to_string()).into_response(),
    }
}
