//! The facilitator seam.
//!
//! A facilitator is the trusted service that checks a payment against the
//! network and moves the funds. Resource servers only ever talk to it through
//! [`Facilitator`], so the gating middleware works the same whether the
//! facilitator is a remote HTTP service or an in-process ledger.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::proto::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};

/// A boxed, sendable future, used to keep [`Facilitator`] object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure talking to a facilitator.
///
/// A facilitator that answers with `isValid: false` or `success: false` is not
/// an error; those outcomes travel inside [`VerifyResponse`] and
/// [`SettleResponse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FacilitatorError {
    /// The facilitator could not be reached, timed out, or kept failing after
    /// every retry.
    #[error("facilitator unavailable after {attempts} attempt(s): {reason}")]
    Unavailable {
        /// Number of attempts made.
        attempts: u32,
        /// Last failure observed.
        reason: String,
    },
    /// The facilitator answered with a non-retryable error status.
    #[error("facilitator rejected the request with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The facilitator answered with something that is not a valid response.
    #[error("invalid facilitator response: {0}")]
    InvalidResponse(String),
}

impl FacilitatorError {
    /// Returns `true` if the facilitator could not produce an answer at all.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::InvalidResponse(_))
    }
}

/// Verifies and settles payments on behalf of a resource server.
pub trait Facilitator: Send + Sync {
    /// Checks a payment without moving funds.
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>>;

    /// Executes a payment.
    ///
    /// Settling the same authorization twice must return the original
    /// receipt rather than charging the payer again.
    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>>;

    /// Lists the scheme and network pairs this facilitator can settle.
    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>>;
}

impl<T: Facilitator + ?Sized> Facilitator for Arc<T> {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        (**self).verify(request)
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        (**self).settle(request)
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        (**self).supported()
    }
}
