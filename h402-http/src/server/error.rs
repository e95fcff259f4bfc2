//! Error types for the payment gate middleware.
//!
//! Every way a paid request can fail maps onto one [`PaygateError`] variant,
//! with a fixed HTTP status and a stable `snake_case` code. Failures are
//! rendered as JSON:
//!
//! ```json
//! { "error": "verification_failed", "reason": "invalid_nonce", "details": "..." }
//! ```

use axum_core::response::{IntoResponse, Response};
use h402::FacilitatorError;
use h402::proto::{AsPaymentProblem, PaymentVerificationError};
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde::Serialize;

/// Errors that stop a paid request from reaching its handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaygateError {
    /// The payment header is present but cannot be decoded.
    #[error("Invalid or malformed payment header: {0}")]
    InvalidPayload(String),
    /// The payment does not satisfy the route's requirement.
    #[error("Payment verification failed: {details}")]
    VerificationFailed {
        /// Machine-readable reason code.
        reason: String,
        /// Human-readable details.
        details: String,
    },
    /// The facilitator could not be reached or gave no usable answer.
    #[error("Facilitator unavailable: {0}")]
    FacilitatorUnavailable(String),
    /// The facilitator refused to settle.
    #[error("Settlement failed: {reason}")]
    SettlementError {
        /// Reason reported by the facilitator.
        reason: String,
    },
    /// The route's price cannot be turned into requirements.
    #[error("Payment gate misconfigured: {0}")]
    Configuration(String),
}

impl PaygateError {
    /// Returns the HTTP status this error is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_) | Self::VerificationFailed { .. } => StatusCode::BAD_REQUEST,
            Self::FacilitatorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SettlementError { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::FacilitatorUnavailable(_) => "facilitator_unavailable",
            Self::SettlementError { .. } => "settlement_failed",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Returns the finer-grained reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::VerificationFailed { reason, .. } | Self::SettlementError { reason } => {
                Some(reason)
            }
            _ => None,
        }
    }

    /// Classifies a facilitator failure during verification.
    #[must_use]
    pub fn from_verify_failure(err: &FacilitatorError) -> Self {
        match err {
            FacilitatorError::Rejected { .. } => Self::VerificationFailed {
                reason: "facilitator_rejected".to_owned(),
                details: err.to_string(),
            },
            _ => Self::FacilitatorUnavailable(err.to_string()),
        }
    }

    /// Classifies a facilitator failure during settlement.
    #[must_use]
    pub fn from_settle_failure(err: &FacilitatorError) -> Self {
        match err {
            FacilitatorError::Rejected { .. } => Self::SettlementError {
                reason: err.to_string(),
            },
            _ => Self::FacilitatorUnavailable(err.to_string()),
        }
    }
}

impl From<PaymentVerificationError> for PaygateError {
    fn from(err: PaymentVerificationError) -> Self {
        let problem = err.as_payment_problem();
        Self::VerificationFailed {
            reason: problem.reason().to_string(),
            details: problem.details().to_owned(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    details: String,
}

impl IntoResponse for PaygateError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code(),
            reason: self.reason(),
            details: self.to_string(),
        };
        let json = serde_json::to_string(&body)
            .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, self.code()));
        (self.status(), [(CONTENT_TYPE, "application/json")], json).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use h402::proto::ErrorReason;

    #[test]
    fn statuses_and_codes() {
        let cases = [
            (
                PaygateError::InvalidPayload("x".into()),
                StatusCode::BAD_REQUEST,
                "invalid_payload",
            ),
            (
                PaymentVerificationError::InvalidNonce.into(),
                StatusCode::BAD_REQUEST,
                "verification_failed",
            ),
            (
                PaygateError::FacilitatorUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "facilitator_unavailable",
            ),
            (
                PaygateError::SettlementError {
                    reason: ErrorReason::InsufficientFunds.to_string(),
                },
                StatusCode::PAYMENT_REQUIRED,
                "settlement_failed",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn verification_errors_keep_their_reason_code() {
        let err = PaygateError::from(PaymentVerificationError::InsufficientAmount);
        assert_eq!(err.reason(), Some("invalid_payment_amount"));
    }

    #[test]
    fn facilitator_failures_are_classified() {
        let down = FacilitatorError::Unavailable {
            attempts: 3,
            reason: "timeout".into(),
        };
        let refused = FacilitatorError::Rejected {
            status: 400,
            body: "bad".into(),
        };
        assert!(matches!(
            PaygateError::from_settle_failure(&down),
            PaygateError::FacilitatorUnavailable(_)
        ));
        assert!(matches!(
            PaygateError::from_settle_failure(&refused),
            PaygateError::SettlementError { .. }
        ));
        assert!(matches!(
            PaygateError::from_verify_failure(&refused),
            PaygateError::VerificationFailed { .. }
        ));
    }
}
