//! Verification failures and their machine-readable reason codes.

use serde::{Deserialize, Serialize};

/// Reasons a payment payload can fail local or remote verification.
///
/// Every variant maps onto a stable [`ErrorReason`] code so that clients can
/// react to failures without parsing human-readable messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PaymentVerificationError {
    /// The payload could not be decoded or is missing fields.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// The payload speaks a protocol version this server does not.
    #[error("Unsupported x402 version {0}")]
    UnsupportedVersion(u8),
    /// The payment scheme is not the one required.
    #[error("Unsupported scheme")]
    UnsupportedScheme,
    /// The payload targets a different network than the requirement.
    #[error("Payment network is invalid with respect to the payment requirements")]
    NetworkMismatch,
    /// The payload pays with a different asset than the requirement.
    #[error("Payment asset is invalid with respect to the payment requirements")]
    AssetMismatch,
    /// The payload pays someone other than the configured recipient.
    #[error("Payment recipient is invalid with respect to the payment requirements")]
    RecipientMismatch,
    /// The payload was authorized for a different resource.
    #[error("Payment resource is invalid with respect to the payment requirements")]
    ResourceMismatch,
    /// The declared amount is below the required amount.
    #[error("Payment amount is invalid with respect to the payment requirements")]
    InsufficientAmount,
    /// The nonce was not issued by this server for this resource and network.
    #[error("Payment nonce was not issued for this resource")]
    InvalidNonce,
    /// The authorization's `validAfter` lies in the future.
    #[error("Payment authorization is not yet valid")]
    Early,
    /// The authorization's `validBefore` has passed.
    #[error("Payment authorization is expired")]
    Expired,
    /// The authorization window is longer than the requirement allows.
    #[error("Payment authorization window exceeds {0} seconds")]
    WindowTooLong(u64),
    /// The signature does not recover to the declared payer.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// The payer's nonce was already consumed by an earlier settlement.
    #[error("Authorization nonce already used")]
    NonceAlreadyUsed,
}

impl AsPaymentProblem for PaymentVerificationError {
    fn as_payment_problem(&self) -> PaymentProblem {
        let reason = match self {
            Self::InvalidFormat(_) => ErrorReason::InvalidFormat,
            Self::UnsupportedVersion(_) => ErrorReason::UnsupportedVersion,
            Self::UnsupportedScheme => ErrorReason::UnsupportedScheme,
            Self::NetworkMismatch => ErrorReason::NetworkMismatch,
            Self::AssetMismatch => ErrorReason::AssetMismatch,
            Self::RecipientMismatch => ErrorReason::RecipientMismatch,
            Self::ResourceMismatch => ErrorReason::ResourceMismatch,
            Self::InsufficientAmount => ErrorReason::InvalidPaymentAmount,
            Self::InvalidNonce => ErrorReason::InvalidNonce,
            Self::Early => ErrorReason::InvalidPaymentEarly,
            Self::Expired => ErrorReason::InvalidPaymentExpired,
            Self::WindowTooLong(_) => ErrorReason::InvalidPaymentWindow,
            Self::InvalidSignature(_) => ErrorReason::InvalidSignature,
            Self::NonceAlreadyUsed => ErrorReason::NonceAlreadyUsed,
        };
        PaymentProblem::new(reason, self.to_string())
    }
}

/// Machine-readable reason codes for payment failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorReason {
    /// The payment payload format is invalid.
    InvalidFormat,
    /// The protocol version is not supported.
    UnsupportedVersion,
    /// The scheme is not supported.
    UnsupportedScheme,
    /// The network doesn't match.
    NetworkMismatch,
    /// The asset doesn't match.
    AssetMismatch,
    /// The recipient doesn't match.
    RecipientMismatch,
    /// The resource doesn't match.
    ResourceMismatch,
    /// The payment amount is too low.
    InvalidPaymentAmount,
    /// The nonce was not issued by the server.
    InvalidNonce,
    /// The authorization is not yet valid.
    InvalidPaymentEarly,
    /// The authorization has expired.
    InvalidPaymentExpired,
    /// The authorization window is too long.
    InvalidPaymentWindow,
    /// The signature is invalid.
    InvalidSignature,
    /// The nonce was already settled.
    NonceAlreadyUsed,
    /// The facilitator does not settle on this network.
    UnsupportedNetwork,
    /// The payer cannot cover the payment.
    InsufficientFunds,
    /// An unexpected error occurred.
    UnexpectedError,
}

impl ErrorReason {
    /// Returns the `snake_case` string used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::UnsupportedVersion => "unsupported_version",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::NetworkMismatch => "network_mismatch",
            Self::AssetMismatch => "asset_mismatch",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::ResourceMismatch => "resource_mismatch",
            Self::InvalidPaymentAmount => "invalid_payment_amount",
            Self::InvalidNonce => "invalid_nonce",
            Self::InvalidPaymentEarly => "invalid_payment_early",
            Self::InvalidPaymentExpired => "invalid_payment_expired",
            Self::InvalidPaymentWindow => "invalid_payment_window",
            Self::InvalidSignature => "invalid_signature",
            Self::NonceAlreadyUsed => "nonce_already_used",
            Self::UnsupportedNetwork => "unsupported_network",
            Self::InsufficientFunds => "insufficient_funds",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

impl core::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for converting errors into structured payment problems.
pub trait AsPaymentProblem {
    /// Converts this error into a [`PaymentProblem`].
    fn as_payment_problem(&self) -> PaymentProblem;
}

/// A reason code paired with human-readable details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProblem {
    reason: ErrorReason,
    details: String,
}

impl PaymentProblem {
    /// Creates a new payment problem.
    #[must_use]
    pub const fn new(reason: ErrorReason, details: String) -> Self {
        Self { reason, details }
    }

    /// Returns the reason code.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        self.reason
    }

    /// Returns the human-readable details.
    #[must_use]
    pub fn details(&self) -> &str {
        &self.details
    }
}
