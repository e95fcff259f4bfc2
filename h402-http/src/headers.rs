//! Base64 JSON codecs for the `X-PAYMENT` and `X-PAYMENT-RESPONSE` headers.

use base64::prelude::*;
use h402::{PaymentPayload, PaymentRequired, SettleResponse};

use crate::error::HttpError;

/// Encodes a [`PaymentPayload`] for the `X-PAYMENT` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_x_payment(payload: &PaymentPayload) -> Result<String, HttpError> {
    let json = serde_json::to_vec(payload)?;
    Ok(BASE64_STANDARD.encode(&json))
}

/// Decodes an `X-PAYMENT` header value.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`HttpError`] on Base64 or JSON decode failure.
pub fn decode_x_payment(header_value: &[u8]) -> Result<PaymentPayload, HttpError> {
    let bytes = BASE64_STANDARD.decode(header_value.trim_ascii())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encodes a [`SettleResponse`] for the `X-PAYMENT-RESPONSE` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_response(response: &SettleResponse) -> Result<String, HttpError> {
    let json = serde_json::to_vec(response)?;
    Ok(BASE64_STANDARD.encode(&json))
}

/// Decodes an `X-PAYMENT-RESPONSE` header value.
///
/// # Errors
///
/// Returns [`HttpError`] on Base64 or JSON decode failure.
pub fn decode_payment_response(header_value: &str) -> Result<SettleResponse, HttpError> {
    let bytes = BASE64_STANDARD.decode(header_value.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Parses a `402` challenge body.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if the body is not a valid challenge.
pub fn decode_payment_required(body: &[u8]) -> Result<PaymentRequired, HttpError> {
    Ok(serde_json::from_slice(body)?)
}
