//! HTTP-specific constants.

/// Request header carrying the base64 JSON payment payload (client to server).
pub const X_PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the base64 JSON settlement result.
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// CORS header name for exposing custom headers.
pub const ACCESS_CONTROL_EXPOSE_HEADERS: &str = "Access-Control-Expose-Headers";

/// Message placed in a challenge when no payment header was sent.
pub const PAYMENT_HEADER_REQUIRED: &str = "X-PAYMENT header is required";
