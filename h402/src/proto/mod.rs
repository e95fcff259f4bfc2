//! Wire format types for payment-gated requests.
//!
//! This module defines the JSON messages exchanged between clients, the
//! gating middleware, and facilitators.
//!
//! # Key Types
//!
//! - [`PaymentRequirements`] - What a client must pay to access a resource
//! - [`PaymentRequired`] - Body of a `402 Payment Required` challenge
//! - [`PaymentPayload`] - Client-submitted proof of payment
//! - [`VerifyRequest`] / [`VerifyResponse`] - Facilitator verification messages
//! - [`SettleRequest`] / [`SettleResponse`] - Facilitator settlement messages
//! - [`SupportedResponse`] - Facilitator capabilities
//!
//! # Wire Format
//!
//! All types serialize to JSON using camelCase field names. Token amounts are
//! serialized as decimal strings so that JavaScript clients never lose
//! precision.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::timestamp::UnixTimestamp;

mod error;

pub use error::*;

/// The x402 protocol version spoken by this crate.
pub const X402_VERSION: u8 = 1;

/// A network identifier such as `"hedera-testnet"` or `"base-sepolia"`.
pub type Network = String;

/// A unit struct representing the string literal `"exact"`.
///
/// The only scheme supported here: the client pays at least the exact amount
/// stated in the requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExactScheme;

impl ExactScheme {
    /// The string literal value: `"exact"`.
    pub const VALUE: &'static str = "exact";
}

impl fmt::Display for ExactScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::VALUE)
    }
}

impl PartialEq<str> for ExactScheme {
    fn eq(&self, other: &str) -> bool {
        other == Self::VALUE
    }
}

/// An integer amount in the asset's smallest unit.
///
/// Serialized as a string (`"1000"`), since `u128` values do not survive a
/// round-trip through JavaScript numbers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from raw smallest units.
    #[must_use]
    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    /// Returns the amount in smallest units.
    #[must_use]
    pub const fn units(&self) -> u128 {
        self.0
    }

    /// Returns `true` if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl FromStr for TokenAmount {
    type Err = <u128 as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Self)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom("amount must be a non-negative integer string"))
    }
}

/// Identifies the token used for payment.
///
/// `address` is whatever the network uses to name a token: a contract address
/// on EVM chains, a token id like `0.0.429274` on Hedera, or a symbolic name
/// such as `hbar` for the native currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    /// Token address or identifier.
    pub address: String,
    /// Number of decimal places of the smallest unit.
    pub decimals: u8,
}

impl AssetDescriptor {
    /// Creates a new asset descriptor.
    #[must_use]
    pub fn new(address: impl Into<String>, decimals: u8) -> Self {
        Self {
            address: address.into(),
            decimals,
        }
    }
}

/// Describes what a client must pay to access a resource.
///
/// # JSON Format
///
/// ```json
/// {
///   "scheme": "exact",
///   "network": "hedera-testnet",
///   "amount": "1000",
///   "asset": { "address": "0.0.429274", "decimals": 6 },
///   "payTo": "0.0.1234",
///   "nonce": "5c0f...",
///   "maxTimeoutSeconds": 300,
///   "resource": "/hedera-usdc"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Payment scheme identifier (always `"exact"`).
    pub scheme: String,
    /// Network the payment must happen on.
    pub network: Network,
    /// Required amount in the asset's smallest unit.
    pub amount: TokenAmount,
    /// The asset to pay with.
    pub asset: AssetDescriptor,
    /// Recipient address.
    pub pay_to: String,
    /// Anti-replay nonce the client must sign over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Maximum lifetime of the client's authorization, in seconds.
    pub max_timeout_seconds: u64,
    /// The resource being paid for.
    pub resource: String,
    /// Optional human-readable description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional MIME type of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Scheme-specific extra data, e.g. `{ "feePayer": "0.0.5678" }`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PaymentRequirements {
    /// Returns the fee payer advertised in `extra`, if any.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&str> {
        self.extra.as_ref()?.get("feePayer")?.as_str()
    }

    /// Returns `true` if `payload` claims to answer this requirement's
    /// scheme, network and asset.
    #[must_use]
    pub fn accepts(&self, payload: &PaymentPayload) -> bool {
        self.scheme == payload.scheme
            && self.network == payload.network
            && self.asset == payload.payload.authorization.asset
    }
}

/// Body of a `402 Payment Required` challenge.
///
/// ```json
/// {
///   "x402Version": 1,
///   "error": "X-PAYMENT header is required",
///   "accepts": [{ "scheme": "exact", "network": "hedera-testnet", ... }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version.
    pub x402_version: u8,
    /// Why the request was not served.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Acceptable ways to pay, one per network/asset.
    pub accepts: Vec<PaymentRequirements>,
}

/// The statement a payer signs.
///
/// Every field that makes a payment specific to one requirement is part of the
/// signed message, so a valid signature for one route, network or nonce is
/// useless anywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// Payer address (hex, `0x`-prefixed).
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Declared amount in smallest units.
    pub amount: TokenAmount,
    /// Declared asset.
    pub asset: AssetDescriptor,
    /// Declared network.
    pub network: Network,
    /// Resource the payment is for.
    pub resource: String,
    /// The nonce copied from the requirement.
    pub nonce: String,
    /// Earliest time the authorization may be used.
    pub valid_after: UnixTimestamp,
    /// Time at which the authorization expires.
    pub valid_before: UnixTimestamp,
}

impl Authorization {
    /// Returns the canonical message covered by the payer's signature.
    ///
    /// The format is line-oriented and stable; clients must sign exactly these
    /// bytes with an EIP-191 personal signature.
    #[must_use]
    pub fn signing_message(&self) -> String {
        format!(
            "x402 exact payment\n\
             network: {}\n\
             asset: {}\n\
             decimals: {}\n\
             from: {}\n\
             to: {}\n\
             amount: {}\n\
             resource: {}\n\
             nonce: {}\n\
             validAfter: {}\n\
             validBefore: {}",
            self.network,
            self.asset.address,
            self.asset.decimals,
            self.from.to_lowercase(),
            self.to,
            self.amount,
            self.resource,
            self.nonce,
            self.valid_after,
            self.valid_before,
        )
    }
}

/// Scheme-specific content of an `exact` payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPayload {
    /// 65-byte secp256k1 signature, hex encoded.
    pub signature: String,
    /// The signed authorization.
    pub authorization: Authorization,
}

/// Client-submitted proof of payment.
///
/// Transported base64-encoded in the `X-PAYMENT` request header.
///
/// ```json
/// {
///   "x402Version": 1,
///   "scheme": "exact",
///   "network": "hedera-testnet",
///   "payload": { "signature": "0x...", "authorization": { ... } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version.
    pub x402_version: u8,
    /// Payment scheme.
    pub scheme: String,
    /// Network the payment is made on.
    pub network: Network,
    /// Signed authorization.
    pub payload: ExactPayload,
}

impl PaymentPayload {
    /// Returns the signed authorization.
    #[must_use]
    pub const fn authorization(&self) -> &Authorization {
        &self.payload.authorization
    }

    /// Returns the declared payer.
    #[must_use]
    pub fn payer(&self) -> &str {
        &self.payload.authorization.from
    }
}

/// Request to verify a payment without settling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version.
    pub x402_version: u8,
    /// The payment payload to verify.
    pub payment_payload: PaymentPayload,
    /// The requirement the payload must satisfy.
    pub payment_requirements: PaymentRequirements,
}

impl VerifyRequest {
    /// Pairs a payload with the requirement it answers.
    #[must_use]
    pub const fn new(
        payment_payload: PaymentPayload,
        payment_requirements: PaymentRequirements,
    ) -> Self {
        Self {
            x402_version: X402_VERSION,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Request to settle a verified payment.
///
/// Structurally identical to [`VerifyRequest`] on the wire, but a distinct type
/// so a verify request cannot be passed where a settle request is expected by
/// accident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Protocol version.
    pub x402_version: u8,
    /// The payment payload to settle.
    pub payment_payload: PaymentPayload,
    /// The requirement the payload satisfies.
    pub payment_requirements: PaymentRequirements,
}

impl From<VerifyRequest> for SettleRequest {
    fn from(request: VerifyRequest) -> Self {
        Self {
            x402_version: request.x402_version,
            payment_payload: request.payment_payload,
            payment_requirements: request.payment_requirements,
        }
    }
}

/// Result of verifying a payload against its requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyResponse {
    /// The payload satisfies the requirement.
    Valid {
        /// The address of the payer.
        payer: String,
    },
    /// The payload was well-formed but failed verification.
    Invalid {
        /// Machine-readable reason.
        reason: String,
        /// The payer address, if identifiable.
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// Constructs a successful verification response.
    #[must_use]
    pub const fn valid(payer: String) -> Self {
        Self::Valid { payer }
    }

    /// Constructs a failed verification response.
    #[must_use]
    pub const fn invalid(payer: Option<String>, reason: String) -> Self {
        Self::Invalid { reason, payer }
    }

    /// Returns `true` if the verification succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                payer: Some(payer.clone()),
                invalid_reason: None,
            },
            Self::Invalid { reason, payer } => VerifyResponseWire {
                is_valid: false,
                payer: payer.clone(),
                invalid_reason: Some(reason.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(Self::Valid { payer })
        } else {
            Ok(Self::Invalid {
                reason: wire
                    .invalid_reason
                    .unwrap_or_else(|| ErrorReason::UnexpectedError.to_string()),
                payer: wire.payer,
            })
        }
    }
}

/// Outcome of a settlement request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettleResponse {
    /// Settlement succeeded.
    Success {
        /// The address that paid.
        payer: String,
        /// Network transaction identifier.
        transaction: String,
        /// Network the payment settled on.
        network: String,
    },
    /// The facilitator refused to settle.
    Error {
        /// Machine-readable reason.
        reason: String,
        /// Network where settlement was attempted.
        network: String,
    },
}

impl SettleResponse {
    /// Returns `true` if the settlement succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    network: String,
}

impl Serialize for SettleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                error_reason: None,
                payer: Some(payer.clone()),
                transaction: Some(transaction.clone()),
                network: network.clone(),
            },
            Self::Error { reason, network } => SettleResponseWire {
                success: false,
                error_reason: Some(reason.clone()),
                payer: None,
                transaction: None,
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            let transaction = wire
                .transaction
                .ok_or_else(|| serde::de::Error::missing_field("transaction"))?;
            Ok(Self::Success {
                payer,
                transaction,
                network: wire.network,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(Self::Error {
                reason,
                network: wire.network,
            })
        }
    }
}

/// A payment kind a facilitator can handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version.
    pub x402_version: u8,
    /// Scheme identifier.
    pub scheme: String,
    /// Network identifier.
    pub network: Network,
    /// Optional scheme-specific data such as a fee payer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Response from a facilitator's `/supported` endpoint.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// Supported payment kinds.
    pub kinds: Vec<SupportedKind>,
}

impl SupportedResponse {
    /// Returns `true` if the facilitator settles `scheme` on `network`.
    #[must_use]
    pub fn supports(&self, scheme: &str, network: &str) -> bool {
        self.kinds
            .iter()
            .any(|kind| kind.scheme == scheme && kind.network == network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_amount_is_a_string_on_the_wire() {
        let amount = TokenAmount::new(50_000_000);
        assert_eq!(serde_json::to_value(amount).unwrap(), json!("50000000"));
        let back: TokenAmount = serde_json::from_value(json!("1000")).unwrap();
        assert_eq!(back.units(), 1000);
        assert!(serde_json::from_value::<TokenAmount>(json!("-1")).is_err());
        assert!(serde_json::from_value::<TokenAmount>(json!(1000)).is_err());
    }

    #[test]
    fn requirements_use_camel_case_and_skip_empty_fields() {
        let requirements = PaymentRequirements {
            scheme: ExactScheme.to_string(),
            network: "hedera-testnet".into(),
            amount: TokenAmount::new(1000),
            asset: AssetDescriptor::new("0.0.429274", 6),
            pay_to: "0.0.1234".into(),
            nonce: None,
            max_timeout_seconds: 300,
            resource: "/hedera-usdc".into(),
            description: None,
            mime_type: None,
            extra: Some(json!({ "feePayer": "0.0.9" })),
        };
        let value = serde_json::to_value(&requirements).unwrap();
        assert_eq!(value["payTo"], "0.0.1234");
        assert_eq!(value["maxTimeoutSeconds"], 300);
        assert_eq!(value["asset"], json!({ "address": "0.0.429274", "decimals": 6 }));
        assert!(value.get("nonce").is_none());
        assert_eq!(requirements.fee_payer(), Some("0.0.9"));
    }

    #[test]
    fn verify_response_wire_format() {
        let valid: VerifyResponse =
            serde_json::from_value(json!({ "isValid": true, "payer": "0xabc" })).unwrap();
        assert_eq!(valid, VerifyResponse::valid("0xabc".into()));

        let invalid: VerifyResponse =
            serde_json::from_value(json!({ "isValid": false, "invalidReason": "expired" }))
                .unwrap();
        assert!(!invalid.is_valid());

        let missing_payer = serde_json::from_value::<VerifyResponse>(json!({ "isValid": true }));
        assert!(missing_payer.is_err());
    }

    #[test]
    fn settle_response_wire_format() {
        let ok = SettleResponse::Success {
            payer: "0xabc".into(),
            transaction: "0xdead".into(),
            network: "hedera-testnet".into(),
        };
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["success"], true);
        assert!(value.get("errorReason").is_none());
        assert_eq!(serde_json::from_value::<SettleResponse>(value).unwrap(), ok);

        let err: SettleResponse = serde_json::from_value(json!({
            "success": false,
            "errorReason": "insufficient_funds",
            "network": "hedera-testnet"
        }))
        .unwrap();
        assert!(!err.is_success());
    }

    #[test]
    fn signing_message_lowercases_payer() {
        let authorization = Authorization {
            from: "0xABCDEF".into(),
            to: "0.0.1234".into(),
            amount: TokenAmount::new(1000),
            asset: AssetDescriptor::new("0.0.429274", 6),
            network: "hedera-testnet".into(),
            resource: "/hedera-usdc".into(),
            nonce: "00".into(),
            valid_after: UnixTimestamp::from_secs(1),
            valid_before: UnixTimestamp::from_secs(2),
        };
        let message = authorization.signing_message();
        assert!(message.contains("from: 0xabcdef\n"));
        assert!(message.ends_with("validBefore: 2"));
    }
}
