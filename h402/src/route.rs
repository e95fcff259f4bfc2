//! Route pricing and lookup.
//!
//! A [`RouteTable`] maps `(method, path)` pairs to [`RouteRule`]s. Lookup is
//! exact and case-sensitive on both method and path; a request that matches
//! no rule is public.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::amount::MoneyAmount;
use crate::proto::{AssetDescriptor, Network, TokenAmount};

/// An explicit token amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    /// Amount in the asset's smallest unit.
    pub amount: TokenAmount,
    /// The asset being paid.
    pub asset: AssetDescriptor,
}

/// What a route costs.
///
/// Deserializes from either a money string or an explicit asset amount:
///
/// ```json
/// "$0.001"
/// { "amount": "50000000", "asset": { "address": "hbar", "decimals": 8 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    /// A fiat amount settled in the network's default stablecoin.
    Money(MoneyAmount),
    /// An exact amount of a specific asset.
    Asset(AssetAmount),
}

impl From<MoneyAmount> for Price {
    fn from(value: MoneyAmount) -> Self {
        Self::Money(value)
    }
}

impl From<AssetAmount> for Price {
    fn from(value: AssetAmount) -> Self {
        Self::Asset(value)
    }
}

/// One acceptable way to pay for a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOption {
    /// The price.
    pub price: Price,
    /// The network the price must be paid on.
    pub network: Network,
}

impl PriceOption {
    /// Creates a price option.
    #[must_use]
    pub fn new(price: impl Into<Price>, network: impl Into<Network>) -> Self {
        Self {
            price: price.into(),
            network: network.into(),
        }
    }
}

/// Pricing for one route.
///
/// Immutable once loaded. `accepts` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    accepts: Vec<PriceOption>,
    description: Option<String>,
    mime_type: Option<String>,
}

impl RouteRule {
    /// Creates a rule with a single accepted price.
    #[must_use]
    pub fn new(option: PriceOption) -> Self {
        Self {
            accepts: vec![option],
            description: None,
            mime_type: None,
        }
    }

    /// Adds another accepted price, e.g. the same route on a second network.
    #[must_use]
    pub fn or_accept(mut self, option: PriceOption) -> Self {
        self.accepts.push(option);
        self
    }

    /// Sets a description shown to payers.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the MIME type of the paid resource.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Returns the accepted prices, in preference order.
    #[must_use]
    pub fn accepts(&self) -> &[PriceOption] {
        &self.accepts
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the MIME type.
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }
}

/// Errors parsing a `"METHOD /path"` route key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteKeyError {
    /// No whitespace between method and path.
    #[error("route key {0:?} must look like \"GET /path\"")]
    Malformed(String),
    /// The method is not an HTTP token.
    #[error("invalid HTTP method {0:?}")]
    InvalidMethod(String),
    /// The path does not start with `/`.
    #[error("route path {0:?} must start with '/'")]
    InvalidPath(String),
}

/// Composite lookup key: HTTP method plus path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    method: String,
    path: String,
}

impl RouteKey {
    /// Creates a key from a method and a path, unvalidated.
    ///
    /// Used for per-request lookups where both parts come from a parsed HTTP
    /// request.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FromStr for RouteKey {
    type Err = RouteKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, path) = s
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| RouteKeyError::Malformed(s.to_owned()))?;
        let path = path.trim();
        if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(RouteKeyError::InvalidMethod(method.to_owned()));
        }
        if !path.starts_with('/') || path.contains(char::is_whitespace) {
            return Err(RouteKeyError::InvalidPath(path.to_owned()));
        }
        Ok(Self::new(method, path))
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Immutable table of priced routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: HashMap<RouteKey, Arc<RouteRule>>,
}

impl RouteTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, replacing any previous rule for the same key.
    #[must_use]
    pub fn with_rule(mut self, key: RouteKey, rule: RouteRule) -> Self {
        self.rules.insert(key, Arc::new(rule));
        self
    }

    /// Looks up the rule for `key`.
    ///
    /// `None` means the route is public.
    #[must_use]
    pub fn resolve(&self, key: &RouteKey) -> Option<&Arc<RouteRule>> {
        self.rules.get(key)
    }

    /// Iterates over all rules.
    pub fn iter(&self) -> impl Iterator<Item = (&RouteKey, &RouteRule)> {
        self.rules.iter().map(|(key, rule)| (key, rule.as_ref()))
    }

    /// Returns the number of priced routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if no route is priced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usdc_rule(price: &str) -> RouteRule {
        RouteRule::new(PriceOption::new(
            price.parse::<MoneyAmount>().unwrap(),
            "hedera-testnet",
        ))
    }

    #[test]
    fn parses_route_keys() {
        let key: RouteKey = "GET /hedera-usdc".parse().unwrap();
        assert_eq!(key.method(), "GET");
        assert_eq!(key.path(), "/hedera-usdc");
        assert_eq!(key.to_string(), "GET /hedera-usdc");

        assert!(matches!(
            "/no-method".parse::<RouteKey>(),
            Err(RouteKeyError::Malformed(_))
        ));
        assert!(matches!(
            "G3T /x".parse::<RouteKey>(),
            Err(RouteKeyError::InvalidMethod(_))
        ));
        assert!(matches!(
            "GET x".parse::<RouteKey>(),
            Err(RouteKeyError::InvalidPath(_))
        ));
    }

    #[test]
    fn lookup_is_exact_and_case_sensitive() {
        let table = RouteTable::new().with_rule("GET /paid".parse().unwrap(), usdc_rule("$0.001"));

        assert!(table.resolve(&RouteKey::new("GET", "/paid")).is_some());
        assert!(table.resolve(&RouteKey::new("get", "/paid")).is_none());
        assert!(table.resolve(&RouteKey::new("POST", "/paid")).is_none());
        assert!(table.resolve(&RouteKey::new("GET", "/paid/")).is_none());
        assert!(table.resolve(&RouteKey::new("GET", "/Paid")).is_none());

        let both = table.with_rule("get /paid".parse().unwrap(), usdc_rule("$0.002"));
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn price_deserializes_from_string_or_object() {
        let money: Price = serde_json::from_value(serde_json::json!("$0.001")).unwrap();
        assert!(matches!(money, Price::Money(_)));

        let asset: Price = serde_json::from_value(serde_json::json!({
            "amount": "50000000",
            "asset": { "address": "hbar", "decimals": 8 }
        }))
        .unwrap();
        assert_eq!(
            asset,
            Price::Asset(AssetAmount {
                amount: TokenAmount::new(50_000_000),
                asset: AssetDescriptor::new("hbar", 8),
            })
        );

        assert!(serde_json::from_value::<Price>(serde_json::json!("free")).is_err());
    }

    #[test]
    fn rules_keep_accept_order() {
        let rule = usdc_rule("$0.001")
            .or_accept(PriceOption::new(
                "$0.001".parse::<MoneyAmount>().unwrap(),
                "base-sepolia",
            ))
            .with_description("weather");
        let networks: Vec<_> = rule.accepts().iter().map(|o| o.network.as_str()).collect();
        assert_eq!(networks, ["hedera-testnet", "base-sepolia"]);
        assert_eq!(rule.description(), Some("weather"));
        assert_eq!(rule.mime_type(), None);
    }
}
