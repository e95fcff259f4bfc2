//! Serde-facing paywall configuration.
//!
//! A [`PaywallConfig`] is what an operator writes down: who gets paid, which
//! facilitator settles, and what each route costs. It is validated and
//! compiled into a [`RouteTable`] once at start-up.
//!
//! # Example
//!
//! ```rust
//! use h402::config::PaywallConfig;
//!
//! let config: PaywallConfig = serde_json::from_value(serde_json::json!({
//!     "payTo": "0.0.1234",
//!     "facilitator": { "url": "https://x402.org/facilitator" },
//!     "routes": {
//!         "GET /hedera-usdc": { "price": "$0.001", "network": "hedera-testnet" }
//!     }
//! }))
//! .unwrap();
//!
//! let table = config.route_table().unwrap();
//! assert_eq!(table.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::networks::NetworkRegistry;
use crate::nonce::NonceIssuer;
use crate::proto::Network;
use crate::requirements::{BuildError, DEFAULT_MAX_TIMEOUT_SECONDS, RequirementBuilder};
use crate::route::{Price, PriceOption, RouteKey, RouteKeyError, RouteRule, RouteTable};

/// Errors validating a [`PaywallConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `payTo` is empty.
    #[error("payTo must not be empty")]
    MissingPayTo,
    /// A route key does not parse.
    #[error("route {key:?}: {source}")]
    RouteKey {
        /// The key as written.
        key: String,
        /// Parse failure.
        #[source]
        source: RouteKeyError,
    },
    /// A route's price cannot be built into a requirement.
    #[error("route {key:?}: {source}")]
    Price {
        /// The key as written.
        key: String,
        /// Build failure.
        #[source]
        source: BuildError,
    },
    /// `maxTimeoutSeconds` is zero.
    #[error("maxTimeoutSeconds must be positive")]
    ZeroTimeout,
}

/// Pricing for one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// Primary price.
    pub price: Price,
    /// Network the primary price is paid on.
    pub network: Network,
    /// Further prices offered alongside the primary one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub also_accepts: Vec<PriceOption>,
    /// Human-readable description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl RouteConfig {
    /// Converts this entry into a [`RouteRule`].
    #[must_use]
    pub fn to_rule(&self) -> RouteRule {
        let mut rule = RouteRule::new(PriceOption::new(self.price.clone(), self.network.clone()));
        for option in &self.also_accepts {
            rule = rule.or_accept(option.clone());
        }
        if let Some(description) = &self.description {
            rule = rule.with_description(description);
        }
        if let Some(mime_type) = &self.mime_type {
            rule = rule.with_mime_type(mime_type);
        }
        rule
    }
}

/// Where and how to reach the facilitator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorConfig {
    /// Base URL of the facilitator service.
    pub url: String,
    /// Account that pays network fees for clients, advertised in
    /// requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,
}

/// Complete paywall configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaywallConfig {
    /// Recipient of every payment.
    pub pay_to: String,
    /// Facilitator settings.
    pub facilitator: FacilitatorConfig,
    /// Priced routes, keyed by `"METHOD /path"`.
    #[serde(default)]
    pub routes: BTreeMap<String, RouteConfig>,
    /// Maximum lifetime of a payment authorization.
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
    /// Public base URL of this server.
    ///
    /// When set, requirements name the full URL of the resource
    /// (`https://api.example/weather`) rather than just its path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_base_url: Option<String>,
    /// Secret for route-bound nonces; random per process when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_secret: Option<String>,
    /// Ask the facilitator to verify after local verification succeeds.
    #[serde(default)]
    pub remote_verify: bool,
    /// Attach the settlement receipt to responses as `X-PAYMENT-RESPONSE`.
    #[serde(default)]
    pub expose_receipt_header: bool,
}

const fn default_max_timeout_seconds() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECONDS
}

impl PaywallConfig {
    /// Creates a configuration with no routes.
    #[must_use]
    pub fn new(pay_to: impl Into<String>, facilitator_url: impl Into<String>) -> Self {
        Self {
            pay_to: pay_to.into(),
            facilitator: FacilitatorConfig {
                url: facilitator_url.into(),
                fee_payer: None,
            },
            routes: BTreeMap::new(),
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            resource_base_url: None,
            nonce_secret: None,
            remote_verify: false,
            expose_receipt_header: false,
        }
    }

    /// Adds a priced route.
    #[must_use]
    pub fn with_route(mut self, key: impl Into<String>, route: RouteConfig) -> Self {
        self.routes.insert(key.into(), route);
        self
    }

    /// Parses every route key into a [`RouteTable`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RouteKey`] for the first malformed key.
    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        self.routes
            .iter()
            .try_fold(RouteTable::new(), |table, (key, route)| {
                let parsed = key.parse::<RouteKey>().map_err(|source| ConfigError::RouteKey {
                    key: key.clone(),
                    source,
                })?;
                Ok(table.with_rule(parsed, route.to_rule()))
            })
    }

    /// Creates the requirement builder described by this configuration.
    #[must_use]
    pub fn requirement_builder(&self, registry: NetworkRegistry) -> RequirementBuilder {
        let nonces = self
            .nonce_secret
            .as_deref()
            .map_or_else(NonceIssuer::random, |secret| NonceIssuer::new(secret.as_bytes()));
        let mut builder = RequirementBuilder::new(self.pay_to.clone(), nonces)
            .with_registry(registry)
            .with_max_timeout_seconds(self.max_timeout_seconds);
        if let Some(fee_payer) = &self.facilitator.fee_payer {
            builder = builder.with_fee_payer(fee_payer);
        }
        if let Some(base) = &self.resource_base_url {
            builder = builder.with_resource_base_url(base);
        }
        builder
    }

    /// Checks the configuration and compiles it into a route table and
    /// requirement builder.
    ///
    /// Every route is built once so misconfigured prices fail at start-up
    /// rather than on the first request.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn compile(
        &self,
        registry: NetworkRegistry,
    ) -> Result<(RouteTable, RequirementBuilder), ConfigError> {
        if self.pay_to.trim().is_empty() {
            return Err(ConfigError::MissingPayTo);
        }
        if self.max_timeout_seconds == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let table = self.route_table()?;
        let builder = self.requirement_builder(registry);
        for (key, rule) in table.iter() {
            builder
                .build_all(rule, &builder.resource_for(key.path()))
                .map_err(|source| ConfigError::Price {
                    key: key.to_string(),
                    source,
                })?;
        }
        Ok((table, builder))
    }
}
