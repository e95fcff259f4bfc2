//! Payment requirement construction.
//!
//! [`RequirementBuilder`] turns a [`RouteRule`] into the concrete
//! [`PaymentRequirements`] a client must satisfy: it resolves money prices to
//! the network's default stablecoin, scales them into smallest units, stamps
//! the recipient and timeout, and issues a route-bound nonce.
//!
//! When a paid request comes back, [`RequirementBuilder::requirement_for`]
//! rebuilds the requirement the client answered, using the nonce the client
//! signed, so the verifier can compare the two field by field.

use serde_json::json;

use crate::amount::MoneyAmountError;
use crate::networks::NetworkRegistry;
use crate::nonce::NonceIssuer;
use crate::proto::{
    ExactScheme, PaymentPayload, PaymentRequired, PaymentRequirements,
    PaymentVerificationError, X402_VERSION,
};
use crate::route::{Price, PriceOption, RouteRule};

/// Default lifetime of a payment authorization, in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// Errors building requirements from a route rule.
///
/// These are configuration errors: a rule that fails to build fails for every
/// request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A money price names a network without a default stablecoin.
    #[error("network {0:?} has no default stablecoin; price it with an explicit asset")]
    UnsupportedNetwork(String),
    /// The money price cannot be expressed in the stablecoin's units.
    #[error("price on network {network:?} is not representable: {source}")]
    Price {
        /// Network of the offending price.
        network: String,
        /// Underlying conversion error.
        #[source]
        source: MoneyAmountError,
    },
}

/// Errors matching a payment payload to one of a rule's requirements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// The rule itself does not build.
    #[error(transparent)]
    Build(#[from] BuildError),
    /// The payload does not answer any requirement of the rule.
    #[error(transparent)]
    Mismatch(#[from] PaymentVerificationError),
}

/// Builds [`PaymentRequirements`] for priced routes.
///
/// Building is deterministic apart from the nonce: the same rule and resource
/// always yield the same amount, asset, recipient and timeout.
#[derive(Debug, Clone)]
pub struct RequirementBuilder {
    registry: NetworkRegistry,
    pay_to: String,
    fee_payer: Option<String>,
    max_timeout_seconds: u64,
    resource_base_url: Option<String>,
    nonces: NonceIssuer,
}

impl RequirementBuilder {
    /// Creates a builder paying `pay_to`, with the well-known network registry
    /// and the default timeout.
    #[must_use]
    pub fn new(pay_to: impl Into<String>, nonces: NonceIssuer) -> Self {
        Self {
            registry: NetworkRegistry::known(),
            pay_to: pay_to.into(),
            fee_payer: None,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            resource_base_url: None,
            nonces,
        }
    }

    /// Replaces the network registry used to resolve money prices.
    #[must_use]
    pub fn with_registry(mut self, registry: NetworkRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Advertises an account that pays network fees on the client's behalf.
    #[must_use]
    pub fn with_fee_payer(mut self, fee_payer: impl Into<String>) -> Self {
        self.fee_payer = Some(fee_payer.into());
        self
    }

    /// Sets the maximum lifetime of a payment authorization.
    #[must_use]
    pub const fn with_max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Prefixes resource identifiers with `base`, e.g. `https://api.example`.
    #[must_use]
    pub fn with_resource_base_url(mut self, base: impl Into<String>) -> Self {
        self.resource_base_url = Some(base.into());
        self
    }

    /// Returns the resource identifier for a request path.
    #[must_use]
    pub fn resource_for(&self, path: &str) -> String {
        match &self.resource_base_url {
            Some(base) => format!("{}{path}", base.trim_end_matches('/')),
            None => path.to_owned(),
        }
    }

    /// Returns the recipient address.
    #[must_use]
    pub fn pay_to(&self) -> &str {
        &self.pay_to
    }

    /// Returns the nonce issuer.
    #[must_use]
    pub const fn nonces(&self) -> &NonceIssuer {
        &self.nonces
    }

    /// Builds the requirement for one accepted price, with a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the price cannot be resolved on its network.
    pub fn build(
        &self,
        option: &PriceOption,
        rule: &RouteRule,
        resource: &str,
    ) -> Result<PaymentRequirements, BuildError> {
        let mut requirements = self.template(option, rule, resource)?;
        requirements.nonce = Some(self.nonces.issue(resource, &option.network));
        Ok(requirements)
    }

    /// Builds one requirement per accepted price of `rule`, in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`BuildError`] encountered.
    pub fn build_all(
        &self,
        rule: &RouteRule,
        resource: &str,
    ) -> Result<Vec<PaymentRequirements>, BuildError> {
        rule.accepts()
            .iter()
            .map(|option| self.build(option, rule, resource))
            .collect()
    }

    /// Builds the body of a `402 Payment Required` challenge for `rule`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if any accepted price fails to build.
    pub fn challenge(
        &self,
        rule: &RouteRule,
        resource: &str,
        error: impl Into<String>,
    ) -> Result<PaymentRequired, BuildError> {
        Ok(PaymentRequired {
            x402_version: X402_VERSION,
            error: Some(error.into()),
            accepts: self.build_all(rule, resource)?,
        })
    }

    /// Rebuilds the requirement that `payload` answers.
    ///
    /// Picks the accepted price whose scheme, network and asset match the
    /// payload, checks that the signed nonce was issued by this server for
    /// `resource` on that network, and returns the requirement carrying that
    /// nonce.
    ///
    /// # Errors
    ///
    /// Returns [`MatchError::Mismatch`] if the payload answers none of the
    /// rule's prices or carries a foreign nonce, and [`MatchError::Build`] if
    /// the rule is misconfigured.
    pub fn requirement_for(
        &self,
        rule: &RouteRule,
        resource: &str,
        payload: &PaymentPayload,
    ) -> Result<PaymentRequirements, MatchError> {
        if payload.scheme != ExactScheme::VALUE {
            return Err(PaymentVerificationError::UnsupportedScheme.into());
        }
        let mut on_network = rule
            .accepts()
            .iter()
            .filter(|option| option.network == payload.network)
            .peekable();
        if on_network.peek().is_none() {
            return Err(PaymentVerificationError::NetworkMismatch.into());
        }
        let mut matched = None;
        for option in on_network {
            let template = self.template(option, rule, resource)?;
            if template.accepts(payload) {
                matched = Some(template);
                break;
            }
        }
        let mut requirements = matched.ok_or(PaymentVerificationError::AssetMismatch)?;

        let nonce = &payload.authorization().nonce;
        if !self.nonces.check(nonce, resource, &requirements.network) {
            return Err(PaymentVerificationError::InvalidNonce.into());
        }
        requirements.nonce = Some(nonce.clone());
        Ok(requirements)
    }

    fn template(
        &self,
        option: &PriceOption,
        rule: &RouteRule,
        resource: &str,
    ) -> Result<PaymentRequirements, BuildError> {
        let (amount, asset) = match &option.price {
            Price::Money(money) => {
                let stablecoin = self
                    .registry
                    .stablecoin(&option.network)
                    .ok_or_else(|| BuildError::UnsupportedNetwork(option.network.clone()))?;
                let amount = money.to_token_amount(stablecoin.decimals).map_err(|source| {
                    BuildError::Price {
                        network: option.network.clone(),
                        source,
                    }
                })?;
                (amount, stablecoin.descriptor())
            }
            Price::Asset(asset_amount) => (asset_amount.amount, asset_amount.asset.clone()),
        };
        Ok(PaymentRequirements {
            scheme: ExactScheme.to_string(),
            network: option.network.clone(),
            amount,
            asset,
            pay_to: self.pay_to.clone(),
            nonce: None,
            max_timeout_seconds: self.max_timeout_seconds,
            resource: resource.to_owned(),
            description: rule.description().map(str::to_owned),
            mime_type: rule.mime_type().map(str::to_owned),
            extra: self
                .fee_payer
                .as_ref()
                .map(|fee_payer| json!({ "feePayer": fee_payer })),
        })
    }
}
