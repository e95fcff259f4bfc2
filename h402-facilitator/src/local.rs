//! In-process facilitator with an idempotent settlement ledger.
//!
//! [`LocalFacilitator`] checks payments with the same [`PaymentVerifier`] the
//! gate uses and records every settlement in memory. A nonce settles at most
//! once per network: settling the identical authorization again returns the
//! original receipt, while a different authorization reusing the nonce is
//! refused.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{B256, keccak256};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use h402::facilitator::{BoxFuture, Facilitator, FacilitatorError};
use h402::proto::{
    AsPaymentProblem, ErrorReason, ExactScheme, PaymentPayload, PaymentRequirements,
    PaymentVerificationError, SettleRequest, SettleResponse, SupportedKind, SupportedResponse,
    VerifyRequest, VerifyResponse, X402_VERSION,
};
use h402::timestamp::UnixTimestamp;
use h402::verify::PaymentVerifier;

use crate::config::FacilitatorConfig;

#[derive(Debug, Clone)]
struct Settlement {
    digest: B256,
    response: SettleResponse,
}

/// A [`Facilitator`] that settles into an in-memory ledger.
#[derive(Debug)]
pub struct LocalFacilitator {
    verifier: PaymentVerifier,
    networks: BTreeSet<String>,
    fee_payer: Option<String>,
    operator: String,
    ledger: DashMap<(String, String), Settlement>,
    sequence: AtomicU64,
}

impl LocalFacilitator {
    /// Creates a facilitator for `networks`.
    pub fn new<I, N>(networks: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            verifier: PaymentVerifier::new(),
            networks: networks.into_iter().map(Into::into).collect(),
            fee_payer: None,
            operator: "0.0.5678".to_owned(),
            ledger: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates a facilitator from server configuration.
    #[must_use]
    pub fn from_config(config: &FacilitatorConfig) -> Self {
        let mut this = Self::new(config.networks.iter().cloned());
        this.fee_payer.clone_from(&config.fee_payer);
        this.operator.clone_from(&config.operator);
        this
    }

    /// Advertises `fee_payer` in `/supported`.
    #[must_use]
    pub fn with_fee_payer(mut self, fee_payer: impl Into<String>) -> Self {
        self.fee_payer = Some(fee_payer.into());
        self
    }

    /// Returns the number of settled authorizations.
    #[must_use]
    pub fn settled(&self) -> usize {
        self.ledger.len()
    }

    fn check(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<String, PaymentVerificationError> {
        if !self.networks.contains(&requirements.network) {
            return Err(PaymentVerificationError::NetworkMismatch);
        }
        Ok(self.verifier.verify(requirements, payload)?.payer)
    }

    fn verify_now(&self, request: &VerifyRequest) -> VerifyResponse {
        let payload = &request.payment_payload;
        let payer = payload.payer().to_owned();
        if !self.networks.contains(&request.payment_requirements.network) {
            return VerifyResponse::invalid(
                Some(payer),
                ErrorReason::UnsupportedNetwork.to_string(),
            );
        }
        if let Some(settled) = self.ledger.get(&ledger_key(payload))
            && settled.digest != digest(payload)
        {
            return VerifyResponse::invalid(
                Some(payer),
                ErrorReason::NonceAlreadyUsed.to_string(),
            );
        }
        match self.check(payload, &request.payment_requirements) {
            Ok(payer) => VerifyResponse::valid(payer),
            Err(err) => VerifyResponse::invalid(
                Some(payer),
                err.as_payment_problem().reason().to_string(),
            ),
        }
    }

    fn settle_now(&self, request: &SettleRequest) -> SettleResponse {
        let payload = &request.payment_payload;
        let network = request.payment_requirements.network.clone();
        let digest = digest(payload);

        match self.ledger.entry(ledger_key(payload)) {
            Entry::Occupied(entry) => {
                let settled = entry.get();
                if settled.digest == digest {
                    tracing::debug!(%network, "replayed settlement, returning original receipt");
                    settled.response.clone()
                } else {
                    SettleResponse::Error {
                        reason: ErrorReason::NonceAlreadyUsed.to_string(),
                        network,
                    }
                }
            }
            Entry::Vacant(entry) => match self.check(payload, &request.payment_requirements) {
                Ok(payer) => {
                    let response = SettleResponse::Success {
                        payer,
                        transaction: self.next_transaction(),
                        network,
                    };
                    tracing::info!(?response, "settled");
                    entry.insert(Settlement {
                        digest,
                        response: response.clone(),
                    });
                    response
                }
                Err(err) => SettleResponse::Error {
                    reason: err.as_payment_problem().reason().to_string(),
                    network,
                },
            },
        }
    }

    /// Hedera-style transaction id: `account@seconds.sequence`.
    fn next_transaction(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}@{}.{sequence:09}",
            self.operator,
            UnixTimestamp::now().as_secs()
        )
    }
}

fn ledger_key(payload: &PaymentPayload) -> (String, String) {
    let authorization = payload.authorization();
    (authorization.network.clone(), authorization.nonce.clone())
}

/// Hash of the signed authorization together with its signature.
fn digest(payload: &PaymentPayload) -> B256 {
    let message = payload.authorization().signing_message();
    keccak256([message.as_bytes(), payload.payload.signature.as_bytes()].concat())
}

impl Facilitator for LocalFacilitator {
    fn verify(
        &self,
        request: VerifyRequest,
    ) -> BoxFuture<'_, Result<VerifyResponse, FacilitatorError>> {
        Box::pin(async move { Ok(self.verify_now(&request)) })
    }

    fn settle(
        &self,
        request: SettleRequest,
    ) -> BoxFuture<'_, Result<SettleResponse, FacilitatorError>> {
        Box::pin(async move { Ok(self.settle_now(&request)) })
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        let extra = self
            .fee_payer
            .as_ref()
            .map(|fee_payer| serde_json::json!({ "feePayer": fee_payer }));
        let kinds = self
            .networks
            .iter()
            .map(|network| SupportedKind {
                x402_version: X402_VERSION,
                scheme: ExactScheme.to_string(),
                network: network.clone(),
                extra: extra.clone(),
            })
            .collect();
        Box::pin(async move { Ok(SupportedResponse { kinds }) })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::hex;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use h402::proto::{AssetDescriptor, Authorization, ExactPayload, TokenAmount};
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) fn signer() -> PrivateKeySigner {
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap()
    }

    pub(crate) fn verify_request(nonce: &str, amount: u128) -> VerifyRequest {
        let requirements = PaymentRequirements {
            scheme: "exact".into(),
            network: "hedera-testnet".into(),
            amount: TokenAmount::new(1000),
            asset: AssetDescriptor::new("0.0.429274", 6),
            pay_to: "0.0.1234".into(),
            nonce: Some(nonce.into()),
            max_timeout_seconds: 300,
            resource: "/hedera-usdc".into(),
            description: None,
            mime_type: None,
            extra: None,
        };
        let now = UnixTimestamp::now();
        let authorization = Authorization {
            from: signer().address().to_string(),
            to: requirements.pay_to.clone(),
            amount: TokenAmount::new(amount),
            asset: requirements.asset.clone(),
            network: requirements.network.clone(),
            resource: requirements.resource.clone(),
            nonce: nonce.into(),
            valid_after: now.saturating_sub(Duration::from_secs(5)),
            valid_before: now.saturating_add(Duration::from_secs(60)),
        };
        let signature = signer()
            .sign_message_sync(authorization.signing_message().as_bytes())
            .unwrap();
        let payload = PaymentPayload {
            x402_version: X402_VERSION,
            scheme: "exact".into(),
            network: requirements.network.clone(),
            payload: ExactPayload {
                signature: hex::encode_prefixed(signature.as_bytes()),
                authorization,
            },
        };
        VerifyRequest::new(payload, requirements)
    }

    #[tokio::test]
    async fn settling_twice_returns_the_same_receipt() {
        let facilitator = LocalFacilitator::new(["hedera-testnet"]);
        let request = SettleRequest::from(verify_request("n-1", 1000));

        let first = facilitator.settle(request.clone()).await.unwrap();
        let second = facilitator.settle(request).await.unwrap();

        assert!(first.is_success());
        assert_eq!(first, second);
        assert_eq!(facilitator.settled(), 1);
    }

    #[tokio::test]
    async fn concurrent_settlements_of_one_payment_charge_once() {
        let facilitator = Arc::new(LocalFacilitator::new(["hedera-testnet"]));
        let request = SettleRequest::from(verify_request("n-2", 1000));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let facilitator = Arc::clone(&facilitator);
                let request = request.clone();
                tokio::spawn(async move { facilitator.settle(request).await.unwrap() })
            })
            .collect();
        let mut receipts = Vec::new();
        for handle in handles {
            receipts.push(handle.await.unwrap());
        }

        assert!(receipts.iter().all(|r| r == &receipts[0]));
        assert_eq!(facilitator.settled(), 1);
    }

    #[tokio::test]
    async fn reusing_a_nonce_for_another_authorization_is_refused() {
        let facilitator = LocalFacilitator::new(["hedera-testnet"]);
        facilitator
            .settle(verify_request("n-3", 1000).into())
            .await
            .unwrap();

        let reused = verify_request("n-3", 2000);
        let verdict = facilitator.verify(reused.clone()).await.unwrap();
        assert_eq!(
            verdict,
            VerifyResponse::invalid(
                Some(signer().address().to_string()),
                "nonce_already_used".into()
            )
        );
        let settlement = facilitator.settle(reused.into()).await.unwrap();
        assert!(matches!(
            settlement,
            SettleResponse::Error { ref reason, .. } if reason == "nonce_already_used"
        ));
    }

    #[tokio::test]
    async fn replaying_an_authorization_with_a_forged_signature_is_refused() {
        let facilitator = LocalFacilitator::new(["hedera-testnet"]);
        let genuine = verify_request("n-6", 1000);
        let receipt = facilitator.settle(genuine.clone().into()).await.unwrap();
        assert!(receipt.is_success());

        let mut forged = genuine;
        forged.payment_payload.payload.signature = format!("0x{}", "00".repeat(65));
        let verdict = facilitator.verify(forged.clone()).await.unwrap();
        assert!(!verdict.is_valid());
        let settlement = facilitator.settle(forged.into()).await.unwrap();
        assert!(!settlement.is_success());
        assert_ne!(settlement, receipt);
        assert_eq!(facilitator.settled(), 1);
    }

    #[tokio::test]
    async fn invalid_payments_are_not_recorded() {
        let facilitator = LocalFacilitator::new(["hedera-testnet"]);
        let settlement = facilitator
            .settle(verify_request("n-4", 999).into())
            .await
            .unwrap();

        assert!(matches!(
            settlement,
            SettleResponse::Error { ref reason, .. } if reason == "invalid_payment_amount"
        ));
        assert_eq!(facilitator.settled(), 0);
    }

    #[tokio::test]
    async fn unknown_networks_are_unsupported() {
        let facilitator = LocalFacilitator::new(["base-sepolia"]).with_fee_payer("0xfee");
        let verdict = facilitator
            .verify(verify_request("n-5", 1000))
            .await
            .unwrap();
        assert!(!verdict.is_valid());

        let supported = facilitator.supported().await.unwrap();
        assert!(supported.supports("exact", "base-sepolia"));
        assert!(!supported.supports("exact", "hedera-testnet"));
        assert_eq!(supported.kinds[0].extra.as_ref().unwrap()["feePayer"], "0xfee");
    }
}
