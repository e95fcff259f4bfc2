//! Local payment verification.
//!
//! [`PaymentVerifier`] decides, without any I/O, whether a submitted
//! [`PaymentPayload`] satisfies a [`PaymentRequirements`]. It checks every
//! field the client was asked to sign over, the authorization window, and the
//! EIP-191 signature of the declared payer.
//!
//! Passing local verification does not mean the payer has funds; that is
//! established by the facilitator at settlement.

use alloy_primitives::{Address, Signature, hex};
use std::str::FromStr;
use std::time::Duration;

use crate::proto::{
    AsPaymentProblem, ExactScheme, PaymentPayload, PaymentRequirements,
    PaymentVerificationError, TokenAmount, VerifyRequest, VerifyResponse, X402_VERSION,
};
use crate::timestamp::UnixTimestamp;

/// A payment that passed local verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// Checksummed address of the payer.
    pub payer: String,
    /// Amount the payer authorized.
    pub amount: TokenAmount,
}

/// Checks payment payloads against requirements.
///
/// Stateless and cheap to copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentVerifier {
    clock_skew: Duration,
}

impl PaymentVerifier {
    /// Creates a verifier with no clock-skew tolerance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            clock_skew: Duration::ZERO,
        }
    }

    /// Accepts authorizations whose `validAfter` lies up to `skew` in the
    /// future.
    #[must_use]
    pub const fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Verifies `payload` against `requirements` at the current time.
    ///
    /// # Errors
    ///
    /// Returns the first [`PaymentVerificationError`] found.
    pub fn verify(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<VerifiedPayment, PaymentVerificationError> {
        let result = self.verify_at(requirements, payload, UnixTimestamp::now());
        #[cfg(feature = "telemetry")]
        if let Err(err) = &result {
            tracing::debug!(
                resource = %requirements.resource,
                network = %requirements.network,
                error = %err,
                "local payment verification failed"
            );
        }
        result
    }

    /// Verifies `payload` against `requirements` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the first [`PaymentVerificationError`] found.
    pub fn verify_at(
        &self,
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
        now: UnixTimestamp,
    ) -> Result<VerifiedPayment, PaymentVerificationError> {
        if payload.x402_version != X402_VERSION {
            return Err(PaymentVerificationError::UnsupportedVersion(
                payload.x402_version,
            ));
        }
        if payload.scheme != ExactScheme::VALUE || requirements.scheme != payload.scheme {
            return Err(PaymentVerificationError::UnsupportedScheme);
        }

        let authorization = payload.authorization();
        if payload.network != requirements.network || authorization.network != requirements.network
        {
            return Err(PaymentVerificationError::NetworkMismatch);
        }
        if authorization.asset != requirements.asset {
            return Err(PaymentVerificationError::AssetMismatch);
        }
        if !authorization.to.eq_ignore_ascii_case(&requirements.pay_to) {
            return Err(PaymentVerificationError::RecipientMismatch);
        }
        if authorization.resource != requirements.resource {
            return Err(PaymentVerificationError::ResourceMismatch);
        }
        if let Some(nonce) = &requirements.nonce
            && authorization.nonce != *nonce
        {
            return Err(PaymentVerificationError::InvalidNonce);
        }
        if authorization.amount < requirements.amount {
            return Err(PaymentVerificationError::InsufficientAmount);
        }

        let window = authorization
            .valid_before
            .seconds_since(authorization.valid_after);
        if window > requirements.max_timeout_seconds {
            return Err(PaymentVerificationError::WindowTooLong(
                requirements.max_timeout_seconds,
            ));
        }
        if authorization.valid_after > now.saturating_add(self.clock_skew) {
            return Err(PaymentVerificationError::Early);
        }
        if authorization.valid_before <= now {
            return Err(PaymentVerificationError::Expired);
        }

        let payer = recover_payer(payload)?;
        Ok(VerifiedPayment {
            payer: payer.to_checksum(None),
            amount: authorization.amount,
        })
    }

    /// Runs [`verify`](Self::verify) on a facilitator-style request and wraps
    /// the outcome as a [`VerifyResponse`].
    #[must_use]
    pub fn check(&self, request: &VerifyRequest) -> VerifyResponse {
        match self.verify(&request.payment_requirements, &request.payment_payload) {
            Ok(verified) => VerifyResponse::valid(verified.payer),
            Err(err) => VerifyResponse::invalid(
                Some(request.payment_payload.payer().to_owned()),
                err.as_payment_problem().reason().to_string(),
            ),
        }
    }
}

fn recover_payer(payload: &PaymentPayload) -> Result<Address, PaymentVerificationError> {
    let authorization = payload.authorization();
    let declared = Address::from_str(&authorization.from).map_err(|e| {
        PaymentVerificationError::InvalidFormat(format!("payer address: {e}"))
    })?;
    let bytes = hex::decode(&payload.payload.signature)
        .map_err(|e| PaymentVerificationError::InvalidSignature(e.to_string()))?;
    let signature = Signature::from_raw(&bytes)
        .map_err(|e| PaymentVerificationError::InvalidSignature(e.to_string()))?;
    let recovered = signature
        .recover_address_from_msg(authorization.signing_message())
        .map_err(|e| PaymentVerificationError::InvalidSignature(e.to_string()))?;
    if recovered != declared {
        return Err(PaymentVerificationError::InvalidSignature(format!(
            "signed by {recovered}, not {declared}"
        )));
    }
    Ok(declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{AssetDescriptor, Authorization, ExactPayload, ErrorReason};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    const NOW: u64 = 1_700_000_000;

    fn signer() -> PrivateKeySigner {
        "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap()
    }

    fn requirements(resource: &str) -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".into(),
            network: "hedera-testnet".into(),
            amount: TokenAmount::new(1000),
            asset: AssetDescriptor::new("0.0.429274", 6),
            pay_to: "0.0.1234".into(),
            nonce: Some("abcd".into()),
            max_timeout_seconds: 300,
            resource: resource.into(),
            description: None,
            mime_type: None,
            extra: None,
        }
    }

    fn sign(authorization: Authorization, signer: &PrivateKeySigner) -> PaymentPayload {
        let signature = signer
            .sign_message_sync(authorization.signing_message().as_bytes())
            .unwrap();
        PaymentPayload {
            x402_version: X402_VERSION,
            scheme: "exact".into(),
            network: authorization.network.clone(),
            payload: ExactPayload {
                signature: hex::encode_prefixed(signature.as_bytes()),
                authorization,
            },
        }
    }

    fn authorization_for(requirements: &PaymentRequirements) -> Authorization {
        Authorization {
            from: signer().address().to_string(),
            to: requirements.pay_to.clone(),
            amount: requirements.amount,
            asset: requirements.asset.clone(),
            network: requirements.network.clone(),
            resource: requirements.resource.clone(),
            nonce: requirements.nonce.clone().unwrap_or_default(),
            valid_after: UnixTimestamp::from_secs(NOW - 10),
            valid_before: UnixTimestamp::from_secs(NOW + 60),
        }
    }

    fn verify(
        requirements: &PaymentRequirements,
        payload: &PaymentPayload,
    ) -> Result<VerifiedPayment, PaymentVerificationError> {
        PaymentVerifier::new().verify_at(requirements, payload, UnixTimestamp::from_secs(NOW))
    }

    #[test]
    fn accepts_a_well_formed_payment() {
        let requirements = requirements("/hedera-usdc");
        let payload = sign(authorization_for(&requirements), &signer());

        let verified = verify(&requirements, &payload).unwrap();
        assert_eq!(verified.payer, signer().address().to_checksum(None));
        assert_eq!(verified.amount.units(), 1000);
    }

    #[test]
    fn overpayment_is_accepted_underpayment_is_not() {
        let requirements = requirements("/r");
        let mut authorization = authorization_for(&requirements);
        authorization.amount = TokenAmount::new(5000);
        assert!(verify(&requirements, &sign(authorization.clone(), &signer())).is_ok());

        authorization.amount = TokenAmount::new(999);
        assert_eq!(
            verify(&requirements, &sign(authorization, &signer())),
            Err(PaymentVerificationError::InsufficientAmount)
        );
    }

    #[test]
    fn payload_for_one_route_fails_on_another() {
        let route_a = requirements("/hedera-usdc");
        let route_b = requirements("/paid-signal");
        let payload = sign(authorization_for(&route_a), &signer());

        assert!(verify(&route_a, &payload).is_ok());
        assert_eq!(
            verify(&route_b, &payload),
            Err(PaymentVerificationError::ResourceMismatch)
        );
    }

    #[test]
    fn tampered_fields_break_the_signature() {
        let requirements = requirements("/r");
        let mut payload = sign(authorization_for(&requirements), &signer());
        payload.payload.authorization.valid_before = UnixTimestamp::from_secs(NOW + 120);

        assert!(matches!(
            verify(&requirements, &payload),
            Err(PaymentVerificationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn signature_from_someone_else_is_rejected() {
        let requirements = requirements("/r");
        let mut authorization = authorization_for(&requirements);
        authorization.from = "0x0000000000000000000000000000000000000001".into();
        let payload = sign(authorization, &signer());

        assert!(matches!(
            verify(&requirements, &payload),
            Err(PaymentVerificationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let requirements = requirements("/r");
        let mut payload = sign(authorization_for(&requirements), &signer());
        payload.payload.signature = "0x1234".into();

        assert!(matches!(
            verify(&requirements, &payload),
            Err(PaymentVerificationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn field_mismatches_are_reported_specifically() {
        let requirements = requirements("/r");
        let base = authorization_for(&requirements);

        let mut other = base.clone();
        other.to = "0.0.9999".into();
        assert_eq!(
            verify(&requirements, &sign(other, &signer())),
            Err(PaymentVerificationError::RecipientMismatch)
        );

        let mut other = base.clone();
        other.nonce = "ffff".into();
        assert_eq!(
            verify(&requirements, &sign(other, &signer())),
            Err(PaymentVerificationError::InvalidNonce)
        );

        let mut other = base.clone();
        other.asset = AssetDescriptor::new("0.0.429274", 8);
        assert_eq!(
            verify(&requirements, &sign(other, &signer())),
            Err(PaymentVerificationError::AssetMismatch)
        );

        let mut payload = sign(base, &signer());
        payload.x402_version = 2;
        assert_eq!(
            verify(&requirements, &payload),
            Err(PaymentVerificationError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn authorization_window_is_enforced() {
        let requirements = requirements("/r");
        let base = authorization_for(&requirements);

        let mut early = base.clone();
        early.valid_after = UnixTimestamp::from_secs(NOW + 5);
        assert_eq!(
            verify(&requirements, &sign(early.clone(), &signer())),
            Err(PaymentVerificationError::Early)
        );
        let tolerant = PaymentVerifier::new().with_clock_skew(Duration::from_secs(10));
        assert!(
            tolerant
                .verify_at(
                    &requirements,
                    &sign(early, &signer()),
                    UnixTimestamp::from_secs(NOW)
                )
                .is_ok()
        );

        let mut expired = base.clone();
        expired.valid_before = UnixTimestamp::from_secs(NOW);
        assert_eq!(
            verify(&requirements, &sign(expired, &signer())),
            Err(PaymentVerificationError::Expired)
        );

        let mut too_long = base;
        too_long.valid_before = UnixTimestamp::from_secs(NOW + 1000);
        assert_eq!(
            verify(&requirements, &sign(too_long, &signer())),
            Err(PaymentVerificationError::WindowTooLong(300))
        );
    }

    #[test]
    fn check_wraps_failures_with_reason_codes() {
        let requirements = requirements("/r");
        let mut authorization = authorization_for(&requirements);
        authorization.valid_after = UnixTimestamp::from_secs(0);
        authorization.valid_before = UnixTimestamp::from_secs(1);
        let request = VerifyRequest::new(sign(authorization, &signer()), requirements);

        match PaymentVerifier::new().check(&request) {
            VerifyResponse::Invalid { reason, payer } => {
                assert_eq!(reason, ErrorReason::InvalidPaymentExpired.as_str());
                assert!(payer.is_some());
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }
}
