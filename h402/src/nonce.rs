//! Stateless, route-bound payment nonces.
//!
//! Each challenge carries a fresh nonce the client must sign over. Rather than
//! remembering every nonce it hands out, the server makes them
//! self-authenticating: a nonce is 16 random bytes followed by a truncated
//! HMAC-SHA256 tag over those bytes, the resource, and the network. A nonce
//! therefore only checks out for the route and network it was issued for.
//!
//! Replay protection (a nonce consumed twice) is the facilitator's job; this
//! module only guarantees that a nonce came from this server.

use alloy_primitives::hex;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Issues and checks route-bound nonces.
#[derive(Clone)]
pub struct NonceIssuer {
    mac: HmacSha256,
}

impl NonceIssuer {
    /// Creates an issuer keyed with `secret`.
    ///
    /// Servers sharing a secret accept each other's nonces.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn new(secret: &[u8]) -> Self {
        let mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
        Self { mac }
    }

    /// Creates an issuer with a random key.
    ///
    /// Nonces issued before a restart stop validating.
    #[must_use]
    pub fn random() -> Self {
        Self::new(&rand::random::<[u8; 32]>())
    }

    /// Issues a fresh nonce for `resource` on `network`.
    #[must_use]
    pub fn issue(&self, resource: &str, network: &str) -> String {
        let salt = rand::random::<[u8; SALT_LEN]>();
        let tag = self.tagged(&salt, resource, network).finalize().into_bytes();
        let mut nonce = [0u8; SALT_LEN + TAG_LEN];
        nonce[..SALT_LEN].copy_from_slice(&salt);
        nonce[SALT_LEN..].copy_from_slice(&tag[..TAG_LEN]);
        hex::encode(nonce)
    }

    /// Returns `true` if `nonce` was issued by this key for `resource` on
    /// `network`.
    #[must_use]
    pub fn check(&self, nonce: &str, resource: &str, network: &str) -> bool {
        let Ok(bytes) = hex::decode(nonce) else {
            return false;
        };
        if bytes.len() != SALT_LEN + TAG_LEN {
            return false;
        }
        let (salt, tag) = bytes.split_at(SALT_LEN);
        self.tagged(salt, resource, network)
            .verify_truncated_left(tag)
            .is_ok()
    }

    fn tagged(&self, salt: &[u8], resource: &str, network: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(salt);
        // Length prefixes keep ("/a", "bc") and ("/ab", "c") apart.
        mac.update(&(resource.len() as u64).to_be_bytes());
        mac.update(resource.as_bytes());
        mac.update(&(network.len() as u64).to_be_bytes());
        mac.update(network.as_bytes());
        mac
    }
}

impl fmt::Debug for NonceIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceIssuer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_nonces_check_out_for_their_route_only() {
        let issuer = NonceIssuer::new(b"secret");
        let nonce = issuer.issue("/hedera-usdc", "hedera-testnet");

        assert_eq!(nonce.len(), 64);
        assert!(issuer.check(&nonce, "/hedera-usdc", "hedera-testnet"));
        assert!(!issuer.check(&nonce, "/paid-signal", "hedera-testnet"));
        assert!(!issuer.check(&nonce, "/hedera-usdc", "base-sepolia"));
    }

    #[test]
    fn nonces_are_unique() {
        let issuer = NonceIssuer::random();
        let a = issuer.issue("/r", "hedera-testnet");
        let b = issuer.issue("/r", "hedera-testnet");
        assert_ne!(a, b);
    }

    #[test]
    fn other_keys_and_garbage_are_rejected() {
        let ours = NonceIssuer::new(b"one");
        let theirs = NonceIssuer::new(b"two");
        let nonce = theirs.issue("/r", "hedera");

        assert!(!ours.check(&nonce, "/r", "hedera"));
        assert!(!ours.check("zz", "/r", "hedera"));
        assert!(!ours.check(&nonce[..40], "/r", "hedera"));

        let mut tampered = nonce.into_bytes();
        tampered[0] = if tampered[0] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(!theirs.check(&tampered, "/r", "hedera"));
    }

    #[test]
    fn shared_secret_is_portable() {
        let nonce = NonceIssuer::new(b"shared").issue("/r", "hedera");
        assert!(NonceIssuer::new(b"shared").check(&nonce, "/r", "hedera"));
    }
}
