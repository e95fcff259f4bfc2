//! Known networks and their default stablecoins.
//!
//! Money-denominated prices (`"$0.001"`) are settled in the default stablecoin
//! of the route's network. [`NetworkRegistry`] is the lookup table used for
//! that; it starts from [`KNOWN_NETWORKS`] and can be extended at start-up.

use std::collections::HashMap;

use crate::proto::AssetDescriptor;

/// Hedera testnet.
pub const HEDERA_TESTNET: &str = "hedera-testnet";

/// Hedera mainnet.
pub const HEDERA_MAINNET: &str = "hedera";

/// Base Sepolia (testnet).
pub const BASE_SEPOLIA: &str = "base-sepolia";

/// Base mainnet.
pub const BASE_MAINNET: &str = "base";

/// Decimals used by USDC on every network listed here.
pub const USDC_DECIMALS: u8 = 6;

/// A stablecoin deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StablecoinInfo {
    /// Ticker symbol.
    pub symbol: &'static str,
    /// Token address or identifier.
    pub address: &'static str,
    /// Decimal places.
    pub decimals: u8,
}

impl StablecoinInfo {
    /// Returns the wire descriptor for this token.
    #[must_use]
    pub fn descriptor(&self) -> AssetDescriptor {
        AssetDescriptor::new(self.address, self.decimals)
    }
}

/// A known network definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Network identifier used on the wire.
    pub name: &'static str,
    /// The stablecoin used for money-denominated prices.
    pub stablecoin: StablecoinInfo,
}

/// Networks with a default stablecoin out of the box.
pub const KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: HEDERA_TESTNET,
        stablecoin: StablecoinInfo {
            symbol: "USDC",
            address: "0.0.429274",
            decimals: USDC_DECIMALS,
        },
    },
    NetworkInfo {
        name: HEDERA_MAINNET,
        stablecoin: StablecoinInfo {
            symbol: "USDC",
            address: "0.0.456858",
            decimals: USDC_DECIMALS,
        },
    },
    NetworkInfo {
        name: BASE_SEPOLIA,
        stablecoin: StablecoinInfo {
            symbol: "USDC",
            address: "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            decimals: USDC_DECIMALS,
        },
    },
    NetworkInfo {
        name: BASE_MAINNET,
        stablecoin: StablecoinInfo {
            symbol: "USDC",
            address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            decimals: USDC_DECIMALS,
        },
    },
];

/// Maps network identifiers to their default stablecoin.
///
/// # Example
///
/// ```
/// use h402::networks::{NetworkRegistry, HEDERA_TESTNET};
///
/// let registry = NetworkRegistry::known();
/// let usdc = registry.default_asset(HEDERA_TESTNET).unwrap();
/// assert_eq!(usdc.address, "0.0.429274");
/// ```
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    stablecoins: HashMap<String, StablecoinInfo>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding [`KNOWN_NETWORKS`].
    #[must_use]
    pub fn known() -> Self {
        Self::from_networks(KNOWN_NETWORKS)
    }

    /// Creates a registry from a slice of network definitions.
    #[must_use]
    pub fn from_networks(networks: &[NetworkInfo]) -> Self {
        let mut registry = Self::new();
        for info in networks {
            registry.insert(info.name, info.stablecoin);
        }
        registry
    }

    /// Adds or replaces the default stablecoin of `network`.
    pub fn insert(&mut self, network: impl Into<String>, stablecoin: StablecoinInfo) {
        self.stablecoins.insert(network.into(), stablecoin);
    }

    /// Returns the default stablecoin of `network`.
    #[must_use]
    pub fn stablecoin(&self, network: &str) -> Option<&StablecoinInfo> {
        self.stablecoins.get(network)
    }

    /// Returns the default asset descriptor of `network`.
    #[must_use]
    pub fn default_asset(&self, network: &str) -> Option<AssetDescriptor> {
        self.stablecoin(network).map(StablecoinInfo::descriptor)
    }

    /// Returns `true` if `network` has a default stablecoin.
    #[must_use]
    pub fn contains(&self, network: &str) -> bool {
        self.stablecoins.contains_key(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_networks_have_usdc() {
        let registry = NetworkRegistry::known();
        for info in KNOWN_NETWORKS {
            let asset = registry.default_asset(info.name).unwrap();
            assert_eq!(asset.decimals, USDC_DECIMALS);
        }
        assert!(!registry.contains("solana"));
    }

    #[test]
    fn insert_overrides_default() {
        let mut registry = NetworkRegistry::known();
        registry.insert(
            HEDERA_TESTNET,
            StablecoinInfo {
                symbol: "hUSDT",
                address: "0.0.7274170",
                decimals: 6,
            },
        );
        assert_eq!(
            registry.default_asset(HEDERA_TESTNET).unwrap().address,
            "0.0.7274170"
        );
    }
}
