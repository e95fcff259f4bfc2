//! Facilitator server configuration.
//!
//! Read from a TOML file whose string values may reference the environment
//! as `$VAR` or `${VAR}`:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4022
//! networks = ["hedera-testnet"]
//! fee_payer = "$FEE_PAYER"
//! ```
//!
//! `CONFIG` names the file (default `config.toml`); a missing file means all
//! defaults. `HOST` and `PORT` override the file.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use h402::networks::{BASE_SEPOLIA, HEDERA_TESTNET};
use serde::{Deserialize, Serialize};

/// Failure loading [`FacilitatorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: String,
        /// TOML failure.
        #[source]
        source: toml::de::Error,
    },
    /// `HOST` or `PORT` does not parse.
    #[error("invalid {name} override {value:?}")]
    Override {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Top-level facilitator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Networks this facilitator settles on.
    #[serde(default = "default_networks")]
    pub networks: Vec<String>,
    /// Account advertised as paying network fees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,
    /// Account prefix used in transaction identifiers.
    #[serde(default = "default_operator")]
    pub operator: String,
}

impl Default for FacilitatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            networks: default_networks(),
            fee_payer: None,
            operator: default_operator(),
        }
    }
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4022
}

fn default_networks() -> Vec<String> {
    vec![HEDERA_TESTNET.to_owned(), BASE_SEPOLIA.to_owned()]
}

fn default_operator() -> String {
    "0.0.5678".to_owned()
}

impl FacilitatorConfig {
    /// Loads from `$CONFIG`, or `config.toml`, then applies `HOST`/`PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file or an override is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        let mut config = Self::load_from(&path)?;
        if let Ok(host) = std::env::var("HOST") {
            config.host = host.parse().map_err(|_| ConfigError::Override {
                name: "HOST",
                value: host.clone(),
            })?;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port.parse().map_err(|_| ConfigError::Override {
                name: "PORT",
                value: port.clone(),
            })?;
        }
        Ok(config)
    }

    /// Loads from `path` without consulting `HOST`/`PORT`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&raw, |name| std::env::var(name).ok()).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Parses TOML after expanding variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the expanded text does not parse.
    pub fn parse(
        raw: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, toml::de::Error> {
        toml::from_str(&expand_vars(raw, lookup))
    }
}

/// Replaces `$VAR` and `${VAR}` using `lookup`; unknown names stay verbatim.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(at) = rest.find('$') {
        out.push_str(&rest[..at]);
        let after = &rest[at + 1..];
        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&rest[at..=at + consumed]),
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}
