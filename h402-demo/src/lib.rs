//! Demo resource server.
//!
//! Two public routes and three paid ones, priced on Hedera testnet:
//!
//! | Route                | Price                         |
//! |----------------------|-------------------------------|
//! | `GET /weather`       | free                          |
//! | `GET /signal`        | free                          |
//! | `GET /hedera-usdc`   | `$0.001` in USDC              |
//! | `GET /hedera-native` | `50000000` tinybar (0.5 HBAR) |
//! | `GET /paid-signal`   | `$0.003` in USDC              |

use axum::routing::get;
use axum::{Json, Router};
use h402::config::{PaywallConfig, RouteConfig};
use h402::networks::HEDERA_TESTNET;
use h402::proto::{AssetDescriptor, TokenAmount};
use h402::route::{AssetAmount, Price};
use serde_json::{Value, json};

/// Port the demo listens on by default.
pub const DEFAULT_PORT: u16 = 4021;

/// Builds the paywall for the demo's priced routes.
///
/// # Panics
///
/// Panics if one of the built-in price literals stops parsing.
#[must_use]
pub fn paywall(
    pay_to: impl Into<String>,
    facilitator_url: impl Into<String>,
    fee_payer: Option<String>,
) -> PaywallConfig {
    let usd = |literal: &str| Price::Money(literal.parse().expect("valid money literal"));
    let route = |price: Price, description: &str| RouteConfig {
        price,
        network: HEDERA_TESTNET.to_owned(),
        also_accepts: Vec::new(),
        description: Some(description.to_owned()),
        mime_type: Some("application/json".to_owned()),
    };
    let hbar = Price::Asset(AssetAmount {
        amount: TokenAmount::new(50_000_000),
        asset: AssetDescriptor::new("hbar", 8),
    });

    let mut config = PaywallConfig::new(pay_to, facilitator_url)
        .with_route(
            "GET /hedera-usdc",
            route(usd("$0.001"), "Weather on Hedera, paid in USDC"),
        )
        .with_route(
            "GET /hedera-native",
            route(hbar, "Premium Hedera data, paid in HBAR"),
        )
        .with_route(
            "GET /paid-signal",
            route(usd("$0.003"), "Premium trading signal"),
        );
    config.facilitator.fee_payer = fee_payer;
    config
}

/// Returns the demo routes, without any payment gate.
pub fn routes() -> Router {
    Router::new()
        .route("/weather", get(weather))
        .route("/signal", get(signal))
        .route("/hedera-usdc", get(hedera_usdc))
        .route("/hedera-native", get(hedera_native))
        .route("/paid-signal", get(paid_signal))
}

async fn weather() -> Json<Value> {
    Json(json!({
        "report": { "weather": "sunny", "temperature": 70 }
    }))
}

async fn signal() -> Json<Value> {
    Json(json!({
        "report": {
            "signal": "BTC/USDT Trade Signal",
            "body": "Buy BTC at $90,000, target $92,000, stop loss $89,000"
        }
    }))
}

async fn hedera_usdc() -> Json<Value> {
    Json(json!({
        "message": "You paid $0.001 with USDC on Hedera!",
        "data": {
            "weather": "sunny on Hedera",
            "temperature": 75,
            "paid_with": "USDC",
            "token_id": "0.0.429274",
            "network": "hedera-testnet"
        }
    }))
}

async fn hedera_native() -> Json<Value> {
    Json(json!({
        "message": "You paid 0.5 HBAR natively!",
        "data": {
            "premium_content": "Exclusive Hedera network data with native payment",
            "paid_with": "HBAR",
            "amount_hbar": "0.5"
        }
    }))
}

async fn paid_signal() -> Json<Value> {
    Json(json!({
        "message": "You paid $0.003 with hUSDT on Hedera! Unlocking premium trading signal",
        "data": {
            "signal": "BTC/USDT Trade Signal",
            "body": "Buy BTC at $95,000, target $97,000, stop loss $94,000",
            "paid_with": "hUSDT",
            "token_id": "0.0.7274170",
            "network": "hedera-testnet"
        }
    }))
}
