//! Demo resource server with payment-gated Hedera routes.
//!
//! ```bash
//! FACILITATOR_URL=http://localhost:4022 ADDRESS=0.0.1234 cargo run -p h402-demo
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;
use h402_demo::{DEFAULT_PORT, paywall, routes};
use h402_http::server::PaymentGateLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Demo server arguments; every flag can also come from the environment or
/// a `.env` file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Base URL of the facilitator.
    #[arg(long, env = "FACILITATOR_URL")]
    facilitator_url: String,

    /// Account that receives payments.
    #[arg(long = "address", env = "ADDRESS")]
    pay_to: String,

    /// Account that pays network fees for clients.
    #[arg(long, env = "FEE_PAYER")]
    fee_payer: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Args::parse()).await {
        tracing::error!("demo server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(pay_to = %args.pay_to, facilitator = %args.facilitator_url, "starting");

    let config = paywall(args.pay_to, args.facilitator_url, args.fee_payer);
    let gate = PaymentGateLayer::from_config(&config)?;
    let app = routes().layer(gate).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{addr}");
    for (route, description) in [
        ("GET /weather", "free"),
        ("GET /signal", "free"),
        ("GET /hedera-usdc", "$0.001 USDC on hedera-testnet"),
        ("GET /hedera-native", "0.5 HBAR on hedera-testnet"),
        ("GET /paid-signal", "$0.003 USDC on hedera-testnet"),
    ] {
        tracing::info!("  {route} - {description}");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}
