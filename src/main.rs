//! x402 payment gateway HTTP entrypoint.
//!
//! Endpoints:
//! - `POST /process` – Priced resource, requires an `X-PAYMENT` header
//! - `GET /payment-info` – Payment terms of `/process`
//! - `GET /health` – Service status and active settlement mode
//! - `GET /merchant-status` – Balances of the settling account
//! - `GET /api/networks` – Supported networks
//! - `POST /api/payment-link/create`, `GET /api/payment-link/{id}`,
//!   `POST /api/payment-link/execute` – Shareable payment links
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` points at an optional JSON configuration file
//! - `MERCHANT_PRIVATE_KEY` enables on-chain settlement; without it payments are simulated
//! - `OTEL_*` variables enable tracing to systems like Honeycomb

use axum::http::Method;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors;

use push_x402::chain::ChainRegistry;
use push_x402::config::Config;
use push_x402::handlers::{self, AppState, PROCESS_RESOURCE};
use push_x402::networks::NetworkRegistry;
use push_x402::requirements::RequirementsBuilder;
use push_x402::settlement::{SettlementEngine, SettlementMode};
use push_x402::util::{SigDown, Telemetry, http_trace_layer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Alloy and OTLP both pull in rustls; pick the provider explicitly.
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenv().ok();
    let _telemetry = Telemetry::new();

    let config = Config::load()?;
    let networks = NetworkRegistry::from_env();
    let requirements = RequirementsBuilder::new(networks.clone(), config.service_name());
    requirements.build_strict(
        PROCESS_RESOURCE,
        config.service_name(),
        config.price(),
        config.pay_to(),
        config.network(),
    )?;

    let mode = match config.merchant_key() {
        Some(merchant_key) => {
            let registry = ChainRegistry::from_config(&config, &networks, merchant_key)?;
            SettlementMode::Live(Arc::new(registry))
        }
        None => {
            tracing::warn!("MERCHANT_PRIVATE_KEY not set, payments are verified but not settled on-chain");
            SettlementMode::Simulated
        }
    };
    tracing::info!(
        mode = ?mode,
        network = config.network(),
        pay_to = %config.pay_to(),
        price = %config.price(),
        "Settlement configured"
    );

    let engine = SettlementEngine::new(
        networks,
        mode,
        Duration::from_secs(config.settlement_timeout_secs()),
    );
    let state = Arc::new(AppState {
        engine,
        requirements,
        pay_to: config.pay_to(),
        price: config.price(),
        network: config.network().to_string(),
        service_name: config.service_name().to_string(),
    });

    let http_endpoints = handlers::routes(state)
        .layer(http_trace_layer())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return Err(e.into());
        }
    };

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
