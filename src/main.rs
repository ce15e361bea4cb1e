//! Main entry point for the HMS platform server.
//!
//! Wires the in-process document store, attachment storage and the BHYT
//! insurance client into the REST API and serves it on one address.
//!
//! # Environment Variables
//! - `HMS_ADDR`: server address (default: "0.0.0.0:8000")
//! - `HMS_DATA_DIR`: directory for result attachments (default: "./hms_data")
//! - `HMS_INSURANCE_URL`: base URL of the insurance validation service
//!   (default: "http://localhost:8002")

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use hms_core::{CoreConfig, Database};
use hms_files::AttachmentStore;
use hms_insurance_client::InsuranceClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hms_run=info".parse()?)
                .add_directive("hms_core=info".parse()?)
                .add_directive("hms_insurance_client=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("HMS_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into());
    let data_dir =
        PathBuf::from(std::env::var("HMS_DATA_DIR").unwrap_or_else(|_| "./hms_data".into()));
    let insurance_url =
        std::env::var("HMS_INSURANCE_URL").unwrap_or_else(|_| "http://localhost:8002".into());

    std::fs::create_dir_all(&data_dir)?;
    let cfg = Arc::new(CoreConfig::new(data_dir, insurance_url)?);

    let db = Arc::new(Database::new());
    let attachments = Arc::new(AttachmentStore::new(cfg.attachments_dir())?);
    let insurance_client = Arc::new(InsuranceClient::new(cfg.insurance_url())?);
    let state = AppState::new(cfg, db.clone(), attachments, insurance_client);

    // Best-effort: a failed seed must not keep the service down.
    if let Err(e) = state.insurance.seed_sample_cards() {
        tracing::warn!(error = %e, "skipping insurance card seed");
    }

    tracing::info!("++ Starting HMS REST on {}", addr);

    let app = api_rest::router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
