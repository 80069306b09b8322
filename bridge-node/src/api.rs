//! HTTP surface
//!
//! - `GET /receiveaddress/:beneficiary` checks the beneficiary is an attested
//!   Planetmint machine, allocates a Liquid receiving address and registers
//!   the pending conversion
//! - `GET /health`
//! - `GET /metrics` (Prometheus text format)

use adapters::{AddressAllocator, MachineRegistry};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bridge_core::Relay;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Relay core
    pub relay: Arc<Relay>,
    /// Receiving address source
    pub addresses: Arc<dyn AddressAllocator>,
    /// Beneficiary verification
    pub machines: Arc<dyn MachineRegistry>,
}

/// Registration response
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiveAddressResponse {
    /// Address the depositor pays into
    #[serde(rename = "liquid-address")]
    pub liquid_address: String,
    /// Account credited on Planetmint
    #[serde(rename = "planetmint-beneficiary")]
    pub planetmint_beneficiary: String,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: &'static str,
    /// Service name
    pub service: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Handler errors
#[derive(Debug)]
pub enum ApiError {
    /// Client sent an unusable request
    BadRequest(String),
    /// A ledger gateway failed
    Gateway(String),
    /// The pending request store failed
    Storage(String),
    /// Anything else
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Gateway(msg) => (StatusCode::BAD_GATEWAY, format!("Gateway error: {}", msg)),
            ApiError::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Storage error: {}", msg),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", msg),
            ),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<bridge_core::Error> for ApiError {
    fn from(err: bridge_core::Error) -> Self {
        use bridge_core::Error as E;
        match &err {
            E::InvalidRequest(msg) => ApiError::BadRequest(msg.clone()),
            E::SourceGateway(_) | E::DestinationGateway(_) | E::GatewayTimeout { .. } => {
                ApiError::Gateway(err.to_string())
            }
            E::Storage(_) | E::Serialization(_) | E::CorruptRecord { .. } | E::Io(_) => {
                ApiError::Storage(err.to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<adapters::Error> for ApiError {
    fn from(err: adapters::Error) -> Self {
        ApiError::Gateway(err.to_string())
    }
}

async fn receive_address(
    State(state): State<AppState>,
    Path(beneficiary): Path<String>,
) -> Result<Json<ReceiveAddressResponse>, ApiError> {
    let beneficiary = beneficiary.trim().to_string();
    if beneficiary.is_empty() {
        return Err(ApiError::BadRequest("beneficiary is empty".to_string()));
    }

    let resolved = state
        .machines
        .machine_address(&beneficiary)
        .await
        .map_err(|e| {
            warn!(beneficiary = %beneficiary, error = %e, "Machine lookup failed");
            ApiError::from(e)
        })?;
    match resolved {
        Some(machine) if machine == beneficiary => {}
        Some(machine) => {
            return Err(ApiError::BadRequest(format!(
                "different machine resolved: {} instead of {}",
                machine, beneficiary
            )))
        }
        None => {
            return Err(ApiError::BadRequest(format!(
                "no machine registered for {}",
                beneficiary
            )))
        }
    }

    let address = state.addresses.new_address().await.map_err(|e| {
        warn!(error = %e, "Failed to allocate receiving address");
        ApiError::from(e)
    })?;

    // RocksDB writes block; keep them off the async workers
    let relay = state.relay.clone();
    let (liquid_address, planetmint_beneficiary) = (address.clone(), beneficiary.clone());
    let request = tokio::task::spawn_blocking(move || {
        relay.register_pending_conversion(&liquid_address, &planetmint_beneficiary)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(|e| {
        error!(address = %address, error = %e, "Failed to register conversion");
        ApiError::from(e)
    })?;

    info!(
        address = %request.source_address,
        beneficiary = %request.destination_address,
        "Issued receiving address"
    );

    Ok(Json(ReceiveAddressResponse {
        liquid_address: request.source_address,
        planetmint_beneficiary: request.destination_address,
    }))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "bridge-node",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .relay
        .metrics()
        .export()
        .map_err(|e| ApiError::Internal(format!("Failed to export metrics: {}", e)))
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/receiveaddress/:beneficiary", get(receive_address))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
