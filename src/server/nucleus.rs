//! Nucleus: game-server registration and liveness.
//!
//! # Endpoints
//!
//! - `POST /api/register` - Register a server (arbitrary fields)
//! - `POST /api/validateSource` - Source address check, always valid
//! - `GET /api/servers` - List registered servers
//! - `POST /api/servers/:id/status` - Heartbeat / status update
//! - `DELETE /api/servers/:id` - Unregister a server
//! - `GET /health` - Service health

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::errors::ServiceResult;
use crate::server::extractors::JsonBody;
use crate::server::keymaster::MessageResponse;
use crate::server::logging::{log_server_event, ServerEvent};
use crate::server::registry::{ServerRegistry, ServerSummary};

/// Service name reported by `/health`.
pub const NUCLEUS_SERVICE_NAME: &str = "GGMP Nucleus";

#[derive(Clone)]
pub struct NucleusState {
    pub registry: Arc<ServerRegistry>,
}

impl NucleusState {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterServerResponse {
    pub success: bool,
    pub id: String,
    pub host: String,
    pub rp_token: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateSourceRequest {
    #[serde(default)]
    pub ip: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateSourceResponse {
    pub success: bool,
    pub valid: bool,
    pub ip: Value,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListServersResponse {
    pub success: bool,
    pub count: usize,
    pub servers: Vec<ServerSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerStatusResponse {
    pub success: bool,
    /// Full record minus `rpToken`.
    pub server: Value,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NucleusHealth {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    pub registered_servers: usize,
}

/// `POST /api/register`
pub async fn register_server_handler(
    State(state): State<NucleusState>,
    JsonBody(fields): JsonBody<Map<String, Value>>,
) -> ServiceResult<Json<RegisterServerResponse>> {
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let registration = state.registry.register(fields)?;
    log_server_event(ServerEvent::Registered, &registration.id, name.as_deref());

    Ok(Json(RegisterServerResponse {
        success: true,
        id: registration.id,
        host: registration.host,
        rp_token: registration.rp_token,
        message: "Server registered with GGMP Nucleus".to_string(),
    }))
}

/// `POST /api/validateSource`
///
/// Local deployments trust every source, so the answer is always `valid: true`.
pub async fn validate_source_handler(
    JsonBody(payload): JsonBody<ValidateSourceRequest>,
) -> Json<ValidateSourceResponse> {
    info!(ip = %payload.ip, "Source validation request");
    Json(ValidateSourceResponse {
        success: true,
        valid: true,
        ip: payload.ip,
        message: "IP validated by GGMP Nucleus".to_string(),
    })
}

/// `GET /api/servers`
pub async fn list_servers_handler(
    State(state): State<NucleusState>,
) -> ServiceResult<Json<ListServersResponse>> {
    let servers = state.registry.list()?;
    Ok(Json(ListServersResponse {
        success: true,
        count: servers.len(),
        servers,
    }))
}

/// `POST /api/servers/:id/status`
pub async fn update_status_handler(
    State(state): State<NucleusState>,
    Path(id): Path<String>,
    JsonBody(fields): JsonBody<Map<String, Value>>,
) -> ServiceResult<Json<ServerStatusResponse>> {
    let record = state.registry.update_status(&id, fields)?;
    log_server_event(ServerEvent::Heartbeat, &record.id, record.name());

    Ok(Json(ServerStatusResponse {
        success: true,
        server: record.to_public_json(),
    }))
}

/// `DELETE /api/servers/:id`
pub async fn unregister_server_handler(
    State(state): State<NucleusState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<MessageResponse>> {
    let record = state.registry.unregister(&id)?;
    log_server_event(ServerEvent::Unregistered, &record.id, record.name());

    Ok(Json(MessageResponse {
        success: true,
        message: "Server unregistered".to_string(),
    }))
}

/// `GET /health`
pub async fn nucleus_health_handler(
    State(state): State<NucleusState>,
) -> ServiceResult<Json<NucleusHealth>> {
    Ok(Json(NucleusHealth {
        status: "ok".to_string(),
        service: NUCLEUS_SERVICE_NAME.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        registered_servers: state.registry.len()?,
    }))
}
