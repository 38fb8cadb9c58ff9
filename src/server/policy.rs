//! Policy service: the platform-wide game policy document.
//!
//! # Endpoints
//!
//! - `GET /` and `GET /api/policy` - Current policy
//! - `POST /api/policy` - Shallow-merge an update into the policy
//! - `GET /pool-size-limits/:game` - Entity pool limits for a game
//! - `GET /health` - Service health
//!
//! The document lives in memory only and resets to [`default_policy`] on restart.

use std::sync::{Arc, RwLock};

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::errors::{ServiceError, ServiceResult};
use crate::server::extractors::JsonBody;

/// Service name reported by `/health`.
pub const POLICY_SERVICE_NAME: &str = "GGMP Policy";

/// The policy served on a fresh start.
pub fn default_policy() -> Map<String, Value> {
    let policy = json!({
        "version": "1.0.0",
        "platform": "GGMP",
        "maxPlayers": 2048,
        "streamingMemory": "18MB",
        "features": {
            "customAuth": true,
            "enhancedStreaming": true,
            "unlimitedPlayers": true,
            "premiumPerks": true,
            "unlimitedClothing": true,
            "unlimitedProps": true
        },
        "limits": {
            "entities": 50000,
            "props": 25000,
            "vehicles": 10000,
            "peds": 5000
        },
        "security": {
            "enforceGameBuild": false,
            "allowOfflineMode": true,
            "requireKeymaster": false
        }
    });

    match policy {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Engine pool sizes that every game starts from before policy limits apply.
fn base_pool_limits() -> Map<String, Value> {
    let mut limits = Map::new();
    for (name, size) in [
        ("CTaskVehicleTempAction", 500),
        ("CVehicleClipRequestData", 300),
        ("CPedPropsMgr", 2048),
        ("CCompEntity", 10000),
        ("CVehicle", 1000),
        ("CPed", 512),
        ("CObject", 5000),
        ("CPickup", 1000),
    ] {
        limits.insert(name.to_string(), Value::from(size));
    }
    limits
}

#[derive(Debug)]
pub struct PolicyStore {
    document: RwLock<Map<String, Value>>,
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(default_policy())
    }
}

impl PolicyStore {
    pub fn new(document: Map<String, Value>) -> Self {
        Self {
            document: RwLock::new(document),
        }
    }

    pub fn current(&self) -> ServiceResult<Map<String, Value>> {
        self.document
            .read()
            .map(|doc| doc.clone())
            .map_err(|_| ServiceError::Internal("failed to acquire policy lock".into()))
    }

    /// Overwrite top-level entries with those in `updates`.
    pub fn merge(&self, updates: Map<String, Value>) -> ServiceResult<Map<String, Value>> {
        let mut doc = self
            .document
            .write()
            .map_err(|_| ServiceError::Internal("failed to acquire policy lock".into()))?;
        for (k, v) in updates {
            doc.insert(k, v);
        }
        Ok(doc.clone())
    }

    /// Base pool table overlaid with the policy's `limits` object.
    pub fn pool_limits(&self) -> ServiceResult<Map<String, Value>> {
        let mut limits = base_pool_limits();
        if let Some(Value::Object(overrides)) = self.current()?.get("limits") {
            for (k, v) in overrides {
                limits.insert(k.clone(), v.clone());
            }
        }
        Ok(limits)
    }

    pub fn version(&self) -> ServiceResult<Value> {
        Ok(self
            .current()?
            .get("version")
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[derive(Clone)]
pub struct PolicyState {
    pub policy: Arc<PolicyStore>,
}

impl PolicyState {
    pub fn new(policy: PolicyStore) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatePolicyResponse {
    pub success: bool,
    pub policy: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PoolSizeLimits {
    pub game: String,
    pub limits: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PolicyHealth {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    pub version: Value,
}

/// `GET /` and `GET /api/policy`
pub async fn get_policy_handler(
    State(state): State<PolicyState>,
) -> ServiceResult<Json<Map<String, Value>>> {
    info!("Policy configuration requested");
    Ok(Json(state.policy.current()?))
}

/// `POST /api/policy`
pub async fn update_policy_handler(
    State(state): State<PolicyState>,
    JsonBody(updates): JsonBody<Map<String, Value>>,
) -> ServiceResult<Json<UpdatePolicyResponse>> {
    let policy = state.policy.merge(updates)?;
    info!("Policy configuration updated");
    Ok(Json(UpdatePolicyResponse {
        success: true,
        policy,
    }))
}

/// `GET /pool-size-limits/:game`
pub async fn pool_size_limits_handler(
    State(state): State<PolicyState>,
    Path(game): Path<String>,
) -> ServiceResult<Json<PoolSizeLimits>> {
    info!(game = %game, "Pool size limits requested");
    Ok(Json(PoolSizeLimits {
        game,
        limits: state.policy.pool_limits()?,
    }))
}

/// `GET /health`
pub async fn policy_health_handler(
    State(state): State<PolicyState>,
) -> ServiceResult<Json<PolicyHealth>> {
    Ok(Json(PolicyHealth {
        status: "ok".to_string(),
        service: POLICY_SERVICE_NAME.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        version: state.policy.version()?,
    }))
}
