//! Keymaster: license key validation and lifecycle.
//!
//! # Endpoints
//!
//! - `POST /api/validate` - Validate a key for a game server
//! - `POST /api/register-key` - Register (or overwrite) a key
//! - `GET /api/keys` - List keys with their usage logs
//! - `DELETE /api/keys/:key` - Revoke a key
//! - `GET /health` - Service health
//!
//! A key is either absent or registered. Registered keys are valid or expired
//! depending on the time of the call; expiry is never stored, and expired keys
//! stay in the store until revoked.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::KeymasterConfig;
use crate::errors::{ServiceError, ServiceResult};
use crate::license_key::{Features, DEFAULT_MAX_PLAYERS, DEFAULT_SERVER_NAME, KEY_TYPE};
pub use crate::license_key::RegisterKeyRequest;
use crate::server::extractors::JsonBody;
pub use crate::server::key_store::parse_expiry;
use crate::server::key_store::{KeyStore, LicenseKey};
use crate::server::logging::{log_key_event, KeyEvent};
use crate::server::usage::{RetentionPolicy, UsageRecord, UsageTracker};

/// Service name reported by `/health`.
pub const KEYMASTER_SERVICE_NAME: &str = "GGMP Keymaster";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /api/validate`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    /// Kept loose so a non-string key fails as an unknown key, not a bad body.
    pub key: Option<Value>,
    pub server_endpoint: Option<String>,
}

impl ValidateRequest {
    /// The key as lookup text. Falsy values (`null`, `false`, `0`, `""`) count
    /// as missing; other non-strings use their JSON text and so never match.
    pub fn key_text(&self) -> Option<String> {
        match self.key.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            other => Some(other.to_string()),
        }
    }
}

/// Successful validation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub success: bool,
    pub key: String,
    pub server_name: String,
    pub max_players: u32,
    pub features: Features,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub key_type: String,
}

impl From<LicenseKey> for ValidateResponse {
    fn from(record: LicenseKey) -> Self {
        Self {
            success: true,
            key: record.key,
            server_name: record.server_name,
            max_players: record.max_players,
            features: record.features,
            expires_at: record.expires_at,
            key_type: KEY_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterKeyResponse {
    pub success: bool,
    pub message: String,
    pub key: LicenseKey,
}

/// A key as listed by `GET /api/keys`, with its usage log attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyListing {
    #[serde(flatten)]
    pub record: LicenseKey,
    pub usage: Vec<UsageRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListKeysResponse {
    pub success: bool,
    pub count: usize,
    pub keys: Vec<KeyListing>,
}

/// Generic `{success, message}` acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeymasterHealth {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    pub active_keys: usize,
}

// ============================================================================
// Service
// ============================================================================

/// License key service over a [`KeyStore`] and a [`UsageTracker`].
#[derive(Debug)]
pub struct Keymaster {
    store: KeyStore,
    usage: UsageTracker,
}

impl Keymaster {
    pub fn new(store: KeyStore, usage: UsageTracker) -> Self {
        Self { store, usage }
    }

    /// Open the key file and build the usage retention policy from config.
    pub fn from_config(config: &KeymasterConfig) -> ServiceResult<Self> {
        let store = KeyStore::load(&config.keys_file)?;
        let usage = UsageTracker::new(RetentionPolicy::from(config));
        Ok(Self::new(store, usage))
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Validate `key` as of now.
    pub fn validate(
        &self,
        key: Option<&str>,
        server_endpoint: Option<String>,
    ) -> ServiceResult<LicenseKey> {
        self.validate_at(key, server_endpoint, Utc::now())
    }

    /// Validate `key` as of `now`, recording a usage event on success.
    ///
    /// Fails with `MissingParameter` when no key is given, `InvalidKey` when it
    /// is not registered, and `ExpiredKey` when its expiry is before `now`.
    pub fn validate_at(
        &self,
        key: Option<&str>,
        server_endpoint: Option<String>,
        now: DateTime<Utc>,
    ) -> ServiceResult<LicenseKey> {
        let key = key
            .filter(|k| !k.is_empty())
            .ok_or(ServiceError::MissingParameter("license key"))?;

        let Some(record) = self.store.get(key)? else {
            log_key_event(KeyEvent::ValidationFailed, key, Some("not registered"));
            return Err(ServiceError::InvalidKey);
        };

        if record.is_expired_at(now) {
            log_key_event(KeyEvent::ValidationFailed, key, Some("expired"));
            return Err(ServiceError::ExpiredKey);
        }

        let details = server_endpoint.clone();
        self.usage.record_at(key, server_endpoint, now)?;
        log_key_event(KeyEvent::Validated, key, details.as_deref());

        Ok(record)
    }

    /// Register `key`, replacing any record already stored under it.
    ///
    /// Re-registering is not an error: the new metadata wins outright and the
    /// `registered` timestamp is reset. Missing fields take the platform
    /// defaults (name `GGMP Server`, 2048 players, every feature enabled,
    /// no expiry).
    pub fn register_key(&self, request: RegisterKeyRequest) -> ServiceResult<LicenseKey> {
        let key = request
            .key
            .filter(|k| !k.is_empty())
            .ok_or(ServiceError::MissingParameter("license key"))?;

        let expires_at = match request.expires_at.as_deref() {
            Some(value) => parse_expiry(value)?,
            None => None,
        };

        let record = LicenseKey {
            key,
            server_name: request
                .server_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()),
            max_players: request
                .max_players
                .filter(|&max| max > 0)
                .unwrap_or(DEFAULT_MAX_PLAYERS),
            features: request.features.unwrap_or_default(),
            expires_at,
            registered: Utc::now(),
        };

        self.store.put(record.clone())?;
        log_key_event(KeyEvent::Registered, &record.key, Some(&record.server_name));

        Ok(record)
    }

    /// Every key with its usage log, in registration order.
    pub fn list_keys(&self) -> ServiceResult<Vec<KeyListing>> {
        self.store
            .list()?
            .into_iter()
            .map(|record| {
                let usage = self.usage.list(&record.key)?;
                Ok(KeyListing { record, usage })
            })
            .collect()
    }

    /// Remove `key` and its usage log.
    pub fn revoke_key(&self, key: &str) -> ServiceResult<()> {
        if !self.store.remove(key)? {
            return Err(ServiceError::KeyNotFound);
        }
        self.usage.clear(key)?;
        log_key_event(KeyEvent::Revoked, key, None);
        Ok(())
    }

    /// Number of registered keys, expired ones included.
    pub fn active_keys(&self) -> ServiceResult<usize> {
        self.store.len()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Shared state of the keymaster router.
#[derive(Clone)]
pub struct KeymasterState {
    pub keymaster: Arc<Keymaster>,
}

impl KeymasterState {
    pub fn new(keymaster: Keymaster) -> Self {
        Self {
            keymaster: Arc::new(keymaster),
        }
    }
}

/// `POST /api/validate`
pub async fn validate_handler(
    State(state): State<KeymasterState>,
    JsonBody(payload): JsonBody<ValidateRequest>,
) -> ServiceResult<Json<ValidateResponse>> {
    let record = state
        .keymaster
        .validate(payload.key_text().as_deref(), payload.server_endpoint)?;
    Ok(Json(record.into()))
}

/// `POST /api/register-key`
///
/// Overwrites any existing key with the same value; see [`Keymaster::register_key`].
pub async fn register_key_handler(
    State(state): State<KeymasterState>,
    JsonBody(payload): JsonBody<RegisterKeyRequest>,
) -> ServiceResult<Json<RegisterKeyResponse>> {
    let record = state.keymaster.register_key(payload)?;
    Ok(Json(RegisterKeyResponse {
        success: true,
        message: "Key registered successfully".to_string(),
        key: record,
    }))
}

/// `GET /api/keys`
pub async fn list_keys_handler(
    State(state): State<KeymasterState>,
) -> ServiceResult<Json<ListKeysResponse>> {
    let keys = state.keymaster.list_keys()?;
    Ok(Json(ListKeysResponse {
        success: true,
        count: keys.len(),
        keys,
    }))
}

/// `DELETE /api/keys/:key`
pub async fn revoke_key_handler(
    State(state): State<KeymasterState>,
    Path(key): Path<String>,
) -> ServiceResult<Json<MessageResponse>> {
    state.keymaster.revoke_key(&key)?;
    Ok(Json(MessageResponse {
        success: true,
        message: "Key revoked successfully".to_string(),
    }))
}

/// `GET /health`
pub async fn keymaster_health_handler(
    State(state): State<KeymasterState>,
) -> ServiceResult<Json<KeymasterHealth>> {
    Ok(Json(KeymasterHealth {
        status: "ok".to_string(),
        service: KEYMASTER_SERVICE_NAME.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        active_keys: state.keymaster.active_keys()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn keymaster() -> (tempfile::TempDir, Keymaster) {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::load(dir.path().join("keys.json")).unwrap();
        let km = Keymaster::new(store, UsageTracker::new(RetentionPolicy::unbounded()));
        (dir, km)
    }

    fn register(km: &Keymaster, key: &str) -> LicenseKey {
        km.register_key(RegisterKeyRequest {
            key: Some(key.to_string()),
            ..RegisterKeyRequest::default()
        })
        .unwrap()
    }

    #[test]
    fn validate_request_key_text() {
        let text = |key: serde_json::Value| {
            serde_json::from_value::<ValidateRequest>(serde_json::json!({ "key": key }))
                .unwrap()
                .key_text()
        };
        assert_eq!(text("K".into()), Some("K".to_string()));
        assert_eq!(text(12345.into()), Some("12345".to_string()));
        assert_eq!(text(true.into()), Some("true".to_string()));
        assert_eq!(text(serde_json::Value::Null), None);
        assert_eq!(text(false.into()), None);
        assert_eq!(text(0.into()), None);
        assert_eq!(ValidateRequest::default().key_text(), None);
    }

    #[test]
    fn parse_expiry_formats() {
        assert!(parse_expiry("2025-12-31T23:59:59Z").unwrap().is_some());
        assert!(parse_expiry("2025-12-31T23:59:59+02:00").unwrap().is_some());
        assert!(parse_expiry("2025-12-31T23:59:59").unwrap().is_some());
        assert_eq!(
            parse_expiry("2025-12-31").unwrap().unwrap().to_rfc3339(),
            "2025-12-31T00:00:00+00:00"
        );
        assert_eq!(parse_expiry("").unwrap(), None);
        assert!(parse_expiry("next tuesday").is_err());
    }

    #[test]
    fn register_applies_defaults() {
        let (_dir, km) = keymaster();
        let record = register(&km, "K1");
        assert_eq!(record.server_name, DEFAULT_SERVER_NAME);
        assert_eq!(record.max_players, DEFAULT_MAX_PLAYERS);
        assert_eq!(record.features, Features::default());
        assert!(record.expires_at.is_none());
    }

    #[test]
    fn register_without_key_fails() {
        let (_dir, km) = keymaster();
        let err = km.register_key(RegisterKeyRequest::default()).unwrap_err();
        assert!(matches!(err, ServiceError::MissingParameter(_)));

        let err = km
            .register_key(RegisterKeyRequest {
                key: Some(String::new()),
                ..RegisterKeyRequest::default()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::MissingParameter(_)));
    }

    #[test]
    fn validate_missing_unknown_and_expired() {
        let (_dir, km) = keymaster();
        assert!(matches!(
            km.validate(None, None),
            Err(ServiceError::MissingParameter(_))
        ));
        assert!(matches!(
            km.validate(Some("UNKNOWN"), None),
            Err(ServiceError::InvalidKey)
        ));

        km.register_key(RegisterKeyRequest {
            key: Some("OLD".into()),
            expires_at: Some("2000-01-01".into()),
            ..RegisterKeyRequest::default()
        })
        .unwrap();
        assert!(matches!(
            km.validate(Some("OLD"), None),
            Err(ServiceError::ExpiredKey)
        ));
    }

    #[test]
    fn expiry_is_evaluated_at_call_time() {
        let (_dir, km) = keymaster();
        let expires = Utc::now() + Duration::hours(1);
        km.register_key(RegisterKeyRequest {
            key: Some("SOON".into()),
            expires_at: Some(expires.to_rfc3339()),
            ..RegisterKeyRequest::default()
        })
        .unwrap();

        assert!(km.validate_at(Some("SOON"), None, Utc::now()).is_ok());
        assert!(matches!(
            km.validate_at(Some("SOON"), None, expires + Duration::seconds(1)),
            Err(ServiceError::ExpiredKey)
        ));
    }

    #[test]
    fn validation_records_usage() {
        let (_dir, km) = keymaster();
        register(&km, "K1");
        km.validate(Some("K1"), Some("10.0.0.1:30120".into())).unwrap();
        km.validate(Some("K1"), Some("10.0.0.2:30120".into())).unwrap();

        let listing = km.list_keys().unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].usage.len(), 2);
        assert_eq!(
            listing[0].usage[1].endpoint.as_deref(),
            Some("10.0.0.2:30120")
        );
    }

    #[test]
    fn failed_validation_records_nothing() {
        let (_dir, km) = keymaster();
        km.register_key(RegisterKeyRequest {
            key: Some("OLD".into()),
            expires_at: Some("2000-01-01".into()),
            ..RegisterKeyRequest::default()
        })
        .unwrap();
        let _ = km.validate(Some("OLD"), Some("x".into()));
        assert!(km.list_keys().unwrap()[0].usage.is_empty());
    }

    #[test]
    fn revoke_removes_key_and_usage() {
        let (_dir, km) = keymaster();
        register(&km, "K1");
        km.validate(Some("K1"), None).unwrap();

        km.revoke_key("K1").unwrap();
        assert!(matches!(
            km.validate(Some("K1"), None),
            Err(ServiceError::InvalidKey)
        ));
        assert!(matches!(km.revoke_key("K1"), Err(ServiceError::KeyNotFound)));

        register(&km, "K1");
        assert!(km.list_keys().unwrap()[0].usage.is_empty());
    }

    #[test]
    fn re_registration_overwrites_metadata() {
        let (_dir, km) = keymaster();
        km.register_key(RegisterKeyRequest {
            key: Some("K1".into()),
            server_name: Some("First".into()),
            max_players: Some(10),
            ..RegisterKeyRequest::default()
        })
        .unwrap();
        km.register_key(RegisterKeyRequest {
            key: Some("K1".into()),
            server_name: Some("Second".into()),
            ..RegisterKeyRequest::default()
        })
        .unwrap();

        let keys = km.list_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].record.server_name, "Second");
        assert_eq!(keys[0].record.max_players, DEFAULT_MAX_PLAYERS);
    }
}
