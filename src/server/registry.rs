//! In-memory registry of running game servers.
//!
//! Servers register once, then heartbeat through status updates that merge
//! arbitrary fields into their record and refresh `lastSeen`. Nothing is
//! persisted; a restart forgets every server.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::{ServiceError, ServiceResult};
use crate::license_key::DEFAULT_MAX_PLAYERS;

/// Fields owned by the registry. Caller-supplied values for these are dropped.
pub const RESERVED_FIELDS: [&str; 5] = ["id", "host", "rpToken", "registeredAt", "lastSeen"];

/// Generate the one-time `rpToken`: 32 random bytes, hex encoded.
pub fn generate_rp_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// JavaScript-style truthiness, used for `players`/`maxPlayers` fallbacks.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn strip_reserved(mut fields: Map<String, Value>) -> Map<String, Value> {
    for name in RESERVED_FIELDS {
        fields.remove(name);
    }
    fields
}

/// A registered game server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord {
    pub id: String,
    pub host: String,
    /// Secret handed out once at registration.
    pub rp_token: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Everything else the server told us about itself (`name`, `players`, ...).
    pub fields: Map<String, Value>,
}

impl ServerRecord {
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// The record as JSON, without `rpToken`.
    pub fn to_public_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.clone());
        }
        out.insert(
            "registeredAt".into(),
            serde_json::to_value(self.registered_at).unwrap_or(Value::Null),
        );
        out.insert(
            "lastSeen".into(),
            serde_json::to_value(self.last_seen).unwrap_or(Value::Null),
        );
        out.insert("host".into(), Value::String(self.host.clone()));
        Value::Object(out)
    }

    /// Project onto the public listing fields.
    pub fn summary(&self) -> ServerSummary {
        let field_or = |name: &str, default: Value| {
            self.fields
                .get(name)
                .filter(|v| is_truthy(v))
                .cloned()
                .unwrap_or(default)
        };

        ServerSummary {
            id: self.id.clone(),
            name: self.fields.get("name").cloned(),
            host: self.host.clone(),
            players: field_or("players", Value::from(0)),
            max_players: field_or("maxPlayers", Value::from(DEFAULT_MAX_PLAYERS)),
            registered_at: self.registered_at,
            last_seen: self.last_seen,
        }
    }
}

/// Public view of a server, as listed by `GET /api/servers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    pub host: String,
    pub players: Value,
    pub max_players: Value,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// What a server receives back from registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub id: String,
    pub host: String,
    pub rp_token: String,
}

/// Mapping from server id to [`ServerRecord`], in registration order.
#[derive(Debug)]
pub struct ServerRegistry {
    host_suffix: String,
    servers: Mutex<IndexMap<String, ServerRecord>>,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new("ggmp.local")
    }
}

impl ServerRegistry {
    /// `host_suffix` forms each server's host as `{id}.{host_suffix}`.
    pub fn new(host_suffix: impl Into<String>) -> Self {
        Self {
            host_suffix: host_suffix.into(),
            servers: Mutex::new(IndexMap::new()),
        }
    }

    fn lock(&self) -> ServiceResult<MutexGuard<'_, IndexMap<String, ServerRecord>>> {
        self.servers
            .lock()
            .map_err(|_| ServiceError::Internal("failed to acquire registry lock".into()))
    }

    /// Register a server with the given descriptive fields.
    ///
    /// Always succeeds with a fresh id; reserved fields in `fields` are ignored.
    pub fn register(&self, fields: Map<String, Value>) -> ServiceResult<Registration> {
        let mut servers = self.lock()?;

        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !servers.contains_key(&candidate) {
                break candidate;
            }
        };

        let now = Utc::now();
        let record = ServerRecord {
            id: id.clone(),
            host: format!("{}.{}", id, self.host_suffix),
            rp_token: generate_rp_token(),
            registered_at: now,
            last_seen: now,
            fields: strip_reserved(fields),
        };

        let registration = Registration {
            id: record.id.clone(),
            host: record.host.clone(),
            rp_token: record.rp_token.clone(),
        };
        servers.insert(id, record);

        Ok(registration)
    }

    /// Shallow-merge `fields` into the record and refresh `lastSeen`.
    ///
    /// Fields are only ever added or overwritten, never removed.
    pub fn update_status(&self, id: &str, fields: Map<String, Value>) -> ServiceResult<ServerRecord> {
        self.update_status_at(id, fields, Utc::now())
    }

    pub fn update_status_at(
        &self,
        id: &str,
        fields: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> ServiceResult<ServerRecord> {
        let mut servers = self.lock()?;
        let record = servers.get_mut(id).ok_or(ServiceError::ServerNotFound)?;

        for (k, v) in strip_reserved(fields) {
            record.fields.insert(k, v);
        }
        record.last_seen = now;

        Ok(record.clone())
    }

    /// Remove a server, returning its final record.
    pub fn unregister(&self, id: &str) -> ServiceResult<ServerRecord> {
        self.lock()?
            .shift_remove(id)
            .ok_or(ServiceError::ServerNotFound)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Option<ServerRecord>> {
        Ok(self.lock()?.get(id).cloned())
    }

    /// Public summaries of every server.
    pub fn list(&self) -> ServiceResult<Vec<ServerSummary>> {
        Ok(self.lock()?.values().map(ServerRecord::summary).collect())
    }

    pub fn len(&self) -> ServiceResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> ServiceResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every server whose `lastSeen` is before `threshold`.
    pub fn evict_stale(&self, threshold: DateTime<Utc>) -> ServiceResult<Vec<ServerRecord>> {
        let mut servers = self.lock()?;
        let mut evicted = Vec::new();
        servers.retain(|_, record| {
            if record.last_seen < threshold {
                evicted.push(record.clone());
                false
            } else {
                true
            }
        });
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn register_derives_host_and_token() {
        let registry = ServerRegistry::default();
        let reg = registry.register(fields(json!({"name": "Test"}))).unwrap();

        assert_eq!(reg.id.len(), 36);
        assert!(Uuid::parse_str(&reg.id).is_ok());
        assert_eq!(reg.host, format!("{}.ggmp.local", reg.id));
        assert_eq!(reg.rp_token.len(), 64);
        assert!(reg.rp_token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_are_unique() {
        let registry = ServerRegistry::default();
        let a = registry.register(Map::new()).unwrap();
        let b = registry.register(Map::new()).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.rp_token, b.rp_token);
        assert_eq!(registry.len().unwrap(), 2);
    }

    #[test]
    fn reserved_fields_cannot_be_overwritten() {
        let registry = ServerRegistry::default();
        let reg = registry
            .register(fields(json!({"id": "spoofed", "rpToken": "x", "name": "A"})))
            .unwrap();
        let record = registry.get(&reg.id).unwrap().unwrap();
        assert_eq!(record.id, reg.id);
        assert!(!record.fields.contains_key("id"));
        assert!(!record.fields.contains_key("rpToken"));

        let updated = registry
            .update_status(&reg.id, fields(json!({"host": "evil.example", "players": 3})))
            .unwrap();
        assert_eq!(updated.host, reg.host);
        assert_eq!(updated.fields["players"], 3);
    }

    #[test]
    fn update_merges_and_refreshes_last_seen() {
        let registry = ServerRegistry::default();
        let reg = registry.register(fields(json!({"name": "Test"}))).unwrap();
        let later = Utc::now() + chrono::Duration::seconds(30);

        let updated = registry
            .update_status_at(&reg.id, fields(json!({"players": 5})), later)
            .unwrap();
        assert_eq!(updated.last_seen, later);
        assert_eq!(updated.fields["name"], "Test");
        assert_eq!(updated.fields["players"], 5);
    }

    #[test]
    fn unknown_server_is_not_found() {
        let registry = ServerRegistry::default();
        assert!(matches!(
            registry.update_status("missing", Map::new()),
            Err(ServiceError::ServerNotFound)
        ));
        assert!(matches!(
            registry.unregister("missing"),
            Err(ServiceError::ServerNotFound)
        ));
    }

    #[test]
    fn summary_applies_defaults_and_hides_token() {
        let registry = ServerRegistry::default();
        let reg = registry.register(Map::new()).unwrap();
        let summary = &registry.list().unwrap()[0];

        assert_eq!(summary.players, json!(0));
        assert_eq!(summary.max_players, json!(2048));
        assert!(summary.name.is_none());

        let json = serde_json::to_value(summary).unwrap();
        assert!(json.get("rpToken").is_none());
        assert_eq!(json["host"], reg.host);

        let record = registry.get(&reg.id).unwrap().unwrap();
        assert!(record.to_public_json().get("rpToken").is_none());
    }

    #[test]
    fn evict_stale_removes_only_old_servers() {
        let registry = ServerRegistry::default();
        let old = registry.register(Map::new()).unwrap();
        let fresh = registry.register(Map::new()).unwrap();
        let future = Utc::now() + chrono::Duration::minutes(10);
        registry
            .update_status_at(&fresh.id, Map::new(), future)
            .unwrap();

        let evicted = registry
            .evict_stale(Utc::now() + chrono::Duration::minutes(5))
            .unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, old.id);
        assert!(registry.get(&fresh.id).unwrap().is_some());
    }

    #[test]
    fn truthiness_matches_fallback_rules() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
        assert!(is_truthy(&json!(10)));
        assert!(is_truthy(&json!("10")));
    }
}
