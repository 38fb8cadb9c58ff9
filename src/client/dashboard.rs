//! Client for the admin dashboard.
//!
//! Polls the three services and folds their answers into a [`DashboardSummary`].
//! A service that cannot be reached is reported offline and contributes zero
//! to the totals instead of failing the whole summary.
//!
//! Key management (register, revoke) goes to the keymaster directly; its
//! `{success: false, error}` answers come back as the matching [`ServiceError`].

use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::{ServiceError, ServiceResult};
use crate::license_key::RegisterKeyRequest;

/// `GET /api/keys` as seen by the dashboard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysPage {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub keys: Vec<Value>,
}

/// `GET /api/servers` as seen by the dashboard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServersPage {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub servers: Vec<Value>,
}

impl ServersPage {
    /// Sum of every numeric `players` field.
    pub fn total_players(&self) -> u64 {
        self.servers
            .iter()
            .filter_map(|s| s.get("players").and_then(Value::as_u64))
            .sum()
    }
}

/// Any service's `/health` body.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Online,
    Offline,
}

impl ServiceStatus {
    fn from_health(health: &ServiceResult<HealthReport>) -> Self {
        match health {
            Ok(report) if report.is_ok() => ServiceStatus::Online,
            _ => ServiceStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatuses {
    pub keymaster: ServiceStatus,
    pub nucleus: ServiceStatus,
    pub policy: ServiceStatus,
}

/// The dashboard's headline numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_servers: usize,
    pub active_keys: usize,
    pub total_players: u64,
    pub services: ServiceStatuses,
}

/// A keymaster write acknowledgement.
#[derive(Debug, Clone, Deserialize)]
struct Ack {
    #[serde(default)]
    message: String,
    /// The stored record, present on registration.
    #[serde(default)]
    key: Value,
}

/// Body of a failed request.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turn a non-2xx keymaster answer into the error the service reported.
async fn error_from_response(method: &str, url: &str, resp: Response) -> ServiceError {
    let status = resp.status();
    let reported = resp.json::<ErrorBody>().await.ok().map(|body| body.error);

    match (status, reported) {
        (StatusCode::BAD_REQUEST, Some(error)) => ServiceError::InvalidParameter(error),
        (StatusCode::FORBIDDEN, Some(error)) if error == ServiceError::ExpiredKey.to_string() => {
            ServiceError::ExpiredKey
        }
        (StatusCode::FORBIDDEN, Some(_)) => ServiceError::InvalidKey,
        (StatusCode::NOT_FOUND, Some(_)) => ServiceError::KeyNotFound,
        (status, Some(error)) => ServiceError::Network(format!(
            "{method} {url} failed with HTTP status {status}: {error}"
        )),
        (status, None) => {
            ServiceError::Network(format!("{method} {url} failed with HTTP status {status}"))
        }
    }
}

/// Which service a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Keymaster,
    Nucleus,
    Policy,
}

#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: Client,
    keymaster_url: String,
    nucleus_url: String,
    policy_url: String,
}

impl DashboardClient {
    /// Base URLs without a trailing slash, e.g. `http://localhost:3001`.
    pub fn new(
        keymaster_url: impl Into<String>,
        nucleus_url: impl Into<String>,
        policy_url: impl Into<String>,
    ) -> Self {
        let trim = |url: String| url.trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            keymaster_url: trim(keymaster_url.into()),
            nucleus_url: trim(nucleus_url.into()),
            policy_url: trim(policy_url.into()),
        }
    }

    /// Client for services on `localhost` at their default ports.
    pub fn localhost() -> Self {
        Self::new(
            "http://localhost:3001",
            "http://localhost:3003",
            "http://localhost:3002",
        )
    }

    fn base_url(&self, service: Service) -> &str {
        match service {
            Service::Keymaster => &self.keymaster_url,
            Service::Nucleus => &self.nucleus_url,
            Service::Policy => &self.policy_url,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> ServiceResult<T> {
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(ServiceError::Network(format!(
                "GET {} failed with HTTP status {}",
                url,
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| ServiceError::Network(format!("Failed to parse response from {url}: {e}")))
    }

    pub async fn fetch_keys(&self) -> ServiceResult<KeysPage> {
        self.get_json(format!("{}/api/keys", self.keymaster_url))
            .await
    }

    pub async fn fetch_servers(&self) -> ServiceResult<ServersPage> {
        self.get_json(format!("{}/api/servers", self.nucleus_url))
            .await
    }

    pub async fn service_health(&self, service: Service) -> ServiceResult<HealthReport> {
        self.get_json(format!("{}/health", self.base_url(service)))
            .await
    }

    /// `POST /api/register-key`. Returns the stored record.
    pub async fn register_key(&self, request: &RegisterKeyRequest) -> ServiceResult<Value> {
        let url = format!("{}/api/register-key", self.keymaster_url);
        let resp = self.http.post(&url).json(request).send().await?;

        if !resp.status().is_success() {
            return Err(error_from_response("POST", &url, resp).await);
        }

        let ack: Ack = resp
            .json()
            .await
            .map_err(|e| ServiceError::Network(format!("Failed to parse response from {url}: {e}")))?;
        Ok(ack.key)
    }

    /// `DELETE /api/keys/:key`. Returns the service's confirmation message.
    pub async fn revoke_key(&self, key: &str) -> ServiceResult<String> {
        if key.is_empty() {
            return Err(ServiceError::MissingParameter("license key"));
        }

        let url = self.key_url(key)?;
        let resp = self.http.delete(url.clone()).send().await?;

        if !resp.status().is_success() {
            return Err(error_from_response("DELETE", url.as_str(), resp).await);
        }

        let ack: Ack = resp
            .json()
            .await
            .map_err(|e| ServiceError::Network(format!("Failed to parse response from {url}: {e}")))?;
        Ok(ack.message)
    }

    /// `{keymaster}/api/keys/{key}` with the key percent-encoded as one segment.
    fn key_url(&self, key: &str) -> ServiceResult<Url> {
        let invalid = |detail: String| {
            ServiceError::InvalidParameter(format!(
                "keymaster url '{}' {detail}",
                self.keymaster_url
            ))
        };

        let mut url = Url::parse(&self.keymaster_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "keys", key]);
        Ok(url)
    }

    /// Gather all dashboard numbers concurrently.
    pub async fn summary(&self) -> DashboardSummary {
        let (keys, servers, keymaster, nucleus, policy) = tokio::join!(
            self.fetch_keys(),
            self.fetch_servers(),
            self.service_health(Service::Keymaster),
            self.service_health(Service::Nucleus),
            self.service_health(Service::Policy),
        );

        let keys = keys.unwrap_or_else(|e| {
            warn!("Could not fetch keys: {}", e);
            KeysPage::default()
        });
        let servers = servers.unwrap_or_else(|e| {
            warn!("Could not fetch servers: {}", e);
            ServersPage::default()
        });

        DashboardSummary {
            total_servers: servers.count,
            active_keys: keys.count,
            total_players: servers.total_players(),
            services: ServiceStatuses {
                keymaster: ServiceStatus::from_health(&keymaster),
                nucleus: ServiceStatus::from_health(&nucleus),
                policy: ServiceStatus::from_health(&policy),
            },
        }
    }
}
