//! License key generation and the key-file document.
//!
//! GGMP license keys are human-readable tokens in the format
//! `GGMP-XXXX-XXXX-XXXX-XXXX-XXXX`, each segment four upper-case hex digits.
//! The keymaster itself treats keys as opaque strings; the format only matters
//! to the generator and to operators eyeballing a key.
//!
//! # Example
//!
//! ```rust
//! use ggmp::license_key::{generate_license_key, validate_license_key_format};
//!
//! let key = generate_license_key();
//! assert!(validate_license_key_format(&key));
//! ```

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix of every generated key.
pub const LICENSE_KEY_PREFIX: &str = "GGMP";

/// Player ceiling of the platform, used when a key does not specify one.
pub const DEFAULT_MAX_PLAYERS: u32 = 2048;

/// Display label used when a key is registered without a server name.
pub const DEFAULT_SERVER_NAME: &str = "GGMP Server";

/// Key type reported to game servers on validation.
pub const KEY_TYPE: &str = "GGMP_LOCAL";

/// Version stamped into generated key files.
pub const GENERATOR_VERSION: &str = "1.0.0";

const SEGMENTS: usize = 5;

fn enabled() -> bool {
    true
}

/// Capability flags carried by a license key.
///
/// Every flag defaults to `true`, both when the whole object is missing and
/// when an individual flag is left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    #[serde(default = "enabled")]
    pub custom_auth: bool,
    #[serde(default = "enabled")]
    pub enhanced_streaming: bool,
    #[serde(default = "enabled")]
    pub unlimited_players: bool,
    #[serde(default = "enabled")]
    pub premium_perks: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            custom_auth: true,
            enhanced_streaming: true,
            unlimited_players: true,
            premium_perks: true,
        }
    }
}

/// Generate a license key from 20 bytes of OS randomness.
///
/// Each of the five segments is the first two bytes of a four-byte chunk,
/// rendered as upper-case hex.
pub fn generate_license_key() -> String {
    let mut bytes = [0u8; SEGMENTS * 4];
    rand::rng().fill(&mut bytes);

    let segments: Vec<String> = bytes
        .chunks(4)
        .map(|chunk| hex::encode_upper(&chunk[..2]))
        .collect();

    format!("{}-{}", LICENSE_KEY_PREFIX, segments.join("-"))
}

fn key_regex() -> &'static Regex {
    static KEY_REGEX: OnceLock<Regex> = OnceLock::new();
    KEY_REGEX.get_or_init(|| {
        Regex::new(r"^GGMP(-[0-9A-F]{4}){5}$").expect("license key pattern is valid")
    })
}

/// Check that a key has the `GGMP-XXXX-XXXX-XXXX-XXXX-XXXX` shape.
pub fn validate_license_key_format(key: &str) -> bool {
    key_regex().is_match(key)
}

/// Body of `POST /api/register-key`. Unset fields take the keymaster defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterKeyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Features>,
    /// ISO 8601 timestamp or bare date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// One entry of a generated key file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedKey {
    pub key: String,
    pub id: usize,
    pub server_name: String,
    pub generated: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_players: u32,
    pub features: Features,
    #[serde(rename = "type")]
    pub key_type: String,
    pub version: String,
}

/// Document written by `ggmp_keygen`.
///
/// Its `keys` array can be loaded directly by the keymaster key store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFile {
    pub generator: String,
    pub version: String,
    pub generated: DateTime<Utc>,
    pub server_name: String,
    pub total_keys: usize,
    pub keys: Vec<GeneratedKey>,
}

impl KeyFile {
    /// Generate `count` fresh keys labelled with `server_name`.
    pub fn generate(count: usize, server_name: &str) -> Self {
        let now = Utc::now();
        let keys: Vec<GeneratedKey> = (0..count)
            .map(|index| GeneratedKey {
                key: generate_license_key(),
                id: index + 1,
                server_name: server_name.to_string(),
                generated: now,
                expires_at: None,
                max_players: DEFAULT_MAX_PLAYERS,
                features: Features::default(),
                key_type: KEY_TYPE.to_string(),
                version: GENERATOR_VERSION.to_string(),
            })
            .collect();

        Self {
            generator: "GGMP Keymaster Generator".to_string(),
            version: GENERATOR_VERSION.to_string(),
            generated: now,
            server_name: server_name.to_string(),
            total_keys: keys.len(),
            keys,
        }
    }
}
