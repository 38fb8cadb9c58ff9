//! HTTP services of the GGMP mock platform.
//!
//! This module contains:
//! - `keymaster`  → license key validation, registration and revocation
//! - `key_store`  → file-backed key storage
//! - `usage`      → per-key validation history
//! - `nucleus`    → game-server registration handlers
//! - `registry`   → in-memory server registry
//! - `policy`     → platform policy document
//! - `routes`     → router builders, one per service
//! - `launch`     → service selection and startup
//! - `api_error`, `extractors`, `logging` → shared HTTP plumbing

pub mod api_error;
pub mod extractors;
pub mod key_store;
pub mod keymaster;
pub mod launch;
pub mod logging;
pub mod nucleus;
pub mod policy;
pub mod registry;
pub mod routes;
pub mod usage;

pub use api_error::ErrorResponse;
pub use key_store::{KeyStore, LicenseKey};
pub use keymaster::{Keymaster, KeymasterState};
pub use launch::{parse_service_command, run, ServiceSelection};
pub use nucleus::NucleusState;
pub use policy::{default_policy, PolicyState, PolicyStore};
pub use registry::{ServerRecord, ServerRegistry, ServerSummary};
pub use routes::{build_keymaster_router, build_nucleus_router, build_policy_router};
pub use usage::{RetentionPolicy, UsageRecord, UsageTracker};
