//! GGMP mock platform services.
//!
//! Three small HTTP services that stand in for the hosted GGMP platform on a
//! private deployment:
//!
//! - **Keymaster** validates and manages license keys, persisted to a JSON file
//! - **Nucleus** keeps a registry of running game servers
//! - **Policy** serves the platform policy document
//!
//! # Features
//!
//! - `server` - HTTP services and the `ggmp_server` binary. Enabled by default.
//! - `background-jobs` - Scheduled eviction of stale game servers. Enabled by default.
//!
//! Without default features only the key format, key file generation and the
//! dashboard client are built.

pub mod client;
pub mod config;
pub mod errors;
pub mod license_key;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "background-jobs")]
pub mod jobs;
