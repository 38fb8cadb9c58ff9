//! Background job scheduler for the nucleus service.
//!
//! Requires the `background-jobs` feature to be enabled.
//!
//! # Available Jobs
//!
//! - **Stale Server Cleanup**: Evicts registered game servers that have not
//!   sent a status update within the configured timeout
//!
//! # Usage
//!
//! ```rust,ignore
//! use ggmp::jobs::{JobConfig, JobScheduler};
//!
//! let registry = Arc::new(ServerRegistry::default());
//! let scheduler = JobScheduler::new(registry, JobConfig::default()).await?;
//! scheduler.start().await?;
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler as TokioJobScheduler};
use tracing::{error, info};

use crate::config::NucleusConfig;
use crate::server::registry::ServerRegistry;

mod stale_servers;

pub use stale_servers::run_stale_server_cleanup;

/// Configuration for background jobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Whether stale server cleanup is enabled (default: true)
    pub stale_cleanup_enabled: bool,
    /// Cron expression for the sweep (default: every minute)
    pub stale_sweep_cron: String,
    /// Seconds without a status update before a server is evicted (default: 300)
    pub stale_timeout_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            stale_cleanup_enabled: true,
            stale_sweep_cron: "0 * * * * *".to_string(),
            stale_timeout_secs: 300,
        }
    }
}

impl From<&NucleusConfig> for JobConfig {
    fn from(config: &NucleusConfig) -> Self {
        Self {
            stale_cleanup_enabled: config.stale_cleanup_enabled,
            stale_sweep_cron: config.stale_sweep_cron.clone(),
            stale_timeout_secs: config.stale_timeout_secs,
        }
    }
}

/// Background job scheduler.
pub struct JobScheduler {
    scheduler: TokioJobScheduler,
    registry: Arc<ServerRegistry>,
    config: JobConfig,
}

impl JobScheduler {
    pub async fn new(registry: Arc<ServerRegistry>, config: JobConfig) -> Result<Self, JobError> {
        let scheduler = TokioJobScheduler::new()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        Ok(Self {
            scheduler,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Start the job scheduler with all configured jobs.
    pub async fn start(&self) -> Result<(), JobError> {
        info!("Starting GGMP job scheduler");

        if self.config.stale_cleanup_enabled {
            self.add_stale_server_job().await?;
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!("GGMP job scheduler started successfully");

        Ok(())
    }

    /// Stop the job scheduler.
    pub async fn shutdown(&mut self) -> Result<(), JobError> {
        info!("Shutting down GGMP job scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;
        Ok(())
    }

    async fn add_stale_server_job(&self) -> Result<(), JobError> {
        let registry = Arc::clone(&self.registry);
        let timeout_secs = self.config.stale_timeout_secs;

        let job = Job::new_async(self.config.stale_sweep_cron.as_str(), move |_uuid, _l| {
            let registry = Arc::clone(&registry);
            Box::pin(async move {
                info!("Running stale server cleanup at {}", Utc::now());

                match run_stale_server_cleanup(&registry, timeout_secs) {
                    Ok(count) => {
                        if count > 0 {
                            info!("Stale server cleanup: {} servers evicted", count);
                        }
                    }
                    Err(e) => {
                        error!("Stale server cleanup failed: {}", e);
                    }
                }
            })
        })
        .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!(
            "Added stale server cleanup job (schedule: {}, timeout: {}s)",
            self.config.stale_sweep_cron, self.config.stale_timeout_secs
        );

        Ok(())
    }

    /// Run the stale server cleanup immediately.
    pub fn run_stale_server_cleanup_now(&self) -> Result<u32, JobError> {
        run_stale_server_cleanup(&self.registry, self.config.stale_timeout_secs)
    }
}

/// Errors that can occur in the job scheduler.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Job execution error: {0}")]
    ExecutionError(String),
}

impl From<crate::errors::ServiceError> for JobError {
    fn from(err: crate::errors::ServiceError) -> Self {
        JobError::RegistryError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = JobConfig::default();
        assert!(config.stale_cleanup_enabled);
        assert_eq!(config.stale_sweep_cron, "0 * * * * *");
        assert_eq!(config.stale_timeout_secs, 300);
    }

    #[test]
    fn config_follows_nucleus_settings() {
        let nucleus = NucleusConfig {
            stale_cleanup_enabled: false,
            stale_timeout_secs: 42,
            ..NucleusConfig::default()
        };
        let config = JobConfig::from(&nucleus);
        assert!(!config.stale_cleanup_enabled);
        assert_eq!(config.stale_timeout_secs, 42);
    }
}
