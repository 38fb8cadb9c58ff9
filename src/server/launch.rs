//! Service selection and startup for the `ggmp_server` binary.
//!
//! ```text
//! ggmp_server              # all three services
//! ggmp_server keymaster
//! ggmp_server nucleus
//! ggmp_server policy
//! ```
//!
//! Each service listens on its own port and owns its own state; running them
//! in one process shares nothing but the runtime.

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::GgmpConfig;
use crate::errors::{ServiceError, ServiceResult};
use crate::server::keymaster::{Keymaster, KeymasterState, KEYMASTER_SERVICE_NAME};
use crate::server::nucleus::{NucleusState, NUCLEUS_SERVICE_NAME};
use crate::server::policy::{PolicyState, PolicyStore, POLICY_SERVICE_NAME};
use crate::server::registry::ServerRegistry;
use crate::server::routes::{build_keymaster_router, build_nucleus_router, build_policy_router};

/// Which services a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceSelection {
    Keymaster,
    Nucleus,
    Policy,
    All,
}

impl ServiceSelection {
    pub fn runs_keymaster(self) -> bool {
        matches!(self, ServiceSelection::Keymaster | ServiceSelection::All)
    }

    pub fn runs_nucleus(self) -> bool {
        matches!(self, ServiceSelection::Nucleus | ServiceSelection::All)
    }

    pub fn runs_policy(self) -> bool {
        matches!(self, ServiceSelection::Policy | ServiceSelection::All)
    }
}

/// Parse the service argument. `args[0]` is the program name.
pub fn parse_service_command(args: &[String]) -> ServiceResult<ServiceSelection> {
    if args.len() < 2 {
        return Ok(ServiceSelection::All);
    }

    match args[1].to_lowercase().as_str() {
        "keymaster" => Ok(ServiceSelection::Keymaster),
        "nucleus" => Ok(ServiceSelection::Nucleus),
        "policy" => Ok(ServiceSelection::Policy),
        "all" => Ok(ServiceSelection::All),
        other => Err(ServiceError::InvalidParameter(format!(
            "unknown service '{other}', expected keymaster, nucleus, policy or all"
        ))),
    }
}

/// Resolves when the process receives Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}

/// Bind `host:port` and serve `router` until shutdown.
pub async fn serve(name: &'static str, host: String, port: u16, router: Router) -> ServiceResult<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServiceError::Internal(format!("{name}: failed to bind {addr}: {e}")))?;

    info!("{} listening on {}", name, addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::Internal(format!("{name}: server error: {e}")))?;

    info!("{} stopped", name);
    Ok(())
}

/// Build and run the selected services until shutdown or the first failure.
pub async fn run(selection: ServiceSelection, config: &GgmpConfig) -> ServiceResult<()> {
    let mut tasks = JoinSet::new();

    if selection.runs_keymaster() {
        let keymaster = Keymaster::from_config(&config.keymaster)?;
        info!(
            "Loaded {} license keys from {}",
            keymaster.active_keys()?,
            keymaster.store().path().display()
        );
        let router = build_keymaster_router(KeymasterState::new(keymaster));
        tasks.spawn(serve(
            KEYMASTER_SERVICE_NAME,
            config.keymaster.host.clone(),
            config.keymaster.port,
            router,
        ));
    }

    #[cfg(feature = "background-jobs")]
    let mut scheduler = None;

    if selection.runs_nucleus() {
        let registry = Arc::new(ServerRegistry::new(config.nucleus.host_suffix.clone()));

        #[cfg(feature = "background-jobs")]
        if config.nucleus.stale_cleanup_enabled {
            let jobs = crate::jobs::JobScheduler::new(
                Arc::clone(&registry),
                crate::jobs::JobConfig::from(&config.nucleus),
            )
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
            jobs.start()
                .await
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            scheduler = Some(jobs);
        }

        let router = build_nucleus_router(NucleusState::new(registry));
        tasks.spawn(serve(
            NUCLEUS_SERVICE_NAME,
            config.nucleus.host.clone(),
            config.nucleus.port,
            router,
        ));
    }

    if selection.runs_policy() {
        let router = build_policy_router(PolicyState::new(PolicyStore::default()));
        tasks.spawn(serve(
            POLICY_SERVICE_NAME,
            config.policy.host.clone(),
            config.policy.port,
            router,
        ));
    }

    let mut result = Ok(());
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .map_err(|e| ServiceError::Internal(format!("service task failed: {e}")))
            .and_then(|r| r);
        if let Err(e) = outcome {
            error!("{}", e);
            tasks.abort_all();
            result = Err(e);
            break;
        }
    }

    #[cfg(feature = "background-jobs")]
    if let Some(mut jobs) = scheduler {
        if let Err(e) = jobs.shutdown().await {
            tracing::warn!("Job scheduler did not shut down cleanly: {}", e);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_argument_runs_everything() {
        assert_eq!(
            parse_service_command(&args(&["ggmp_server"])).unwrap(),
            ServiceSelection::All
        );
    }

    #[test]
    fn single_service_selection() {
        let selection = parse_service_command(&args(&["ggmp_server", "nucleus"])).unwrap();
        assert_eq!(selection, ServiceSelection::Nucleus);
        assert!(selection.runs_nucleus());
        assert!(!selection.runs_keymaster());
        assert!(!selection.runs_policy());

        assert_eq!(
            parse_service_command(&args(&["ggmp_server", "Keymaster"])).unwrap(),
            ServiceSelection::Keymaster
        );
    }

    #[test]
    fn unknown_service_is_rejected() {
        let err = parse_service_command(&args(&["ggmp_server", "matchmaker"])).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParameter(_)));
    }
}
