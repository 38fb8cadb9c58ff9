//! Stale server cleanup job.
//!
//! Game servers that stop sending status updates are never unregistered by
//! themselves. This job evicts every server whose `lastSeen` is older than
//! the configured timeout.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::server::logging::{log_server_event, ServerEvent};
use crate::server::registry::ServerRegistry;

use super::JobError;

/// Evict servers not seen for `timeout_secs` seconds.
///
/// Returns the number of servers removed.
pub fn run_stale_server_cleanup(
    registry: &ServerRegistry,
    timeout_secs: u64,
) -> Result<u32, JobError> {
    let now = Utc::now();
    let threshold = i64::try_from(timeout_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|timeout| now.checked_sub_signed(timeout));

    // A timeout reaching before the earliest representable time evicts nothing.
    let Some(threshold) = threshold else {
        debug!("Stale timeout of {}s is out of range, nothing to evict", timeout_secs);
        return Ok(0);
    };

    debug!(
        "Checking for stale servers (last seen before {}) at {}",
        threshold, now
    );

    let evicted = registry.evict_stale(threshold)?;
    for record in &evicted {
        log_server_event(ServerEvent::Evicted, &record.id, record.name());
        info!(
            "Server {} evicted, last seen {}",
            record.id, record.last_seen
        );
    }

    Ok(evicted.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn fresh_servers_survive() {
        let registry = ServerRegistry::default();
        registry.register(Map::new()).unwrap();
        assert_eq!(run_stale_server_cleanup(&registry, 300).unwrap(), 0);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn silent_servers_are_evicted() {
        let registry = ServerRegistry::default();
        let reg = registry.register(Map::new()).unwrap();
        let past = Utc::now() - Duration::seconds(600);
        registry.update_status_at(&reg.id, Map::new(), past).unwrap();

        assert_eq!(run_stale_server_cleanup(&registry, 300).unwrap(), 1);
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn huge_timeout_evicts_nothing() {
        let registry = ServerRegistry::default();
        registry.register(Map::new()).unwrap();
        for secs in [10_000_000_000_000, u64::MAX] {
            assert_eq!(run_stale_server_cleanup(&registry, secs).unwrap(), 0);
        }
        assert_eq!(registry.len().unwrap(), 1);
    }
}
