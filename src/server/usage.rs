//! In-memory log of successful validations, per license key.
//!
//! Nothing here is persisted; a restart starts every log empty. Growth is
//! bounded by a [`RetentionPolicy`]: a per-key record cap (oldest dropped
//! first) and an age window. Either bound may be disabled.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::KeymasterConfig;
use crate::errors::{ServiceError, ServiceResult};

/// One successful validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    /// Whatever the game server reported as its endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Bounds on the usage log. `None` disables a bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_records: Option<usize>,
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    /// No bounds at all.
    pub fn unbounded() -> Self {
        Self::default()
    }
}

impl From<&KeymasterConfig> for RetentionPolicy {
    fn from(config: &KeymasterConfig) -> Self {
        Self {
            max_records: (config.usage_max_records > 0).then_some(config.usage_max_records),
            // A window too large to represent keeps every record.
            max_age: (config.usage_max_age_secs > 0)
                .then(|| i64::try_from(config.usage_max_age_secs).ok())
                .flatten()
                .and_then(Duration::try_seconds),
        }
    }
}

#[derive(Debug, Default)]
pub struct UsageTracker {
    policy: RetentionPolicy,
    logs: Mutex<HashMap<String, VecDeque<UsageRecord>>>,
}

impl UsageTracker {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    fn lock(&self) -> ServiceResult<MutexGuard<'_, HashMap<String, VecDeque<UsageRecord>>>> {
        self.logs
            .lock()
            .map_err(|_| ServiceError::Internal("failed to acquire usage lock".into()))
    }

    fn prune(&self, log: &mut VecDeque<UsageRecord>, now: DateTime<Utc>) {
        if let Some(cutoff) = self
            .policy
            .max_age
            .and_then(|max_age| now.checked_sub_signed(max_age))
        {
            while log.front().is_some_and(|r| r.timestamp < cutoff) {
                log.pop_front();
            }
        }
        if let Some(max) = self.policy.max_records {
            while log.len() > max {
                log.pop_front();
            }
        }
    }

    /// Append a usage event for `key` stamped with the current time.
    pub fn record(&self, key: &str, endpoint: Option<String>) -> ServiceResult<()> {
        self.record_at(key, endpoint, Utc::now())
    }

    /// Append a usage event with an explicit timestamp.
    pub fn record_at(
        &self,
        key: &str,
        endpoint: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let mut logs = self.lock()?;
        let log = logs.entry(key.to_string()).or_default();
        log.push_back(UsageRecord {
            timestamp,
            endpoint,
        });
        self.prune(log, timestamp);
        Ok(())
    }

    /// Usage events for `key`, oldest first. Empty if there are none.
    pub fn list(&self, key: &str) -> ServiceResult<Vec<UsageRecord>> {
        self.list_at(key, Utc::now())
    }

    pub fn list_at(&self, key: &str, now: DateTime<Utc>) -> ServiceResult<Vec<UsageRecord>> {
        let mut logs = self.lock()?;
        match logs.get_mut(key) {
            Some(log) => {
                self.prune(log, now);
                Ok(log.iter().cloned().collect())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Drop the whole log for `key`.
    pub fn clear(&self, key: &str) -> ServiceResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_has_empty_log() {
        let tracker = UsageTracker::new(RetentionPolicy::unbounded());
        assert!(tracker.list("nope").unwrap().is_empty());
    }

    #[test]
    fn records_accumulate_in_order() {
        let tracker = UsageTracker::new(RetentionPolicy::unbounded());
        tracker.record("K", Some("a:30120".into())).unwrap();
        tracker.record("K", Some("b:30120".into())).unwrap();
        tracker.record("K", None).unwrap();

        let log = tracker.list("K").unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].endpoint.as_deref(), Some("a:30120"));
        assert_eq!(log[2].endpoint, None);
    }

    #[test]
    fn record_cap_drops_oldest() {
        let tracker = UsageTracker::new(RetentionPolicy {
            max_records: Some(2),
            max_age: None,
        });
        for endpoint in ["first", "second", "third"] {
            tracker.record("K", Some(endpoint.into())).unwrap();
        }

        let log = tracker.list("K").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].endpoint.as_deref(), Some("second"));
        assert_eq!(log[1].endpoint.as_deref(), Some("third"));
    }

    #[test]
    fn age_window_drops_old_records() {
        let tracker = UsageTracker::new(RetentionPolicy {
            max_records: None,
            max_age: Some(Duration::minutes(10)),
        });
        let now = Utc::now();
        tracker
            .record_at("K", Some("old".into()), now - Duration::minutes(30))
            .unwrap();
        tracker.record_at("K", Some("new".into()), now).unwrap();

        let log = tracker.list_at("K", now).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].endpoint.as_deref(), Some("new"));

        let later = tracker.list_at("K", now + Duration::minutes(11)).unwrap();
        assert!(later.is_empty());
    }

    #[test]
    fn clear_removes_log() {
        let tracker = UsageTracker::new(RetentionPolicy::unbounded());
        tracker.record("K", None).unwrap();
        tracker.clear("K").unwrap();
        assert!(tracker.list("K").unwrap().is_empty());
    }

    #[test]
    fn policy_from_config_treats_zero_as_unbounded() {
        let config = KeymasterConfig::default();
        assert_eq!(RetentionPolicy::from(&config), RetentionPolicy::unbounded());

        let config = KeymasterConfig {
            usage_max_records: 100,
            usage_max_age_secs: 3600,
            ..KeymasterConfig::default()
        };
        let policy = RetentionPolicy::from(&config);
        assert_eq!(policy.max_records, Some(100));
        assert_eq!(policy.max_age, Some(Duration::hours(1)));
    }

    #[test]
    fn oversized_age_window_keeps_everything() {
        for secs in [10_000_000_000_000, 10_000_000_000_000_000, u64::MAX] {
            let config = KeymasterConfig {
                usage_max_age_secs: secs,
                ..KeymasterConfig::default()
            };
            let tracker = UsageTracker::new(RetentionPolicy::from(&config));
            let now = Utc::now();
            tracker
                .record_at("K", Some("old".into()), now - Duration::days(3650))
                .unwrap();
            tracker.record("K", Some("new".into())).unwrap();

            assert_eq!(tracker.list("K").unwrap().len(), 2, "window {secs}");
        }
    }
}
