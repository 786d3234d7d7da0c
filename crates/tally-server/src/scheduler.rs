//! Background polling scheduler
//!
//! Periodically syncs every linked account. Failed accounts are retried with
//! capped exponential backoff; after the final attempt the account is marked
//! sync-failed and left for manual intervention.
//!
//! # Configuration
//!
//! Environment variables:
//! - `TALLY_POLL_ENABLED`: "1" or "true" to enable polling
//! - `TALLY_POLL_INTERVAL_HOURS`: hours between full polls (default: 24)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use tally_core::{models::AccountStatus, SyncEngine};

use crate::AppState;

/// Attempts per failed account before giving up
pub const MAX_SYNC_ATTEMPTS: u32 = 3;

/// Base delay before the first retry
const RETRY_BASE: Duration = Duration::from_secs(60 * 60);

/// Poll schedule configuration
#[derive(Debug, Clone)]
pub struct PollScheduleConfig {
    pub interval: Duration,
}

impl PollScheduleConfig {
    /// Read the schedule from the environment
    ///
    /// Returns None when polling is not enabled or the interval is zero.
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("TALLY_POLL_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if !enabled {
            return None;
        }

        let hours = match std::env::var("TALLY_POLL_INTERVAL_HOURS") {
            Ok(v) => match v.parse::<u64>() {
                Ok(h) => h,
                Err(_) => {
                    warn!(value = %v, "Invalid TALLY_POLL_INTERVAL_HOURS, polling disabled");
                    return None;
                }
            },
            Err(_) => 24,
        };
        if hours == 0 {
            warn!("TALLY_POLL_INTERVAL_HOURS is 0, polling disabled");
            return None;
        }

        Some(Self {
            interval: Duration::from_secs(hours * 3600),
        })
    }
}

/// Backoff delay before retry `attempt` (1-based): 1h, 2h, 4h
pub fn retry_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(MAX_SYNC_ATTEMPTS - 1);
    RETRY_BASE * 2u32.pow(exp)
}

struct RetryState {
    attempts: u32,
    next_attempt: Instant,
}

/// Spawn the polling task
///
/// The first full poll runs one interval after startup.
pub fn start_poll_scheduler(
    state: Arc<AppState>,
    config: PollScheduleConfig,
) -> tokio::task::JoinHandle<()> {
    info!(
        interval_hours = config.interval.as_secs() / 3600,
        "Poll scheduler started"
    );

    tokio::spawn(async move {
        let mut retries: HashMap<i64, RetryState> = HashMap::new();
        let mut next_full_poll = Instant::now() + config.interval;

        loop {
            let wake = retries
                .values()
                .map(|r| r.next_attempt)
                .min()
                .map_or(next_full_poll, |earliest| earliest.min(next_full_poll));
            tokio::time::sleep_until(wake).await;

            let now = Instant::now();
            if now >= next_full_poll {
                next_full_poll = now + config.interval;
                run_full_poll(&state, &mut retries, now).await;
            }

            let due: Vec<i64> = retries
                .iter()
                .filter(|(_, r)| r.next_attempt <= now)
                .map(|(id, _)| *id)
                .collect();
            for account_id in due {
                run_retry(&state, &mut retries, account_id, now).await;
            }
        }
    })
}

async fn run_full_poll(state: &AppState, retries: &mut HashMap<i64, RetryState>, now: Instant) {
    let Some(aggregator) = &state.aggregator else {
        return;
    };
    let engine = SyncEngine::new(
        &state.db,
        aggregator,
        state.ai.as_ref(),
        state.fraud_config.clone(),
    );

    let results = match engine.sync_all().await {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "Scheduled poll could not run");
            return;
        }
    };

    let mut synced = 0usize;
    for (account_id, result) in results {
        match result {
            Ok(outcome) => {
                synced += 1;
                retries.remove(&account_id);
                if outcome.imported > 0 || outcome.updated > 0 {
                    info!(
                        account_id,
                        imported = outcome.imported,
                        updated = outcome.updated,
                        "Scheduled sync imported transactions"
                    );
                }
            }
            Err(e) => {
                warn!(account_id, error = %e, "Scheduled sync failed, will retry");
                retries.insert(
                    account_id,
                    RetryState {
                        attempts: 1,
                        next_attempt: now + retry_delay(1),
                    },
                );
            }
        }
    }

    if let Err(e) = state.db.log_audit(
        "scheduler",
        "sync.poll",
        None,
        None,
        Some(&format!("{} accounts synced", synced)),
    ) {
        warn!(error = %e, "Failed to write scheduler audit entry");
    }
}

async fn run_retry(
    state: &AppState,
    retries: &mut HashMap<i64, RetryState>,
    account_id: i64,
    now: Instant,
) {
    let Some(aggregator) = &state.aggregator else {
        return;
    };
    let engine = SyncEngine::new(
        &state.db,
        aggregator,
        state.ai.as_ref(),
        state.fraud_config.clone(),
    );

    match engine.sync_account(account_id).await {
        Ok(_) => {
            info!(account_id, "Retry sync succeeded");
            retries.remove(&account_id);
        }
        Err(e) => {
            let attempts = retries.get(&account_id).map(|r| r.attempts).unwrap_or(0) + 1;
            if attempts >= MAX_SYNC_ATTEMPTS {
                warn!(account_id, error = %e, "Sync failed after final retry, marking account");
                retries.remove(&account_id);
                if let Err(e) = state.db.set_account_status(account_id, AccountStatus::SyncFailed)
                {
                    warn!(account_id, error = %e, "Failed to mark account sync-failed");
                }
                if let Err(e) = state.db.log_audit(
                    "scheduler",
                    "sync.failed",
                    Some("account"),
                    Some(account_id),
                    Some("retries exhausted"),
                ) {
                    warn!(error = %e, "Failed to write scheduler audit entry");
                }
            } else {
                warn!(account_id, attempts, error = %e, "Retry sync failed");
                retries.insert(
                    account_id,
                    RetryState {
                        attempts,
                        next_attempt: now + retry_delay(attempts),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Env vars are process-global; tests that touch them must not interleave
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_retry_delay_doubles_from_one_hour() {
        assert_eq!(retry_delay(1), Duration::from_secs(3600));
        assert_eq!(retry_delay(2), Duration::from_secs(7200));
        assert_eq!(retry_delay(3), Duration::from_secs(14400));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(retry_delay(10), retry_delay(MAX_SYNC_ATTEMPTS));
    }

    #[test]
    fn test_poll_config_disabled_by_default() {
        let _env = env_guard();
        std::env::remove_var("TALLY_POLL_ENABLED");
        assert!(PollScheduleConfig::from_env().is_none());
    }

    #[test]
    fn test_poll_config_enabled_with_default_interval() {
        let _env = env_guard();
        std::env::set_var("TALLY_POLL_ENABLED", "true");
        std::env::remove_var("TALLY_POLL_INTERVAL_HOURS");
        let config = PollScheduleConfig::from_env().unwrap();
        assert_eq!(config.interval, Duration::from_secs(24 * 3600));
        std::env::remove_var("TALLY_POLL_ENABLED");
    }

    #[test]
    fn test_poll_config_zero_interval_disables() {
        let _env = env_guard();
        std::env::set_var("TALLY_POLL_ENABLED", "1");
        std::env::set_var("TALLY_POLL_INTERVAL_HOURS", "0");
        assert!(PollScheduleConfig::from_env().is_none());
        std::env::remove_var("TALLY_POLL_ENABLED");
        std::env::remove_var("TALLY_POLL_INTERVAL_HOURS");
    }
}
