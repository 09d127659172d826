use once_cell::sync::Lazy;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::service::settings;

/// A quota-warning check queued after a reconciliation. Carries the balance
/// snapshot taken when the request was authenticated; the worker never goes
/// back to storage.
#[derive(Debug)]
pub struct QuotaCheck {
    pub user_id: i64,
    /// Balance snapshot from the request's RelayInfo.
    pub user_quota: i64,
    /// delta + pre_consumed for the request being reconciled.
    pub consumed_quota: i64,
    pub notify_type: String,
    pub user_threshold: i64,
}

pub struct NotifyManager {
    sender: mpsc::Sender<QuotaCheck>,
}

const QUEUE_DEPTH: usize = 64;

impl NotifyManager {
    fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<QuotaCheck>(QUEUE_DEPTH);
        tokio::spawn(async move {
            while let Some(check) = receiver.recv().await {
                Self::process(check);
            }
        });
        Self { sender }
    }

    /// Never blocks the request path: a full queue drops the check.
    pub fn enqueue(&self, check: QuotaCheck) {
        if let Err(e) = self.sender.try_send(check) {
            warn!("notify queue saturated, dropping quota check: {}", e);
        }
    }

    fn process(check: QuotaCheck) {
        let threshold = if check.user_threshold > 0 {
            check.user_threshold
        } else {
            settings::snapshot().quota_remind_threshold
        };

        if check.user_quota - check.consumed_quota < threshold {
            // Delivery transports (email/bark/gotify/webhook) live outside the
            // core; emit the structured event they subscribe to.
            info!(
                user_id = check.user_id,
                user_quota = check.user_quota,
                consumed = check.consumed_quota,
                threshold,
                notify_type = %check.notify_type,
                "user quota below warning threshold"
            );
        }
    }
}

static NOTIFY_MANAGER: Lazy<NotifyManager> = Lazy::new(NotifyManager::new);

pub fn get_notify_manager() -> &'static NotifyManager {
    &NOTIFY_MANAGER
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(user_quota: i64, consumed: i64, user_threshold: i64) -> QuotaCheck {
        QuotaCheck {
            user_id: 1,
            user_quota,
            consumed_quota: consumed,
            notify_type: "email".to_string(),
            user_threshold,
        }
    }

    // The warning predicate, spelled out so the snapshot arithmetic is pinned.
    fn below_threshold(check: &QuotaCheck, global_threshold: i64) -> bool {
        let threshold = if check.user_threshold > 0 {
            check.user_threshold
        } else {
            global_threshold
        };
        check.user_quota - check.consumed_quota < threshold
    }

    #[test]
    fn warning_uses_the_snapshot_minus_consumed() {
        // 150k snapshot - 60k consumed = 90k, under the 100k threshold.
        assert!(below_threshold(&check(150_000, 60_000, 0), 100_000));
        // 500k snapshot stays comfortably above.
        assert!(!below_threshold(&check(500_000, 60_000, 0), 100_000));
    }

    #[test]
    fn user_threshold_overrides_the_global_one() {
        // Global would not warn; the user's own 300k threshold does.
        assert!(below_threshold(&check(250_000, 10_000, 300_000), 100_000));
        // A zero user threshold means "use the global".
        assert!(!below_threshold(&check(250_000, 10_000, 0), 100_000));
    }
}
