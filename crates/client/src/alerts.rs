//! Alert polling and the bounded alert log.
//!
//! While monitoring is active the poller issues one gateway request per
//! fixed interval and folds returned events into a capped, newest-first
//! log. A failed poll is logged and the next tick proceeds; one failure
//! never stops subsequent polling.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::CHECK_ALERTS_PATH;
use crate::config::DEFAULT_ALERT_CAPACITY;
use crate::gateway::Gateway;

/// One motion alert produced by the appliance, immutable once received.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AlertEvent {
    /// Epoch milliseconds assigned by the server.
    pub timestamp: i64,
    /// Normalized motion intensity, percent.
    pub score: f64,
    /// Opaque image blob (data URI or raw base64), forwarded to a renderer.
    pub image: String,
}

/// Polling endpoint payload; an absent or empty `alerts` array means no new
/// events.
#[derive(Debug, Default, Deserialize)]
pub struct AlertsResponse {
    #[serde(default)]
    pub alerts: Vec<AlertEvent>,
}

/// Ordered alert sequence, newest first, never longer than its capacity.
#[derive(Debug)]
pub struct AlertLog {
    entries: VecDeque<AlertEvent>,
    capacity: usize,
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend a poll batch in the order the server returned it and truncate
    /// to capacity in the same operation. Existing entries are never
    /// reordered.
    pub fn prepend(&mut self, batch: Vec<AlertEvent>) {
        for event in batch.into_iter().rev() {
            self.entries.push_front(event);
        }
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&AlertEvent> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertEvent> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<AlertEvent> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Timer-driven poller for new alert events.
///
/// At most one timer per poller instance runs at any time; the owner starts
/// it when monitoring begins and stops it when monitoring ends or the owner
/// shuts down. The timer also stops itself the moment the credential is
/// gone: polling only happens while a credential is present, and a 401 on
/// the poll call itself ends the timer rather than continuing
/// unauthenticated.
pub struct AlertPoller {
    gateway: Gateway,
    interval: Duration,
    log: Arc<RwLock<AlertLog>>,
    task: Option<PollTask>,
}

impl AlertPoller {
    pub fn new(gateway: Gateway, interval: Duration, capacity: usize) -> Self {
        Self {
            gateway,
            interval,
            log: Arc::new(RwLock::new(AlertLog::new(capacity))),
            task: None,
        }
    }

    /// Shared handle to the log for renderers.
    pub fn log(&self) -> Arc<RwLock<AlertLog>> {
        Arc::clone(&self.log)
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Start the poll timer. A no-op when one is already running, so two
    /// timers for the same poller can never coexist.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.gateway.clone(),
            Arc::clone(&self.log),
            self.interval,
            cancel.clone(),
        ));
        self.task = Some(PollTask { cancel, handle });
        debug!(interval_ms = self.interval.as_millis() as u64, "alert poller started");
    }

    /// Tear the timer down and wait for the in-flight tick, if any, to
    /// finish.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.cancel.cancel();
        if let Err(err) = task.handle.await {
            warn!(error = %err, "alert poll task failed during teardown");
        }
        debug!("alert poller stopped");
    }
}

async fn poll_loop(
    gateway: Gateway,
    log: Arc<RwLock<AlertLog>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !gateway.session().is_authenticated() {
                    info!("credential absent, alert polling stopped");
                    break;
                }
                match gateway.get_json::<AlertsResponse>(CHECK_ALERTS_PATH).await {
                    Ok(response) if response.alerts.is_empty() => {}
                    Ok(response) => {
                        info!(count = response.alerts.len(), "new alert events received");
                        log.write().prepend(response.alerts);
                    }
                    Err(err) if err.is_auth_expired() => {
                        warn!("session expired, alert polling stopped");
                        break;
                    }
                    Err(err) => {
                        // One failed poll never stops subsequent polling.
                        warn!(error = %err, "alert poll failed, retrying next tick");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(timestamp: i64) -> AlertEvent {
        AlertEvent {
            timestamp,
            score: 50.0,
            image: String::new(),
        }
    }

    #[test]
    fn two_polls_yield_newest_first_log() {
        let mut log = AlertLog::new(10);
        log.prepend(vec![AlertEvent {
            timestamp: 5,
            score: 90.0,
            image: "a".into(),
        }]);
        log.prepend(vec![AlertEvent {
            timestamp: 6,
            score: 10.0,
            image: "b".into(),
        }]);

        let timestamps: Vec<i64> = log.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![6, 5]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.latest().unwrap().timestamp, 6);
    }

    #[test]
    fn log_never_exceeds_capacity() {
        let mut log = AlertLog::new(10);
        for batch in 0..7 {
            log.prepend((0..3).map(|i| event(batch * 3 + i)).collect());
            assert!(log.len() <= 10);
        }
        assert_eq!(log.len(), 10);
        // Newest batch stays in front, in server order.
        let timestamps: Vec<i64> = log.iter().take(3).map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![18, 19, 20]);
    }

    #[test]
    fn batch_order_is_preserved_and_tail_truncated_atomically() {
        let mut log = AlertLog::new(3);
        log.prepend(vec![event(1), event(2)]);
        log.prepend(vec![event(3), event(4)]);
        let timestamps: Vec<i64> = log.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![3, 4, 1]);
    }

    #[test]
    fn absent_alerts_field_deserializes_to_empty() {
        let parsed: AlertsResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.alerts.is_empty());

        let parsed: AlertsResponse =
            serde_json::from_str(r#"{"alerts":[{"timestamp":5,"score":90,"image":"a"}]}"#)
                .unwrap();
        assert_eq!(parsed.alerts.len(), 1);
        assert_eq!(parsed.alerts[0].timestamp, 5);
    }
}
