//! Focus session timer.
//!
//! A session ends at an absolute wall-clock instant. The wake-up task sleeps
//! in slices of at most [`RECHECK_INTERVAL`] and compares the [`Clock`]
//! against the end each time, so a process that was suspended past the end
//! still expires promptly once it runs again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::blocking::BlockingInputs;
use crate::clock::Clock;
use crate::error::{Result, ValidationError};
use crate::notify::{NotificationConfig, NotificationGateway};
use crate::storage::RecordStore;

/// kv key the session is persisted under.
pub const FOCUS_SESSION_KEY: &str = "focus_session";

/// Upper bound on how long the wake-up task sleeps between clock checks.
pub const RECHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub active: bool,
    pub end_at: Option<DateTime<Utc>>,
}

impl FocusSession {
    /// Time left, zero once past the end. `None` when inactive.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        if !self.active {
            return None;
        }
        let end = self.end_at?;
        Some((end - now).max(chrono::Duration::zero()))
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_at.is_some_and(|end| end <= now)
    }
}

#[derive(Default)]
struct TimerState {
    session: FocusSession,
    generation: u64,
    wakeup: Option<JoinHandle<()>>,
}

impl TimerState {
    fn cancel_wakeup(&mut self) {
        if let Some(handle) = self.wakeup.take() {
            handle.abort();
        }
        self.generation += 1;
    }
}

struct Inner {
    store: RecordStore,
    notifier: Arc<NotificationGateway>,
    clock: Arc<dyn Clock>,
    inputs: watch::Sender<BlockingInputs>,
    state: Mutex<TimerState>,
}

/// Starts, stops and expires focus sessions. Cheap to clone.
#[derive(Clone)]
pub struct FocusTimer {
    inner: Arc<Inner>,
}

impl FocusTimer {
    pub fn new(
        store: RecordStore,
        notifier: Arc<NotificationGateway>,
        clock: Arc<dyn Clock>,
        inputs: watch::Sender<BlockingInputs>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                notifier,
                clock,
                inputs,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Start a session of `minutes`, replacing any running one.
    ///
    /// # Errors
    /// Returns a validation error for a zero duration or one whose end
    /// cannot be represented.
    pub async fn start(&self, minutes: u64) -> Result<FocusSession> {
        if minutes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration".into(),
                message: "focus session must last at least one minute".into(),
            }
            .into());
        }
        let now = self.inner.clock.now();
        let end_at = i64::try_from(minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .and_then(|duration| now.checked_add_signed(duration))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "duration".into(),
                message: format!("{minutes} minutes is out of range"),
            })?;
        let session = FocusSession {
            active: true,
            end_at: Some(end_at),
        };

        {
            let mut state = self.inner.state.lock().await;
            state.cancel_wakeup();
            state.session = session.clone();
            self.persist(&session).await;
            self.publish(true);
            state.wakeup = Some(self.spawn_wakeup(state.generation));
        }

        tracing::info!(minutes, end_at = ?session.end_at, "focus session started");
        self.notify(NotificationConfig::focus_started(minutes)).await;
        Ok(session)
    }

    /// End the session early. No notification is sent.
    pub async fn stop(&self) -> FocusSession {
        let mut state = self.inner.state.lock().await;
        state.cancel_wakeup();
        let was_active = state.session.active;
        state.session = FocusSession::default();
        self.persist(&state.session).await;
        self.publish(false);
        if was_active {
            tracing::info!("focus session stopped");
        }
        state.session.clone()
    }

    /// Current session, after expiring it if its end has passed.
    pub async fn status(&self) -> FocusSession {
        self.check_expiry().await;
        self.inner.state.lock().await.session.clone()
    }

    /// Restore the persisted session on startup. Expires it at once if the
    /// end has passed while the process was down, otherwise reschedules the
    /// wake-up.
    pub async fn resume(&self) -> FocusSession {
        let persisted = match self.inner.store.kv_get(FOCUS_SESSION_KEY).await {
            Ok(Some(json)) => serde_json::from_str::<FocusSession>(&json).unwrap_or_else(|e| {
                tracing::warn!("discarding unreadable focus session: {e}");
                FocusSession::default()
            }),
            Ok(None) => FocusSession::default(),
            Err(e) => {
                tracing::warn!("failed to load focus session: {e}");
                FocusSession::default()
            }
        };
        let persisted = if persisted.active && persisted.end_at.is_none() {
            tracing::warn!("discarding focus session without an end time");
            let cleared = FocusSession::default();
            self.persist(&cleared).await;
            cleared
        } else {
            persisted
        };

        {
            let mut state = self.inner.state.lock().await;
            state.cancel_wakeup();
            state.session = persisted.clone();
            if persisted.active && !persisted.is_due(self.inner.clock.now()) {
                tracing::info!(end_at = ?persisted.end_at, "focus session resumed");
                self.publish(true);
                state.wakeup = Some(self.spawn_wakeup(state.generation));
                return persisted;
            }
            if !persisted.active {
                self.publish(false);
                return persisted;
            }
        }

        self.expire(None).await;
        self.inner.state.lock().await.session.clone()
    }

    /// Expire the session if its end has passed. Returns true if this call
    /// ended it.
    pub async fn check_expiry(&self) -> bool {
        self.expire(None).await
    }

    /// Cancel the wake-up task.
    pub async fn shutdown(&self) {
        self.inner.state.lock().await.cancel_wakeup();
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn expire(&self, generation: Option<u64>) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            if generation.is_some_and(|g| g != state.generation) {
                return false;
            }
            if !state.session.is_due(self.inner.clock.now()) {
                return false;
            }
            if generation.is_none() {
                state.cancel_wakeup();
            } else {
                // Called from the wake-up task itself.
                state.wakeup = None;
                state.generation += 1;
            }
            state.session = FocusSession::default();
            self.persist(&state.session).await;
            self.publish(false);
        }

        tracing::info!("focus session complete");
        self.notify(NotificationConfig::focus_complete()).await;
        true
    }

    fn spawn_wakeup(&self, generation: u64) -> JoinHandle<()> {
        let timer = self.clone();
        tokio::spawn(async move {
            loop {
                let remaining = {
                    let state = timer.inner.state.lock().await;
                    if state.generation != generation {
                        return;
                    }
                    match state.session.remaining(timer.inner.clock.now()) {
                        Some(remaining) => remaining,
                        None => return,
                    }
                };
                if remaining <= chrono::Duration::zero() {
                    timer.expire(Some(generation)).await;
                    return;
                }
                let nap = remaining
                    .to_std()
                    .unwrap_or(RECHECK_INTERVAL)
                    .min(RECHECK_INTERVAL);
                tokio::time::sleep(nap).await;
            }
        })
    }

    async fn persist(&self, session: &FocusSession) {
        let result = match serde_json::to_string(session) {
            Ok(json) => self.inner.store.kv_set(FOCUS_SESSION_KEY, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!("failed to persist focus session: {e}");
        }
    }

    fn publish(&self, active: bool) {
        self.inner.inputs.send_if_modified(|inputs| {
            let changed = inputs.focus_active != active;
            inputs.focus_active = active;
            changed
        });
    }

    async fn notify(&self, config: NotificationConfig) {
        let enabled = self
            .inner
            .store
            .load_settings()
            .await
            .map(|s| s.notifications_enabled)
            .unwrap_or(true);
        if !enabled {
            return;
        }
        if let Err(e) = self.inner.notifier.show(&config).await {
            tracing::warn!("failed to show focus notification: {e}");
        }
    }
}

impl std::fmt::Debug for FocusTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusTimer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::MemoryChannel;

    struct Fixture {
        timer: FocusTimer,
        clock: ManualClock,
        store: RecordStore,
        channel: MemoryChannel,
        inputs: watch::Receiver<BlockingInputs>,
    }

    async fn fixture_with_store(store: RecordStore) -> Fixture {
        let clock = ManualClock::new(Utc::now());
        let channel = MemoryChannel::new("memory");
        let notifier = NotificationGateway::new(Some(Box::new(channel.clone())), None);
        notifier.initialize().await;
        let (tx, rx) = watch::channel(BlockingInputs::default());
        let timer = FocusTimer::new(
            store.clone(),
            Arc::new(notifier),
            Arc::new(clock.clone()),
            tx,
        );
        Fixture {
            timer,
            clock,
            store,
            channel,
            inputs: rx,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with_store(RecordStore::in_memory()).await
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_sets_end_and_publishes() {
        let f = fixture().await;
        let session = f.timer.start(25).await.unwrap();
        assert!(session.active);
        assert_eq!(
            session.end_at,
            Some(f.clock.now() + chrono::Duration::minutes(25))
        );
        assert!(f.inputs.borrow().focus_active);
        assert_eq!(f.channel.titles(), vec!["Focus Session Started".to_string()]);

        let stored = f.store.kv_get(FOCUS_SESSION_KEY).await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<FocusSession>(&stored).unwrap(), session);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_minutes_rejected() {
        let f = fixture().await;
        assert!(f.timer.start(0).await.is_err());
        assert!(!f.timer.status().await.active);
    }

    #[tokio::test]
    async fn unrepresentable_duration_rejected() {
        let f = fixture().await;
        for minutes in [200_000_000_000_000, u64::MAX] {
            let err = f.timer.start(minutes).await.unwrap_err();
            assert!(err.to_string().contains("out of range"), "{err}");
        }
        assert!(!f.timer.status().await.active);
        assert!(!f.inputs.borrow().focus_active);
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_suspension_within_one_recheck() {
        let f = fixture().await;
        f.timer.start(25).await.unwrap();

        // The wall clock jumps past the end while the runtime slept only
        // one recheck interval.
        f.clock.advance(chrono::Duration::minutes(26));
        tokio::time::sleep(RECHECK_INTERVAL + Duration::from_secs(1)).await;
        settle().await;

        assert!(!f.inputs.borrow().focus_active);
        assert_eq!(
            f.channel.titles(),
            vec![
                "Focus Session Started".to_string(),
                "Focus Session Complete!".to_string()
            ]
        );
        // Exactly once.
        assert!(!f.timer.check_expiry().await);
        assert!(!f.timer.status().await.active);
        assert_eq!(f.channel.titles().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_without_notification() {
        let f = fixture().await;
        f.timer.start(25).await.unwrap();
        let session = f.timer.stop().await;
        assert!(!session.active);
        assert!(!f.inputs.borrow().focus_active);

        f.clock.advance(chrono::Duration::minutes(30));
        tokio::time::sleep(RECHECK_INTERVAL * 2).await;
        settle().await;
        assert_eq!(f.channel.titles(), vec!["Focus Session Started".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_the_previous_wakeup() {
        let f = fixture().await;
        f.timer.start(1).await.unwrap();
        f.timer.start(60).await.unwrap();

        f.clock.advance(chrono::Duration::minutes(2));
        tokio::time::sleep(RECHECK_INTERVAL * 2).await;
        settle().await;
        assert!(f.timer.status().await.active);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_expires_overdue_session_immediately() {
        let store = RecordStore::in_memory();
        let overdue = FocusSession {
            active: true,
            end_at: Some(Utc::now() - chrono::Duration::minutes(5)),
        };
        store
            .kv_set(FOCUS_SESSION_KEY, &serde_json::to_string(&overdue).unwrap())
            .await
            .unwrap();

        let f = fixture_with_store(store).await;
        let session = f.timer.resume().await;
        assert!(!session.active);
        assert_eq!(
            f.channel.titles(),
            vec!["Focus Session Complete!".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resume_reschedules_pending_session() {
        let store = RecordStore::in_memory();
        let pending = FocusSession {
            active: true,
            end_at: Some(Utc::now() + chrono::Duration::minutes(10)),
        };
        store
            .kv_set(FOCUS_SESSION_KEY, &serde_json::to_string(&pending).unwrap())
            .await
            .unwrap();

        let f = fixture_with_store(store).await;
        assert!(f.timer.resume().await.active);
        assert!(f.inputs.borrow().focus_active);

        f.clock.advance(chrono::Duration::minutes(11));
        tokio::time::sleep(RECHECK_INTERVAL + Duration::from_secs(1)).await;
        settle().await;
        assert!(!f.timer.status().await.active);
    }

    #[tokio::test(start_paused = true)]
    async fn resume_discards_active_session_without_end() {
        let store = RecordStore::in_memory();
        store
            .kv_set(FOCUS_SESSION_KEY, r#"{"active":true,"endAt":null}"#)
            .await
            .unwrap();

        let f = fixture_with_store(store).await;
        let session = f.timer.resume().await;
        assert!(!session.active);
        assert!(!f.inputs.borrow().focus_active);
        assert!(f.channel.delivered().is_empty());

        let stored = f.store.kv_get(FOCUS_SESSION_KEY).await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<FocusSession>(&stored).unwrap(),
            FocusSession::default()
        );
    }
}
