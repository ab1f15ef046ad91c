//! Running intervention gates.
//!
//! Each gate is one tokio task that owns an [`InterventionSession`] and
//! multiplexes the countdown, the breathing pacer, the skip-delay timer and
//! user commands. At most one gate runs per origin.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use super::breathing::BreathPhase;
use super::session::{
    CompletionRatePolicy, GateEvent, GateOutcome, GateState, InterventionSession, SessionParams,
};
use crate::error::GateError;
use crate::notify::{NotificationConfig, NotificationGateway};
use crate::storage::RecordStore;

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);
const PACING_PERIOD: Duration = Duration::from_millis(100);
const EVENT_CAPACITY: usize = 64;

/// Snapshot of a running gate for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub site_or_app_id: String,
    pub display_name: String,
    pub state: GateState,
    pub remaining_secs: u64,
    pub phase: Option<BreathPhase>,
    pub skip_available: bool,
}

impl GateStatus {
    fn of(session: &InterventionSession) -> Self {
        Self {
            site_or_app_id: session.site_or_app_id().to_string(),
            display_name: session.display_name().to_string(),
            state: session.state(),
            remaining_secs: session.remaining_secs(),
            phase: session.phase(),
            skip_available: session.skip_available(),
        }
    }
}

enum Command {
    Skip(oneshot::Sender<Result<(), GateError>>),
    Finish(oneshot::Sender<Result<(), GateError>>),
    Cancel,
}

/// Handle to one running gate. Cheap to clone.
#[derive(Clone)]
pub struct GateHandle {
    origin: String,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<GateEvent>,
    status: watch::Receiver<GateStatus>,
}

impl GateHandle {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn status(&self) -> GateStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to events from now on.
    pub fn events(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), GateError>>) -> Command,
    ) -> Result<(), GateError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| GateError::NotRunning)?;
        rx.await.map_err(|_| GateError::NotRunning)?
    }

    /// # Errors
    /// See [`InterventionSession::skip`].
    pub async fn skip(&self) -> Result<(), GateError> {
        self.request(Command::Skip).await
    }

    /// # Errors
    /// See [`InterventionSession::finish`].
    pub async fn finish(&self) -> Result<(), GateError> {
        self.request(Command::Finish).await
    }

    /// Tear the gate down without an outcome.
    pub async fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel).await;
    }

    /// Wait for the terminal outcome. By the time this returns, the record
    /// (if any) has been written and the completion notification sent.
    pub async fn outcome(&self) -> GateOutcome {
        let mut status = self.status.clone();
        let result = status
            .wait_for(|s| s.state.is_terminal())
            .await
            .map(|s| s.state);
        match result {
            Ok(GateState::Completed) => GateOutcome::Completed,
            Ok(GateState::Skipped) => GateOutcome::Skipped,
            _ => GateOutcome::Abandoned,
        }
    }
}

impl std::fmt::Debug for GateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateHandle")
            .field("origin", &self.origin)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

#[derive(Debug)]
pub enum TriggerResult {
    Triggered(GateHandle),
    /// A gate is already running for this origin; the trigger was ignored.
    AlreadyRunning(GateHandle),
}

impl TriggerResult {
    pub fn handle(&self) -> &GateHandle {
        match self {
            TriggerResult::Triggered(h) | TriggerResult::AlreadyRunning(h) => h,
        }
    }
}

struct ActiveGate {
    generation: u64,
    handle: GateHandle,
    task: JoinHandle<()>,
}

impl ActiveGate {
    /// A task that died without deregistering leaves the origin free.
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

#[derive(Default)]
struct Registry {
    next_generation: u64,
    gates: HashMap<String, ActiveGate>,
}

/// Starts and tracks intervention gates.
#[derive(Clone)]
pub struct InterventionGate {
    store: RecordStore,
    notifier: Arc<NotificationGateway>,
    rate_policy: CompletionRatePolicy,
    registry: Arc<Mutex<Registry>>,
}

impl InterventionGate {
    pub fn new(
        store: RecordStore,
        notifier: Arc<NotificationGateway>,
        rate_policy: CompletionRatePolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            rate_policy,
            registry: Arc::default(),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Handle of the gate running for `origin`, if any.
    pub fn active(&self, origin: &str) -> Option<GateHandle> {
        self.registry()
            .gates
            .get(origin)
            .filter(|g| g.is_live())
            .map(|g| g.handle.clone())
    }

    pub fn active_count(&self) -> usize {
        self.registry().gates.values().filter(|g| g.is_live()).count()
    }

    /// Start a gate for `origin` using the current settings, unless one is
    /// already running there.
    pub async fn trigger(
        &self,
        origin: &str,
        site_or_app_id: &str,
        display_name: &str,
    ) -> TriggerResult {
        if let Some(existing) = self.active(origin) {
            tracing::debug!(%origin, "intervention already running; ignoring trigger");
            return TriggerResult::AlreadyRunning(existing);
        }

        let settings = self.store.load_settings().await.unwrap_or_else(|e| {
            tracing::warn!("failed to load settings, using defaults: {e}");
            Default::default()
        });
        let params = SessionParams::from_settings(&settings, self.rate_policy);
        let session = InterventionSession::new(site_or_app_id, display_name, params);

        let mut registry = self.registry();
        // Settings were loaded without the lock held; re-check.
        if let Some(existing) = registry.gates.get(origin).filter(|g| g.is_live()) {
            return TriggerResult::AlreadyRunning(existing.handle.clone());
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, status_rx) = watch::channel(GateStatus::of(&session));
        let handle = GateHandle {
            origin: origin.to_string(),
            commands: cmd_tx,
            events: event_tx.clone(),
            status: status_rx,
        };

        registry.next_generation += 1;
        let generation = registry.next_generation;
        let task = tokio::spawn(run_gate(GateTask {
            session,
            notifications_enabled: settings.notifications_enabled,
            store: self.store.clone(),
            notifier: Arc::clone(&self.notifier),
            registry: Arc::clone(&self.registry),
            origin: origin.to_string(),
            generation,
            commands: cmd_rx,
            events: event_tx,
            status: status_tx,
        }));
        registry.gates.insert(
            origin.to_string(),
            ActiveGate {
                generation,
                handle: handle.clone(),
                task,
            },
        );
        tracing::info!(%origin, site = %site_or_app_id, "intervention started");
        TriggerResult::Triggered(handle)
    }

    /// Abort every running gate. Aborted gates write no record.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.registry().gates.drain().collect();
        for (origin, gate) in drained {
            tracing::debug!(%origin, "aborting intervention");
            gate.task.abort();
        }
    }
}

impl std::fmt::Debug for InterventionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterventionGate")
            .field("active", &self.active_count())
            .field("rate_policy", &self.rate_policy)
            .finish()
    }
}

struct GateTask {
    session: InterventionSession,
    notifications_enabled: bool,
    store: RecordStore,
    notifier: Arc<NotificationGateway>,
    registry: Arc<Mutex<Registry>>,
    origin: String,
    generation: u64,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<GateEvent>,
    status: watch::Sender<GateStatus>,
}

impl GateTask {
    fn deregister(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
        let ours = registry
            .gates
            .get(&self.origin)
            .is_some_and(|g| g.generation == self.generation);
        if ours {
            registry.gates.remove(&self.origin);
        }
    }

    fn publish(&self, events: Vec<GateEvent>) {
        if events.is_empty() {
            return;
        }
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        // The terminal status is published only after the outcome is persisted.
        if !self.session.state().is_terminal() {
            self.status.send_replace(GateStatus::of(&self.session));
        }
    }
}

// Runs on every exit path, including a panic or abort inside the task.
impl Drop for GateTask {
    fn drop(&mut self) {
        self.deregister();
    }
}

async fn run_gate(mut task: GateTask) {
    let started = Instant::now();
    let events = task.session.start(Utc::now());
    task.publish(events);

    let mut countdown = interval_at(started + COUNTDOWN_PERIOD, COUNTDOWN_PERIOD);
    countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut pacing = interval_at(started + PACING_PERIOD, PACING_PERIOD);
    pacing.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Past the countdown the delay no longer matters.
    let params = task.session.params();
    let skip_at = started.checked_add(params.skip_delay.min(params.duration));
    let mut skip_delay_done = skip_at.is_none();
    let skip_delay = sleep_until(skip_at.unwrap_or(started));
    tokio::pin!(skip_delay);

    while task.session.state() == GateState::Running {
        tokio::select! {
            _ = countdown.tick() => {
                let events = task.session.advance(started.elapsed());
                task.publish(events);
            }
            _ = pacing.tick() => {
                let events = task.session.advance(started.elapsed());
                task.publish(events);
            }
            () = &mut skip_delay, if !skip_delay_done => {
                skip_delay_done = true;
                let events = task.session.advance(started.elapsed());
                task.publish(events);
            }
            command = task.commands.recv() => {
                let events = task.session.advance(started.elapsed());
                task.publish(events);
                match command {
                    Some(Command::Skip(reply)) => {
                        let result = task.session.skip();
                        if let Ok(event) = &result {
                            task.publish(vec![event.clone()]);
                        }
                        let _ = reply.send(result.map(|_| ()));
                    }
                    Some(Command::Finish(reply)) => {
                        let result = task.session.finish();
                        if let Ok(event) = &result {
                            task.publish(vec![event.clone()]);
                        }
                        let _ = reply.send(result.map(|_| ()));
                    }
                    Some(Command::Cancel) | None => {
                        if task.session.abandon() {
                            let _ = task.events.send(GateEvent::Resolved {
                                outcome: GateOutcome::Abandoned,
                            });
                        }
                    }
                }
            }
        }
    }

    resolve(&task).await;

    task.deregister();
    task.status.send_replace(GateStatus::of(&task.session));
}

/// Persist the outcome and congratulate. Failures are logged only.
async fn resolve(task: &GateTask) {
    let session = &task.session;
    let Some(record) = session.to_record() else {
        tracing::debug!(
            origin = %task.origin,
            elapsed_ms = session.elapsed().as_millis() as u64,
            "intervention abandoned; nothing recorded"
        );
        return;
    };

    tracing::info!(
        site = %record.site_or_app_id,
        skipped = record.was_skipped,
        completion_rate = record.completion_rate,
        "intervention resolved"
    );
    if let Err(e) = task.store.put_intervention(&record).await {
        tracing::warn!("failed to save intervention {}: {e}", record.id);
    }

    if task.notifications_enabled && session.state() == GateState::Completed {
        let config = NotificationConfig::intervention_complete(session.display_name());
        if let Err(e) = task.notifier.show(&config).await {
            tracing::warn!("failed to show completion notification: {e}");
        }
    }
}
