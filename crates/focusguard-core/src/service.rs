//! The explicitly constructed service context.
//!
//! [`FocusGuard`] owns one of each component and wires them together: block
//! list and focus changes flow to the rule synchronizer through a watch
//! channel, extension messages are dispatched by [`FocusGuard::handle`], and
//! the usage monitor reports launches through
//! [`FocusGuard::on_app_launch_detected`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::blocking::{
    generate_rules, BlockingInputs, BlockingRule, FileRuleSink, RuleSet, RuleSink, RuleSynchronizer,
    DEFAULT_BLOCKED_SITES,
};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, GateError, Result};
use crate::focus::{FocusSession, FocusTimer};
use crate::gate::{GateHandle, GateOutcome, GateStatus, InterventionGate, TriggerResult};
use crate::notify::{
    CommandChannel, ConsoleChannel, NotificationChannel, NotificationConfig, NotificationGateway,
};
use crate::storage::{normalize_identifier, Config, DailySummary, RecordStore};
use crate::sync::{SyncReport, SyncService};

const INITIALIZED_KEY: &str = "initialized";

/// A message from the browser extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionMessage {
    StartBreathingExercise {
        site: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
        #[serde(default, rename = "displayName", skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    SkipIntervention {
        site: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },
    CompleteIntervention {
        site: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },
    StartFocusSession {
        /// Minutes.
        duration: u64,
    },
    SyncWithWebApp,
    ToggleSite {
        site: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum MessageReply {
    Started { gate: GateStatus },
    AlreadyRunning { gate: GateStatus },
    Resolved { outcome: GateOutcome },
    FocusStarted { session: FocusSession },
    Synced { report: SyncReport },
    Toggled { site: String, blocked: bool },
    Error { message: String },
}

impl MessageReply {
    fn error(err: impl std::fmt::Display) -> Self {
        MessageReply::Error {
            message: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MessageReply::Error { .. })
    }
}

pub struct FocusGuard {
    config: Config,
    store: RecordStore,
    clock: Arc<dyn Clock>,
    notifier: Arc<NotificationGateway>,
    inputs: watch::Sender<BlockingInputs>,
    synchronizer: Arc<RuleSynchronizer>,
    focus: FocusTimer,
    gate: InterventionGate,
    sync: Arc<SyncService>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FocusGuard {
    /// Wire the components. Nothing runs until [`initialize`](Self::initialize).
    pub fn new(
        config: Config,
        store: RecordStore,
        notifier: NotificationGateway,
        rule_sink: Arc<dyn RuleSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifier = Arc::new(notifier);
        let (inputs, _) = watch::channel(BlockingInputs::default());
        let synchronizer = Arc::new(
            RuleSynchronizer::new(rule_sink).with_redirect_path(config.blocking.redirect_path.clone()),
        );
        let focus = FocusTimer::new(
            store.clone(),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            inputs.clone(),
        );
        let gate = InterventionGate::new(store.clone(), Arc::clone(&notifier), config.gate.policy());
        let sync = Arc::new(SyncService::from_config(
            store.clone(),
            &config.sync,
            None,
            Arc::clone(&clock),
        ));
        Self {
            config,
            store,
            clock,
            notifier,
            inputs,
            synchronizer,
            focus,
            gate,
            sync,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Replace the sync service built from config.
    pub fn with_sync(mut self, sync: SyncService) -> Self {
        self.sync = Arc::new(sync);
        self
    }

    /// Production wiring: SQLite store in the data directory (in-memory if
    /// it cannot be opened), desktop notifier with a console fallback, rules
    /// written to the configured file.
    pub fn open(config: Config) -> Result<Self> {
        let store = RecordStore::open_or_memory(&crate::storage::data_dir()?.join("focusguard.db"));
        let rich = (!config.notifications.command.is_empty()).then(|| {
            Box::new(CommandChannel::new(config.notifications.command.clone()))
                as Box<dyn NotificationChannel>
        });
        let notifier = NotificationGateway::new(rich, Some(Box::new(ConsoleChannel)))
            .with_default_icon(config.notifications.icon.clone());
        let sink = Arc::new(FileRuleSink::new(config.rules_path()?));
        Ok(Self::new(config, store, notifier, sink, Arc::new(SystemClock)))
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn notifier(&self) -> &NotificationGateway {
        &self.notifier
    }

    pub fn focus(&self) -> &FocusTimer {
        &self.focus
    }

    pub fn gate(&self) -> &InterventionGate {
        &self.gate
    }

    pub fn sync(&self) -> &SyncService {
        &self.sync
    }

    pub fn synchronizer(&self) -> &RuleSynchronizer {
        &self.synchronizer
    }

    pub fn inputs(&self) -> watch::Receiver<BlockingInputs> {
        self.inputs.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load state, ask for notification permission, start the rule
    /// synchronizer, resume a persisted focus session and schedule periodic
    /// sync.
    ///
    /// # Errors
    /// Returns an error if the block list cannot be read.
    pub async fn initialize(&self) -> Result<()> {
        self.install_default_block_list().await;

        let blocked = self.store.blocked_list().await?;
        self.inputs.send_modify(|inputs| inputs.blocked = blocked);

        let permission = self.notifier.initialize().await;
        tracing::debug!(?permission, "notification permission");

        let rules_task = Arc::clone(&self.synchronizer).spawn(self.inputs.subscribe());
        self.track(rules_task);

        let session = self.focus.resume().await;
        tracing::debug!(active = session.active, "focus session restored");

        if self.sync.is_configured() {
            let minutes = self.config.sync.interval_minutes.max(1);
            let task = Arc::clone(&self.sync).spawn_periodic(Duration::from_secs(minutes * 60));
            self.track(task);
        }
        tracing::info!(durable = self.store.is_durable(), "focusguard initialized");
        Ok(())
    }

    /// Cancel every running gate, the focus wake-up and background tasks.
    pub async fn shutdown(&self) {
        self.gate.shutdown();
        self.focus.shutdown().await;
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        tracing::debug!("focusguard shut down");
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(task);
    }

    async fn install_default_block_list(&self) {
        match self.store.kv_get(INITIALIZED_KEY).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("failed to read first-run marker: {e}");
                return;
            }
        }
        let result = async {
            if self.store.blocked_list().await?.is_empty() {
                let defaults: Vec<String> =
                    DEFAULT_BLOCKED_SITES.iter().map(|s| s.to_string()).collect();
                self.store.replace_blocked(&defaults).await?;
                tracing::info!(count = defaults.len(), "installed default block list");
            }
            self.store.kv_set(INITIALIZED_KEY, "1").await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!("failed to install default block list: {e}");
        }
    }

    // ── Block list ───────────────────────────────────────────────────

    fn publish_blocked(&self, blocked: Vec<String>) {
        self.inputs.send_modify(|inputs| inputs.blocked = blocked);
    }

    /// Add or remove one site or app. Returns whether it is now blocked.
    pub async fn toggle_blocked(&self, site: &str) -> Result<bool> {
        let id = normalize_identifier(site)?;
        let (list, blocked) = self.store.toggle_blocked(&id).await?;
        self.publish_blocked(list);
        Ok(blocked)
    }

    /// Replace the block list. Entries are normalized; the store rejects
    /// duplicates and keeps the previous list in that case.
    pub async fn replace_blocked(&self, sites: &[String]) -> Result<Vec<String>> {
        let list = sites
            .iter()
            .map(|s| normalize_identifier(s))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.store.replace_blocked(&list).await?;
        self.publish_blocked(list.clone());
        Ok(list)
    }

    /// Regenerate the rules from the current inputs now instead of waiting
    /// for the synchronizer task.
    pub fn resync_rules(&self) -> Result<Vec<BlockingRule>> {
        let inputs = self.inputs.borrow().clone();
        self.synchronizer.resync(&inputs.blocked, inputs.focus_active)
    }

    /// The blocked entry a destination URL or host falls under, whether or
    /// not a focus session is running.
    pub async fn blocked_entry_for(&self, url_or_host: &str) -> Result<Option<String>> {
        let blocked = self.store.blocked_list().await?;
        let rules = RuleSet::new(generate_rules(
            &blocked,
            true,
            &self.config.blocking.redirect_path,
        ));
        Ok(rules
            .match_destination(url_or_host)
            .and_then(|rule| rule.site().map(str::to_string)))
    }

    // ── Stats ────────────────────────────────────────────────────────

    pub async fn daily_summary(&self) -> Result<DailySummary> {
        self.store.daily_summary(self.clock.now()).await
    }

    // ── External collaborators ───────────────────────────────────────

    /// Usage-monitor callback. If `app_id` is blocked, starts an intervention
    /// (origin = the app id) and sends a reminder. Returns `None` when the app
    /// is not blocked.
    pub async fn on_app_launch_detected(
        &self,
        app_id: &str,
        app_name: &str,
    ) -> Result<Option<TriggerResult>> {
        let id = normalize_identifier(app_id)?;
        if !self.store.blocked_list().await?.contains(&id) {
            return Ok(None);
        }
        let result = self.gate.trigger(&id, &id, app_name).await;
        if matches!(result, TriggerResult::Triggered(_)) {
            let settings = self.store.load_settings().await.unwrap_or_default();
            if settings.notifications_enabled {
                let reminder = NotificationConfig::intervention_reminder(app_name);
                if let Err(e) = self.notifier.show(&reminder).await {
                    tracing::warn!("failed to show intervention reminder: {e}");
                }
            }
        }
        Ok(Some(result))
    }

    fn find_gate(&self, site: &str, origin: Option<&str>) -> Result<GateHandle> {
        let key = match origin {
            Some(origin) => origin.to_string(),
            None => normalize_identifier(site)?,
        };
        self.gate
            .active(&key)
            .ok_or_else(|| CoreError::Gate(GateError::NoActiveGate(key)))
    }

    /// Dispatch one extension message. Failures are returned as
    /// [`MessageReply::Error`], never as panics or dropped replies.
    pub async fn handle(&self, message: ExtensionMessage) -> MessageReply {
        tracing::debug!(?message, "extension message");
        match message {
            ExtensionMessage::StartBreathingExercise {
                site,
                origin,
                display_name,
            } => {
                let id = match normalize_identifier(&site) {
                    Ok(id) => id,
                    Err(e) => return MessageReply::error(e),
                };
                let origin = origin.unwrap_or_else(|| id.clone());
                let name = display_name.unwrap_or_else(|| id.clone());
                match self.gate.trigger(&origin, &id, &name).await {
                    TriggerResult::Triggered(h) => MessageReply::Started { gate: h.status() },
                    TriggerResult::AlreadyRunning(h) => {
                        MessageReply::AlreadyRunning { gate: h.status() }
                    }
                }
            }
            ExtensionMessage::SkipIntervention { site, origin } => {
                let handle = match self.find_gate(&site, origin.as_deref()) {
                    Ok(h) => h,
                    Err(e) => return MessageReply::error(e),
                };
                match handle.skip().await {
                    Ok(()) => MessageReply::Resolved {
                        outcome: handle.outcome().await,
                    },
                    Err(e) => MessageReply::error(e),
                }
            }
            ExtensionMessage::CompleteIntervention { site, origin } => {
                let handle = match self.find_gate(&site, origin.as_deref()) {
                    Ok(h) => h,
                    Err(e) => return MessageReply::error(e),
                };
                match handle.finish().await {
                    Ok(()) => MessageReply::Resolved {
                        outcome: handle.outcome().await,
                    },
                    Err(e) => MessageReply::error(e),
                }
            }
            ExtensionMessage::StartFocusSession { duration } => {
                match self.focus.start(duration).await {
                    Ok(session) => MessageReply::FocusStarted { session },
                    Err(e) => MessageReply::error(e),
                }
            }
            ExtensionMessage::SyncWithWebApp => MessageReply::Synced {
                report: self.sync.sync_once().await,
            },
            ExtensionMessage::ToggleSite { site } => match self.toggle_blocked(&site).await {
                Ok(blocked) => MessageReply::Toggled {
                    site: normalize_identifier(&site).unwrap_or(site),
                    blocked,
                },
                Err(e) => MessageReply::error(e),
            },
        }
    }
}

impl std::fmt::Debug for FocusGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusGuard")
            .field("store", &self.store)
            .field("gate", &self.gate)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}
