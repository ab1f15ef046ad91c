use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::rules::{generate_rules, BlockingRule, RuleSet, DEFAULT_REDIRECT_PATH};
use super::sink::RuleSink;
use crate::error::Result;

/// Everything the rule set is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockingInputs {
    pub blocked: Vec<String>,
    pub focus_active: bool,
}

/// Keeps a [`RuleSink`] in step with the block list and focus state.
pub struct RuleSynchronizer {
    sink: Arc<dyn RuleSink>,
    redirect_path: String,
    current: Mutex<RuleSet>,
}

impl RuleSynchronizer {
    pub fn new(sink: Arc<dyn RuleSink>) -> Self {
        Self {
            sink,
            redirect_path: DEFAULT_REDIRECT_PATH.to_string(),
            current: Mutex::new(RuleSet::default()),
        }
    }

    pub fn with_redirect_path(mut self, path: impl Into<String>) -> Self {
        self.redirect_path = path.into();
        self
    }

    /// The rule set installed by the last successful resync.
    pub fn current(&self) -> RuleSet {
        self.current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Withdraw every installed rule, then install the set derived from
    /// the inputs. Concurrent calls are serialized.
    ///
    /// # Errors
    /// Returns the sink's error. A failed install leaves no rules installed.
    pub fn resync(&self, blocked: &[String], focus_active: bool) -> Result<Vec<BlockingRule>> {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());

        let installed = self.sink.installed_rule_ids()?;
        if !installed.is_empty() {
            self.sink.remove_rules(&installed)?;
        }
        *current = RuleSet::default();

        let rules = generate_rules(blocked, focus_active, &self.redirect_path);
        if !rules.is_empty() {
            self.sink.add_rules(&rules)?;
        }
        tracing::debug!(
            removed = installed.len(),
            installed = rules.len(),
            focus_active,
            "blocking rules resynced"
        );
        *current = RuleSet::new(rules.clone());
        Ok(rules)
    }

    /// Re-run [`resync`](Self::resync) on the current inputs and on every
    /// change. The task ends when the sender is dropped.
    pub fn spawn(self: Arc<Self>, mut inputs: watch::Receiver<BlockingInputs>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let snapshot = inputs.borrow_and_update().clone();
                if let Err(e) = self.resync(&snapshot.blocked, snapshot.focus_active) {
                    tracing::warn!("failed to resync blocking rules: {e}");
                }
                if inputs.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

impl std::fmt::Debug for RuleSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSynchronizer")
            .field("redirect_path", &self.redirect_path)
            .field("installed", &self.current().len())
            .finish()
    }
}
