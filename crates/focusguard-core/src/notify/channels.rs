use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{Notification, NotificationChannel, Permission};
use crate::error::NotificationError;

const APP_NAME: &str = "FocusGuard";

/// Rich channel backed by a desktop notifier program with a
/// `notify-send`-compatible command line.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    program: String,
}

impl CommandChannel {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn resolve(&self) -> Option<PathBuf> {
        if self.program.is_empty() {
            return None;
        }
        let direct = Path::new(&self.program);
        if direct.components().count() > 1 {
            return direct.is_file().then(|| direct.to_path_buf());
        }
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.is_file())
    }

    fn args(notification: &Notification) -> Vec<String> {
        let mut args = vec![
            format!("--app-name={APP_NAME}"),
            format!("--icon={}", notification.icon),
        ];
        if notification.require_interaction {
            args.push("--urgency=critical".into());
        }
        if let Some(timeout) = notification.auto_dismiss {
            args.push(format!("--expire-time={}", timeout.as_millis()));
        }
        for action in &notification.actions {
            args.push(format!("--action={}={}", action.action, action.title));
        }
        args.push(notification.title.clone());
        args.push(notification.body.clone());
        args
    }
}

#[async_trait]
impl NotificationChannel for CommandChannel {
    fn name(&self) -> &'static str {
        "command"
    }

    fn is_supported(&self) -> bool {
        self.resolve().is_some()
    }

    async fn request_permission(&self) -> Permission {
        // Desktop notifiers do not prompt.
        if self.is_supported() {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        let program = self.resolve().ok_or(NotificationError::NotSupported)?;
        let mut command = Command::new(program);
        command
            .args(Self::args(notification))
            .stdin(Stdio::null())
            .stderr(Stdio::null());

        if notification.actions.is_empty() {
            let status = command
                .stdout(Stdio::null())
                .status()
                .await
                .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;
            if !status.success() {
                return Err(NotificationError::DeliveryFailed(format!(
                    "{} exited with {status}",
                    self.program
                )));
            }
            return Ok(());
        }

        // With actions the notifier blocks until the user picks one and then
        // prints the action id. Watch it in the background.
        let mut child = command
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| NotificationError::DeliveryFailed(e.to_string()))?;
        let tag = notification.tag.clone().unwrap_or_default();
        tokio::spawn(async move {
            if let Some(stdout) = child.stdout.take() {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(action)) = lines.next_line().await {
                    tracing::info!(%tag, %action, "notification action chosen");
                }
            }
            let _ = child.wait().await;
        });
        Ok(())
    }
}

/// Basic channel that writes to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleChannel;

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &'static str {
        "console"
    }

    fn is_supported(&self) -> bool {
        true
    }

    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(title = %notification.title, tag = ?notification.tag, "notification");
        eprintln!("[{}] {}", notification.title, notification.body);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    delivered: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

/// Channel that records deliveries in memory. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    name: &'static str,
    supported: bool,
    permission: Permission,
    state: Arc<MemoryState>,
}

impl MemoryChannel {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            supported: true,
            permission: Permission::Granted,
            state: Arc::default(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Make every subsequent delivery fail.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.state
            .delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Titles of delivered notifications, oldest first.
    pub fn titles(&self) -> Vec<String> {
        self.delivered().into_iter().map(|n| n.title).collect()
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_permission(&self) -> Permission {
        self.permission
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::DeliveryFailed(format!(
                "{} is failing",
                self.name
            )));
        }
        self.state
            .delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
