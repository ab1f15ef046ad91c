//! Notification gateway.
//!
//! Delivers user-facing notifications through a rich channel (action
//! buttons, survives the app being backgrounded) with a fallback to a basic
//! transient channel. Only when both fail does the caller see an error.

mod channels;

pub use channels::{CommandChannel, ConsoleChannel, MemoryChannel};

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;

/// Basic notifications close themselves after this long unless they
/// require interaction.
pub const BASIC_AUTO_DISMISS: Duration = Duration::from_secs(5);

pub const DEFAULT_ICON: &str = "/icons/icon-192.png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
        }
    }
}

/// What the caller wants shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub require_interaction: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
}

impl NotificationConfig {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_actions(mut self, actions: Vec<NotificationAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn requiring_interaction(mut self) -> Self {
        self.require_interaction = true;
        self
    }

    /// Sent when a blocked app is opened.
    pub fn intervention_reminder(app_name: &str) -> Self {
        Self::new(
            "Focus Guard Intervention",
            format!("Take a moment to breathe before opening {app_name}"),
        )
        .with_tag("intervention")
        .requiring_interaction()
        .with_actions(vec![
            NotificationAction::new("breathe", "Start Breathing Exercise"),
            NotificationAction::new("skip", "Skip"),
        ])
    }

    pub fn intervention_complete(app_name: &str) -> Self {
        Self::new(
            "Intervention Complete!",
            format!("Great job taking a mindful moment before opening {app_name}"),
        )
        .with_tag("intervention-complete")
    }

    pub fn focus_started(minutes: u64) -> Self {
        Self::new(
            "Focus Session Started",
            format!("All distracting sites are blocked for {minutes} minutes."),
        )
        .with_tag("focus-session")
    }

    pub fn focus_complete() -> Self {
        Self::new(
            "Focus Session Complete!",
            "Great job staying focused! Sites are now unblocked.",
        )
        .with_tag("focus-session")
    }

    pub fn focus_reminder(message: &str) -> Self {
        Self::new("Focus Reminder", message)
            .with_tag("focus-reminder")
            .with_actions(vec![
                NotificationAction::new("start-focus", "Start Focus Session"),
                NotificationAction::new("dismiss", "Dismiss"),
            ])
    }

    pub fn progress_update(interventions: u64, time_saved: &str) -> Self {
        Self::new(
            "Daily Progress Update",
            format!(
                "You've completed {interventions} interventions and saved {time_saved} today!"
            ),
        )
        .with_tag("progress-update")
    }

    pub fn app_blocked(app_name: &str, intervention_count: u64) -> Self {
        Self::new(
            "App Access Blocked",
            format!("{app_name} was blocked. This is your {intervention_count} intervention today."),
        )
        .with_tag("app-blocked")
    }
}

/// A notification as handed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: Option<String>,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
    /// `None` means the notification stays until dismissed.
    pub auto_dismiss: Option<Duration>,
}

impl Notification {
    fn rich(config: &NotificationConfig, default_icon: &str) -> Self {
        let icon = config
            .icon
            .clone()
            .unwrap_or_else(|| default_icon.to_string());
        Self {
            title: config.title.clone(),
            body: config.body.clone(),
            badge: config.badge.clone().unwrap_or_else(|| icon.clone()),
            icon,
            tag: config.tag.clone(),
            require_interaction: config.require_interaction,
            actions: config.actions.clone(),
            auto_dismiss: None,
        }
    }

    fn basic(config: &NotificationConfig, default_icon: &str) -> Self {
        Self {
            actions: Vec::new(),
            auto_dismiss: (!config.require_interaction).then_some(BASIC_AUTO_DISMISS),
            ..Self::rich(config, default_icon)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Not asked yet.
    #[default]
    Default,
    Granted,
    Denied,
}

/// A way of putting a notification in front of the user.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_supported(&self) -> bool;

    async fn request_permission(&self) -> Permission;

    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

pub struct NotificationGateway {
    rich: Option<Box<dyn NotificationChannel>>,
    basic: Option<Box<dyn NotificationChannel>>,
    permission: Mutex<Permission>,
    default_icon: String,
}

impl NotificationGateway {
    pub fn new(
        rich: Option<Box<dyn NotificationChannel>>,
        basic: Option<Box<dyn NotificationChannel>>,
    ) -> Self {
        Self {
            rich,
            basic,
            permission: Mutex::new(Permission::Default),
            default_icon: DEFAULT_ICON.to_string(),
        }
    }

    /// A gateway with no channels; every `show` fails with `NotSupported`.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn with_default_icon(mut self, icon: impl Into<String>) -> Self {
        self.default_icon = icon.into();
        self
    }

    fn supported(&self) -> impl Iterator<Item = &dyn NotificationChannel> {
        self.rich
            .iter()
            .chain(self.basic.iter())
            .map(|c| &**c)
            .filter(|c| c.is_supported())
    }

    pub fn is_supported(&self) -> bool {
        self.supported().next().is_some()
    }

    pub fn permission(&self) -> Permission {
        *self.permission.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_permission(&self, permission: Permission) {
        *self.permission.lock().unwrap_or_else(|p| p.into_inner()) = permission;
    }

    /// Ask for permission once at startup. A decision already made is kept.
    pub async fn initialize(&self) -> Permission {
        match self.permission() {
            Permission::Default => self.request_permission().await,
            decided => decided,
        }
    }

    /// Ask every supported channel; granted if any grants.
    pub async fn request_permission(&self) -> Permission {
        let mut result = Permission::Denied;
        for channel in self.supported() {
            if channel.request_permission().await == Permission::Granted {
                result = Permission::Granted;
                break;
            }
        }
        tracing::debug!(?result, "notification permission");
        self.set_permission(result);
        result
    }

    /// Show a notification.
    ///
    /// # Errors
    /// `NotSupported` when no channel is available, `PermissionDenied` when
    /// permission has not been granted, `DeliveryFailed` when both the rich
    /// and the basic channel failed.
    pub async fn show(&self, config: &NotificationConfig) -> Result<(), NotificationError> {
        if !self.is_supported() {
            return Err(NotificationError::NotSupported);
        }
        if self.permission() != Permission::Granted {
            return Err(NotificationError::PermissionDenied);
        }

        let mut failures = Vec::new();

        if let Some(rich) = self.rich.as_deref().filter(|c| c.is_supported()) {
            let notification = Notification::rich(config, &self.default_icon);
            match rich.deliver(&notification).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(channel = rich.name(), "rich notification failed, falling back: {e}");
                    failures.push(format!("{}: {e}", rich.name()));
                }
            }
        }

        if let Some(basic) = self.basic.as_deref().filter(|c| c.is_supported()) {
            let notification = Notification::basic(config, &self.default_icon);
            match basic.deliver(&notification).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(channel = basic.name(), "basic notification failed: {e}");
                    failures.push(format!("{}: {e}", basic.name()));
                }
            }
        }

        Err(NotificationError::DeliveryFailed(failures.join("; ")))
    }
}

impl std::fmt::Debug for NotificationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationGateway")
            .field("rich", &self.rich.as_ref().map(|c| c.name()))
            .field("basic", &self.basic.as_ref().map(|c| c.name()))
            .field("permission", &self.permission())
            .finish()
    }
}
