//! # FocusGuard Core Library
//!
//! Core logic for FocusGuard, a digital-wellbeing tool that puts a short
//! breathing exercise between the user and a distracting site or app. The
//! `focusguard` CLI and the browser extension bridge are thin layers over
//! this crate.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite record store (with an in-memory fallback) and TOML
//!   configuration
//! - **Notifications**: rich channel first, basic channel as fallback
//! - **Blocking**: declarative redirect rules regenerated from the block list
//!   whenever it or the focus session changes
//! - **Gate**: one countdown-driven breathing intervention per origin
//! - **Focus**: a timed session that turns blocking rules on while it runs
//! - **Sync**: periodic upload of intervention records to the web app
//!
//! ## Key Components
//!
//! - [`FocusGuard`]: the service context owning all of the above
//! - [`RecordStore`]: persistence
//! - [`InterventionGate`]: intervention lifecycle
//! - [`Config`]: application configuration

pub mod blocking;
pub mod clock;
pub mod error;
pub mod focus;
pub mod gate;
pub mod notify;
pub mod service;
pub mod storage;
pub mod sync;

pub use blocking::{BlockingRule, RuleSet, RuleSynchronizer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    ConfigError, CoreError, DatabaseError, GateError, NotificationError, SyncError,
    ValidationError,
};
pub use focus::{FocusSession, FocusTimer};
pub use gate::{BreathingPattern, GateOutcome, InterventionGate};
pub use notify::{NotificationConfig, NotificationGateway};
pub use service::{ExtensionMessage, FocusGuard, MessageReply};
pub use storage::{Config, InterventionRecord, RecordStore, Settings};
pub use sync::{SyncReport, SyncService};
