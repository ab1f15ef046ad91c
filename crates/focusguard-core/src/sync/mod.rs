//! Background upload of intervention history to the companion web app.
//!
//! Sync is best-effort: failures are logged and retried on the next window,
//! local data stays untouched until an upload succeeds.

pub mod client;
pub mod credentials;
pub mod service;

pub use client::{SyncClient, SyncPayload};
pub use service::{SyncReport, SyncService, DEFAULT_SYNC_INTERVAL, LAST_SYNC_KEY};
