//! Blocking rules derived from the block list and the focus session.
//!
//! Rules are never patched: every change regenerates the full set, and the
//! synchronizer withdraws the old set before installing the new one.

mod rules;
mod sink;
mod synchronizer;

pub use rules::{
    generate_rules, BlockingRule, Redirect, ResourceType, RuleAction, RuleCondition, RuleSet,
    DEFAULT_REDIRECT_PATH,
};
pub use sink::{FileRuleSink, MemoryRuleSink, RuleSink, SinkOp};
pub use synchronizer::{BlockingInputs, RuleSynchronizer};

/// Sites blocked on first run.
pub const DEFAULT_BLOCKED_SITES: &[&str] = &[
    "instagram.com",
    "tiktok.com",
    "youtube.com",
    "twitter.com",
    "x.com",
    "reddit.com",
    "facebook.com",
    "netflix.com",
];
