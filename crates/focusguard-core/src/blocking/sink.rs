use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::rules::BlockingRule;
use crate::error::{Result, ValidationError};

/// Where rules get installed: the browser's rule engine, a file the
/// extension loads, or memory.
pub trait RuleSink: Send + Sync {
    fn installed_rule_ids(&self) -> Result<Vec<u32>>;

    fn remove_rules(&self, ids: &[u32]) -> Result<()>;

    /// Fails with a duplicate-entry error if an id is already installed.
    fn add_rules(&self, rules: &[BlockingRule]) -> Result<()>;
}

fn check_collisions(installed: &[BlockingRule], incoming: &[BlockingRule]) -> Result<()> {
    let mut seen: Vec<u32> = installed.iter().map(|r| r.id).collect();
    for rule in incoming {
        if seen.contains(&rule.id) {
            return Err(ValidationError::DuplicateEntry(format!("rule {}", rule.id)).into());
        }
        seen.push(rule.id);
    }
    Ok(())
}

/// A sink operation, as recorded by [`MemoryRuleSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Removed(Vec<u32>),
    Added(Vec<u32>),
}

#[derive(Debug, Default)]
struct MemoryInner {
    installed: Vec<BlockingRule>,
    log: Vec<SinkOp>,
}

/// In-process sink. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleSink {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryRuleSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn installed(&self) -> Vec<BlockingRule> {
        self.lock().installed.clone()
    }

    pub fn log(&self) -> Vec<SinkOp> {
        self.lock().log.clone()
    }
}

impl RuleSink for MemoryRuleSink {
    fn installed_rule_ids(&self) -> Result<Vec<u32>> {
        Ok(self.lock().installed.iter().map(|r| r.id).collect())
    }

    fn remove_rules(&self, ids: &[u32]) -> Result<()> {
        let mut inner = self.lock();
        inner.installed.retain(|r| !ids.contains(&r.id));
        inner.log.push(SinkOp::Removed(ids.to_vec()));
        Ok(())
    }

    fn add_rules(&self, rules: &[BlockingRule]) -> Result<()> {
        let mut inner = self.lock();
        check_collisions(&inner.installed, rules)?;
        inner.installed.extend_from_slice(rules);
        inner.log.push(SinkOp::Added(rules.iter().map(|r| r.id).collect()));
        Ok(())
    }
}

/// Writes the installed rule array as JSON for the browser extension to
/// load. Writes go through a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FileRuleSink {
    path: PathBuf,
}

impl FileRuleSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Vec<BlockingRule>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, rules: &[BlockingRule]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(rules)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RuleSink for FileRuleSink {
    fn installed_rule_ids(&self) -> Result<Vec<u32>> {
        Ok(self.read()?.iter().map(|r| r.id).collect())
    }

    fn remove_rules(&self, ids: &[u32]) -> Result<()> {
        let mut rules = self.read()?;
        rules.retain(|r| !ids.contains(&r.id));
        self.write(&rules)
    }

    fn add_rules(&self, incoming: &[BlockingRule]) -> Result<()> {
        let mut rules = self.read()?;
        check_collisions(&rules, incoming)?;
        rules.extend_from_slice(incoming);
        self.write(&rules)
    }
}
