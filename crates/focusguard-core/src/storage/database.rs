//! Local record store.
//!
//! Holds the three record collections (intervention history, the settings
//! singleton, the ordered block list) plus a small key-value table. SQLite is
//! the durable backend; when it cannot be opened the store degrades to an
//! in-memory backend with the same semantics.
//!
//! Writes are serialized per collection: every mutating call first takes that
//! collection's async write lock, so two `replace_blocked` calls never
//! interleave even when issued from different tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::migrations;
use super::records::{ClearScope, DailySummary, DataSnapshot, InterventionRecord, Settings};
use crate::error::{CoreError, DatabaseError, Result, ValidationError};

const SETTINGS_KEY: &str = "appSettings";
const INTERVENTIONS: &str = "interventions";

/// Storage operations shared by the SQLite and in-memory backends.
trait Backend: Send {
    fn insert_intervention(&mut self, record: &InterventionRecord) -> Result<()>;
    fn get_intervention(&self, id: &str) -> Result<Option<InterventionRecord>>;
    fn list_interventions(&self, limit: usize) -> Result<Vec<InterventionRecord>>;
    fn interventions_since(&self, since: DateTime<Utc>) -> Result<Vec<InterventionRecord>>;
    fn delete_interventions(&mut self, ids: &[String]) -> Result<usize>;
    fn load_settings(&self) -> Result<Option<Settings>>;
    fn save_settings(&mut self, settings: &Settings) -> Result<()>;
    fn blocked(&self) -> Result<Vec<String>>;
    fn replace_blocked(&mut self, items: &[String]) -> Result<()>;
    fn clear(&mut self, scope: ClearScope) -> Result<()>;
    fn kv_get(&self, key: &str) -> Result<Option<String>>;
    fn kv_set(&mut self, key: &str, value: &str) -> Result<()>;
    fn kv_delete(&mut self, key: &str) -> Result<()>;
}

// ── SQLite backend ───────────────────────────────────────────────────

struct SqliteBackend {
    conn: Connection,
}

fn is_primary_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<InterventionRecord> {
    let raw_ts: String = row.get(3)?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(InterventionRecord {
        id: row.get(0)?,
        site_or_app_id: row.get(1)?,
        display_name: row.get(2)?,
        timestamp,
        duration_seconds: row.get(4)?,
        was_skipped: row.get(5)?,
        completion_rate: row.get(6)?,
    })
}

const RECORD_COLUMNS: &str =
    "id, site_or_app_id, display_name, timestamp, duration_seconds, was_skipped, completion_rate";

impl Backend for SqliteBackend {
    fn insert_intervention(&mut self, record: &InterventionRecord) -> Result<()> {
        let result = self.conn.execute(
            "INSERT INTO interventions
             (id, site_or_app_id, display_name, timestamp, duration_seconds, was_skipped, completion_rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.site_or_app_id,
                record.display_name,
                format_ts(record.timestamp),
                record.duration_seconds,
                record.was_skipped,
                record.completion_rate,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_primary_key_violation(&e) => Err(CoreError::DuplicateId {
                collection: INTERVENTIONS.into(),
                id: record.id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn get_intervention(&self, id: &str) -> Result<Option<InterventionRecord>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM interventions WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()?)
    }

    fn list_interventions(&self, limit: usize) -> Result<Vec<InterventionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM interventions
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn interventions_since(&self, since: DateTime<Utc>) -> Result<Vec<InterventionRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM interventions
             WHERE timestamp >= ?1
             ORDER BY timestamp DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![format_ts(since)], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete_interventions(&mut self, ids: &[String]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM interventions WHERE id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    fn load_settings(&self) -> Result<Option<Settings>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![SETTINGS_KEY, json],
        )?;
        Ok(())
    }

    fn blocked(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM blocked ORDER BY position ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn replace_blocked(&mut self, items: &[String]) -> Result<()> {
        // Clear-then-insert inside one transaction: any failure rolls back to
        // the previous list when `tx` is dropped uncommitted.
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM blocked", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO blocked (id, position) VALUES (?1, ?2)")?;
            for (position, id) in items.iter().enumerate() {
                let position = i64::try_from(position).unwrap_or(i64::MAX);
                if let Err(e) = stmt.execute(params![id, position]) {
                    if is_primary_key_violation(&e) {
                        return Err(ValidationError::DuplicateEntry(id.clone()).into());
                    }
                    return Err(e.into());
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self, scope: ClearScope) -> Result<()> {
        let sql = match scope {
            ClearScope::Interventions => "DELETE FROM interventions;",
            ClearScope::Settings => "DELETE FROM settings;",
            ClearScope::Blocked => "DELETE FROM blocked;",
            ClearScope::All => {
                "DELETE FROM interventions; DELETE FROM settings; DELETE FROM blocked;"
            }
        };
        let tx = self.conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.commit()?;
        Ok(())
    }

    fn kv_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?)
    }

    fn kv_set(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn kv_delete(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

// ── In-memory backend ────────────────────────────────────────────────

#[derive(Default)]
struct MemoryBackend {
    interventions: Vec<InterventionRecord>,
    settings: Option<Settings>,
    blocked: Vec<String>,
    kv: HashMap<String, String>,
}

impl MemoryBackend {
    fn sorted(&self) -> Vec<InterventionRecord> {
        let mut all = self.interventions.clone();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        all
    }
}

impl Backend for MemoryBackend {
    fn insert_intervention(&mut self, record: &InterventionRecord) -> Result<()> {
        if self.interventions.iter().any(|r| r.id == record.id) {
            return Err(CoreError::DuplicateId {
                collection: INTERVENTIONS.into(),
                id: record.id.clone(),
            });
        }
        self.interventions.push(record.clone());
        Ok(())
    }

    fn get_intervention(&self, id: &str) -> Result<Option<InterventionRecord>> {
        Ok(self.interventions.iter().find(|r| r.id == id).cloned())
    }

    fn list_interventions(&self, limit: usize) -> Result<Vec<InterventionRecord>> {
        Ok(self.sorted().into_iter().take(limit).collect())
    }

    fn interventions_since(&self, since: DateTime<Utc>) -> Result<Vec<InterventionRecord>> {
        Ok(self
            .sorted()
            .into_iter()
            .filter(|r| r.timestamp >= since)
            .collect())
    }

    fn delete_interventions(&mut self, ids: &[String]) -> Result<usize> {
        let before = self.interventions.len();
        self.interventions.retain(|r| !ids.contains(&r.id));
        Ok(before - self.interventions.len())
    }

    fn load_settings(&self) -> Result<Option<Settings>> {
        Ok(self.settings.clone())
    }

    fn save_settings(&mut self, settings: &Settings) -> Result<()> {
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn blocked(&self) -> Result<Vec<String>> {
        Ok(self.blocked.clone())
    }

    fn replace_blocked(&mut self, items: &[String]) -> Result<()> {
        let mut next: Vec<String> = Vec::with_capacity(items.len());
        for id in items {
            if next.contains(id) {
                return Err(ValidationError::DuplicateEntry(id.clone()).into());
            }
            next.push(id.clone());
        }
        self.blocked = next;
        Ok(())
    }

    fn clear(&mut self, scope: ClearScope) -> Result<()> {
        match scope {
            ClearScope::Interventions => self.interventions.clear(),
            ClearScope::Settings => self.settings = None,
            ClearScope::Blocked => self.blocked.clear(),
            ClearScope::All => {
                self.interventions.clear();
                self.settings = None;
                self.blocked.clear();
            }
        }
        Ok(())
    }

    fn kv_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.kv.get(key).cloned())
    }

    fn kv_set(&mut self, key: &str, value: &str) -> Result<()> {
        self.kv.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn kv_delete(&mut self, key: &str) -> Result<()> {
        self.kv.remove(key);
        Ok(())
    }
}

// ── Store ────────────────────────────────────────────────────────────

#[derive(Default)]
struct WriteLocks {
    interventions: tokio::sync::Mutex<()>,
    settings: tokio::sync::Mutex<()>,
    blocked: tokio::sync::Mutex<()>,
    kv: tokio::sync::Mutex<()>,
}

struct StoreInner {
    backend: Mutex<Box<dyn Backend>>,
    locks: WriteLocks,
    location: Option<PathBuf>,
}

/// Local, durable store for intervention history, settings and the block
/// list. Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<StoreInner>,
}

static DEGRADED_WARNING: Once = Once::new();

impl RecordStore {
    fn from_backend(backend: Box<dyn Backend>, location: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend: Mutex::new(backend),
                locks: WriteLocks::default(),
                location,
            }),
        }
    }

    /// Open (creating if needed) the SQLite store at `path`.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the file cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let unavailable = |message: String| CoreError::StorageUnavailable {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| unavailable(e.to_string()))?;
        migrations::migrate(&conn)
            .map_err(|e| unavailable(DatabaseError::MigrationFailed(e.to_string()).to_string()))?;
        tracing::debug!(path = %path.display(), "record store opened");
        Ok(Self::from_backend(
            Box::new(SqliteBackend { conn }),
            Some(path.to_path_buf()),
        ))
    }

    /// Open the SQLite store, degrading to a non-durable in-memory store if
    /// the persistence layer is unavailable. The degradation is warned about
    /// once per process.
    pub fn open_or_memory(path: &Path) -> Self {
        match Self::open(path) {
            Ok(store) => store,
            Err(err) => {
                DEGRADED_WARNING.call_once(|| {
                    tracing::warn!("{err}; falling back to in-memory storage (not durable)");
                });
                Self::in_memory()
            }
        }
    }

    /// A non-durable in-memory store.
    pub fn in_memory() -> Self {
        Self::from_backend(Box::<MemoryBackend>::default(), None)
    }

    /// Open the default store at `<data_dir>/focusguard.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be resolved or the
    /// database cannot be opened.
    pub fn open_default() -> Result<Self> {
        let path = super::data_dir()?.join("focusguard.db");
        Self::open(&path)
    }

    /// Whether writes survive a restart.
    pub fn is_durable(&self) -> bool {
        self.inner.location.is_some()
    }

    pub fn location(&self) -> Option<&Path> {
        self.inner.location.as_deref()
    }

    fn with_backend<T>(&self, f: impl FnOnce(&mut dyn Backend) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .backend
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(guard.as_mut())
    }

    // ── Interventions ────────────────────────────────────────────────

    /// Append an intervention record.
    ///
    /// # Errors
    /// Returns `DuplicateId` if a record with the same id exists.
    pub async fn put_intervention(&self, record: &InterventionRecord) -> Result<()> {
        let _write = self.inner.locks.interventions.lock().await;
        self.with_backend(|b| b.insert_intervention(record))
    }

    pub async fn get_intervention(&self, id: &str) -> Result<Option<InterventionRecord>> {
        self.with_backend(|b| b.get_intervention(id))
    }

    /// Newest first, at most `limit` records.
    pub async fn list_interventions(&self, limit: usize) -> Result<Vec<InterventionRecord>> {
        self.with_backend(|b| b.list_interventions(limit))
    }

    pub async fn interventions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<InterventionRecord>> {
        self.with_backend(|b| b.interventions_since(since))
    }

    /// Delete the given records, typically after they were uploaded.
    /// Unknown ids are ignored. Returns how many were deleted.
    pub async fn delete_interventions(&self, ids: &[String]) -> Result<usize> {
        let _write = self.inner.locks.interventions.lock().await;
        self.with_backend(|b| b.delete_interventions(ids))
    }

    /// Counts for the UTC day containing `now`.
    pub async fn daily_summary(&self, now: DateTime<Utc>) -> Result<DailySummary> {
        let start_of_day = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        let today = self.interventions_since(start_of_day).await?;
        Ok(DailySummary::from_records(&today))
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// Stored settings, or defaults when none were saved.
    pub async fn load_settings(&self) -> Result<Settings> {
        Ok(self.with_backend(|b| b.load_settings())?.unwrap_or_default())
    }

    /// Overwrite the settings record wholesale.
    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let _write = self.inner.locks.settings.lock().await;
        self.with_backend(|b| b.save_settings(settings))
    }

    // ── Block list ───────────────────────────────────────────────────

    pub async fn blocked_list(&self) -> Result<Vec<String>> {
        self.with_backend(|b| b.blocked())
    }

    /// Replace the block list atomically. On any failure the previous list
    /// is left intact.
    ///
    /// # Errors
    /// Returns `Validation(DuplicateEntry)` when `items` repeats an entry.
    pub async fn replace_blocked(&self, items: &[String]) -> Result<()> {
        let _write = self.inner.locks.blocked.lock().await;
        self.with_backend(|b| b.replace_blocked(items))
    }

    /// Add `id` if absent, remove it if present. Returns the new list and
    /// whether `id` is now blocked.
    pub async fn toggle_blocked(&self, id: &str) -> Result<(Vec<String>, bool)> {
        let _write = self.inner.locks.blocked.lock().await;
        self.with_backend(|b| {
            let mut list = b.blocked()?;
            let now_blocked = if let Some(pos) = list.iter().position(|s| s == id) {
                list.remove(pos);
                false
            } else {
                list.push(id.to_string());
                true
            };
            b.replace_blocked(&list)?;
            Ok((list, now_blocked))
        })
    }

    // ── Maintenance ──────────────────────────────────────────────────

    pub async fn clear(&self, scope: ClearScope) -> Result<()> {
        let locks = &self.inner.locks;
        match scope {
            ClearScope::Interventions => {
                let _w = locks.interventions.lock().await;
                self.with_backend(|b| b.clear(scope))
            }
            ClearScope::Settings => {
                let _w = locks.settings.lock().await;
                self.with_backend(|b| b.clear(scope))
            }
            ClearScope::Blocked => {
                let _w = locks.blocked.lock().await;
                self.with_backend(|b| b.clear(scope))
            }
            ClearScope::All => {
                // Fixed acquisition order.
                let _a = locks.interventions.lock().await;
                let _b = locks.settings.lock().await;
                let _c = locks.blocked.lock().await;
                self.with_backend(|b| b.clear(scope))
            }
        }
    }

    pub async fn kv_get(&self, key: &str) -> Result<Option<String>> {
        self.with_backend(|b| b.kv_get(key))
    }

    pub async fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        let _write = self.inner.locks.kv.lock().await;
        self.with_backend(|b| b.kv_set(key, value))
    }

    pub async fn kv_delete(&self, key: &str) -> Result<()> {
        let _write = self.inner.locks.kv.lock().await;
        self.with_backend(|b| b.kv_delete(key))
    }

    /// Export everything (up to 100 most recent interventions, matching the
    /// history view) as one bundle.
    pub async fn export_snapshot(&self, now: DateTime<Utc>) -> Result<DataSnapshot> {
        Ok(DataSnapshot {
            interventions: self.list_interventions(100).await?,
            settings: self.load_settings().await?,
            blocked: self.blocked_list().await?,
            last_sync: now,
        })
    }

    /// Import a bundle: settings and block list are replaced, interventions
    /// are appended. Records whose id already exists are skipped. Returns the
    /// number of records imported.
    pub async fn import_snapshot(&self, snapshot: &DataSnapshot) -> Result<usize> {
        self.save_settings(&snapshot.settings).await?;
        self.replace_blocked(&snapshot.blocked).await?;
        let mut imported = 0;
        for record in &snapshot.interventions {
            match self.put_intervention(record).await {
                Ok(()) => imported += 1,
                Err(CoreError::DuplicateId { id, .. }) => {
                    tracing::debug!(%id, "skipping already-present intervention on import");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(imported)
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("location", &self.inner.location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str, site: &str, ts: DateTime<Utc>) -> InterventionRecord {
        InterventionRecord {
            id: id.into(),
            site_or_app_id: site.into(),
            display_name: site.into(),
            timestamp: ts,
            duration_seconds: 60,
            was_skipped: false,
            completion_rate: 1.0,
        }
    }

    fn sqlite_store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn put_then_get_round_trips_on_both_backends() {
        let (_dir, sqlite) = sqlite_store();
        for store in [sqlite, RecordStore::in_memory()] {
            let r = record("1-instagram", "instagram", Utc::now());
            store.put_intervention(&r).await.unwrap();
            let fetched = store.get_intervention(&r.id).await.unwrap().unwrap();
            assert_eq!(fetched.id, r.id);
            assert_eq!(fetched.site_or_app_id, r.site_or_app_id);
            assert_eq!(
                fetched.timestamp.timestamp_millis(),
                r.timestamp.timestamp_millis()
            );
            assert!(store.get_intervention("missing").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_not_overwritten() {
        let (_dir, sqlite) = sqlite_store();
        for store in [sqlite, RecordStore::in_memory()] {
            let first = record("dup", "a.com", Utc::now());
            let mut second = first.clone();
            second.display_name = "changed".into();

            store.put_intervention(&first).await.unwrap();
            let err = store.put_intervention(&second).await.unwrap_err();
            assert!(matches!(err, CoreError::DuplicateId { .. }));

            let kept = store.get_intervention("dup").await.unwrap().unwrap();
            assert_eq!(kept.display_name, "a.com");
        }
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let (_dir, sqlite) = sqlite_store();
        for store in [sqlite, RecordStore::in_memory()] {
            let base = Utc::now();
            for i in 0..5 {
                let ts = base + Duration::seconds(i);
                store
                    .put_intervention(&record(&format!("r{i}"), "x", ts))
                    .await
                    .unwrap();
            }
            let listed = store.list_interventions(3).await.unwrap();
            let ids: Vec<_> = listed.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, vec!["r4", "r3", "r2"]);
        }
    }

    #[tokio::test]
    async fn settings_default_when_absent_and_overwrite_wholesale() {
        let (_dir, store) = sqlite_store();
        assert_eq!(store.load_settings().await.unwrap(), Settings::default());

        let mut s = Settings::default();
        s.allow_skip = false;
        s.skip_delay_seconds = 30;
        store.save_settings(&s).await.unwrap();
        assert_eq!(store.load_settings().await.unwrap(), s);

        store.clear(ClearScope::Settings).await.unwrap();
        assert_eq!(store.load_settings().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn replace_blocked_preserves_order() {
        let (_dir, sqlite) = sqlite_store();
        for store in [sqlite, RecordStore::in_memory()] {
            let l = list(&["tiktok.com", "a.com", "reddit.com"]);
            store.replace_blocked(&l).await.unwrap();
            assert_eq!(store.blocked_list().await.unwrap(), l);
        }
    }

    #[tokio::test]
    async fn replace_blocked_with_duplicate_leaves_previous_list() {
        let (_dir, sqlite) = sqlite_store();
        for store in [sqlite, RecordStore::in_memory()] {
            let before = list(&["a.com", "b.com"]);
            store.replace_blocked(&before).await.unwrap();

            let err = store
                .replace_blocked(&list(&["c.com", "d.com", "c.com"]))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                CoreError::Validation(ValidationError::DuplicateEntry(ref id)) if id == "c.com"
            ));
            assert_eq!(store.blocked_list().await.unwrap(), before);
        }
    }

    #[tokio::test]
    async fn replace_blocked_rolls_back_on_fault_after_partial_insert() {
        let (_dir, store) = sqlite_store();
        let before = list(&["a.com", "b.com"]);
        store.replace_blocked(&before).await.unwrap();

        // Simulated storage fault on the third insert.
        let path = store.location().unwrap().to_path_buf();
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER fail_on_boom BEFORE INSERT ON blocked
             WHEN NEW.id = 'boom.com'
             BEGIN SELECT RAISE(ABORT, 'simulated fault'); END;",
        )
        .unwrap();
        drop(conn);

        let result = store
            .replace_blocked(&list(&["x.com", "y.com", "boom.com", "z.com"]))
            .await;
        assert!(result.is_err());
        assert_eq!(store.blocked_list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn toggle_adds_then_removes() {
        let store = RecordStore::in_memory();
        store.replace_blocked(&list(&["a.com"])).await.unwrap();

        let (l, blocked) = store.toggle_blocked("b.com").await.unwrap();
        assert!(blocked);
        assert_eq!(l, list(&["a.com", "b.com"]));

        let (l, blocked) = store.toggle_blocked("a.com").await.unwrap();
        assert!(!blocked);
        assert_eq!(l, list(&["b.com"]));
    }

    #[tokio::test]
    async fn concurrent_replace_calls_never_interleave() {
        let (_dir, store) = sqlite_store();
        let a = list(&["a1", "a2", "a3", "a4"]);
        let b = list(&["b1", "b2", "b3"]);
        let (s1, s2) = (store.clone(), store.clone());
        let (a2, b2) = (a.clone(), b.clone());
        let t1 = tokio::spawn(async move { s1.replace_blocked(&a2).await });
        let t2 = tokio::spawn(async move { s2.replace_blocked(&b2).await });
        t1.await.unwrap().unwrap();
        t2.await.unwrap().unwrap();
        let result = store.blocked_list().await.unwrap();
        assert!(result == a || result == b, "interleaved: {result:?}");
    }

    #[tokio::test]
    async fn clear_all_wipes_every_collection() {
        let (_dir, store) = sqlite_store();
        store
            .put_intervention(&record("1", "a", Utc::now()))
            .await
            .unwrap();
        store.replace_blocked(&list(&["a"])).await.unwrap();
        let mut s = Settings::default();
        s.allow_skip = false;
        store.save_settings(&s).await.unwrap();

        store.clear(ClearScope::All).await.unwrap();
        assert!(store.list_interventions(10).await.unwrap().is_empty());
        assert!(store.blocked_list().await.unwrap().is_empty());
        assert_eq!(store.load_settings().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn delete_interventions_only_touches_named_ids() {
        let (_dir, sqlite) = sqlite_store();
        for store in [sqlite, RecordStore::in_memory()] {
            let now = Utc::now();
            for id in ["a", "b", "c"] {
                store.put_intervention(&record(id, "x", now)).await.unwrap();
            }
            let ids = vec!["a".to_string(), "c".to_string(), "zzz".to_string()];
            assert_eq!(store.delete_interventions(&ids).await.unwrap(), 2);
            let left = store.list_interventions(10).await.unwrap();
            assert_eq!(left.len(), 1);
            assert_eq!(left[0].id, "b");
        }
    }

    #[tokio::test]
    async fn kv_store() {
        let store = RecordStore::in_memory();
        assert!(store.kv_get("test").await.unwrap().is_none());
        store.kv_set("test", "hello").await.unwrap();
        assert_eq!(store.kv_get("test").await.unwrap().unwrap(), "hello");
        store.kv_delete("test").await.unwrap();
        assert!(store.kv_get("test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_or_memory_degrades_when_path_is_unusable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the database file should be.
        let path = dir.path().join("not-a-file");
        std::fs::create_dir_all(&path).unwrap();
        let store = RecordStore::open_or_memory(&path);
        assert!(!store.is_durable());
        store.replace_blocked(&list(&["a.com"])).await.unwrap();
        assert_eq!(store.blocked_list().await.unwrap(), list(&["a.com"]));
    }

    #[tokio::test]
    async fn daily_summary_only_counts_today() {
        let store = RecordStore::in_memory();
        let now = Utc::now();
        store.put_intervention(&record("t1", "a", now)).await.unwrap();
        let mut skipped = record("t2", "a", now);
        skipped.was_skipped = true;
        store.put_intervention(&skipped).await.unwrap();
        store
            .put_intervention(&record("old", "a", now - Duration::days(2)))
            .await
            .unwrap();

        let summary = store.daily_summary(now).await.unwrap();
        assert_eq!(summary.interventions, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.time_saved_minutes, 10);
    }

    #[tokio::test]
    async fn export_import_round_trip_skips_existing_ids() {
        let source = RecordStore::in_memory();
        source
            .put_intervention(&record("1", "a.com", Utc::now()))
            .await
            .unwrap();
        source.replace_blocked(&list(&["a.com", "b.com"])).await.unwrap();
        let snapshot = source.export_snapshot(Utc::now()).await.unwrap();

        let target = RecordStore::in_memory();
        assert_eq!(target.import_snapshot(&snapshot).await.unwrap(), 1);
        assert_eq!(target.import_snapshot(&snapshot).await.unwrap(), 0);
        assert_eq!(target.blocked_list().await.unwrap(), snapshot.blocked);
    }
}
