//! On-disk behaviour of the record store.

use chrono::{Duration, TimeZone, Utc};
use focusguard_core::error::CoreError;
use focusguard_core::gate::BreathingPattern;
use focusguard_core::storage::{ClearScope, InterventionRecord, RecordStore, Settings};
use tempfile::TempDir;

fn record(id: &str, minutes_ago: i64) -> InterventionRecord {
    let base = Utc.with_ymd_and_hms(2026, 5, 10, 18, 0, 0).unwrap();
    InterventionRecord {
        id: id.into(),
        site_or_app_id: "youtube.com".into(),
        display_name: "YouTube".into(),
        timestamp: base - Duration::minutes(minutes_ago),
        duration_seconds: 20,
        was_skipped: true,
        completion_rate: 0.33,
    }
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("focusguard.db");

    {
        let store = RecordStore::open(&path).unwrap();
        assert!(store.is_durable());
        store.put_intervention(&record("a", 30)).await.unwrap();
        store.put_intervention(&record("b", 10)).await.unwrap();
        let settings = Settings {
            intervention_duration_seconds: 90,
            breathing_pattern: BreathingPattern::Box,
            ..Settings::default()
        };
        store.save_settings(&settings).await.unwrap();
        store
            .replace_blocked(&["netflix.com".to_string(), "x.com".to_string()])
            .await
            .unwrap();
    }

    let store = RecordStore::open(&path).unwrap();
    let ids: Vec<_> = store
        .list_interventions(10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
    let got = store.get_intervention("a").await.unwrap().unwrap();
    assert_eq!(got, record("a", 30));

    let settings = store.load_settings().await.unwrap();
    assert_eq!(settings.intervention_duration_seconds, 90);
    assert_eq!(settings.breathing_pattern, BreathingPattern::Box);
    assert_eq!(
        store.blocked_list().await.unwrap(),
        vec!["netflix.com".to_string(), "x.com".to_string()]
    );
}

#[tokio::test]
async fn duplicate_id_is_rejected_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(&dir.path().join("db.sqlite")).unwrap();
    store.put_intervention(&record("same", 5)).await.unwrap();

    let mut changed = record("same", 1);
    changed.was_skipped = false;
    let err = store.put_intervention(&changed).await.unwrap_err();
    assert!(matches!(err, CoreError::DuplicateId { .. }), "{err:?}");

    let kept = store.get_intervention("same").await.unwrap().unwrap();
    assert!(kept.was_skipped);
}

#[tokio::test]
async fn clear_scopes_are_independent() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open(&dir.path().join("db.sqlite")).unwrap();
    store.put_intervention(&record("a", 5)).await.unwrap();
    store.replace_blocked(&["x.com".to_string()]).await.unwrap();

    store.clear(ClearScope::Interventions).await.unwrap();
    assert!(store.list_interventions(10).await.unwrap().is_empty());
    assert_eq!(store.blocked_list().await.unwrap(), vec!["x.com".to_string()]);

    store.clear(ClearScope::All).await.unwrap();
    assert!(store.blocked_list().await.unwrap().is_empty());
    assert_eq!(store.load_settings().await.unwrap(), Settings::default());
}

#[tokio::test]
async fn unusable_path_falls_back_to_memory() {
    let dir = TempDir::new().unwrap();
    // A directory cannot be opened as a database file.
    let store = RecordStore::open_or_memory(dir.path());
    assert!(!store.is_durable());
    store.put_intervention(&record("a", 1)).await.unwrap();
    assert_eq!(store.list_interventions(10).await.unwrap().len(), 1);
}

#[test]
fn file_that_is_not_a_database_fails_migration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("focusguard.db");
    std::fs::write(&path, vec![0x5a_u8; 4096]).unwrap();

    let err = RecordStore::open(&path).unwrap_err();
    assert!(matches!(err, CoreError::StorageUnavailable { .. }), "{err}");
    assert!(err.to_string().contains("migration failed"), "{err}");
}

#[tokio::test]
async fn snapshot_moves_data_between_stores() {
    let dir = TempDir::new().unwrap();
    let source = RecordStore::open(&dir.path().join("a.db")).unwrap();
    source.put_intervention(&record("a", 3)).await.unwrap();
    source.replace_blocked(&["reddit.com".to_string()]).await.unwrap();

    let snapshot = source.export_snapshot(Utc::now()).await.unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();

    let target = RecordStore::open(&dir.path().join("b.db")).unwrap();
    let imported = target
        .import_snapshot(&serde_json::from_str(&json).unwrap())
        .await
        .unwrap();
    assert_eq!(imported, 1);
    assert_eq!(target.blocked_list().await.unwrap(), vec!["reddit.com".to_string()]);

    // Importing again adds nothing.
    assert_eq!(target.import_snapshot(&snapshot).await.unwrap(), 0);
}
