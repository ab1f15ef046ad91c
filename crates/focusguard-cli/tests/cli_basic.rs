//! Basic CLI E2E tests.
//!
//! Each test drives the built binary against its own data directory.

use std::io::Write;
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// A fresh data directory with the desktop notifier disabled.
fn home() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[notifications]\ncommand = \"\"\n",
    )
    .unwrap();
    dir
}

fn command(home: &TempDir, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_focusguard"));
    cmd.args(args)
        .env("FOCUSGUARD_HOME", home.path())
        .env("FOCUSGUARD_LOG", "warn")
        .env_remove("FOCUSGUARD_API_KEY");
    cmd
}

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &TempDir, args: &[&str]) -> (String, String, i32) {
    let output = command(home, args).output().expect("failed to run focusguard");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

fn run_ok(home: &TempDir, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

#[test]
fn test_first_run_has_default_block_list() {
    let home = home();
    let out = run_ok(&home, &["block", "list", "--json"]);
    let sites: Vec<String> = serde_json::from_str(&out).unwrap();
    assert_eq!(sites.len(), 8);
    assert!(sites.contains(&"reddit.com".to_string()));
}

#[test]
fn test_block_add_remove_toggle() {
    let home = home();
    let out = run_ok(&home, &["block", "add", "https://www.Example.org/path"]);
    assert!(out.contains("blocked example.org"), "{out}");
    let out = run_ok(&home, &["block", "add", "example.org"]);
    assert!(out.contains("already blocked"), "{out}");

    let out = run_ok(&home, &["block", "toggle", "example.org"]);
    assert!(out.contains("unblocked example.org"), "{out}");
    let out = run_ok(&home, &["block", "remove", "example.org"]);
    assert!(out.contains("not blocked"), "{out}");

    let out = run_ok(&home, &["block", "check", "https://old.reddit.com/r/rust"]);
    assert!(out.contains("blocked (reddit.com)"), "{out}");
}

#[test]
fn test_focus_session_writes_rules() {
    let home = home();
    let out = run_ok(&home, &["focus", "start", "15"]);
    assert!(out.contains("focus session started: 15 min"), "{out}");

    let status: serde_json::Value =
        serde_json::from_str(&run_ok(&home, &["focus", "status", "--json"])).unwrap();
    assert_eq!(status["active"], true);

    let rules: Vec<serde_json::Value> =
        serde_json::from_str(&run_ok(&home, &["rules", "show"])).unwrap();
    assert_eq!(rules.len(), 8);
    assert_eq!(rules[0]["id"], 1);
    assert_eq!(rules[0]["action"]["type"], "redirect");

    run_ok(&home, &["focus", "stop"]);
    let rules: Vec<serde_json::Value> =
        serde_json::from_str(&run_ok(&home, &["rules", "show"])).unwrap();
    assert!(rules.is_empty());
}

#[test]
fn test_zero_minute_focus_fails() {
    let home = home();
    let (_, stderr, code) = run_cli(&home, &["focus", "start", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "{stderr}");
}

#[test]
fn test_settings_get_set() {
    let home = home();
    assert_eq!(run_ok(&home, &["settings", "get", "allowSkip"]).trim(), "true");
    run_ok(&home, &["settings", "set", "allowSkip", "false"]);
    assert_eq!(run_ok(&home, &["settings", "get", "allowSkip"]).trim(), "false");
    run_ok(&home, &["settings", "set", "breathingPattern", "box"]);
    assert_eq!(run_ok(&home, &["settings", "get", "breathingPattern"]).trim(), "box");

    let (_, stderr, code) = run_cli(&home, &["settings", "set", "breathingPattern", "square"]);
    assert_eq!(code, 1, "{stderr}");
}

#[test]
fn test_config_get_set() {
    let home = home();
    run_ok(&home, &["config", "set", "focus.default_minutes", "45"]);
    assert_eq!(run_ok(&home, &["config", "get", "focus.default_minutes"]).trim(), "45");

    let (_, stderr, code) = run_cli(&home, &["config", "get", "no.such.key"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"), "{stderr}");
}

#[test]
fn test_history_and_stats_start_empty() {
    let home = home();
    let out = run_ok(&home, &["history", "--json"]);
    let records: Vec<serde_json::Value> = serde_json::from_str(&out).unwrap();
    assert!(records.is_empty());

    let stats: serde_json::Value =
        serde_json::from_str(&run_ok(&home, &["stats", "--json"])).unwrap();
    assert_eq!(stats["interventions"], 0);
    assert_eq!(stats["timeSavedMinutes"], 0);
}

#[test]
fn test_sync_unconfigured_is_skipped() {
    let home = home();
    let out = run_ok(&home, &["sync", "now"]);
    assert!(out.contains("sync skipped"), "{out}");
    let out = run_ok(&home, &["sync", "status"]);
    assert!(out.contains("configured: no"), "{out}");
    assert!(out.contains("last sync: never"), "{out}");
}

#[test]
fn test_data_export_import() {
    let home = home();
    run_ok(&home, &["block", "list"]);
    let export = home.path().join("export.json");
    run_ok(&home, &["data", "export", "--output", export.to_str().unwrap()]);

    run_ok(&home, &["data", "reset", "--scope", "blocked"]);
    let sites: Vec<String> =
        serde_json::from_str(&run_ok(&home, &["block", "list", "--json"])).unwrap();
    assert!(sites.is_empty());

    run_ok(&home, &["data", "import", export.to_str().unwrap()]);
    let sites: Vec<String> =
        serde_json::from_str(&run_ok(&home, &["block", "list", "--json"])).unwrap();
    assert_eq!(sites.len(), 8);
}

#[test]
fn test_daemon_answers_one_line_per_message() {
    let home = home();
    let mut child = command(&home, &["daemon"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, r#"{{"action":"toggleSite","site":"news.ycombinator.com"}}"#).unwrap();
        writeln!(stdin, r#"{{"action":"startFocusSession","duration":10}}"#).unwrap();
        writeln!(stdin, "not json").unwrap();
        writeln!(stdin, r#"{{"appLaunched":"com.example.editor","name":"Editor"}}"#).unwrap();
    }
    drop(child.stdin.take());
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let replies: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(replies.len(), 4);
    assert_eq!(replies[0]["result"], "toggled");
    assert_eq!(replies[0]["blocked"], true);
    assert_eq!(replies[1]["result"], "focusStarted");
    assert_eq!(replies[2]["result"], "error");
    assert_eq!(replies[3]["result"], "notBlocked");
}
