// End-to-end tests for the `fbook` binary.
//
// Every command runs with HOME / XDG dirs pointed at a temp dir so a
// developer's own settings.toml or keychain token cannot leak in.
//
// Run with: cargo test -p floorbook-cli --test cli_tests

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use httpmock::prelude::*;
use tempfile::TempDir;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../recon/tests/fixtures")
}

fn fixture(name: &str) -> String {
    fixtures_dir().join(name).to_string_lossy().into_owned()
}

fn fbook(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_fbook"));
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"))
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("FLOORBOOK_FEED_TOKEN")
        .env_remove("FLOORBOOK_DB")
        .env_remove("FLOORBOOK_LOG");
    cmd
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_str(stdout(output).trim()).unwrap_or_else(|e| {
        panic!("stdout must be one JSON value: {e}\nstdout:\n{}", stdout(output))
    })
}

fn sync_args(db: &Path) -> Vec<String> {
    vec![
        "sync".into(),
        "--orders".into(),
        fixture("orders.json"),
        "--customers".into(),
        fixture("customers.json"),
        "-c".into(),
        fixture("term2.sync.toml"),
        "--today".into(),
        "2025-06-05".into(),
        "--db".into(),
        db.to_string_lossy().into_owned(),
        "--json".into(),
    ]
}

// ===========================================================================
// fbook validate
// ===========================================================================

#[test]
fn validate_accepts_fixture_config() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .args(["validate", &fixture("term2.sync.toml")])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("valid: 'Term 2 sync' term 2"));
}

#[test]
fn validate_rejects_bad_config_with_exit_4() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("bad.sync.toml");
    std::fs::write(&path, "[term]\ncurrent = \"two\"\n").unwrap();

    let output = fbook(home.path())
        .args(["validate", path.to_str().unwrap()])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(4));
    assert!(stderr(&output).contains("term.current"));
}

#[test]
fn token_status_reports_env_token() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .env("FLOORBOOK_FEED_TOKEN", "tok_env")
        .args(["token", "status", "--json"])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = json(&output);
    assert_eq!(val["token"], "present");
    assert_eq!(val["source"], "environment");
    assert_eq!(val["env_var"], "FLOORBOOK_FEED_TOKEN");
    assert!(!stdout(&output).contains("tok_env"));
}

// ===========================================================================
// fbook classify
// ===========================================================================

#[test]
fn classify_bundle_lists_grants() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .args(["classify", "Unlimited Bundle", "Term 2B / Leader"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("Bundle, term 2, block B, role Leader"), "{out}");
    assert!(out.contains("grants Level 3, term 2, block B, role Leader"));
    assert!(out.contains("grants Shines, term 2, block B, role None"));
}

#[test]
fn classify_json_free_class() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .args([
            "classify",
            "Free Class - New York Salsa",
            "Tuesday 27th May / Follower",
            "--json",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let val = json(&output);
    assert_eq!(val["result"]["class_name"], "Free Class");
    assert_eq!(val["result"]["role"], "Follower");
    assert_eq!(val["result"]["is_free"], true);
    assert!(val.get("grants").is_none());
}

// ===========================================================================
// fbook project / revenue
// ===========================================================================

#[test]
fn project_csv_writes_one_row_per_record() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .args([
            "project",
            "--orders",
            &fixture("orders.json"),
            "-c",
            &fixture("term2.sync.toml"),
            "--today",
            "2025-06-05",
            "--csv",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 1 + 5 + 1, "{out}");
    assert!(lines[0].starts_with("kind,order_id,customer_id"));
    assert_eq!(lines.iter().filter(|l| l.starts_with("free,1004,")).count(), 1);
    assert!(!out.contains(",1007,"), "Term 1 order must be out of scope");
}

#[test]
fn project_with_stale_today_drops_free_class() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .args([
            "project",
            "--orders",
            &fixture("orders.json"),
            "-c",
            &fixture("term2.sync.toml"),
            "--today",
            "2025-06-15",
            "--json",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let val = json(&output);
    assert_eq!(val["free"].as_array().unwrap().len(), 0);
    assert_eq!(val["stats"]["stale_free_classes"], 1);
}

#[test]
fn revenue_json_spreads_discount() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .args([
            "revenue",
            "--orders",
            &fixture("orders.json"),
            "--today",
            "2025-06-05",
            "--window-start",
            "2025-04-01",
            "--json",
        ])
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let val = json(&output);
    let find = |name: &str| {
        val.as_array()
            .unwrap()
            .iter()
            .find(|r| r["class_name"] == name)
            .cloned()
            .unwrap_or_else(|| panic!("no revenue line for {name}: {val}"))
    };
    assert_eq!(find("Level 2")["revenue_cents"], 5400);
    assert_eq!(find("Shines")["revenue_cents"], 3600);
    assert_eq!(find("Level 1")["orders"], 2);
    assert_eq!(find("Bundle")["revenue_cents"], 20000);
}

#[test]
fn missing_source_is_usage_error() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path()).args(["project"]).output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("no order source"));
    assert!(stderr(&output).contains("hint:"));
}

#[test]
fn bad_today_is_usage_error() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .args(["project", "--orders", &fixture("orders.json"), "--today", "June 5th"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// fbook sync
// ===========================================================================

#[test]
fn sync_twice_is_idempotent() {
    let home = TempDir::new().unwrap();
    let db = home.path().join("school.db");

    let first = fbook(home.path()).args(sync_args(&db)).output().unwrap();
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let report = json(&first);
    assert_eq!(report["failed_step"], serde_json::Value::Null);
    assert_eq!(report["counts"]["paid_attendance"]["inserted"], 7);
    assert_eq!(report["counts"]["free_attendance"]["inserted"], 1);
    assert_eq!(report["counts"]["social_attendance"]["inserted"], 1);
    assert_eq!(report["counts"]["customers_fetched"], 4);

    let second = fbook(home.path()).args(sync_args(&db)).output().unwrap();
    assert!(second.status.success());
    let report = json(&second);
    assert_eq!(report["counts"]["paid_attendance"]["inserted"], 0);
    assert_eq!(report["counts"]["paid_attendance"]["already_present"], 8);
    assert_eq!(report["counts"]["paid_orders_written"], 5);
}

#[test]
fn sync_human_output_and_report_file() {
    let home = TempDir::new().unwrap();
    let db = home.path().join("school.db");
    let report_path = home.path().join("report.json");

    let mut args = sync_args(&db);
    args.retain(|a| a != "--json");
    args.extend(["--output".into(), report_path.to_string_lossy().into_owned()]);
    args.extend(["--run-id".into(), "nightly".into()]);

    let output = fbook(home.path()).args(&args).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Sync complete: 7 paid, 1 free, 1 social attendance rows added"));

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(saved["run_id"], "nightly");
}

#[test]
fn sync_with_missing_order_file_reports_failed_step() {
    let home = TempDir::new().unwrap();
    let db = home.path().join("school.db");
    let mut args = sync_args(&db);
    args[2] = home.path().join("nope.json").to_string_lossy().into_owned();

    let output = fbook(home.path()).args(&args).output().unwrap();

    assert_eq!(output.status.code(), Some(3));
    let report = json(&output);
    assert_eq!(report["failed_step"], "fetch_orders");
    assert!(stderr(&output).contains("failed step"));
}

#[test]
fn sync_from_feed_without_token_exits_50() {
    let home = TempDir::new().unwrap();
    let output = fbook(home.path())
        .args(["sync", "--feed-url", "http://127.0.0.1:9", "--today", "2025-06-05"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(50));
    assert!(stderr(&output).contains("FLOORBOOK_FEED_TOKEN"));
}

#[test]
fn sync_from_feed_uses_orders_and_customers() {
    let server = MockServer::start();
    let orders: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fixture("orders.json")).unwrap()).unwrap();
    let customers: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fixture("customers.json")).unwrap()).unwrap();

    let orders_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/orders.json")
            .query_param("status", "any")
            .query_param("created_at_min", "2025-03-24T00:00:00Z")
            .header("authorization", "Bearer tok_test");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({ "orders": orders }));
    });
    let customers_mock = server.mock(|when, then| {
        when.method(GET).path("/customers.json");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({ "customers": customers }));
    });

    let home = TempDir::new().unwrap();
    let db = home.path().join("school.db");
    let output = fbook(home.path())
        .env("FLOORBOOK_FEED_TOKEN", "tok_test")
        .args([
            "sync",
            "--feed-url",
            &server.base_url(),
            "-c",
            &fixture("term2.sync.toml"),
            "--today",
            "2025-06-05",
            "--db",
            db.to_str().unwrap(),
            "--json",
        ])
        .output()
        .unwrap();

    orders_mock.assert();
    customers_mock.assert();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report = json(&output);
    assert_eq!(report["counts"]["orders_fetched"], 7);
    assert_eq!(report["counts"]["customers_fetched"], 4);
    assert_eq!(report["counts"]["paid_attendance"]["inserted"], 7);
}
