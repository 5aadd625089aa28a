//! End-to-end tests of the `sift` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sift_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sift");
    path
}

fn feed_body() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
    <title>Release Notes</title>
    <link>https://blog.example/</link>
    <description>Project releases</description>
    <item>
        <title>Rust compiler 1.90 released</title>
        <link>https://blog.example/rust-1-90</link>
        <guid>release-1-90</guid>
        <description>The compiler gets faster incremental builds.</description>
    </item>
    <item>
        <title>Gardening in autumn</title>
        <link>https://blog.example/gardening</link>
        <guid>gardening</guid>
        <description>Planting bulbs before the frost.</description>
    </item>
</channel>
</rss>"#
}

/// Writes a config with one feed source at `feed_url` and returns its path.
fn setup_test_env(feed_url: &str, extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/sift.sqlite"

[pipeline]
min_relevance_score = 50
source_delay_ms = 0
fetch_timeout_secs = 5

[oracle]
provider = "keyword"

[[sources]]
name = "Release Notes"
url = "{}"
{}
"#,
        root.display(),
        feed_url,
        extra
    );

    let config_path = config_dir.join("sift.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sift(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sift_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sift binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Runs the binary off the async runtime so the mock server keeps serving.
async fn run_sift_async(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_sift(&config_path, &args)
    })
    .await
    .unwrap()
}

async fn feed_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rss"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed_body()))
        .mount(&server)
        .await;
    server
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9/rss", "");

    let (stdout, stderr, success) = run_sift(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/sift.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9/rss", "");

    let (_, _, success1) = run_sift(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sift(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_query_add_and_list() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9/rss", "");
    run_sift(&config_path, &["init"]);

    let (stdout, _, success) = run_sift(&config_path, &["query", "add", "rust compiler"]);
    assert!(success);
    assert!(stdout.contains("open: rust compiler"), "got: {}", stdout);

    // Same text again is a no-op.
    let (_, _, success) = run_sift(&config_path, &["query", "add", "rust compiler"]);
    assert!(success);

    let (stdout, _, success) = run_sift(&config_path, &["query", "list", "--open"]);
    assert!(success);
    assert_eq!(stdout.matches("rust compiler").count(), 1, "got: {}", stdout);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_resolves_query() {
    let server = feed_server().await;
    let (_tmp, config_path) = setup_test_env(&format!("{}/rss", server.uri()), "");

    run_sift_async(&config_path, &["init"]).await;
    run_sift_async(&config_path, &["query", "add", "rust compiler"]).await;

    let (stdout, stderr, success) = run_sift_async(&config_path, &["sync"]).await;
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("items stored: 2"), "got: {}", stdout);
    assert!(stdout.contains("queries resolved: 1"), "got: {}", stdout);
    assert!(stdout.contains("ok"));

    let (stdout, _, _) = run_sift_async(&config_path, &["query", "list"]).await;
    assert!(stdout.contains("resolved"));
    assert!(stdout.contains("release-1-90"), "got: {}", stdout);

    let (stdout, _, success) = run_sift_async(&config_path, &["results", "rust compiler"]).await;
    assert!(success);
    assert!(stdout.contains("Rust compiler 1.90 released"), "got: {}", stdout);
    assert!(!stdout.contains("Gardening"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_twice_stores_nothing_new() {
    let server = feed_server().await;
    let (_tmp, config_path) = setup_test_env(&format!("{}/rss", server.uri()), "");

    run_sift_async(&config_path, &["init"]).await;
    let (stdout1, _, _) = run_sift_async(&config_path, &["sync"]).await;
    assert!(stdout1.contains("items stored: 2"), "got: {}", stdout1);

    let (stdout2, _, success) = run_sift_async(&config_path, &["sync"]).await;
    assert!(success);
    assert!(stdout2.contains("items found: 2"), "got: {}", stdout2);
    assert!(stdout2.contains("items stored: 0"), "got: {}", stdout2);

    let (stdout, _, success) = run_sift_async(&config_path, &["stats"]).await;
    assert!(success);
    assert!(stdout.contains("Items:       2"), "got: {}", stdout);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_unknown_source_fails() {
    let server = feed_server().await;
    let (_tmp, config_path) = setup_test_env(&format!("{}/rss", server.uri()), "");

    let (_, stderr, success) =
        run_sift_async(&config_path, &["sync", "--source", "Nowhere"]).await;
    assert!(!success);
    assert!(stderr.contains("Nowhere"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_schedule_with_max_runs() {
    let server = feed_server().await;
    let (_tmp, config_path) = setup_test_env(&format!("{}/rss", server.uri()), "");

    let (stdout, stderr, success) = run_sift_async(
        &config_path,
        &["schedule", "--max-runs", "1", "--no-cleanup"],
    )
    .await;
    assert!(success, "schedule failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("run 1"));
    assert!(stdout.contains("schedule stopped after 1 run"));
}

#[test]
fn test_schedule_rejects_overflowing_interval() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9/rss", "");

    let (_, stderr, success) = run_sift(
        &config_path,
        &["schedule", "--interval", "18446744073709551615", "--max-runs", "1"],
    );
    assert!(!success);
    assert!(stderr.contains("too large"), "got: {}", stderr);
}

#[test]
fn test_cleanup_reports_removed() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9/rss", "");
    run_sift(&config_path, &["init"]);

    let (stdout, _, success) = run_sift(&config_path, &["cleanup", "--days", "30"]);
    assert!(success);
    assert!(stdout.contains("Removed 0 item(s) older than 30 days."));

    let (_, _, success) = run_sift(&config_path, &["cleanup", "--days", "0"]);
    assert!(!success);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) =
        setup_test_env("http://127.0.0.1:9/rss", "\n[schedule]\ninterval_minutes = 0\n");

    let (_, stderr, success) = run_sift(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("interval_minutes"), "got: {}", stderr);
}
