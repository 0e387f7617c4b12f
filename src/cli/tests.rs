//! Tests for the CLI

use super::*;
use crate::error::Error;
use crate::output::{CollectingSink, Message};
use clap::Parser;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn users_manifest(url_base: &str) -> String {
    format!(
        r#"
version: "1.0.0"
check:
  stream_names: [users]
streams:
  - name: users
    primary_key: id
    retriever:
      requester:
        url_base: "{url_base}"
        path: /users
        error_handler:
          max_retries: 0
      record_selector:
        extractor:
          field_path: [data]
    incremental_sync:
      cursor_field: updated_at
"#
    )
}

fn write_manifest(dir: &Path, contents: &str) -> String {
    let path = dir.join("manifest.yaml");
    std::fs::write(&path, contents).unwrap();
    path.display().to_string()
}

fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["solidafy-declarative"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

// ============================================================================
// Argument Parsing
// ============================================================================

#[test]
fn test_parse_read_arguments() {
    let cli = parse(&[
        "-c",
        "manifest.yaml",
        "read",
        "--streams",
        "users, orders,",
        "--max-records",
        "5",
        "--fail-fast",
    ]);
    assert_eq!(cli.selected_streams(), vec!["users", "orders"]);
    let Commands::Read {
        max_records,
        fail_fast,
        full_refresh,
        ..
    } = cli.command
    else {
        panic!("expected read");
    };
    assert_eq!(max_records, Some(5));
    assert!(fail_fast);
    assert!(!full_refresh);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = parse(&["check", "--config-json", "{}", "-c", "m.yaml", "-v"]);
    assert_eq!(cli.command, Commands::Check);
    assert_eq!(cli.config_json.as_deref(), Some("{}"));
    assert!(cli.verbose);
    assert!(cli.selected_streams().is_empty());
}

#[test]
fn test_unknown_subcommand() {
    assert!(Cli::try_parse_from(["solidafy-declarative", "serve"]).is_err());
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_validate_reports_streams() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), &users_manifest("https://api.example.com"));
    let sink = CollectingSink::new();

    Runner::new(parse(&["-c", &manifest, "validate"]))
        .run_with(&sink)
        .await
        .unwrap();

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].to_json()["log"]["message"],
        json!("Manifest v1.0.0 is valid with 1 streams: users")
    );
}

#[tokio::test]
async fn test_spec_defaults_to_open_object() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), &users_manifest("https://api.example.com"));
    let sink = CollectingSink::new();

    Runner::new(parse(&["-c", &manifest, "spec"]))
        .run_with(&sink)
        .await
        .unwrap();

    let Message::Spec(spec) = &sink.messages()[0] else {
        panic!("expected a spec message");
    };
    assert_eq!(spec["connectionSpecification"]["type"], json!("object"));
}

#[tokio::test]
async fn test_check_without_manifest_fails_softly() {
    let sink = CollectingSink::new();
    Runner::new(parse(&["check"])).run_with(&sink).await.unwrap();

    let status = sink.messages()[0].to_json();
    assert_eq!(status["type"], json!("CONNECTION_STATUS"));
    assert_eq!(status["connectionStatus"]["status"], json!("FAILED"));
    assert!(status["connectionStatus"]["message"]
        .as_str()
        .unwrap()
        .contains("use -c flag"));
}

#[tokio::test]
async fn test_check_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), &users_manifest(&server.uri()));
    let sink = CollectingSink::new();

    Runner::new(parse(&["-c", &manifest, "check"]))
        .run_with(&sink)
        .await
        .unwrap();

    assert_eq!(
        sink.messages()[0].to_json(),
        json!({ "type": "CONNECTION_STATUS", "connectionStatus": { "status": "SUCCEEDED" } })
    );
}

#[tokio::test]
async fn test_discover_emits_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), &users_manifest("https://api.example.com"));
    let sink = CollectingSink::new();

    Runner::new(parse(&["-c", &manifest, "discover"]))
        .run_with(&sink)
        .await
        .unwrap();

    let Message::Catalog(catalog) = &sink.messages()[0] else {
        panic!("expected a catalog message");
    };
    assert_eq!(catalog.streams[0].name, "users");
    assert_eq!(catalog.streams[0].default_cursor_field, vec!["updated_at"]);
}

#[tokio::test]
async fn test_read_writes_state_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": 1, "updated_at": 5 },
                { "id": 2, "updated_at": 9 }
            ]
        })))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), &users_manifest(&server.uri()));
    let state_path = dir.path().join("state.json");
    let sink = CollectingSink::new();

    Runner::new(parse(&[
        "-c",
        &manifest,
        "-s",
        &state_path.display().to_string(),
        "read",
    ]))
    .run_with(&sink)
    .await
    .unwrap();

    assert_eq!(sink.records("users").len(), 2);
    assert_eq!(sink.states("users").last(), Some(&json!({ "updated_at": 9 })));

    let written: Value =
        serde_json::from_str(&std::fs::read_to_string(&state_path).unwrap()).unwrap();
    assert_eq!(written, json!({ "users": { "updated_at": 9 } }));
}

#[tokio::test]
async fn test_read_unknown_stream() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), &users_manifest("https://api.example.com"));
    let sink = CollectingSink::new();

    let err = Runner::new(parse(&["-c", &manifest, "read", "--streams", "orders"]))
        .run_with(&sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StreamNotFound { stream } if stream == "orders"));
}

#[tokio::test]
async fn test_read_reports_failed_partitions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path(), &users_manifest(&server.uri()));
    let sink = CollectingSink::new();

    let err = Runner::new(parse(&["-c", &manifest, "read"]))
        .run_with(&sink)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("1 partition(s) failed"));
    assert!(sink.states("users").is_empty());
}
