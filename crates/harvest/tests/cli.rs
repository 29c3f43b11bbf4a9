// ABOUTME: Integration tests for the harvest CLI binary.
// ABOUTME: Tests HTML file extraction, site detection, parameter handling, and exit codes.

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo::CommandCargoExt;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn harvest_cmd() -> Command {
    Command::cargo_bin("harvest").unwrap()
}

const REPO_HTML: &str = r#"<!DOCTYPE html>
<html><body>
<h1><strong><a href="/octo/kite">kite</a></strong></h1>
<p class="f4 my-3">Kites in the terminal</p>
<span id="repo-stars-counter-star">1.5k</span>
</body></html>"#;

fn write_page(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("repo.html");
    fs::write(&path, REPO_HTML).unwrap();
    path
}

#[test]
fn extracts_from_html_file_with_detected_site() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = write_page(&temp_dir);

    let output = harvest_cmd()
        .arg("--html")
        .arg(&html_path)
        .arg("--url")
        .arg("https://github.com/octo/kite")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let doc: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(doc["repository"]["name"], "octo/kite");
    assert_eq!(doc["repository"]["stars"], 1500);
    assert!(doc["extractedAt"].is_string());
}

#[test]
fn compact_output_is_one_line() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = write_page(&temp_dir);

    let output = harvest_cmd()
        .args(["--site", "github_repo", "--compact", "--url", "https://github.com/octo/kite"])
        .arg("--html")
        .arg(&html_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    assert_eq!(stdout.trim_end().lines().count(), 1);
}

#[test]
fn writes_output_file() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = write_page(&temp_dir);
    let out_path = temp_dir.path().join("out.json");

    harvest_cmd()
        .arg("--html")
        .arg(&html_path)
        .arg("--url")
        .arg("https://github.com/octo/kite")
        .arg("-o")
        .arg(&out_path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let doc: Value = serde_json::from_str(&fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(doc["repository"]["description"], "Kites in the terminal");
}

#[test]
fn params_file_is_read() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = write_page(&temp_dir);
    let params_path = temp_dir.path().join("params.json");
    fs::write(&params_path, r#"{"includeReadme": "yes"}"#).unwrap();

    harvest_cmd()
        .arg("--html")
        .arg(&html_path)
        .arg("--url")
        .arg("https://github.com/octo/kite")
        .arg("--params-file")
        .arg(&params_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("expected a boolean"));
}

#[test]
fn invalid_params_yield_error_envelope_and_success_exit() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = write_page(&temp_dir);

    harvest_cmd()
        .arg("--html")
        .arg(&html_path)
        .arg("--url")
        .arg("https://github.com/octo/kite")
        .args(["--params", r#"{"maxFiles": "many"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"error\": \"Params: "));
}

#[test]
fn undetectable_site_fails() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = write_page(&temp_dir);

    harvest_cmd()
        .arg("--html")
        .arg(&html_path)
        .arg("--url")
        .arg("https://example.com/page")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pass --site"));
}

#[test]
fn html_requires_url() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = write_page(&temp_dir);

    harvest_cmd()
        .arg("--html")
        .arg(&html_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--url is required"));
}

#[test]
fn missing_html_file_fails() {
    harvest_cmd()
        .args(["--html", "/nonexistent/page.html", "--url", "https://github.com/a/b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading file"));
}

#[test]
fn non_object_params_fail() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = write_page(&temp_dir);

    harvest_cmd()
        .arg("--html")
        .arg(&html_path)
        .arg("--url")
        .arg("https://github.com/octo/kite")
        .args(["--params", "[1, 2]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("params must be a JSON object"));
}

#[test]
fn unknown_site_is_rejected() {
    harvest_cmd()
        .args(["--site", "myspace", "https://github.com/a/b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown site"));
}

#[test]
fn fetches_url_argument() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/octo/kite");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(REPO_HTML);
    });

    let output = harvest_cmd()
        .args(["--site", "github_repo", "--allow-private-networks"])
        .arg(server.url("/octo/kite"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    mock.assert();
    let doc: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(doc["repository"]["name"], "octo/kite");
}
