//! One-shot passes against mocked remotes.
//!
//! Credentials reach the child process through sentinel env names set on
//! the command only; the test process environment is never touched.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use httpmock::prelude::*;
use httpmock::Method::PATCH;
use predicates::prelude::*;
use serde_json::json;

const TOKEN_ENV: &str = "TORA_CLI_TEST_REDDIT_TOKEN";
const KEY_ENV: &str = "TORA_CLI_TEST_BLOSSOM_KEY";

fn config(dir: &tempfile::TempDir, reddit: &MockServer, blossom: &MockServer) -> PathBuf {
    let yaml = format!(
        r#"
reddit:
  base_url: "{reddit}"
  subreddit: "TranscribersOfReddit"
  debug_subreddit: "ModsOfToR"
  archive_subreddit: "ToR_Archive"
  keys_env:
    token: "{TOKEN_ENV}"
blossom:
  base_url: "{blossom}"
  keys_env:
    api_key: "{KEY_ENV}"
    token: "TORA_CLI_TEST_BLOSSOM_TOKEN_NEVER_SET"
sync:
  sweep_pacing_ms: 0
"#,
        reddit = reddit.base_url(),
        blossom = blossom.base_url(),
    );
    let path = dir.path().join("test.yaml");
    fs::write(&path, yaml).expect("write config");
    path
}

fn tora(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tora").expect("tora binary");
    cmd.current_dir(dir.path())
        .env(TOKEN_ENV, "reddit-test-token")
        .env(KEY_ENV, "blossom-test-key");
    cmd
}

fn removal_log(subreddit: &str) -> serde_json::Value {
    json!({
        "kind": "Listing",
        "data": {"after": null, "children": [
            {"kind": "modaction", "data": {
                "mod": "a_mod",
                "target_permalink": format!("/r/{subreddit}/comments/a1/post/"),
                "created_utc": 1760000000.0
            }}
        ]}
    })
}

#[test]
fn sync_removals_mirrors_removal_and_prints_summary() {
    let reddit = MockServer::start();
    let blossom = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, &reddit, &blossom);

    let log = reddit.mock(|when, then| {
        when.method(GET)
            .path("/r/TranscribersOfReddit/about/log")
            .query_param("type", "removelink")
            .header("Authorization", "Bearer reddit-test-token");
        then.status(200).json_body(removal_log("TranscribersOfReddit"));
    });
    let find = blossom.mock(|when, then| {
        when.method(GET)
            .path("/submission/")
            .query_param(
                "tor_url",
                "https://reddit.com/r/TranscribersOfReddit/comments/a1/post/",
            )
            .header("X-Api-Key", "blossom-test-key");
        then.status(200).json_body(json!({
            "count": 1,
            "next": null,
            "results": [{
                "id": 42,
                "tor_url": "https://reddit.com/r/TranscribersOfReddit/comments/a1/post/",
                "removed_from_queue": false
            }]
        }));
    });
    let remove = blossom.mock(|when, then| {
        when.method(PATCH).path("/submission/42/remove/");
        then.status(201).json_body(json!({"id": 42}));
    });

    tora(&dir)
        .args(["sync", "removals", "--config"])
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""pass":"removals""#))
        .stdout(predicate::str::contains(r#""writes_ok":1"#));

    log.assert();
    find.assert();
    remove.assert();
}

#[test]
fn debug_flag_syncs_the_debug_subreddit() {
    let reddit = MockServer::start();
    let blossom = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, &reddit, &blossom);

    let log = reddit.mock(|when, then| {
        when.method(GET).path("/r/ModsOfToR/about/log");
        then.status(200)
            .json_body(json!({"kind": "Listing", "data": {"after": null, "children": []}}));
    });

    tora(&dir)
        .args(["sync", "removals", "--debug", "--config"])
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""examined":0"#));
    log.assert();
}

#[test]
fn listing_failure_fails_the_command_with_error_line() {
    let reddit = MockServer::start();
    let blossom = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, &reddit, &blossom);

    reddit.mock(|when, then| {
        when.method(GET).path("/r/TranscribersOfReddit/about/modqueue");
        then.status(503);
    });

    tora(&dir)
        .args(["sync", "reports", "--config"])
        .arg(&cfg)
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""error""#))
        .stderr(predicate::str::contains("pass failed"));
}

#[test]
fn missing_credentials_fail_closed() {
    let reddit = MockServer::start();
    let blossom = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, &reddit, &blossom);

    let mut cmd = Command::cargo_bin("tora").unwrap();
    cmd.current_dir(dir.path())
        .env_remove(TOKEN_ENV)
        .env(KEY_ENV, "blossom-test-key")
        .args(["sync", "removals", "--config"])
        .arg(&cfg)
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING"))
        .stderr(predicate::str::contains(TOKEN_ENV));
}

#[test]
fn archive_expired_removes_and_archives() {
    let reddit = MockServer::start();
    let blossom = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, &reddit, &blossom);

    blossom.mock(|when, then| {
        when.method(GET).path("/submission/expired/");
        then.status(200).json_body(json!([{
            "id": 7,
            "tor_url": "https://reddit.com/r/TranscribersOfReddit/comments/e7/post/",
            "original_id": "e7orig"
        }]));
    });
    reddit.mock(|when, then| {
        when.method(GET)
            .path("/api/info")
            .query_param("id", "t3_e7");
        then.status(200).json_body(json!({
            "kind": "Listing",
            "data": {"after": null, "children": [{"kind": "t3", "data": {
                "name": "t3_e7",
                "permalink": "/r/TranscribersOfReddit/comments/e7/post/",
                "url": "https://reddit.com/r/origin/comments/pe7/post/",
                "title": "Image | expired",
                "removed": false
            }}]}
        }));
    });
    let remove = reddit.mock(|when, then| {
        when.method(POST).path("/api/remove");
        then.status(200).json_body(json!({}));
    });
    let archive = blossom.mock(|when, then| {
        when.method(PATCH).path("/submission/7/archive/");
        then.status(200).json_body(json!({"id": 7}));
    });

    tora(&dir)
        .args(["archive", "expired", "--config"])
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""pass":"expired_archival""#))
        .stdout(predicate::str::contains(r#""writes_ok":2"#));

    remove.assert();
    archive.assert();
}
