use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn write_layer(dir: &tempfile::TempDir, name: &str, yaml: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, yaml).expect("write config layer");
    path
}

fn tora(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tora").expect("tora binary");
    cmd.current_dir(dir.path());
    cmd
}

const BASE: &str = r#"
reddit:
  subreddit: "TranscribersOfReddit"
  archive_subreddit: "ToR_Archive"
sync:
  sweep_page_size: 500
"#;

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_layer(&dir, "base.yaml", BASE);

    tora(&dir)
        .arg("config-hash")
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"config_hash=[0-9a-f]{64}\n").unwrap())
        .stdout(predicate::str::contains(r#""sweep_page_size":500"#));
}

#[test]
fn config_hash_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_layer(&dir, "base.yaml", BASE);

    let first = tora(&dir).arg("config-hash").arg(&base).output().unwrap();
    let second = tora(&dir).arg("config-hash").arg(&base).output().unwrap();
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn config_check_reports_unused_keys_and_secret_presence() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_layer(&dir, "base.yaml", BASE);
    let extra = write_layer(
        &dir,
        "extra.yaml",
        "reddit:\n  keys_env:\n    token: \"TORA_SENTINEL_CLI_TOKEN_NEVER_SET_4K\"\nlegacy:\n  bugsnag: 1\n",
    );

    tora(&dir)
        .args(["config-check", "--config"])
        .arg(&base)
        .arg(&extra)
        .assert()
        .success()
        .stdout(predicate::str::contains("unused_keys=1"))
        .stdout(predicate::str::contains("unused=/legacy/bugsnag"))
        .stdout(predicate::str::contains(
            "secret reddit_token env=TORA_SENTINEL_CLI_TOKEN_NEVER_SET_4K set=false",
        ));
}

#[test]
fn strict_config_check_fails_on_unused_keys() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_layer(&dir, "base.yaml", "legacy:\n  bugsnag: 1\n");

    tora(&dir)
        .args(["config-check", "--strict", "--config"])
        .arg(&base)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn secret_literal_in_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_layer(
        &dir,
        "base.yaml",
        "blossom:\n  keys_env:\n    api_key: \"sk-live-abc123secretvalue\"\n",
    );

    tora(&dir)
        .args(["config-check", "--config"])
        .arg(&base)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("abc123secretvalue").not());
}

#[test]
fn shipped_layers_pass_strict_check() {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config");
    let dir = tempfile::tempdir().unwrap();

    tora(&dir)
        .args(["config-check", "--strict", "--config"])
        .arg(root.join("base.yaml"))
        .arg(root.join("debug.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("unused_keys=0"));
}

#[test]
fn sync_requires_config() {
    let dir = tempfile::tempdir().unwrap();
    tora(&dir).args(["sync", "removals"]).assert().failure();
}
