#![allow(missing_docs)]

mod support;

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

use support::{rocksalt, silicon};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("tempdir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn store(&self) -> PathBuf {
        self.path("store.json")
    }

    fn config(&self) -> PathBuf {
        self.path("cli.toml")
    }

    fn write_specs(&self) -> PathBuf {
        let path = self.path("specs.jsonl");
        let lines: Vec<String> = [
            silicon(5.43).with_external_id("ext-1"),
            silicon(5.43).with_external_id("ext-1"),
            rocksalt(5.64),
        ]
        .iter()
        .map(|spec| serde_json::to_string(spec).expect("encode"))
        .collect();
        fs::write(&path, lines.join("\n")).expect("write specs");
        path
    }

    fn ingested(self) -> Self {
        let specs = self.write_specs();
        self.json(&["ingest", "--create"], Some(&specs));
        self
    }

    fn json(&self, args: &[&str], extra: Option<&Path>) -> Value {
        let mut cmd = cargo_bin_cmd!("strudex");
        cmd.arg("--config")
            .arg(self.config())
            .arg("--store")
            .arg(self.store())
            .args(["--format", "json"])
            .args(args);
        if let Some(extra) = extra {
            cmd.arg(extra);
        }
        let output = cmd.assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).expect("valid json")
    }
}

#[test]
fn ingest_then_stats() {
    let ws = Workspace::new();
    let specs = ws.write_specs();
    let ingest = ws.json(&["ingest", "--create"], Some(&specs));
    assert_eq!(ingest["ingested"], 3);
    assert_eq!(ingest["new_groups"], 2);
    assert_eq!(ingest["joined"], 1);

    let stats = ws.json(&["stats"], None);
    assert_eq!(stats["records"], 3);
    assert_eq!(stats["groups"], 2);
    assert_eq!(stats["singleton_groups"], 1);
}

#[test]
fn check_all_reports_every_checker() {
    let ws = Workspace::new().ingested();
    let reports = ws.json(&["check", "all", "--workers", "2", "--flush-every", "1"], None);
    let reports = reports.as_array().expect("array");
    let names: Vec<&str> = reports
        .iter()
        .map(|r| r["checker"].as_str().expect("name"))
        .collect();
    assert_eq!(names, ["spacegroup", "members", "canonical", "external-id"]);
    for report in reports {
        assert_eq!(report["issues"], 0);
        assert_eq!(report["failed"], 0);
    }
    assert_eq!(reports[0]["processed"], 3);
    assert_eq!(reports[3]["processed"], 1);
}

#[test]
fn progress_log_receives_snapshots() {
    let ws = Workspace::new().ingested();
    let log = ws.path("progress.jsonl");
    let log_arg = log.to_string_lossy().into_owned();
    ws.json(&["check", "members", "--progress-log", log_arg.as_str()], None);
    let contents = fs::read_to_string(&log).expect("progress log");
    let last: Value = serde_json::from_str(contents.lines().last().expect("line")).expect("json");
    assert_eq!(last["final_flush"], true);
    assert_eq!(last["checker"], "members");
}

#[test]
fn verify_full_succeeds() {
    let ws = Workspace::new().ingested();
    let report = ws.json(&["verify", "--level", "full"], None);
    assert_eq!(report["success"], true);
    assert_eq!(report["counts"]["records_found"], 3);
}

#[test]
fn annotations_and_canonical_switch() {
    let ws = Workspace::new().ingested();
    let record = ws.json(&["remark", "--record", "1", "cross-checked"], None);
    assert_eq!(record["annotations"][0], "cross-checked");

    let record = ws.json(&["deprecate", "--record", "2", "--reason", "duplicate"], None);
    assert_eq!(record["annotations"][0], "deprecated: duplicate");

    let group = ws.json(&["canonical", "--group", "1", "--record", "2"], None);
    assert_eq!(group["canonical"]["id"], 2);
    assert_eq!(group["members"].as_array().map(Vec::len), Some(2));

    let reconciled = ws.json(&["reconcile"], None);
    assert_eq!(reconciled["examined"], 0);
}

#[test]
fn profiles_supply_the_store() {
    let ws = Workspace::new().ingested();
    let store = ws.store().to_string_lossy().into_owned();
    cargo_bin_cmd!("strudex")
        .arg("--config")
        .arg(ws.config())
        .args(["profile", "save", "lab", "--store-path", store.as_str(), "--workers", "2"])
        .assert()
        .success();
    cargo_bin_cmd!("strudex")
        .arg("--config")
        .arg(ws.config())
        .args(["profile", "default", "lab"])
        .assert()
        .success();
    let saved = fs::read_to_string(ws.config()).expect("config written");
    assert!(saved.contains("default_profile = \"lab\""));

    let output = cargo_bin_cmd!("strudex")
        .arg("--config")
        .arg(ws.config())
        .args(["--format", "json", "stats"])
        .env_remove("STRUDEX_STORE")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stats: Value = serde_json::from_slice(&output).expect("json");
    assert_eq!(stats["records"], 3);

    cargo_bin_cmd!("strudex")
        .arg("--config")
        .arg(ws.config())
        .args(["profile", "delete", "lab"])
        .assert()
        .success();
    let saved = fs::read_to_string(ws.config()).expect("config written");
    assert!(!saved.contains("profiles.lab"));
    assert!(!saved.contains("default_profile"));
}

#[test]
fn missing_store_fails_cleanly() {
    let ws = Workspace::new();
    let output = cargo_bin_cmd!("strudex")
        .arg("--config")
        .arg(ws.config())
        .arg("--store")
        .arg(ws.path("nowhere.json"))
        .arg("stats")
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("store not found"), "stderr: {stderr}");
}

#[test]
fn completions_are_generated() {
    let output = cargo_bin_cmd!("strudex")
        .args(["completions", "bash"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("strudex"));
}
