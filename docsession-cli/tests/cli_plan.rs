use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assert_cmd::Command;
use docsession_core::{
    DocumentViewState, FileBlobStore, FsIdentityResolver, IdentityResolver, PagePoint,
    PersistentStore, WindowState,
};
use serde_json::Value;
use tempfile::{tempdir, TempDir};

fn plan_command(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("docsession").unwrap();
    cmd.env_remove("DOCSESSION_OPEN")
        .env("RUST_LOG", "warn")
        .arg("--state-dir")
        .arg(dir.path().join("state"))
        .arg("--config")
        .arg(dir.path().join("config.toml"))
        .arg("--plan");
    cmd
}

fn plan_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn document(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, b"%PDF-1.4 placeholder").unwrap();
    path
}

fn seed_session(dir: &TempDir, documents: &[(&Path, usize)]) {
    let blobs = Arc::new(FileBlobStore::new(dir.path().join("state")).unwrap());
    let resolver = FsIdentityResolver::new();
    let mut store = PersistentStore::open(blobs, Arc::new(resolver));
    let windows: Vec<WindowState> = documents
        .iter()
        .map(|(path, page)| WindowState {
            document: resolver.resolve(path).unwrap(),
            view: DocumentViewState {
                page_index: *page,
                point_in_page: Some(PagePoint::new(10.0, 20.0)),
                ..DocumentViewState::default()
            },
            frame: None,
            layout_mode: Default::default(),
            layout_direction: Default::default(),
            paired_page_layout: None,
        })
        .collect();
    store.save_session(&windows).unwrap();
}

#[test]
fn empty_state_plans_an_empty_session() {
    let dir = tempdir().unwrap();
    let plan = plan_json(&mut plan_command(&dir));

    assert_eq!(plan["scope"], "full_session");
    assert_eq!(plan["windows"].as_array().unwrap().len(), 0);
}

#[test]
fn explicit_file_without_history_gets_one_fresh_window() {
    let dir = tempdir().unwrap();
    let paper = document(&dir, "paper.pdf");

    let plan = plan_json(plan_command(&dir).arg(&paper));

    assert_eq!(plan["scope"], "explicit_document");
    let windows = plan["windows"].as_array().unwrap();
    assert_eq!(windows.len(), 1);
    assert!(windows[0]["saved"].is_null());
}

#[test]
fn missing_explicit_file_without_session_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.pdf");

    let output = plan_command(&dir)
        .arg(&missing)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("usage: docsession"));
}

#[test]
fn saved_session_is_planned_in_order() {
    let dir = tempdir().unwrap();
    let first = document(&dir, "first.pdf");
    let second = document(&dir, "second.pdf");
    seed_session(&dir, &[(&first, 3), (&second, 8)]);

    let plan = plan_json(&mut plan_command(&dir));

    assert_eq!(plan["scope"], "full_session");
    let windows = plan["windows"].as_array().unwrap();
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0]["saved"]["view"]["page_index"], 3);
    assert_eq!(windows[1]["saved"]["view"]["page_index"], 8);
    assert_eq!(windows[0]["fingerprint_ok"], true);
}

#[test]
fn missing_explicit_file_falls_back_to_saved_session() {
    let dir = tempdir().unwrap();
    let kept = document(&dir, "kept.pdf");
    seed_session(&dir, &[(&kept, 5)]);
    let missing = dir.path().join("missing.pdf");

    let plan = plan_json(plan_command(&dir).arg(&missing));

    assert_eq!(plan["scope"], "full_session");
    assert_eq!(plan["windows"].as_array().unwrap().len(), 1);
    let skipped = plan["skipped"].as_array().unwrap();
    assert_eq!(skipped[0]["path"], missing.to_string_lossy().as_ref());
}

#[test]
fn requested_files_replace_the_session() {
    let dir = tempdir().unwrap();
    let old = document(&dir, "old.pdf");
    seed_session(&dir, &[(&old, 1)]);
    let a = document(&dir, "a.pdf");
    let b = document(&dir, "b.pdf");
    let requested = std::env::join_paths([&a, &b]).unwrap();

    let mut cmd = plan_command(&dir);
    cmd.env("DOCSESSION_OPEN", requested);
    let plan = plan_json(&mut cmd);

    assert_eq!(plan["scope"], "requested_documents");
    assert_eq!(plan["windows"].as_array().unwrap().len(), 2);
}

#[test]
fn log_file_lands_in_the_state_dir() {
    let dir = tempdir().unwrap();
    plan_command(&dir).assert().success();

    assert!(dir.path().join("state/logs/docsession.log").exists());
}
