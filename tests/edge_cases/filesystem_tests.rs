//! Filesystem edge cases: the on-disk store, refs and exports

use crate::common::{sample_data, CliTestRunner};
use datasnap::snapshot::load_dataset;
use datasnap::store::{ContentStore, FsStore};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_fs_store_round_trip_and_dedup() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsStore::open(temp_dir.path()).unwrap();

    let a = store.put(b"hello").unwrap();
    let b = store.put(b"hello").unwrap();
    assert_eq!(a, b);
    assert!(a.starts_with("/fs/"));
    assert_eq!(store.get(&a).unwrap(), b"hello");
    assert_eq!(store.object_count().unwrap(), 1);

    let mut reader: &[u8] = b"streamed body";
    let stored = store.put_reader(&mut reader).unwrap();
    assert_eq!(stored.size, 13);
    assert_eq!(store.object_count().unwrap(), 2);
    assert!(fs::read_dir(temp_dir.path().join("tmp")).unwrap().next().is_none());
}

#[test]
fn test_fs_store_rejects_foreign_addresses() {
    let temp_dir = TempDir::new().unwrap();
    let store = FsStore::open(temp_dir.path()).unwrap();
    for address in ["/mem/abc", "/fs/../../etc/passwd", "/fs/", "abc"] {
        let err = store.get(address).unwrap_err();
        assert!(err.to_string().starts_with("path not found"), "{}", err);
    }
}

#[test]
fn test_missing_component_object() {
    let runner = CliTestRunner::new().unwrap();
    let csv = runner
        .fixture()
        .create_csv("prices.csv", &sample_data::simple_csv_data())
        .unwrap();
    runner.expect_success(&["save", "prices", "--body", csv.to_str().unwrap(), "--quiet"]);

    let ws = &runner.fixture().workspace;
    let store = ws.store().unwrap();
    let head = ws.head("prices").unwrap().unwrap();
    let descriptor: serde_json::Value = serde_json::from_slice(&store.get(&head).unwrap()).unwrap();
    let commit_path = descriptor["commit"]["path"].as_str().unwrap().to_string();
    let hex = commit_path.trim_start_matches("/fs/");
    fs::remove_file(ws.datasnap_dir.join("objects").join(hex)).unwrap();

    let err = load_dataset(Arc::new(store), &head).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("loading dataset commit: loading commit file: path not found: {}", commit_path)
    );
}

#[test]
fn test_body_survives_source_removal() {
    let runner = CliTestRunner::new().unwrap();
    let csv = runner
        .fixture()
        .create_csv("prices.csv", &sample_data::simple_csv_data())
        .unwrap();
    runner.expect_success(&["save", "prices", "--body", csv.to_str().unwrap(), "--quiet"]);
    let original = fs::read(&csv).unwrap();
    fs::remove_file(&csv).unwrap();

    let ws = &runner.fixture().workspace;
    let ds = load_dataset(Arc::new(ws.store().unwrap()), &ws.head("prices").unwrap().unwrap()).unwrap();
    assert_eq!(ds.body_file.unwrap().read_all().unwrap(), original);

    let out = runner.fixture().root().join("nested").join("exports");
    runner.expect_success(&["export", "prices", "--output", out.to_str().unwrap()]);
    assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
}

#[test]
fn test_head_file_whitespace_is_ignored() {
    let runner = CliTestRunner::new().unwrap();
    let ws = &runner.fixture().workspace;
    fs::write(ws.refs_dir.join("padded"), "  /fs/abc  \n\n").unwrap();
    assert_eq!(ws.head("padded").unwrap().as_deref(), Some("/fs/abc"));
}

#[test]
fn test_workspace_stats_count_objects() {
    let runner = CliTestRunner::new().unwrap();
    let before = runner.fixture().workspace.stats().unwrap();
    assert_eq!(before.dataset_count, 0);
    assert_eq!(before.object_count, 0);

    let csv = runner
        .fixture()
        .create_csv("prices.csv", &sample_data::simple_csv_data())
        .unwrap();
    runner.expect_success(&["save", "prices", "--body", csv.to_str().unwrap(), "--quiet"]);

    let after = runner.fixture().workspace.stats().unwrap();
    assert_eq!(after.dataset_count, 1);
    // body, structure, stats, commit and the descriptor
    assert_eq!(after.object_count, 5);
    assert!(after.total_object_size > 0);
}

#[test]
fn test_pinned_save_writes_pin() {
    let runner = CliTestRunner::new().unwrap();
    let csv = runner
        .fixture()
        .create_csv("prices.csv", &sample_data::simple_csv_data())
        .unwrap();
    runner.expect_success(&["save", "prices", "--body", csv.to_str().unwrap(), "--pin", "--quiet"]);

    let ws = &runner.fixture().workspace;
    let head = ws.head("prices").unwrap().unwrap();
    let pin = ws.datasnap_dir.join("pins").join(head.trim_start_matches("/fs/"));
    assert!(pin.exists(), "{}", pin.display());
}
