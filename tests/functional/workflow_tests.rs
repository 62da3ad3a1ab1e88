//! End-to-end workflows through the command line front-end

use crate::common::{assertions, sample_data, CliTestRunner};
use datasnap::archive::ArchiveManager;
use datasnap::resolver::history;
use datasnap::snapshot::load_dataset;
use datasnap::store::ContentStore;
use std::sync::Arc;

fn store_of(runner: &CliTestRunner) -> Arc<dyn ContentStore> {
    Arc::new(runner.fixture().workspace.store().unwrap())
}

fn head_of(runner: &CliTestRunner, name: &str) -> String {
    runner.fixture().workspace.head(name).unwrap().expect("dataset should have a head")
}

#[test]
fn test_save_log_show() {
    let runner = CliTestRunner::new().unwrap();
    let csv = runner
        .fixture()
        .create_csv("prices.csv", &sample_data::simple_csv_data())
        .unwrap();

    runner.expect_success(&["save", "prices", "--body", csv.to_str().unwrap(), "--quiet"]);
    runner.fixture().assert_dataset_exists("prices");
    let head = head_of(&runner, "prices");
    assert!(head.starts_with("/fs/"), "{}", head);

    runner.expect_success(&["log", "prices"]);
    runner.expect_success(&["log", "prices", "--format", "json"]);
    runner.expect_success(&["show", "prices"]);
    runner.expect_success(&["show", &format!("prices@{}", head), "--format", "json"]);
    runner.expect_success(&["show", &head]);
    runner.expect_success(&["list"]);
    runner.expect_success(&["list", "--format", "json"]);
}

#[test]
fn test_unknown_dataset_is_reported() {
    let runner = CliTestRunner::new().unwrap();
    let err = runner.expect_failure(&["show", "missing"]);
    assert_eq!(err.to_string(), "Snapshot not found: missing");
    let err = runner.expect_failure(&["log", "missing"]);
    assert_eq!(err.to_string(), "Snapshot not found: missing");
}

#[test]
fn test_successive_saves_build_history() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    let v1 = fixture.create_csv("v1.csv", &sample_data::simple_csv_data()).unwrap();
    let v2 = fixture.create_csv("v2.csv", &sample_data::updated_csv_data()).unwrap();
    let meta = fixture
        .create_json("meta.json", &serde_json::json!({"title": "fruit prices"}))
        .unwrap();

    runner.expect_success(&["save", "fruit", "--body", v1.to_str().unwrap(), "--quiet"]);
    runner.expect_success(&["save", "fruit", "--meta", meta.to_str().unwrap(), "--quiet"]);
    runner.expect_success(&[
        "save",
        "fruit",
        "--body",
        v2.to_str().unwrap(),
        "--title",
        "new apple price",
        "--quiet",
    ]);

    let log = history(store_of(&runner), &head_of(&runner, "fruit"), None).unwrap();
    let titles: Vec<&str> = log.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["new apple price", "meta added", "created dataset"]);
    assert_eq!(log[0].message, "body:\n\tupdated row 0");

    let head = load_dataset(store_of(&runner), &head_of(&runner, "fruit")).unwrap();
    assert_eq!(head.meta.unwrap().title.as_deref(), Some("fruit prices"));
}

#[test]
fn test_unchanged_save_fails_without_force() {
    let runner = CliTestRunner::new().unwrap();
    let csv = runner
        .fixture()
        .create_csv("prices.csv", &sample_data::simple_csv_data())
        .unwrap();
    let body = csv.to_str().unwrap();

    runner.expect_success(&["save", "prices", "--body", body, "--quiet"]);
    let first = head_of(&runner, "prices");

    let err = runner.expect_failure(&["save", "prices", "--body", body, "--quiet"]);
    assert!(err.is_no_changes(), "{}", err);
    assert_eq!(head_of(&runner, "prices"), first);

    runner.expect_success(&["save", "prices", "--body", body, "--force", "--quiet"]);
    assert_ne!(head_of(&runner, "prices"), first);
}

#[test]
fn test_save_from_component_directory() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture
        .create_json("fruit/meta.json", &serde_json::json!({"title": "from a directory"}))
        .unwrap();
    fixture
        .create_json("fruit/body.json", &sample_data::simple_json_data())
        .unwrap();
    let dir = fixture.root().join("fruit");

    runner.expect_success(&["save", "fruit", "--dir", dir.to_str().unwrap(), "--quiet"]);

    let ds = load_dataset(store_of(&runner), &head_of(&runner, "fruit")).unwrap();
    assert_eq!(ds.meta.unwrap().title.as_deref(), Some("from a directory"));
    let st = ds.structure.unwrap();
    assert_eq!(st.format, "json");
    assert_eq!(st.entries, Some(3));
}

#[test]
fn test_export_archive() {
    let runner = CliTestRunner::new().unwrap();
    runner.expect_success(&["init", "--peername", "me"]);
    let csv = runner
        .fixture()
        .create_csv("prices.csv", &sample_data::simple_csv_data())
        .unwrap();
    runner.expect_success(&["save", "prices", "--body", csv.to_str().unwrap(), "--quiet"]);

    let out = runner.fixture().root().join("out");
    runner.expect_success(&["export", "prices", "--output", out.to_str().unwrap()]);

    let exported: Vec<_> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(exported.len(), 1);
    let archive = &exported[0];
    assertions::assert_file_exists_and_not_empty(archive);
    let file_name = archive.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("me-prices_-_"), "{}", file_name);
    assert!(file_name.ends_with(".tar.zst"), "{}", file_name);

    let files = ArchiveManager::extract_archive(archive).unwrap();
    let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
    assert!(names.contains(&"body.csv"), "{:?}", names);
    assert!(names.contains(&"structure.json"), "{:?}", names);
    assert!(names.contains(&"dataset.json"), "{:?}", names);

    let ds = ArchiveManager::read_dataset(archive).unwrap();
    assert_eq!(ds.structure.unwrap().entries, Some(3));
}

#[test]
fn test_invalid_dataset_name_rejected() {
    let runner = CliTestRunner::new().unwrap();
    let csv = runner
        .fixture()
        .create_csv("prices.csv", &sample_data::simple_csv_data())
        .unwrap();
    let err = runner.expect_failure(&["save", "../escape", "--body", csv.to_str().unwrap(), "--quiet"]);
    assert!(err.to_string().contains("invalid dataset name"), "{}", err);
}
