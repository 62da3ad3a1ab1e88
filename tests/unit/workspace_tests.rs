//! Unit tests for workspace layout, refs and configuration

use crate::common::{assertions, TestFixture};
use datasnap::workspace::validate_name;
use datasnap::DatasnapWorkspace;
use std::fs;

#[test]
fn test_workspace_layout() {
    let fixture = TestFixture::new().unwrap();
    let ws = &fixture.workspace;

    assertions::assert_dir_exists(&ws.datasnap_dir);
    assertions::assert_dir_exists(&ws.refs_dir);
    assertions::assert_dir_exists(&ws.keys_dir);
    assertions::assert_dir_exists(&ws.datasnap_dir.join("objects"));
    assertions::assert_file_exists_and_not_empty(&ws.datasnap_dir.join("config.json"));
}

#[test]
fn test_find_from_nested_directory() {
    let fixture = TestFixture::new().unwrap();
    let nested = fixture.root().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    let found = DatasnapWorkspace::find(Some(&nested)).unwrap();
    assert_eq!(found.root, fixture.workspace.root);
}

#[test]
fn test_find_without_workspace_fails() {
    let fixture = TestFixture::new_empty().unwrap();
    let err = DatasnapWorkspace::find(Some(fixture.root())).unwrap_err();
    assert!(err.to_string().contains("datasnap init"), "{}", err);
}

#[test]
fn test_find_or_create_creates_once() {
    let fixture = TestFixture::new_empty().unwrap();
    let created = DatasnapWorkspace::find_or_create(Some(fixture.root())).unwrap();
    let created_at = created.config().unwrap().created;

    let again = DatasnapWorkspace::find_or_create(Some(fixture.root())).unwrap();
    assert_eq!(again.config().unwrap().created, created_at);
}

#[test]
fn test_config_defaults() {
    let fixture = TestFixture::new().unwrap();
    let config = fixture.workspace.config().unwrap();
    assert_eq!(config.version, datasnap::FORMAT_VERSION);
    assert_eq!(config.peername, "");
    assert_eq!(config.save.batch_size, datasnap::DEFAULT_BATCH_SIZE);
    assert_eq!(config.save.max_enumerated_changes, datasnap::DEFAULT_MAX_ENUMERATED_CHANGES);
}

#[test]
fn test_corrupt_config_is_reported() {
    let fixture = TestFixture::new().unwrap();
    fs::write(fixture.workspace.datasnap_dir.join("config.json"), "{not json").unwrap();
    let err = fixture.workspace.config().unwrap_err();
    assert!(err.to_string().contains("config.json"), "{}", err);
}

#[test]
fn test_list_datasets_sorted() {
    let fixture = TestFixture::new().unwrap();
    let ws = &fixture.workspace;
    ws.set_head("zebras", "/fs/02").unwrap();
    ws.set_head("apples", "/fs/01").unwrap();

    let names: Vec<String> = ws.list_datasets().unwrap().into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["apples", "zebras"]);
    fixture.assert_dataset_exists("apples");
    fixture.assert_dataset_not_exists("pears");
}

#[test]
fn test_validate_name() {
    for ok in ["cities", "world_bank-2020", "v1.2"] {
        assert!(validate_name(ok).is_ok(), "{} should be valid", ok);
    }
    for bad in ["", ".hidden", "a/b", "../x", "with space"] {
        assert!(validate_name(bad).is_err(), "{:?} should be invalid", bad);
    }
}

#[test]
fn test_gitignore_appended_once() {
    let fixture = TestFixture::new_empty().unwrap();
    fs::write(fixture.root().join(".gitignore"), "target/").unwrap();

    let ws = DatasnapWorkspace::create_new(fixture.root().to_path_buf()).unwrap();
    ws.ensure_gitignore().unwrap();

    let content = fs::read_to_string(fixture.root().join(".gitignore")).unwrap();
    assert!(content.starts_with("target/"));
    assert_eq!(content.matches(".datasnap/objects/").count(), 1);
}

#[test]
fn test_signer_persists_across_loads() {
    let fixture = TestFixture::new().unwrap();
    let a = fixture.workspace.signer().unwrap();
    let b = DatasnapWorkspace::from_root(fixture.root().to_path_buf()).signer().unwrap();
    assert_eq!(a.public_key_base64(), b.public_key_base64());
}
