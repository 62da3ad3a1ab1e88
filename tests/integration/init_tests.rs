//! Integration tests for `datasnap init`

use crate::common::{assertions, CliTestRunner};
use std::fs;

#[test]
fn test_init_creates_workspace() {
    let runner = CliTestRunner::new_empty().unwrap();
    runner.expect_success(&["init"]);

    let ws = &runner.fixture().workspace;
    assertions::assert_dir_exists(&ws.datasnap_dir);
    assertions::assert_file_exists_and_not_empty(&ws.keys_dir.join("default.key"));
    assertions::assert_file_exists_and_not_empty(&runner.fixture().root().join(".gitignore"));
}

#[test]
fn test_init_twice_keeps_config() {
    let runner = CliTestRunner::new_empty().unwrap();
    runner.expect_success(&["init"]);
    let before = fs::read_to_string(runner.fixture().workspace.datasnap_dir.join("config.json")).unwrap();

    runner.expect_success(&["init"]);
    let after = fs::read_to_string(runner.fixture().workspace.datasnap_dir.join("config.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_init_keeps_signing_key() {
    let runner = CliTestRunner::new_empty().unwrap();
    runner.expect_success(&["init"]);
    let key_path = runner.fixture().workspace.keys_dir.join("default.key");
    let first = fs::read_to_string(&key_path).unwrap();

    runner.expect_success(&["init", "--force"]);
    assert_eq!(fs::read_to_string(&key_path).unwrap(), first);
}

#[test]
fn test_init_sets_peername() {
    let runner = CliTestRunner::new_empty().unwrap();
    runner.expect_success(&["init", "--peername", "cassie"]);
    assert_eq!(runner.fixture().workspace.config().unwrap().peername, "cassie");
}

#[test]
fn test_commands_require_workspace() {
    let runner = CliTestRunner::new_empty().unwrap();
    for args in [vec!["list"], vec!["log", "cities"], vec!["show", "cities"]] {
        let err = runner.expect_failure(&args);
        assert!(err.to_string().contains("no .datasnap workspace found"), "{}", err);
    }
}
