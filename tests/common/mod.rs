//! Common test utilities and helpers

use chrono::{TimeZone, Utc};
use datasnap::config::{FixedClock, SaveConfig, SaveOptions};
use datasnap::dataset::{BodySource, Commit, Dataset, Structure};
use datasnap::progress::{NilSink, ProgressSink};
use datasnap::signing::Signer;
use datasnap::snapshot::{create_dataset, load_dataset, SaveSwitches};
use datasnap::store::MemStore;
use datasnap::{DatasnapWorkspace, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Test fixture manager for creating temporary test environments
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub workspace: DatasnapWorkspace,
}

impl TestFixture {
    /// Create a new test fixture with initialized workspace
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let workspace = DatasnapWorkspace::create_new(temp_dir.path().to_path_buf())?;

        Ok(Self { temp_dir, workspace })
    }

    /// Create a new test fixture without initializing workspace. A `.git`
    /// marker stops the workspace search from escaping the temp dir.
    pub fn new_empty() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        fs::create_dir(temp_dir.path().join(".git"))?;
        let workspace = DatasnapWorkspace::from_root(temp_dir.path().to_path_buf());

        Ok(Self { temp_dir, workspace })
    }

    /// Get the root path of the test fixture
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a test CSV file with sample data
    pub fn create_csv(&self, name: &str, data: &[Vec<&str>]) -> Result<PathBuf> {
        let mut content = String::new();
        for row in data {
            content.push_str(&row.join(","));
            content.push('\n');
        }
        self.create_file(name, &content)
    }

    /// Create a file with raw string content
    pub fn create_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a test JSON file with sample data
    pub fn create_json(&self, name: &str, data: &serde_json::Value) -> Result<PathBuf> {
        self.create_file(name, &serde_json::to_string_pretty(data)?)
    }

    /// Create a large CSV file: a text header then `rows` numeric rows
    pub fn create_large_csv(&self, name: &str, rows: usize, cols: usize) -> Result<PathBuf> {
        self.create_file(name, &sample_data::numeric_csv(rows, cols))
    }

    /// Assert that a dataset has a head in the workspace
    pub fn assert_dataset_exists(&self, name: &str) {
        assert!(self.workspace.dataset_exists(name), "Dataset '{}' should exist", name);
    }

    /// Assert that a dataset has no head in the workspace
    pub fn assert_dataset_not_exists(&self, name: &str) {
        assert!(!self.workspace.dataset_exists(name), "Dataset '{}' should not exist", name);
    }
}

/// Helper for running CLI commands in tests
pub struct CliTestRunner {
    fixture: TestFixture,
}

impl CliTestRunner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fixture: TestFixture::new()?,
        })
    }

    /// Runner over a directory that has no workspace yet
    pub fn new_empty() -> Result<Self> {
        Ok(Self {
            fixture: TestFixture::new_empty()?,
        })
    }

    pub fn fixture(&self) -> &TestFixture {
        &self.fixture
    }

    /// Run a datasnap command and return the result
    pub fn run_command(&self, args: &[&str]) -> Result<()> {
        use clap::Parser;
        use datasnap::cli::Cli;
        use datasnap::commands::execute_command;

        let mut cmd_args = vec!["datasnap"];
        cmd_args.extend(args);

        let cli = Cli::try_parse_from(cmd_args)
            .map_err(|e| datasnap::DatasnapError::invalid_input(e.to_string()))?;

        // default to the fixture root when no --workspace flag was given
        let workspace_path = cli.workspace.as_deref().or(Some(self.fixture.root()));
        execute_command(cli.command, workspace_path)
    }

    /// Run a command and expect it to succeed
    pub fn expect_success(&self, args: &[&str]) {
        if let Err(e) = self.run_command(args) {
            panic!("Command {:?} should succeed: {}", args, e);
        }
    }

    /// Run a command and expect it to fail
    pub fn expect_failure(&self, args: &[&str]) -> datasnap::DatasnapError {
        self.run_command(args).expect_err("Command should fail")
    }
}

/// Library-level saves against an in-memory store with a fixed clock and key
pub mod saving {
    use super::*;

    pub fn options() -> SaveOptions {
        options_with(SaveConfig::default())
    }

    pub fn options_with(config: SaveConfig) -> SaveOptions {
        SaveOptions::new(config).with_clock(FixedClock(Utc.with_ymd_and_hms(2001, 1, 1, 1, 1, 1).unwrap()))
    }

    pub fn key() -> Signer {
        Signer::from_seed([7u8; 32])
    }

    /// A dataset ready to save, with an empty commit and an inferred csv structure
    pub fn csv_dataset(name: &str, body: &str) -> Dataset {
        let mut ds = Dataset::named(name);
        ds.commit = Some(Commit::default());
        ds.structure = Some(Structure::new("csv"));
        ds.set_body_file(BodySource::from_bytes("body.csv", body.as_bytes().to_vec()));
        ds
    }

    pub fn json_dataset(name: &str, body: &serde_json::Value) -> Dataset {
        let mut ds = Dataset::named(name);
        ds.commit = Some(Commit::default());
        ds.structure = Some(Structure::new("json"));
        ds.set_body_file(BodySource::from_bytes("body.json", body.to_string().into_bytes()));
        ds
    }

    pub fn save(store: &MemStore, next: Dataset, prev: Option<&Dataset>) -> Result<String> {
        save_with(store, next, prev, SaveSwitches::default(), &options(), Arc::new(NilSink))
    }

    pub fn save_with(
        store: &MemStore,
        next: Dataset,
        prev: Option<&Dataset>,
        switches: SaveSwitches,
        options: &SaveOptions,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<String> {
        create_dataset(store, next, prev, Some(&key()), switches, options, sink)
    }

    pub fn load(store: &MemStore, path: &str) -> Result<Dataset> {
        load_dataset(Arc::new(store.clone()), path)
    }

    /// Save then load back in one step
    pub fn save_and_load(store: &MemStore, next: Dataset, prev: Option<&Dataset>) -> Result<Dataset> {
        let path = save(store, next, prev)?;
        load(store, &path)
    }

    pub fn commit_title(ds: &Dataset) -> String {
        ds.commit
            .as_ref()
            .and_then(|c| c.title.clone())
            .unwrap_or_default()
    }
}

/// Sample data generators for testing
pub mod sample_data {
    use serde_json::json;

    pub fn simple_csv_data() -> Vec<Vec<&'static str>> {
        vec![
            vec!["id", "name", "price"],
            vec!["1", "Apple", "1.50"],
            vec!["2", "Banana", "0.75"],
            vec!["3", "Cherry", "2.00"],
        ]
    }

    pub fn updated_csv_data() -> Vec<Vec<&'static str>> {
        vec![
            vec!["id", "name", "price"],
            vec!["1", "Apple", "1.60"],
            vec!["2", "Banana", "0.75"],
            vec!["3", "Cherry", "2.00"],
        ]
    }

    pub fn cities_csv() -> &'static str {
        "city,pop\ntoronto,40000000\nnew york,8500000\nchicago,300000\n"
    }

    /// Header row of `col_i` names followed by integer rows
    pub fn numeric_csv(rows: usize, cols: usize) -> String {
        let header: Vec<String> = (0..cols).map(|c| format!("col_{}", c)).collect();
        let mut content = header.join(",");
        content.push('\n');
        for r in 0..rows {
            let row: Vec<String> = (0..cols).map(|c| (r * cols + c).to_string()).collect();
            content.push_str(&row.join(","));
            content.push('\n');
        }
        content
    }

    pub fn simple_json_data() -> serde_json::Value {
        json!([
            {"id": 1, "name": "Apple", "price": 1.50},
            {"id": 2, "name": "Banana", "price": 0.75},
            {"id": 3, "name": "Cherry", "price": 2.00}
        ])
    }

    pub fn nested_json_data() -> serde_json::Value {
        json!([
            {
                "id": 1,
                "product": {"name": "Apple", "details": {"price": 1.50, "category": "Fruit"}},
                "tags": ["fresh", "organic"]
            },
            {
                "id": 2,
                "product": {"name": "Banana", "details": {"price": 0.75, "category": "Fruit"}},
                "tags": ["tropical"]
            }
        ])
    }
}

/// Assertion helpers for test validation
pub mod assertions {
    use std::path::Path;

    /// Assert that a file exists and is not empty
    pub fn assert_file_exists_and_not_empty(path: &Path) {
        assert!(path.exists(), "File should exist: {}", path.display());
        let metadata = std::fs::metadata(path).expect("Should be able to read file metadata");
        assert!(metadata.len() > 0, "File should not be empty: {}", path.display());
    }

    /// Assert that a directory exists
    pub fn assert_dir_exists(path: &Path) {
        assert!(path.exists(), "Directory should exist: {}", path.display());
        assert!(path.is_dir(), "Path should be a directory: {}", path.display());
    }
}
