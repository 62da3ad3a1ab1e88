//! Snapshot reference resolution and history

use crate::dataset::Dataset;
use crate::error::{DatasnapError, Result, ResultExt};
use crate::snapshot::load_dataset;
use crate::store::ContentStore;
use crate::workspace::DatasnapWorkspace;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::sync::Arc;

/// Reference to a snapshot as typed by a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotRef {
    /// Dataset name, resolves to its head (e.g. "cities")
    Name(String),
    /// A specific version of a named dataset ("cities@/fs/…")
    NameAt { name: String, path: String },
    /// Bare store address ("/fs/…")
    Path(String),
}

impl SnapshotRef {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DatasnapError::invalid_input("empty dataset reference"));
        }
        if s.starts_with('/') {
            return Ok(Self::Path(s.to_string()));
        }
        match s.split_once('@') {
            Some((name, path)) if !name.is_empty() && path.starts_with('/') => Ok(Self::NameAt {
                name: name.to_string(),
                path: path.to_string(),
            }),
            Some(_) => Err(DatasnapError::invalid_input(format!("invalid dataset reference {:?}", s))),
            None => Ok(Self::Name(s.to_string())),
        }
    }
}

/// A reference after resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSnapshot {
    pub name: Option<String>,
    pub path: String,
}

/// One line of a dataset's history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub path: String,
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub title: String,
    pub message: String,
}

/// Resolves snapshot references against a workspace's refs
#[derive(Debug)]
pub struct SnapshotResolver {
    workspace: DatasnapWorkspace,
}

impl SnapshotResolver {
    pub fn new(workspace: DatasnapWorkspace) -> Self {
        Self { workspace }
    }

    pub fn resolve(&self, snapshot_ref: &SnapshotRef) -> Result<ResolvedSnapshot> {
        match snapshot_ref {
            SnapshotRef::Name(name) => {
                let path = self
                    .workspace
                    .head(name)?
                    .ok_or_else(|| DatasnapError::SnapshotNotFound { name: name.clone() })?;
                Ok(ResolvedSnapshot {
                    name: Some(name.clone()),
                    path,
                })
            }
            SnapshotRef::NameAt { name, path } => {
                if !self.workspace.dataset_exists(name) {
                    return Err(DatasnapError::SnapshotNotFound { name: name.clone() });
                }
                Ok(ResolvedSnapshot {
                    name: Some(name.clone()),
                    path: path.clone(),
                })
            }
            SnapshotRef::Path(path) => Ok(ResolvedSnapshot {
                name: None,
                path: path.clone(),
            }),
        }
    }

    /// Parse and resolve a reference string
    pub fn resolve_str(&self, s: &str) -> Result<ResolvedSnapshot> {
        self.resolve(&SnapshotRef::parse(s)?)
    }

    /// Resolve and load a snapshot, carrying the dataset name over
    pub fn load(&self, store: Arc<dyn ContentStore>, s: &str) -> Result<Dataset> {
        let resolved = self.resolve_str(s)?;
        let mut ds = load_dataset(store, &resolved.path)?;
        if let Some(name) = resolved.name {
            ds.name = name;
        }
        Ok(ds)
    }
}

/// Walk `previousPath` links from `head`, newest first
pub fn history(store: Arc<dyn ContentStore>, head: &str, limit: Option<usize>) -> Result<Vec<LogEntry>> {
    let mut entries = Vec::new();
    let mut next = Some(head.to_string());
    while let Some(path) = next {
        if limit.map_or(false, |l| entries.len() >= l) {
            break;
        }
        let ds = load_dataset(store.clone(), &path).stage(&format!("loading history at {}", path))?;
        let commit = ds.commit.unwrap_or_default();
        entries.push(LogEntry {
            path,
            timestamp: commit.timestamp,
            title: commit.title.unwrap_or_default(),
            message: commit.message.unwrap_or_default(),
        });
        next = ds.previous_path;
    }
    Ok(entries)
}
