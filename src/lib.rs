//! # datasnap
//!
//! A content-addressed, versioned store for structured datasets. Each save
//! streams the body through a single pass that stores it, validates it and
//! derives structure and statistics, then writes a signed snapshot that links
//! to the version before it along with a generated description of what
//! changed.

pub mod cli;
pub mod error;
pub mod config;
pub mod dataset;
pub mod store;
pub mod hash;
pub mod codec;
pub mod schema;
pub mod stats;
pub mod component;
pub mod compute;
pub mod change_detection;
pub mod signing;
pub mod snapshot;
pub mod workspace;
pub mod resolver;
pub mod archive;
pub mod commands;
pub mod output;
pub mod progress;

pub use error::{DatasnapError, Result};
pub use resolver::SnapshotResolver;
pub use workspace::DatasnapWorkspace;

/// Current format version for datasnap workspaces
pub const FORMAT_VERSION: &str = "1.0.0";

/// Default number of entries per pipeline batch
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Bodies up to this many bytes are diffed row by row
pub const DEFAULT_BODY_SIZE_SMALL_ENOUGH_TO_DIFF: u64 = 20_000_000;

/// Above this many row changes a body diff is reported as a percentage
pub const DEFAULT_MAX_ENUMERATED_CHANGES: usize = 5;
