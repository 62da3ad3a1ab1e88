//! Save configuration and the injectable clock

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Knobs for a single save operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Number of entries validated together as one JSON document
    pub batch_size: usize,
    /// Bodies that stream more bytes than this are not kept for exact diffing
    pub body_size_small_enough_to_diff: u64,
    /// Exact body diffs with more row operations than this are reported as a percentage
    pub max_enumerated_changes: usize,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            body_size_small_enough_to_diff: crate::DEFAULT_BODY_SIZE_SMALL_ENOUGH_TO_DIFF,
            max_enumerated_changes: crate::DEFAULT_MAX_ENUMERATED_CHANGES,
        }
    }
}

impl SaveConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_diff_threshold(mut self, bytes: u64) -> Self {
        self.body_size_small_enough_to_diff = bytes;
        self
    }
}

/// Source of "now" for commit timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Everything the orchestrator needs besides its inputs
#[derive(Clone)]
pub struct SaveOptions {
    pub config: SaveConfig,
    pub clock: Arc<dyn Clock>,
}

impl SaveOptions {
    pub fn new(config: SaveConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self::new(SaveConfig::default())
    }
}

impl fmt::Debug for SaveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveOptions")
            .field("config", &self.config)
            .field("now", &self.clock.now())
            .finish()
    }
}
