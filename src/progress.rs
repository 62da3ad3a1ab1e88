//! Save events and the sinks that receive them

use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// Events emitted over the lifetime of one save
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SaveEvent {
    SaveStarted {
        name: String,
    },
    SaveProgress {
        name: String,
        /// Fraction of the body consumed, 0..=1
        completion: f64,
    },
    /// Terminal event; exactly one of `path` or `error` is set
    SaveCompleted {
        name: String,
        path: Option<String>,
        error: Option<String>,
    },
}

impl SaveEvent {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::SaveStarted { .. })
    }

    pub fn is_progress(&self) -> bool {
        matches!(self, Self::SaveProgress { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::SaveCompleted { .. })
    }
}

/// Receiver of save events. Failures are logged by the caller, never fatal.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: SaveEvent) -> Result<()>;
}

/// Publish an event, logging rather than returning a failure
pub fn publish_or_log(sink: &dyn ProgressSink, event: SaveEvent) {
    if let Err(e) = sink.publish(event) {
        log::warn!("publishing save event: {}", e);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NilSink;

impl ProgressSink for NilSink {
    fn publish(&self, _event: SaveEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps every event in order; used by tests and tooling
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SaveEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SaveEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&SaveEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, event: SaveEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

const BAR_SCALE: u64 = 1000;

/// Renders save progress as a terminal bar
#[derive(Debug)]
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub fn new(message: &str) -> Self {
        Self {
            bar: create_progress_bar(BAR_SCALE, message),
        }
    }

    /// A sink that draws nothing, for `--quiet` runs
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressSink for ProgressBarSink {
    fn publish(&self, event: SaveEvent) -> Result<()> {
        match event {
            SaveEvent::SaveStarted { name } => {
                self.bar.set_message(format!("saving {}", name));
                self.bar.enable_steady_tick(Duration::from_millis(100));
            }
            SaveEvent::SaveProgress { completion, .. } => {
                let pos = (completion.clamp(0.0, 1.0) * BAR_SCALE as f64) as u64;
                self.bar.set_position(pos);
            }
            SaveEvent::SaveCompleted { path: Some(path), .. } => {
                self.bar.set_position(BAR_SCALE);
                self.bar.finish_with_message(format!("saved {}", path));
            }
            SaveEvent::SaveCompleted { error, .. } => {
                self.bar.abandon_with_message(format!(
                    "save failed: {}",
                    error.unwrap_or_default()
                ));
            }
        }
        Ok(())
    }
}

impl Drop for ProgressBarSink {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Create a spinner progress bar
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
            .expect("Invalid progress template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .expect("Invalid progress template")
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb
}
