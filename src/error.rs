//! Error types for datasnap operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatasnapError>;

#[derive(Error, Debug)]
pub enum DatasnapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{message}")]
    MissingInput { message: String },

    #[error("{message}")]
    Decode { message: String },

    #[error("dataset body did not validate against schema in strict-mode. found at least {count} errors")]
    StrictMode { count: usize },

    #[error("no changes")]
    NoChanges,

    #[error("{message}")]
    Store { message: String },

    #[error("signing error: {message}")]
    Sign { message: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Snapshot not found: {name}")]
    SnapshotNotFound { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("{stage}: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<DatasnapError>,
    },

    #[error("Walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl DatasnapError {
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store {
            message: msg.into(),
        }
    }

    pub fn sign(msg: impl Into<String>) -> Self {
        Self::Sign {
            message: msg.into(),
        }
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Wrap this error with the save stage it happened in
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Strip stage wrappers and return the error that started it all
    pub fn root(&self) -> &DatasnapError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_no_changes(&self) -> bool {
        matches!(self.root(), Self::NoChanges)
    }

    pub fn is_strict_mode(&self) -> bool {
        matches!(self.root(), Self::StrictMode { .. })
    }
}

/// Attach a stage name to any error on its way up
pub trait ResultExt<T> {
    fn stage(self, stage: &str) -> Result<T>;
}

impl<T, E: Into<DatasnapError>> ResultExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: &str) -> Result<T> {
        self.map_err(|e| e.into().in_stage(stage))
    }
}
