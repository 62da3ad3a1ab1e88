//! Workspace management for datasnap operations

use crate::config::SaveConfig;
use crate::error::{DatasnapError, Result};
use crate::signing::Signer;
use crate::store::FsStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const KEY_FILE: &str = "default.key";

/// Contents of `.datasnap/config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub version: String,
    pub created: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub peername: String,
    #[serde(default)]
    pub save: SaveConfig,
}

/// Manages the .datasnap workspace directory
#[derive(Debug, Clone)]
pub struct DatasnapWorkspace {
    /// Project root directory (where .datasnap/ lives)
    pub root: PathBuf,
    /// .datasnap/ directory path, also the object store root
    pub datasnap_dir: PathBuf,
    /// .datasnap/refs/ holds the head snapshot path of each dataset name
    pub refs_dir: PathBuf,
    /// .datasnap/keys/ holds the signing key seed
    pub keys_dir: PathBuf,
}

impl DatasnapWorkspace {
    /// Find existing workspace or create a new one
    pub fn find_or_create(start_dir: Option<&Path>) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let start = start_dir.unwrap_or(&current_dir);

        if let Some(workspace) = Self::find_existing(start)? {
            return Ok(workspace);
        }
        Self::create_new(start.to_path_buf())
    }

    /// Find an existing workspace, failing instead of creating one
    pub fn find(start_dir: Option<&Path>) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let start = start_dir.unwrap_or(&current_dir);
        Self::find_existing(start)?.ok_or_else(|| {
            DatasnapError::workspace(format!(
                "no .datasnap workspace found at or above {}, run `datasnap init` first",
                start.display()
            ))
        })
    }

    /// Walk up the directory tree looking for .datasnap, stopping at a git root
    fn find_existing(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir;
        loop {
            if current.join(".datasnap").is_dir() {
                return Ok(Some(Self::from_root(current.to_path_buf())));
            }
            if current.join(".git").exists() {
                break;
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(None)
    }

    /// Create a new workspace in the specified root directory
    pub fn create_new(root: PathBuf) -> Result<Self> {
        let workspace = Self::from_root(root);

        fs::create_dir_all(&workspace.refs_dir)?;
        fs::create_dir_all(&workspace.keys_dir)?;
        FsStore::open(&workspace.datasnap_dir)?;

        workspace.create_config_with_force(false)?;
        workspace.ensure_gitignore()?;
        workspace.signer()?;

        log::info!("Created datasnap workspace at: {}", workspace.root.display());
        Ok(workspace)
    }

    pub fn from_root(root: PathBuf) -> Self {
        let datasnap_dir = root.join(".datasnap");
        Self {
            refs_dir: datasnap_dir.join("refs"),
            keys_dir: datasnap_dir.join("keys"),
            datasnap_dir,
            root,
        }
    }

    /// Object store backing this workspace
    pub fn store(&self) -> Result<FsStore> {
        FsStore::open(&self.datasnap_dir)
    }

    fn config_path(&self) -> PathBuf {
        self.datasnap_dir.join("config.json")
    }

    /// Write the initial configuration file, keeping an existing one unless forced
    pub fn create_config_with_force(&self, force: bool) -> Result<()> {
        let config_path = self.config_path();
        if config_path.exists() && !force {
            return Ok(());
        }
        let config = WorkspaceConfig {
            version: crate::FORMAT_VERSION.to_string(),
            created: chrono::Utc::now(),
            peername: String::new(),
            save: SaveConfig::default(),
        };
        fs::write(config_path, serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }

    pub fn config(&self) -> Result<WorkspaceConfig> {
        let content = fs::read_to_string(self.config_path())?;
        serde_json::from_str(&content).map_err(|e| DatasnapError::config(format!("reading config.json: {}", e)))
    }

    /// Ensure .gitignore excludes the object store
    pub fn ensure_gitignore(&self) -> Result<()> {
        let gitignore_path = self.root.join(".gitignore");
        let ignore = "# Ignore datasnap objects\n.datasnap/objects/\n.datasnap/pins/\n.datasnap/tmp/\n.datasnap/keys/\n";

        if gitignore_path.exists() {
            let content = fs::read_to_string(&gitignore_path)?;
            if !content.contains(".datasnap/objects/") {
                let new_content = if content.ends_with('\n') {
                    format!("{}\n{}", content, ignore)
                } else {
                    format!("{}\n\n{}", content, ignore)
                };
                fs::write(gitignore_path, new_content)?;
                log::info!("Updated .gitignore with datasnap entries");
            }
        } else {
            fs::write(gitignore_path, ignore)?;
            log::info!("Created .gitignore with datasnap entries");
        }
        Ok(())
    }

    /// Load the workspace signing key, generating one on first use
    pub fn signer(&self) -> Result<Signer> {
        let key_path = self.keys_dir.join(KEY_FILE);
        if key_path.exists() {
            return Signer::from_base64(&fs::read_to_string(&key_path)?);
        }
        fs::create_dir_all(&self.keys_dir)?;
        let signer = Signer::generate();
        fs::write(&key_path, signer.seed_base64())?;
        log::info!("Generated signing key {}", signer.public_key_base64());
        Ok(signer)
    }

    fn ref_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.refs_dir.join(name))
    }

    /// Head snapshot address of a dataset, if it has been saved
    pub fn head(&self, name: &str) -> Result<Option<String>> {
        let path = self.ref_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?.trim().to_string()))
    }

    pub fn set_head(&self, name: &str, address: &str) -> Result<()> {
        let path = self.ref_path(name)?;
        fs::create_dir_all(&self.refs_dir)?;
        fs::write(path, format!("{}\n", address))?;
        log::debug!("moved {} to {}", name, address);
        Ok(())
    }

    pub fn dataset_exists(&self, name: &str) -> bool {
        self.ref_path(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// All dataset names with their head addresses, sorted by name
    pub fn list_datasets(&self) -> Result<Vec<(String, String)>> {
        let mut datasets = Vec::new();
        if !self.refs_dir.exists() {
            return Ok(datasets);
        }
        for entry in fs::read_dir(&self.refs_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                let head = fs::read_to_string(entry.path())?.trim().to_string();
                datasets.push((name.to_string(), head));
            }
        }
        datasets.sort();
        Ok(datasets)
    }

    /// Get workspace statistics
    pub fn stats(&self) -> Result<WorkspaceStats> {
        let mut stats = WorkspaceStats {
            dataset_count: self.list_datasets()?.len(),
            ..Default::default()
        };
        let objects_dir = self.datasnap_dir.join("objects");
        if objects_dir.exists() {
            for entry in WalkDir::new(&objects_dir) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    stats.object_count += 1;
                    stats.total_object_size += entry.metadata()?.len();
                }
            }
        }
        Ok(stats)
    }
}

/// Dataset names become file names under refs/
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(DatasnapError::invalid_input(format!(
            "invalid dataset name {:?}: use letters, digits, '-', '_' or '.'",
            name
        )))
    }
}

/// Statistics about the workspace
#[derive(Debug, Default)]
pub struct WorkspaceStats {
    pub dataset_count: usize,
    pub object_count: usize,
    pub total_object_size: u64,
}
