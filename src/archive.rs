//! Export archives for datasnap snapshots
//!
//! An export is a `.tar.zst` holding one file per component plus
//! `dataset.json`, the whole dataset with components inlined.

use crate::component::write_dataset_dir;
use crate::dataset::Dataset;
use crate::error::{DatasnapError, Result, ResultExt};
use crate::progress::create_spinner;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use zstd::{Decoder, Encoder};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
const ZERO_TIMESTAMP: &str = "0001-01-01-00-00-00";

/// Export file name: `peername-name_-_YYYY-MM-DD-HH-MM-SS.<format>`.
/// An empty `format` falls back to the structure's format. The timestamp is
/// rendered in its own offset; a dataset without a commit gets the zero time.
pub fn generate_filename(ds: &Dataset, format: &str) -> Result<String> {
    let format = if format.is_empty() {
        ds.structure
            .as_ref()
            .map(|st| st.format.as_str())
            .filter(|f| !f.is_empty())
            .ok_or_else(|| {
                DatasnapError::archive("no format specified and no format present in the dataset Structure")
            })?
    } else {
        format
    };

    let stamp = match ds.commit.as_ref().and_then(|c| c.timestamp) {
        Some(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        None => ZERO_TIMESTAMP.to_string(),
    };
    Ok(format!("{}-{}_-_{}.{}", ds.peername, ds.name, stamp, format))
}

/// Write a loaded snapshot into `out_dir` as a `.tar.zst` and return its path
pub fn export_snapshot(ds: &Dataset, out_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let archive_path = out_dir.join(generate_filename(ds, "tar.zst")?);
    let staging = out_dir.join(format!(".export-{}", uuid::Uuid::new_v4()));

    let files = (|| {
        let mut files = Vec::new();
        for path in write_dataset_dir(ds, &staging)? {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            files.push((name, fs::read(&path)?));
        }
        files.push(("dataset.json".to_string(), serde_json::to_vec_pretty(ds)?));
        Ok::<_, DatasnapError>(files)
    })();
    let _ = fs::remove_dir_all(&staging);

    ArchiveManager::create_archive(&archive_path, &files.stage("exporting dataset")?)?;
    log::info!("exported {} to {}", ds.name, archive_path.display());
    Ok(archive_path)
}

/// Archive manager for creating and extracting export archives
pub struct ArchiveManager;

impl ArchiveManager {
    /// Create a compressed archive from in-memory files
    pub fn create_archive<P: AsRef<Path>>(archive_path: P, files: &[(String, Vec<u8>)]) -> Result<()> {
        let archive_file = File::create(archive_path)?;
        let progress = create_spinner("Creating archive");

        let mut encoder = Encoder::new(archive_file, 3)?;
        {
            let mut tar_builder = Builder::new(&mut encoder);
            for (filename, content) in files {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                tar_builder.append_data(&mut header, filename, content.as_slice())?;
            }
            tar_builder.finish()?;
        }
        encoder.finish()?;

        progress.finish_and_clear();
        Ok(())
    }

    /// Extract every file from a compressed archive
    pub fn extract_archive<P: AsRef<Path>>(archive_path: P) -> Result<Vec<(String, Vec<u8>)>> {
        let archive_file = File::open(archive_path)?;
        let mut decoder = Decoder::new(archive_file)?;
        let mut archive = Archive::new(&mut decoder);

        let mut files = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().to_string();
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            files.push((path, content));
        }
        Ok(files)
    }

    /// Read the dataset back out of an export
    pub fn read_dataset<P: AsRef<Path>>(archive_path: P) -> Result<Dataset> {
        let files = Self::extract_archive(archive_path)?;
        let (_, data) = files
            .iter()
            .find(|(name, _)| name == "dataset.json")
            .ok_or_else(|| DatasnapError::archive("export has no dataset.json"))?;
        Dataset::from_json(data)
    }
}
