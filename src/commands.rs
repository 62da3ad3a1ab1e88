//! Command implementations for datasnap CLI

use crate::archive::export_snapshot;
use crate::cli::{Commands, OutputFormat};
use crate::component::dataset_from_dir;
use crate::config::SaveOptions;
use crate::dataset::{BodySource, Commit, Dataset, Meta, Readme, Structure};
use crate::error::{DatasnapError, Result, ResultExt};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::progress::{ProgressBarSink, ProgressSink};
use crate::resolver::{history, SnapshotResolver};
use crate::snapshot::{create_dataset, load_dataset, SaveSwitches};
use crate::store::ContentStore;
use crate::workspace::{validate_name, DatasnapWorkspace};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything `datasnap save` was asked to do
#[derive(Debug, Default)]
pub struct SaveRequest {
    pub name: String,
    pub body: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub meta: Option<PathBuf>,
    pub structure: Option<PathBuf>,
    pub readme: Option<PathBuf>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub force: bool,
    pub pin: bool,
    pub batch_size: Option<usize>,
    pub quiet: bool,
}

/// Execute a command
pub fn execute_command(command: Commands, workspace_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::Init { force, peername } => init_command(workspace_path, force, peername),
        Commands::Save {
            name,
            body,
            dir,
            meta,
            structure,
            readme,
            title,
            message,
            force,
            pin,
            batch_size,
            quiet,
        } => {
            let request = SaveRequest {
                name,
                body,
                dir,
                meta,
                structure,
                readme,
                title,
                message,
                force,
                pin,
                batch_size,
                quiet,
            };
            let workspace = DatasnapWorkspace::find(workspace_path)?;
            let path = save_command(&workspace, &request)?;
            println!("✅ Saved {} at {}", request.name, path);
            Ok(())
        }
        Commands::Log { name, limit, format } => log_command(workspace_path, &name, limit, &format),
        Commands::Show { reference, format } => show_command(workspace_path, &reference, &format),
        Commands::Export { reference, output } => export_command(workspace_path, &reference, &output),
        Commands::List { format } => list_command(workspace_path, &format),
    }
}

/// Initialize datasnap workspace
fn init_command(workspace_path: Option<&Path>, force: bool, peername: Option<String>) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let root = workspace_path.unwrap_or(&current_dir);

    // init always targets the given directory, never a parent workspace
    let workspace = DatasnapWorkspace::create_new(root.to_path_buf())?;
    if force {
        workspace.create_config_with_force(true)?;
    }
    if let Some(peername) = peername {
        let mut config = workspace.config()?;
        config.peername = peername;
        fs::write(
            workspace.datasnap_dir.join("config.json"),
            serde_json::to_string_pretty(&config)?,
        )?;
    }

    println!("✅ Initialized datasnap workspace at: {}", workspace.root.display());
    println!("📁 Workspace directory: {}", workspace.datasnap_dir.display());
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data).map_err(|e| DatasnapError::decode(format!("reading {}: {}", path.display(), e)))
}

/// Start the next version from the previous one: components carry over,
/// derived values and the commit don't, the body falls back to the previous
/// body inside the save.
fn carry_over(prev: &Dataset) -> Dataset {
    let mut next = prev.clone();
    next.drop_derived_values();
    next.commit = None;
    next.body = None;
    next.body_file = None;
    next.body_path = None;
    next.previous_path = None;
    next
}

/// Save a new version of `name` from the request, move its head and return
/// the new path
pub fn save_command(workspace: &DatasnapWorkspace, request: &SaveRequest) -> Result<String> {
    let name = request.name.as_str();
    validate_name(name)?;
    let config = workspace.config()?;
    let store: Arc<dyn ContentStore> = Arc::new(workspace.store()?);

    let prev = match workspace.head(name)? {
        Some(head) => Some(load_dataset(store.clone(), &head).stage("loading previous version")?),
        None => None,
    };

    let mut next = match &request.dir {
        Some(dir) => dataset_from_dir(dir).stage("reading dataset directory")?,
        None => prev.as_ref().map(carry_over).unwrap_or_default(),
    };
    next.name = name.to_string();
    next.peername = config.peername.clone();

    if let Some(path) = &request.meta {
        next.meta = Some(read_json::<Meta>(path)?);
    }
    if let Some(path) = &request.structure {
        next.structure = Some(read_json::<Structure>(path)?);
    }
    if let Some(path) = &request.readme {
        next.readme = Some(Readme::markdown(fs::read_to_string(path)?));
    }
    if let Some(path) = &request.body {
        if !path.exists() {
            return Err(DatasnapError::invalid_input(format!(
                "Body file does not exist: {}",
                path.display()
            )));
        }
        next.set_body_file(BodySource::from_path(path));
    }
    let commit = next.commit.get_or_insert_with(Commit::default);
    commit.title = request.title.clone();
    commit.message = request.message.clone();

    let mut save_config = config.save;
    if let Some(batch_size) = request.batch_size {
        save_config = save_config.with_batch_size(batch_size);
    }
    let options = SaveOptions::new(save_config);
    let sink: Arc<dyn ProgressSink> = if request.quiet {
        Arc::new(ProgressBarSink::hidden())
    } else {
        Arc::new(ProgressBarSink::new("saving"))
    };
    let signer = workspace.signer()?;
    let switches = SaveSwitches {
        pin: request.pin,
        force_if_no_changes: request.force,
    };

    let path = create_dataset(store.as_ref(), next, prev.as_ref(), Some(&signer), switches, &options, sink)?;
    workspace.set_head(name, &path)?;
    log::info!("{} is now at {}", name, path);
    Ok(path)
}

/// Show the version history of a dataset
fn log_command(workspace_path: Option<&Path>, name: &str, limit: Option<usize>, format: &str) -> Result<()> {
    let workspace = DatasnapWorkspace::find(workspace_path)?;
    let output_format = OutputFormat::parse(format).map_err(DatasnapError::invalid_input)?;
    let head = workspace
        .head(name)?
        .ok_or_else(|| DatasnapError::SnapshotNotFound { name: name.to_string() })?;
    let store: Arc<dyn ContentStore> = Arc::new(workspace.store()?);
    let entries = history(store, &head, limit)?;

    match output_format {
        OutputFormat::Pretty => PrettyPrinter::print_log(name, &entries),
        OutputFormat::Json => println!("{}", JsonFormatter::format(&entries)?),
    }
    Ok(())
}

/// Show one version of a dataset
fn show_command(workspace_path: Option<&Path>, reference: &str, format: &str) -> Result<()> {
    let workspace = DatasnapWorkspace::find(workspace_path)?;
    let output_format = OutputFormat::parse(format).map_err(DatasnapError::invalid_input)?;
    let store: Arc<dyn ContentStore> = Arc::new(workspace.store()?);
    let resolver = SnapshotResolver::new(workspace);
    let ds = resolver.load(store, reference)?;

    match output_format {
        OutputFormat::Pretty => PrettyPrinter::print_dataset(&ds),
        OutputFormat::Json => println!("{}", JsonFormatter::format(&ds)?),
    }
    Ok(())
}

/// Export one version of a dataset as an archive
fn export_command(workspace_path: Option<&Path>, reference: &str, output: &Path) -> Result<()> {
    let workspace = DatasnapWorkspace::find(workspace_path)?;
    let peername = workspace.config()?.peername;
    let store: Arc<dyn ContentStore> = Arc::new(workspace.store()?);
    let resolver = SnapshotResolver::new(workspace);
    let mut ds = resolver.load(store, reference)?;
    ds.peername = peername;

    let archive_path = export_snapshot(&ds, output)?;
    println!("📦 Exported to {}", archive_path.display());
    Ok(())
}

/// List datasets and workspace statistics
fn list_command(workspace_path: Option<&Path>, format: &str) -> Result<()> {
    let workspace = DatasnapWorkspace::find(workspace_path)?;
    let output_format = OutputFormat::parse(format).map_err(DatasnapError::invalid_input)?;
    let datasets = workspace.list_datasets()?;
    let stats = workspace.stats()?;

    match output_format {
        OutputFormat::Pretty => {
            PrettyPrinter::print_dataset_list(&datasets);
            PrettyPrinter::print_workspace_stats(&stats);
        }
        OutputFormat::Json => println!("{}", JsonFormatter::format_workspace_stats(&stats, &datasets)?),
    }
    Ok(())
}
