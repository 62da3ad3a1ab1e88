//! Snapshot creation and loading
//!
//! A snapshot is stored as one descriptor object that references every
//! component by address. [`create_dataset`] is the full save: it streams the
//! body into the store through the compute-fields pipeline, describes the
//! change against the previous snapshot, then persists, signs and links the
//! result. [`load_dataset`] reverses the layout.

use crate::change_detection::generate_commit_descriptions;
use crate::codec::{infer_structure, serialize_body};
use crate::compute::{BodyAction, ComputeFieldsFile, ComputedFields};
use crate::config::SaveOptions;
use crate::dataset::{BodySource, Commit, Dataset, Meta, Person, Readme, Stats, Structure, Transform};
use crate::error::{DatasnapError, Result, ResultExt};
use crate::progress::{publish_or_log, ProgressSink, SaveEvent};
use crate::signing::Signer;
use crate::store::ContentStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Behavioural switches for a save
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSwitches {
    /// Pin the descriptor in the store after writing
    pub pin: bool,
    /// Save even when nothing changed
    pub force_if_no_changes: bool,
}

/// Save `next` as a new snapshot following `prev` and return its address.
///
/// Emits one `SaveStarted`, the pipeline's progress events and exactly one
/// `SaveCompleted` carrying either the new path or the error text.
pub fn create_dataset(
    store: &dyn ContentStore,
    next: Dataset,
    prev: Option<&Dataset>,
    key: Option<&Signer>,
    switches: SaveSwitches,
    options: &SaveOptions,
    sink: Arc<dyn ProgressSink>,
) -> Result<String> {
    let name = next.name.clone();
    publish_or_log(sink.as_ref(), SaveEvent::SaveStarted { name: name.clone() });

    let result = save(store, next, prev, key, switches, options, &sink);

    let (path, error) = match &result {
        Ok(path) => (Some(path.clone()), None),
        Err(e) => (None, Some(e.to_string())),
    };
    publish_or_log(sink.as_ref(), SaveEvent::SaveCompleted { name, path, error });
    result
}

fn save(
    store: &dyn ContentStore,
    next: Dataset,
    prev: Option<&Dataset>,
    key: Option<&Signer>,
    switches: SaveSwitches,
    options: &SaveOptions,
    sink: &Arc<dyn ProgressSink>,
) -> Result<String> {
    let now = options.clock.now();
    let has_body = next.body_file.is_some() || next.body.is_some();
    let prev_has_body = prev.map(|p| p.body_file.is_some()).unwrap_or(false);
    if !has_body && !prev_has_body {
        return Err(DatasnapError::missing_input("bodyfile or previous bodyfile needed"));
    }
    let key = key.ok_or_else(|| DatasnapError::missing_input("private key is required to create a dataset"))?;

    let empty = Dataset::default();
    let prev_ds = prev.unwrap_or(&empty);

    let (mut ds, computed) = compute_and_store_body(store, next, prev, options, sink)?;
    validate_dataset(&ds)?;

    let body_action = computed.map(|(_, action)| action).unwrap_or_default();
    log::debug!("body action for {}: {:?}", ds.name, body_action);

    let (title, message) = generate_commit_descriptions(
        store,
        &ds,
        prev_ds,
        body_action,
        switches.force_if_no_changes,
        &options.config,
    )
    .map_err(|e| {
        if e.is_no_changes() {
            e.in_stage("saving failed")
        } else {
            e.in_stage("generating commit message")
        }
    })?;

    let commit = ds.commit.get_or_insert_with(Commit::default);
    if commit.title.as_deref().map_or(true, str::is_empty) {
        commit.title = Some(title);
    }
    if commit.message.as_deref().map_or(true, str::is_empty) {
        commit.message = Some(message);
    }

    persist(store, ds, prev, key, switches, now)
}

/// Persist a dataset without describing its changes. The body, when
/// present, still goes through the compute-fields pipeline.
pub fn write_dataset(
    store: &dyn ContentStore,
    ds: Dataset,
    prev: Option<&Dataset>,
    key: &Signer,
    switches: SaveSwitches,
    options: &SaveOptions,
    sink: Arc<dyn ProgressSink>,
) -> Result<String> {
    if ds.is_empty() {
        return Err(DatasnapError::invalid_input("cannot save empty dataset"));
    }
    let now = options.clock.now();
    let (ds, _) = compute_and_store_body(store, ds, prev, options, &sink)?;
    persist(store, ds, prev, key, switches, now)
}

/// Check an assembled dataset before it is written
pub fn validate_dataset(ds: &Dataset) -> Result<()> {
    if ds.commit.is_none() {
        return Err(DatasnapError::invalid_input("commit is required"));
    }
    match &ds.structure {
        None => Err(DatasnapError::invalid_input("structure is required")),
        Some(st) if st.format.is_empty() => Err(DatasnapError::invalid_input("structure: format is required")),
        Some(st) if st.requires_tabular_schema() && st.schema.is_none() => {
            Err(DatasnapError::invalid_input("structure: csv data format requires a schema"))
        }
        Some(_) => Ok(()),
    }
}

/// Run the pipeline over the body while the store consumes it. Returns the
/// dataset with derived fields filled in, plus what the pipeline computed
/// and how the body compares to the previous one.
fn compute_and_store_body(
    store: &dyn ContentStore,
    mut ds: Dataset,
    prev: Option<&Dataset>,
    options: &SaveOptions,
    sink: &Arc<dyn ProgressSink>,
) -> Result<(Dataset, Option<(ComputedFields, BodyAction)>)> {
    if ds.body_file.is_none() {
        if let Some(body) = ds.body.take() {
            let st = ds.structure.get_or_insert_with(|| Structure::new("json"));
            if st.format.is_empty() {
                st.format = "json".to_string();
            }
            let data = serialize_body(st, &body).stage("serializing inline body")?;
            ds.body_file = Some(BodySource::from_bytes(st.body_filename(), data));
        }
    }

    let source = match ds.body_file.clone().or_else(|| prev.and_then(|p| p.body_file.clone())) {
        Some(source) => source,
        None => return Ok((ds, None)),
    };

    let declared = match ds.structure.take() {
        Some(st) => Some(st),
        None => prev.and_then(|p| p.structure.clone()),
    };
    let mut structure = infer_structure(&source, declared.as_ref()).stage("determining structure")?;
    structure.drop_derived_values();
    ds.structure = Some(structure);
    ds.body = None;
    ds.stats = None;

    let shared = Arc::new(Mutex::new(ds));
    let mut cff = ComputeFieldsFile::new(shared.clone(), prev, &options.config, sink.clone())?;
    log::debug!("writing body {}", cff.file_name());
    let stored = match store.put_reader(&mut cff) {
        Ok(stored) => stored,
        Err(e) => {
            // join the processor so nothing is published after the save ends
            if let Err(processing) = cff.finish() {
                log::debug!("body processor after failed write: {}", processing);
            }
            return Err(e.in_stage("saving body"));
        }
    };
    let computed = cff.finish()?;

    let mut ds = match Arc::try_unwrap(shared) {
        Ok(m) => m
            .into_inner()
            .map_err(|_| DatasnapError::invalid_input("dataset lock poisoned"))?,
        Err(shared) => shared
            .lock()
            .map_err(|_| DatasnapError::invalid_input("dataset lock poisoned"))?
            .clone(),
    };

    if let Some(st) = ds.structure.as_mut() {
        st.checksum = Some(stored.address.clone());
    }
    ds.stats = Some(computed.stats.clone());

    let same = prev.and_then(|p| p.body_path.as_deref()) == Some(stored.address.as_str());
    let action = if same { BodyAction::Same } else { computed.body_action };
    ds.body_path = Some(stored.address);
    Ok((ds, Some((computed, action))))
}

fn put_json<T: Serialize>(store: &dyn ContentStore, value: &T) -> Result<String> {
    store.put(&serde_json::to_vec(value)?)
}

/// Write every populated component, then the signed descriptor. `now`
/// stamps a commit that carries no timestamp of its own.
fn persist(
    store: &dyn ContentStore,
    mut ds: Dataset,
    prev: Option<&Dataset>,
    key: &Signer,
    switches: SaveSwitches,
    now: DateTime<Utc>,
) -> Result<String> {
    let mut descriptor = Dataset {
        body_path: ds.body_path.take(),
        previous_path: prev.and_then(|p| p.path.clone()),
        ..Default::default()
    };

    if let Some(mut meta) = ds.meta.take().filter(|m| !m.is_empty()) {
        meta.path = None;
        let path = put_json(store, &meta).stage("saving meta")?;
        descriptor.meta = Some(Meta::new_ref(path));
    }
    if let Some(mut st) = ds.structure.take().filter(|s| !s.is_empty()) {
        st.path = None;
        let path = put_json(store, &st).stage("saving structure")?;
        descriptor.structure = Some(Structure::new_ref(path));
    }
    if let Some(mut readme) = ds.readme.take().filter(|r| !r.is_empty()) {
        readme.path = None;
        if readme.format.is_empty() {
            readme.format = "md".to_string();
        }
        if !readme.text.is_empty() {
            readme.script_path = Some(store.put(readme.text.as_bytes()).stage("saving readme script")?);
            readme.text.clear();
        }
        let path = put_json(store, &readme).stage("saving readme")?;
        descriptor.readme = Some(Readme::new_ref(path));
    }
    if let Some(mut transform) = ds.transform.take().filter(|t| !t.is_empty()) {
        transform.path = None;
        if !transform.text.is_empty() {
            transform.script_path = Some(store.put(transform.text.as_bytes()).stage("saving transform script")?);
            transform.text.clear();
        }
        let path = put_json(store, &transform).stage("saving transform")?;
        descriptor.transform = Some(Transform::new_ref(path));
    }
    if let Some(mut stats) = ds.stats.take().filter(|s| !s.is_empty()) {
        stats.path = None;
        let path = put_json(store, &stats).stage("saving stats")?;
        descriptor.stats = Some(Stats::new_ref(path));
    }

    let mut commit = ds.commit.take().unwrap_or_default();
    commit.path = None;
    let timestamp = commit
        .timestamp
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(now);
    commit.timestamp = Some(timestamp.into());
    if commit.author.is_none() {
        commit.author = Some(Person {
            id: Some(key.author_id()),
            ..Default::default()
        });
    }
    descriptor.commit = Some(commit.clone());
    commit.signature = Some(key.sign_dataset(&descriptor).stage("signing commit")?);
    let commit_path = put_json(store, &commit).stage("saving commit")?;
    descriptor.commit = Some(Commit::new_ref(commit_path));

    let path = put_json(store, &descriptor).stage("saving dataset")?;
    if switches.pin {
        store.pin(&path).stage("pinning dataset")?;
    }
    log::info!("saved dataset {} to {}", ds.name, path);
    Ok(path)
}

fn load_component<T: DeserializeOwned>(store: &dyn ContentStore, path: &str) -> Result<T> {
    let data = store.get(path)?;
    serde_json::from_slice(&data).map_err(|e| DatasnapError::decode(format!("decoding {}: {}", path, e)))
}

fn load_script(store: &dyn ContentStore, path: &str) -> Result<String> {
    String::from_utf8(store.get(path)?).map_err(|e| DatasnapError::decode(format!("script {} is not utf-8: {}", path, e)))
}

/// Dereference a snapshot descriptor and all of its components. Scripts are
/// inlined; the body stays in the store behind a re-openable source.
pub fn load_dataset(store: Arc<dyn ContentStore>, path: &str) -> Result<Dataset> {
    let s = store.as_ref();
    let mut ds: Dataset = load_component(s, path).stage("loading dataset")?;

    if let Some(path) = ds.commit.as_ref().and_then(|c| c.path.clone()) {
        let mut commit: Commit = load_component(s, &path)
            .stage("loading commit file")
            .stage("loading dataset commit")?;
        commit.path = Some(path);
        ds.commit = Some(commit);
    }
    if let Some(path) = ds.meta.as_ref().and_then(|m| m.path.clone()) {
        let mut meta: Meta = load_component(s, &path)
            .stage("loading meta file")
            .stage("loading dataset meta")?;
        meta.path = Some(path);
        ds.meta = Some(meta);
    }
    if let Some(path) = ds.structure.as_ref().and_then(|st| st.path.clone()) {
        let mut st: Structure = load_component(s, &path)
            .stage("loading structure file")
            .stage("loading dataset structure")?;
        st.path = Some(path);
        ds.structure = Some(st);
    }
    if let Some(path) = ds.readme.as_ref().and_then(|r| r.path.clone()) {
        let mut readme: Readme = load_component(s, &path)
            .stage("loading readme file")
            .stage("loading dataset readme")?;
        if let Some(script) = readme.script_path.take() {
            readme.text = load_script(s, &script).stage("loading readme script")?;
        }
        readme.path = Some(path);
        ds.readme = Some(readme);
    }
    if let Some(path) = ds.transform.as_ref().and_then(|t| t.path.clone()) {
        let mut transform: Transform = load_component(s, &path)
            .stage("loading transform file")
            .stage("loading dataset transform")?;
        if let Some(script) = transform.script_path.take() {
            transform.text = load_script(s, &script).stage("loading transform script")?;
        }
        transform.path = Some(path);
        ds.transform = Some(transform);
    }
    if let Some(path) = ds.stats.as_ref().and_then(|st| st.path.clone()) {
        let mut stats: Stats = load_component(s, &path)
            .stage("loading stats file")
            .stage("loading dataset stats")?;
        stats.path = Some(path);
        ds.stats = Some(stats);
    }

    if let Some(body_path) = ds.body_path.clone() {
        let structure = ds.structure.clone().unwrap_or_default();
        ds.body_file = Some(BodySource::stored(
            store.clone(),
            body_path,
            format!("/{}", structure.body_filename()),
            structure.length,
        ));
    }
    ds.path = Some(path.to_string());
    Ok(ds)
}
