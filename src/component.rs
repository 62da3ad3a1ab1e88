//! Component model
//!
//! Every part of a dataset (commit, structure, meta, readme, transform,
//! body, stats) is a [`Component`]: it can be loaded from a file, compared
//! against another instance of the same kind, stripped of derived values
//! and written back out. A dataset container component groups the rest,
//! which is how a checked-out directory of component files is read.

use crate::codec::{entries_to_value, entry_reader, infer_structure, read_all_entries, serialize_body};
use crate::dataset::{BodySource, Commit, Dataset, Meta, Readme, Stats, Structure, Transform};
use crate::error::{DatasnapError, Result, ResultExt};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Formats loaded as raw text rather than structured fields
const TEXT_FORMATS: &[&str] = &["md", "html", "txt", "star", "py"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKind {
    Dataset,
    Commit,
    Structure,
    Meta,
    Readme,
    Transform,
    Body,
    Stats,
}

impl ComponentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Commit => "commit",
            Self::Structure => "structure",
            Self::Meta => "meta",
            Self::Readme => "readme",
            Self::Transform => "transform",
            Self::Body => "body",
            Self::Stats => "stats",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "dataset" => Some(Self::Dataset),
            "commit" => Some(Self::Commit),
            "structure" => Some(Self::Structure),
            "meta" => Some(Self::Meta),
            "readme" => Some(Self::Readme),
            "transform" => Some(Self::Transform),
            "body" => Some(Self::Body),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// State shared by every component kind
#[derive(Debug, Clone, Default)]
pub struct BaseComponent {
    pub source_file: Option<PathBuf>,
    /// File format without the dot, e.g. `json` or `md`
    pub format: String,
    pub is_loaded: bool,
    /// Refuse to write this component; used for scaffolding without files
    pub disable_serialization: bool,
    pub problem_kind: Option<String>,
    pub problem_message: Option<String>,
}

/// Raw contents of a component file
enum Loaded {
    Fields(Value),
    Text(String),
}

impl BaseComponent {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        Self {
            source_file: Some(path),
            format,
            ..Default::default()
        }
    }

    fn record_problem(&mut self, kind: &str, err: DatasnapError) -> DatasnapError {
        self.problem_kind = Some(kind.to_string());
        self.problem_message = Some(err.to_string());
        err
    }

    fn load_file(&mut self) -> Result<Loaded> {
        let path = match &self.source_file {
            Some(p) => p.clone(),
            None => return Err(DatasnapError::missing_input("component has no source file")),
        };
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) => return Err(self.record_problem("file:open", e.into())),
        };
        if TEXT_FORMATS.contains(&self.format.as_str()) {
            return match String::from_utf8(data) {
                Ok(text) => Ok(Loaded::Text(text)),
                Err(e) => Err(self.record_problem(
                    "parse",
                    DatasnapError::decode(format!("decoding {}: {}", path.display(), e)),
                )),
            };
        }
        match self.format.as_str() {
            "json" => match serde_json::from_slice(&data) {
                Ok(v) => Ok(Loaded::Fields(v)),
                Err(e) => Err(self.record_problem(
                    "parse",
                    DatasnapError::decode(format!("decoding {}: {}", path.display(), e)),
                )),
            },
            other => Err(self.record_problem(
                "format",
                DatasnapError::decode(format!("unknown component file format: {}", other)),
            )),
        }
    }
}

/// Payload types that live inside a [`Part`]
pub trait Payload: Serialize + DeserializeOwned + Clone + Default {
    const KIND: ComponentKind;

    fn is_empty(&self) -> bool;
    fn drop_derived_values(&mut self);
    fn assign_to(&self, ds: &mut Dataset);

    /// Build from a raw text file, for free-form components
    fn from_text(_format: &str, _text: &str) -> Option<Self> {
        None
    }

    /// File name written by `write_to`, given the component's file format
    fn file_name(&self, _format: &str) -> String {
        format!("{}.json", Self::KIND.name())
    }

    /// Raw text body, written instead of JSON unless the component came
    /// from a JSON file
    fn text(&self) -> Option<&str> {
        None
    }

    /// Value compared by `compare`
    fn comparable(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Payload for Commit {
    const KIND: ComponentKind = ComponentKind::Commit;

    fn is_empty(&self) -> bool {
        Commit::is_empty(self)
    }

    fn drop_derived_values(&mut self) {
        Commit::drop_derived_values(self)
    }

    fn assign_to(&self, ds: &mut Dataset) {
        ds.commit = Some(self.clone());
    }
}

impl Payload for Structure {
    const KIND: ComponentKind = ComponentKind::Structure;

    fn is_empty(&self) -> bool {
        Structure::is_empty(self)
    }

    fn drop_derived_values(&mut self) {
        Structure::drop_derived_values(self)
    }

    fn assign_to(&self, ds: &mut Dataset) {
        ds.structure = Some(self.clone());
    }

    fn comparable(&self) -> Result<Value> {
        let mut bare = self.clone();
        bare.drop_derived_values();
        Ok(serde_json::to_value(bare)?)
    }
}

impl Payload for Meta {
    const KIND: ComponentKind = ComponentKind::Meta;

    fn is_empty(&self) -> bool {
        Meta::is_empty(self)
    }

    fn drop_derived_values(&mut self) {
        Meta::drop_derived_values(self)
    }

    fn assign_to(&self, ds: &mut Dataset) {
        ds.meta = Some(self.clone());
    }
}

impl Payload for Readme {
    const KIND: ComponentKind = ComponentKind::Readme;

    fn is_empty(&self) -> bool {
        Readme::is_empty(self)
    }

    fn drop_derived_values(&mut self) {
        Readme::drop_derived_values(self)
    }

    fn assign_to(&self, ds: &mut Dataset) {
        ds.readme = Some(self.clone());
    }

    fn from_text(format: &str, text: &str) -> Option<Self> {
        Some(Readme {
            format: format.to_string(),
            text: text.to_string(),
            ..Default::default()
        })
    }

    fn file_name(&self, format: &str) -> String {
        let ext = match format {
            "json" => "json",
            _ => [self.format.as_str(), format]
                .into_iter()
                .find(|f| !f.is_empty())
                .unwrap_or("md"),
        };
        format!("readme.{}", ext)
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }
}

impl Payload for Transform {
    const KIND: ComponentKind = ComponentKind::Transform;

    fn is_empty(&self) -> bool {
        Transform::is_empty(self)
    }

    fn drop_derived_values(&mut self) {
        Transform::drop_derived_values(self)
    }

    fn assign_to(&self, ds: &mut Dataset) {
        ds.transform = Some(self.clone());
    }

    fn from_text(format: &str, text: &str) -> Option<Self> {
        Some(Transform {
            syntax: format.to_string(),
            text: text.to_string(),
            ..Default::default()
        })
    }

    fn file_name(&self, format: &str) -> String {
        let ext = match format {
            "json" => "json",
            _ => [self.syntax.as_str(), format]
                .into_iter()
                .find(|f| !f.is_empty())
                .unwrap_or("star"),
        };
        format!("transform.{}", ext)
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn comparable(&self) -> Result<Value> {
        Ok(Value::String(self.text.clone()))
    }
}

impl Payload for Stats {
    const KIND: ComponentKind = ComponentKind::Stats;

    fn is_empty(&self) -> bool {
        Stats::is_empty(self)
    }

    fn drop_derived_values(&mut self) {
        Stats::drop_derived_values(self)
    }

    fn assign_to(&self, ds: &mut Dataset) {
        ds.stats = Some(self.clone());
    }
}

/// A component with a typed payload
#[derive(Debug, Clone, Default)]
pub struct Part<T> {
    pub base: BaseComponent,
    pub value: Option<T>,
}

impl<T: Payload> Part<T> {
    pub fn new(value: T) -> Self {
        Self {
            base: BaseComponent::default(),
            value: Some(value),
        }
    }

    pub fn from_base(base: BaseComponent) -> Self {
        Self { base, value: None }
    }

    fn load_and_fill(&mut self, ds: Option<&mut Dataset>) -> Result<()> {
        if self.base.is_loaded {
            return Ok(());
        }
        if self.value.is_none() {
            let value = match self.base.load_file()? {
                Loaded::Fields(fields) => match serde_json::from_value::<T>(fields) {
                    Ok(v) => v,
                    Err(e) => {
                        let err = DatasnapError::decode(format!("decoding {}: {}", T::KIND, e));
                        return Err(self.base.record_problem("parse", err));
                    }
                },
                Loaded::Text(text) => match T::from_text(&self.base.format, &text) {
                    Some(v) => v,
                    None => {
                        let err = DatasnapError::decode(format!(
                            "{} can't be read from a .{} file",
                            T::KIND,
                            self.base.format
                        ));
                        return Err(self.base.record_problem("format", err));
                    }
                },
            };
            self.value = Some(value);
        }
        self.base.is_loaded = true;
        if let (Some(ds), Some(value)) = (ds, self.value.as_ref()) {
            value.assign_to(ds);
        }
        Ok(())
    }

    fn compare(&mut self, other: &mut Part<T>) -> Result<bool> {
        self.load_and_fill(None)?;
        other.load_and_fill(None)?;
        let a = self.value.as_ref().map(T::comparable).transpose()?;
        let b = other.value.as_ref().map(T::comparable).transpose()?;
        Ok(a == b)
    }

    fn write_to(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        if self.base.disable_serialization {
            return Err(DatasnapError::invalid_input("serialization is disabled"));
        }
        self.load_and_fill(None)?;
        let value = match &self.value {
            Some(v) if !v.is_empty() => v,
            _ => return Ok(None),
        };
        let target = dir.join(value.file_name(&self.base.format));
        match value.text().filter(|_| self.base.format != "json") {
            Some(text) => fs::write(&target, text)?,
            None => fs::write(&target, serde_json::to_vec_pretty(value)?)?,
        }
        Ok(Some(target))
    }

    fn remove_from(&self, dir: &Path) -> Result<()> {
        let name = self.value.clone().unwrap_or_default().file_name(&self.base.format);
        remove_if_exists(&dir.join(name))
    }

    fn structured_data(&mut self) -> Result<Value> {
        self.load_and_fill(None)?;
        Ok(match &self.value {
            Some(v) => serde_json::to_value(v)?,
            None => Value::Null,
        })
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// The body, decoded in full only when asked
#[derive(Debug, Clone, Default)]
pub struct BodyComponent {
    pub base: BaseComponent,
    pub source: Option<BodySource>,
    pub structure: Option<Structure>,
    pub value: Option<Value>,
}

impl BodyComponent {
    pub fn from_base(base: BaseComponent) -> Self {
        let source = base.source_file.clone().map(BodySource::from_path);
        Self {
            base,
            source,
            structure: None,
            value: None,
        }
    }

    /// Hand the body source to `ds`; entries are decoded only on demand
    fn load_and_fill(&mut self, ds: Option<&mut Dataset>) -> Result<()> {
        if self.source.is_none() && self.value.is_none() {
            return Err(DatasnapError::missing_input("body component has no source"));
        }
        self.base.is_loaded = true;
        if let (Some(ds), Some(source)) = (ds, &self.source) {
            ds.body_file = Some(source.clone());
            if let Some(st) = &self.structure {
                if ds.structure.is_none() {
                    ds.structure = Some(st.clone());
                }
            }
        }
        Ok(())
    }

    /// Decode the whole body into `value`
    fn load_value(&mut self) -> Result<&Value> {
        if self.value.is_none() {
            let source = self
                .source
                .clone()
                .ok_or_else(|| DatasnapError::missing_input("body component has no source"))?;
            let structure = infer_structure(&source, self.structure.as_ref())?;
            let mut reader = entry_reader(&structure, source.open()?)?;
            let entries = match read_all_entries(reader.as_mut()) {
                Ok(e) => e,
                Err(e) => return Err(self.base.record_problem("parse", e)),
            };
            self.value = Some(match entries_to_value(&entries) {
                Value::Array(a) if a.is_empty() && structure.schema == Some(json!({"type": "object"})) => {
                    json!({})
                }
                v => v,
            });
            self.structure = Some(structure);
        }
        Ok(self.value.get_or_insert(Value::Null))
    }

    fn write_to(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        if self.base.disable_serialization {
            return Err(DatasnapError::invalid_input("serialization is disabled"));
        }
        self.load_value()?;
        let structure = self
            .structure
            .as_ref()
            .ok_or_else(|| DatasnapError::invalid_input("cannot write body without a structure"))?;
        let body = self.value.as_ref().unwrap_or(&Value::Null);
        let data = serialize_body(structure, body)?;
        let target = dir.join(format!("body.{}", structure.format));
        fs::write(&target, data)?;
        Ok(Some(target))
    }

    fn format(&self) -> String {
        self.structure
            .as_ref()
            .map(|s| s.format.clone())
            .unwrap_or_else(|| self.base.format.clone())
    }
}

/// A dataset assembled from its subcomponents
#[derive(Debug, Clone, Default)]
pub struct DatasetComponent {
    pub base: BaseComponent,
    pub value: Option<Dataset>,
    pub subcomponents: IndexMap<ComponentKind, Component>,
}

impl DatasetComponent {
    fn load(&mut self) -> Result<()> {
        if self.base.is_loaded {
            return Ok(());
        }
        let mut value = self.value.take().unwrap_or_default();
        let result = self
            .subcomponents
            .values_mut()
            .try_for_each(|sub| sub.load_and_fill(Some(&mut value)));
        self.value = Some(value);
        result?;
        self.base.is_loaded = true;
        Ok(())
    }
}

/// One part of a dataset, by kind
#[derive(Debug, Clone)]
pub enum Component {
    Dataset(DatasetComponent),
    Commit(Part<Commit>),
    Structure(Part<Structure>),
    Meta(Part<Meta>),
    Readme(Part<Readme>),
    Transform(Part<Transform>),
    Body(BodyComponent),
    Stats(Part<Stats>),
}

/// Operations every component supports
pub trait ComponentOps {
    fn kind(&self) -> ComponentKind;

    fn base(&self) -> &BaseComponent;

    /// Load from the source file if not yet loaded, and copy the value into
    /// `ds` when given. Calling it again is a no-op.
    fn load_and_fill(&mut self, ds: Option<&mut Dataset>) -> Result<()>;

    /// Semantic equality; `Ok(false)` for a different kind
    fn compare(&mut self, other: &mut Component) -> Result<bool>;

    fn drop_derived_values(&mut self);

    /// Write the component file into `dir`; `Ok(None)` when there is nothing to write
    fn write_to(&mut self, dir: &Path) -> Result<Option<PathBuf>>;

    /// Delete the component file from `dir`; a missing file is fine
    fn remove_from(&self, dir: &Path) -> Result<()>;

    fn structured_data(&mut self) -> Result<Value>;
}

impl Component {
    /// Construct an unloaded component from its kind name
    pub fn for_kind(name: &str, base: BaseComponent) -> Option<Component> {
        Some(match ComponentKind::parse(name)? {
            ComponentKind::Dataset => Component::Dataset(DatasetComponent {
                base,
                ..Default::default()
            }),
            ComponentKind::Commit => Component::Commit(Part::from_base(base)),
            ComponentKind::Structure => Component::Structure(Part::from_base(base)),
            ComponentKind::Meta => Component::Meta(Part::from_base(base)),
            ComponentKind::Readme => Component::Readme(Part::from_base(base)),
            ComponentKind::Transform => Component::Transform(Part::from_base(base)),
            ComponentKind::Body => Component::Body(BodyComponent::from_base(base)),
            ComponentKind::Stats => Component::Stats(Part::from_base(base)),
        })
    }

    pub fn base_mut(&mut self) -> &mut BaseComponent {
        match self {
            Component::Dataset(c) => &mut c.base,
            Component::Commit(c) => &mut c.base,
            Component::Structure(c) => &mut c.base,
            Component::Meta(c) => &mut c.base,
            Component::Readme(c) => &mut c.base,
            Component::Transform(c) => &mut c.base,
            Component::Body(c) => &mut c.base,
            Component::Stats(c) => &mut c.base,
        }
    }

    /// Mark the component as one that must not be written
    pub fn disable_serialization(mut self) -> Self {
        self.base_mut().disable_serialization = true;
        self
    }
}

impl ComponentOps for Component {
    fn kind(&self) -> ComponentKind {
        match self {
            Component::Dataset(_) => ComponentKind::Dataset,
            Component::Commit(_) => ComponentKind::Commit,
            Component::Structure(_) => ComponentKind::Structure,
            Component::Meta(_) => ComponentKind::Meta,
            Component::Readme(_) => ComponentKind::Readme,
            Component::Transform(_) => ComponentKind::Transform,
            Component::Body(_) => ComponentKind::Body,
            Component::Stats(_) => ComponentKind::Stats,
        }
    }

    fn base(&self) -> &BaseComponent {
        match self {
            Component::Dataset(c) => &c.base,
            Component::Commit(c) => &c.base,
            Component::Structure(c) => &c.base,
            Component::Meta(c) => &c.base,
            Component::Readme(c) => &c.base,
            Component::Transform(c) => &c.base,
            Component::Body(c) => &c.base,
            Component::Stats(c) => &c.base,
        }
    }

    fn load_and_fill(&mut self, ds: Option<&mut Dataset>) -> Result<()> {
        match self {
            Component::Dataset(c) => {
                c.load()?;
                if let (Some(ds), Some(value)) = (ds, c.value.as_ref()) {
                    *ds = value.clone();
                }
                Ok(())
            }
            Component::Commit(c) => c.load_and_fill(ds),
            Component::Structure(c) => c.load_and_fill(ds),
            Component::Meta(c) => c.load_and_fill(ds),
            Component::Readme(c) => c.load_and_fill(ds),
            Component::Transform(c) => c.load_and_fill(ds),
            Component::Body(c) => c.load_and_fill(ds),
            Component::Stats(c) => c.load_and_fill(ds),
        }
    }

    fn compare(&mut self, other: &mut Component) -> Result<bool> {
        match (self, other) {
            (Component::Commit(a), Component::Commit(b)) => a.compare(b),
            (Component::Structure(a), Component::Structure(b)) => a.compare(b),
            (Component::Meta(a), Component::Meta(b)) => a.compare(b),
            (Component::Readme(a), Component::Readme(b)) => a.compare(b),
            (Component::Transform(a), Component::Transform(b)) => a.compare(b),
            (Component::Stats(a), Component::Stats(b)) => a.compare(b),
            (Component::Body(a), Component::Body(b)) => Ok(a.load_value()?.clone() == *b.load_value()?),
            (Component::Dataset(a), Component::Dataset(b)) => {
                a.load()?;
                b.load()?;
                Ok(serde_json::to_value(&a.value)? == serde_json::to_value(&b.value)?)
            }
            _ => Ok(false),
        }
    }

    fn drop_derived_values(&mut self) {
        match self {
            Component::Dataset(c) => {
                for sub in c.subcomponents.values_mut() {
                    sub.drop_derived_values();
                }
                if let Some(ds) = c.value.as_mut() {
                    ds.drop_derived_values();
                }
            }
            Component::Commit(c) => drop_part(c),
            Component::Structure(c) => drop_part(c),
            Component::Meta(c) => drop_part(c),
            Component::Readme(c) => drop_part(c),
            Component::Transform(c) => drop_part(c),
            Component::Stats(c) => drop_part(c),
            Component::Body(_) => {}
        }
    }

    fn write_to(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        match self {
            Component::Dataset(_) => Err(DatasnapError::invalid_input("cannot write dataset component")),
            Component::Commit(c) => c.write_to(dir),
            Component::Structure(c) => c.write_to(dir),
            Component::Meta(c) => c.write_to(dir),
            Component::Readme(c) => c.write_to(dir),
            Component::Transform(c) => c.write_to(dir),
            Component::Body(c) => c.write_to(dir),
            Component::Stats(c) => c.write_to(dir),
        }
    }

    fn remove_from(&self, dir: &Path) -> Result<()> {
        match self {
            Component::Dataset(_) => Err(DatasnapError::invalid_input("cannot remove dataset component")),
            Component::Commit(c) => c.remove_from(dir),
            Component::Structure(c) => c.remove_from(dir),
            Component::Meta(c) => c.remove_from(dir),
            Component::Readme(c) => c.remove_from(dir),
            Component::Transform(c) => c.remove_from(dir),
            Component::Body(c) => remove_if_exists(&dir.join(format!("body.{}", c.format()))),
            Component::Stats(c) => c.remove_from(dir),
        }
    }

    fn structured_data(&mut self) -> Result<Value> {
        match self {
            Component::Dataset(c) => {
                c.load()?;
                Ok(serde_json::to_value(&c.value)?)
            }
            Component::Body(c) => Ok(c.load_value()?.clone()),
            Component::Commit(c) => c.structured_data(),
            Component::Structure(c) => c.structured_data(),
            Component::Meta(c) => c.structured_data(),
            Component::Readme(c) => c.structured_data(),
            Component::Transform(c) => c.structured_data(),
            Component::Stats(c) => c.structured_data(),
        }
    }
}

fn drop_part<T: Payload>(part: &mut Part<T>) {
    if let Some(v) = part.value.as_mut() {
        v.drop_derived_values();
    }
}

/// Read a directory of component files (`meta.json`, `body.csv`, ...) into
/// a dataset container component
pub fn from_dir(dir: &Path) -> Result<Component> {
    let mut container = DatasetComponent {
        base: BaseComponent {
            source_file: Some(dir.to_path_buf()),
            ..Default::default()
        },
        ..Default::default()
    };

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();

    for path in files {
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };
        let kind = match ComponentKind::parse(&stem) {
            Some(ComponentKind::Dataset) | None => continue,
            Some(kind) => kind,
        };
        if container.subcomponents.contains_key(&kind) {
            return Err(DatasnapError::invalid_input(format!(
                "{} is defined in more than one file in {}",
                kind,
                dir.display()
            )));
        }
        let base = BaseComponent::from_file(&path);
        if let Some(component) = Component::for_kind(kind.name(), base) {
            log::debug!("found {} component at {}", kind, path.display());
            container.subcomponents.insert(kind, component);
        }
    }

    // body decoding needs the declared structure
    let structure = match container.subcomponents.get_mut(&ComponentKind::Structure) {
        Some(Component::Structure(part)) => {
            part.load_and_fill(None)?;
            part.value.clone()
        }
        _ => None,
    };
    if let Some(Component::Body(body)) = container.subcomponents.get_mut(&ComponentKind::Body) {
        body.structure = structure;
    }

    Ok(Component::Dataset(container))
}

/// Split a loaded dataset into loaded components, in file order
pub fn components_of(ds: &Dataset) -> Vec<Component> {
    fn loaded<T: Payload>(value: &Option<T>) -> Option<Part<T>> {
        value.clone().map(|v| {
            let mut part = Part::new(v);
            part.base.is_loaded = true;
            part
        })
    }

    let mut out = Vec::new();
    if let Some(p) = loaded(&ds.commit) {
        out.push(Component::Commit(p));
    }
    if let Some(p) = loaded(&ds.meta) {
        out.push(Component::Meta(p));
    }
    if let Some(p) = loaded(&ds.structure) {
        out.push(Component::Structure(p));
    }
    if let Some(p) = loaded(&ds.readme) {
        out.push(Component::Readme(p));
    }
    if let Some(p) = loaded(&ds.transform) {
        out.push(Component::Transform(p));
    }
    if let Some(p) = loaded(&ds.stats) {
        out.push(Component::Stats(p));
    }
    if ds.body_file.is_some() || ds.body.is_some() {
        out.push(Component::Body(BodyComponent {
            base: BaseComponent {
                is_loaded: true,
                ..Default::default()
            },
            source: ds.body_file.clone(),
            structure: ds.structure.clone(),
            value: ds.body.clone(),
        }));
    }
    out
}

/// Write every populated component of `ds` into `dir`
pub fn write_dataset_dir(ds: &Dataset, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for mut component in components_of(ds) {
        let kind = component.kind();
        if let Some(path) = component.write_to(dir).stage(&format!("writing {}", kind))? {
            written.push(path);
        }
    }
    Ok(written)
}

/// Load every component file in `dir` into a dataset ready to save
pub fn dataset_from_dir(dir: &Path) -> Result<Dataset> {
    let mut container = from_dir(dir)?;
    let mut ds = Dataset::default();
    container.load_and_fill(Some(&mut ds))?;
    Ok(ds)
}
