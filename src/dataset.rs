//! Dataset and component value types
//!
//! A [`Dataset`] is the in-memory form of one snapshot. Every component is
//! optional so the same type describes a partial "next" dataset handed to
//! a save, a fully loaded snapshot, and the stored top-level descriptor in
//! which each component is reduced to a reference (`{"path": "..."}`).

use crate::error::{DatasnapError, Result};
use crate::store::ContentStore;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn is_false(b: &bool) -> bool {
    !*b
}

/// A re-openable source of body bytes
#[derive(Clone)]
pub enum BodySource {
    Bytes { name: String, data: Arc<Vec<u8>> },
    File(PathBuf),
    /// A body already held by a content store
    Stored {
        name: String,
        address: String,
        size: Option<u64>,
        store: Arc<dyn ContentStore>,
    },
}

impl BodySource {
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            name: name.into(),
            data: Arc::new(data.into()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn stored(
        store: Arc<dyn ContentStore>,
        address: impl Into<String>,
        name: impl Into<String>,
        size: Option<u64>,
    ) -> Self {
        Self::Stored {
            name: name.into(),
            address: address.into(),
            size,
            store,
        }
    }

    /// File name of the source, used for format detection
    pub fn name(&self) -> String {
        match self {
            Self::Bytes { name, .. } => name.clone(),
            Self::File(path) => path.to_string_lossy().to_string(),
            Self::Stored { name, .. } => name.clone(),
        }
    }

    /// Size in bytes, when it can be known without reading
    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Bytes { data, .. } => Some(data.len() as u64),
            Self::File(path) => std::fs::metadata(path).ok().map(|m| m.len()),
            Self::Stored { size, .. } => *size,
        }
    }

    /// Extension of the source name, lowercased
    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            Self::Bytes { data, .. } => Ok(Box::new(Cursor::new(SharedBytes(data.clone())))),
            Self::File(path) => Ok(Box::new(File::open(path)?)),
            Self::Stored { address, store, .. } => store.open(address),
        }
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes { name, data } => write!(f, "BodySource::Bytes({}, {} bytes)", name, data.len()),
            Self::File(path) => write!(f, "BodySource::File({})", path.display()),
            Self::Stored { address, .. } => write!(f, "BodySource::Stored({})", address),
        }
    }
}

struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// A person credited on a dataset or commit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct License {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Versioning metadata for one snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Commit {
    pub fn new_ref(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.author.is_none()
            && self.message.is_none()
            && self.signature.is_none()
            && self.timestamp.is_none()
            && self.title.is_none()
    }

    pub fn drop_derived_values(&mut self) {
        self.path = None;
        self.signature = None;
    }
}

/// Schema plus structural facts derived from the body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Structure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_count: Option<u64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_config: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strict: bool,
}

impl Structure {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Default::default()
        }
    }

    pub fn new_ref(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn is_empty(&self) -> bool {
        let mut bare = self.clone();
        bare.path = None;
        bare == Structure::default()
    }

    /// Clear every field recomputed on save
    pub fn drop_derived_values(&mut self) {
        self.checksum = None;
        self.depth = None;
        self.entries = None;
        self.err_count = None;
        self.length = None;
        self.path = None;
    }

    /// Name of the body file this structure describes, e.g. `body.ndjson.zst`
    pub fn body_filename(&self) -> String {
        match &self.compression {
            Some(c) if !c.is_empty() => format!("body.{}.{}", self.format, c),
            _ => format!("body.{}", self.format),
        }
    }

    pub fn requires_tabular_schema(&self) -> bool {
        self.format == "csv"
    }

    /// Boolean option from `formatConfig`
    pub fn format_flag(&self, key: &str) -> bool {
        self.format_config
            .as_ref()
            .and_then(|cfg| cfg.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Descriptive metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "accessURL", default, skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributors: Vec<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "downloadURL", default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(rename = "homeURL", default, skip_serializing_if = "Option::is_none")]
    pub home_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub language: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "readmeURL", default, skip_serializing_if = "Option::is_none")]
    pub readme_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub theme: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Keys this type doesn't model are kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Meta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn new_ref(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        let mut bare = self.clone();
        bare.path = None;
        bare == Meta::default()
    }

    pub fn drop_derived_values(&mut self) {
        self.path = None;
    }
}

/// Free-text documentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readme {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl Readme {
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            format: "md".to_string(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn new_ref(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.script_path.is_none()
    }

    pub fn drop_derived_values(&mut self) {
        self.path = None;
    }
}

/// Script that produced the body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub syntax: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl Transform {
    pub fn new_ref(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.script_path.is_none() && self.config.is_none()
    }

    pub fn drop_derived_values(&mut self) {
        self.path = None;
    }
}

/// Summary statistics of the body, entirely derived
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub stats: Value,
}

impl Stats {
    pub fn new_ref(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_null()
    }

    pub fn drop_derived_values(&mut self) {
        self.path = None;
        self.stats = Value::Null;
    }
}

/// One version of a dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Inline body, only populated for small bodies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<Commit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub peername: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<Readme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Structure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(skip)]
    pub body_file: Option<BodySource>,
}

impl Dataset {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| DatasnapError::decode(format!("decoding dataset: {}", e)))
    }

    pub fn set_body_file(&mut self, source: BodySource) {
        self.body_file = Some(source);
    }

    /// True when no component, body or body reference is present
    pub fn is_empty(&self) -> bool {
        self.commit.is_none()
            && self.meta.is_none()
            && self.readme.is_none()
            && self.stats.is_none()
            && self.structure.is_none()
            && self.transform.is_none()
            && self.body.is_none()
            && self.body_path.is_none()
            && self.body_file.is_none()
    }

    /// Recursively clear values recomputed on every save
    pub fn drop_derived_values(&mut self) {
        self.path = None;
        if let Some(c) = self.commit.as_mut() {
            c.drop_derived_values();
        }
        if let Some(s) = self.structure.as_mut() {
            s.drop_derived_values();
        }
        if let Some(m) = self.meta.as_mut() {
            m.drop_derived_values();
        }
        if let Some(r) = self.readme.as_mut() {
            r.drop_derived_values();
        }
        if let Some(t) = self.transform.as_mut() {
            t.drop_derived_values();
        }
        self.stats = None;
    }
}
