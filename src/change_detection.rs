//! Change detection between two dataset versions and the commit
//! descriptions built from it

use crate::codec::{entries_to_value, entry_reader, read_all_entries, value_to_entries, Entry, EntryReader};
use crate::compute::BodyAction;
use crate::config::SaveConfig;
use crate::dataset::Dataset;
use crate::error::{DatasnapError, Result};
use crate::hash::HashComputer;
use crate::store::ContentStore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// How a single field of a component changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeVerb {
    Added,
    Updated,
    Removed,
}

impl fmt::Display for ChangeVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Added => "added",
            Self::Updated => "updated",
            Self::Removed => "removed",
        })
    }
}

/// One leaf-level change, located by a dotted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub verb: ChangeVerb,
    pub path: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.path)
    }
}

/// One row-level body operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub verb: ChangeVerb,
    /// Row index for array bodies, key for object bodies
    pub row: String,
    pub keyed: bool,
}

impl fmt::Display for RowChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.keyed { "key" } else { "row" };
        write!(f, "{} {} {}", self.verb, noun, self.row)
    }
}

/// Summary of what happened to one component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "lowercase")]
pub enum ComponentChange {
    Added,
    Removed,
    Fields { changes: Vec<FieldChange> },
    Rows { changes: Vec<RowChange> },
    Percent { percent: u64 },
}

/// A change paired with the component kind it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindChange {
    pub kind: String,
    pub change: ComponentChange,
}

impl KindChange {
    pub fn short(&self) -> String {
        match &self.change {
            ComponentChange::Added => format!("{} added", self.kind),
            ComponentChange::Removed => format!("{} removed", self.kind),
            ComponentChange::Fields { changes } if changes.len() == 1 => {
                format!("{} {}", self.kind, changes[0])
            }
            ComponentChange::Fields { changes } => {
                format!("{} updated {} fields", self.kind, changes.len())
            }
            ComponentChange::Rows { changes } => {
                let parts: Vec<String> = changes.iter().map(ToString::to_string).collect();
                format!("{} {}", self.kind, oxford_join(&parts))
            }
            ComponentChange::Percent { percent } => format!("{} changed by {}%", self.kind, percent),
        }
    }

    pub fn long(&self) -> String {
        let lines: Vec<String> = match &self.change {
            ComponentChange::Added | ComponentChange::Removed => return self.short(),
            ComponentChange::Fields { changes } => changes.iter().map(ToString::to_string).collect(),
            ComponentChange::Rows { changes } => changes.iter().map(ToString::to_string).collect(),
            ComponentChange::Percent { percent } => vec![format!("changed by {}%", percent)],
        };
        format!("{}:\n\t{}", self.kind, lines.join("\n\t"))
    }
}

/// "a", "a and b", "a, b, and c"
pub fn oxford_join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{} and {}", a, b),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

/// Leaf-level differences between two JSON trees. Arrays are compared as
/// whole values; objects are walked key by key.
pub fn diff_fields(prev: &Value, next: &Value) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    walk_fields(prev, next, "", &mut changes);
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn walk_fields(prev: &Value, next: &Value, path: &str, out: &mut Vec<FieldChange>) {
    match (prev, next) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, av) in a {
                let p = join_path(path, key);
                match b.get(key) {
                    Some(bv) => walk_fields(av, bv, &p, out),
                    None => out.push(FieldChange {
                        verb: ChangeVerb::Removed,
                        path: p,
                    }),
                }
            }
            for key in b.keys().filter(|k| !a.contains_key(*k)) {
                out.push(FieldChange {
                    verb: ChangeVerb::Added,
                    path: join_path(path, key),
                });
            }
        }
        (a, b) if a != b => out.push(FieldChange {
            verb: ChangeVerb::Updated,
            path: path.to_string(),
        }),
        _ => {}
    }
}

/// Number of values in a tree, containers included
pub fn node_count(value: &Value) -> u64 {
    match value {
        Value::Array(items) => 1 + items.iter().map(node_count).sum::<u64>(),
        Value::Object(fields) => 1 + fields.values().map(node_count).sum::<u64>(),
        _ => 1,
    }
}

/// Number of scalar values in a tree
pub fn leaf_count(value: &Value) -> u64 {
    match value {
        Value::Array(items) => items.iter().map(leaf_count).sum(),
        Value::Object(fields) => fields.values().map(leaf_count).sum(),
        _ => 1,
    }
}

/// Scalar values that differ between two trees, walking arrays by position
pub fn changed_leaves(prev: &Value, next: &Value) -> u64 {
    match (prev, next) {
        (Value::Array(a), Value::Array(b)) => {
            let common: u64 = a.iter().zip(b.iter()).map(|(x, y)| changed_leaves(x, y)).sum();
            let extra: u64 = if a.len() > b.len() {
                a[b.len()..].iter().map(leaf_count).sum()
            } else {
                b[a.len()..].iter().map(leaf_count).sum()
            };
            common + extra
        }
        (Value::Object(a), Value::Object(b)) => {
            let mut total = 0;
            for (key, av) in a {
                total += match b.get(key) {
                    Some(bv) => changed_leaves(av, bv),
                    None => leaf_count(av),
                };
            }
            for (key, bv) in b {
                if !a.contains_key(key) {
                    total += leaf_count(bv);
                }
            }
            total
        }
        (a, b) if a == b => 0,
        (a, b) if a.is_array() || a.is_object() || b.is_array() || b.is_object() => {
            leaf_count(a).max(leaf_count(b)).max(1)
        }
        _ => 1,
    }
}

/// Running tally for the percentage-changed estimate
#[derive(Debug, Default, Clone, Copy)]
struct PercentTally {
    changed: u64,
    nodes: u64,
}

impl PercentTally {
    fn new() -> Self {
        // the enclosing document
        Self { changed: 0, nodes: 1 }
    }

    fn pair(&mut self, prev: &Value, next: &Value) {
        self.nodes += node_count(prev);
        self.changed += changed_leaves(prev, next);
    }

    fn removed(&mut self, prev: &Value) {
        self.nodes += node_count(prev);
        self.changed += leaf_count(prev);
    }

    fn added(&mut self, next: &Value) {
        self.changed += leaf_count(next);
    }

    /// Changed leaves over previous node count, rounded down, at most 100
    fn percent(&self) -> u64 {
        (self.changed * 100 / self.nodes.max(1)).min(100)
    }
}

/// Positional (array) or keyed (object) row operations, in encounter order
pub fn diff_rows(prev: &Value, next: &Value) -> Vec<RowChange> {
    match (prev, next) {
        (Value::Object(a), Value::Object(b)) => diff_keyed_rows(a, b),
        _ => {
            let prev_rows: Vec<Value> = value_to_entries(prev).into_iter().map(|e| e.value).collect();
            let next_rows: Vec<Value> = value_to_entries(next).into_iter().map(|e| e.value).collect();
            let cmp = HashComputer::compare_row_hashes(
                &HashComputer::hash_rows(&prev_rows),
                &HashComputer::hash_rows(&next_rows),
            );
            if !cmp.has_changes() {
                return Vec::new();
            }
            let row = |verb, i: &u64| RowChange {
                verb,
                row: i.to_string(),
                keyed: false,
            };
            cmp.changed_rows
                .iter()
                .map(|i| row(ChangeVerb::Updated, i))
                .chain(cmp.added_rows.iter().map(|i| row(ChangeVerb::Added, i)))
                .chain(cmp.removed_rows.iter().map(|i| row(ChangeVerb::Removed, i)))
                .collect()
        }
    }
}

fn diff_keyed_rows(prev: &Map<String, Value>, next: &Map<String, Value>) -> Vec<RowChange> {
    let mut ops = Vec::new();
    for (key, av) in prev {
        match next.get(key) {
            Some(bv) if bv != av => ops.push(RowChange {
                verb: ChangeVerb::Updated,
                row: key.clone(),
                keyed: true,
            }),
            Some(_) => {}
            None => ops.push(RowChange {
                verb: ChangeVerb::Removed,
                row: key.clone(),
                keyed: true,
            }),
        }
    }
    for key in next.keys().filter(|k| !prev.contains_key(*k)) {
        ops.push(RowChange {
            verb: ChangeVerb::Added,
            row: key.clone(),
            keyed: true,
        });
    }
    ops
}

/// Percentage changed between two in-memory bodies
pub fn percent_changed(prev: &Value, next: &Value) -> u64 {
    let prev_entries = value_to_entries(prev);
    let next_entries = value_to_entries(next);
    let mut tally = PercentTally::new();
    let mut next_iter = next_entries.iter();
    for p in &prev_entries {
        match next_iter.next() {
            Some(n) => tally.pair(&p.value, &n.value),
            None => tally.removed(&p.value),
        }
    }
    for n in next_iter {
        tally.added(&n.value);
    }
    tally.percent()
}

/// Percentage changed between two bodies, reading both one entry at a time
pub fn percent_changed_streaming(prev: &mut dyn EntryReader, next: &mut dyn EntryReader) -> Result<u64> {
    let mut tally = PercentTally::new();
    loop {
        match (prev.read_entry()?, next.read_entry()?) {
            (Some(p), Some(n)) => tally.pair(&p.value, &n.value),
            (Some(p), None) => {
                tally.removed(&p.value);
                while let Some(Entry { value, .. }) = prev.read_entry()? {
                    tally.removed(&value);
                }
                break;
            }
            (None, Some(n)) => {
                tally.added(&n.value);
                while let Some(Entry { value, .. }) = next.read_entry()? {
                    tally.added(&value);
                }
                break;
            }
            (None, None) => break,
        }
    }
    Ok(tally.percent())
}

fn has_body(ds: &Dataset) -> bool {
    ds.body.is_some() || ds.body_path.is_some() || ds.body_file.is_some()
}

/// Open a streaming reader over a dataset's body, preferring the stored copy
fn open_body(store: &dyn ContentStore, ds: &Dataset) -> Result<Option<Box<dyn EntryReader + Send>>> {
    let structure = match &ds.structure {
        Some(st) if !st.format.is_empty() => st,
        _ => return Ok(None),
    };
    let raw = if let Some(path) = &ds.body_path {
        store.open(path)?
    } else if let Some(file) = &ds.body_file {
        file.open()?
    } else {
        return Ok(None);
    };
    Ok(Some(entry_reader(structure, raw)?))
}

/// Decode a body into memory if it is known to be under the diff threshold
fn small_body(store: &dyn ContentStore, ds: &Dataset, limit: u64) -> Result<Option<Value>> {
    if let Some(body) = &ds.body {
        return Ok(Some(body.clone()));
    }
    let length = ds.structure.as_ref().and_then(|s| s.length);
    match length {
        Some(len) if len <= limit => {}
        _ => return Ok(None),
    }
    let mut reader = match open_body(store, ds)? {
        Some(r) => r,
        None => return Ok(None),
    };
    let entries = read_all_entries(reader.as_mut())?;
    Ok(Some(entries_to_value(&entries)))
}

fn diff_body(
    store: &dyn ContentStore,
    next: &Dataset,
    prev: &Dataset,
    body_action: BodyAction,
    config: &SaveConfig,
) -> Result<Option<ComponentChange>> {
    if body_action == BodyAction::Same {
        return Ok(None);
    }
    match (has_body(prev), has_body(next)) {
        (false, true) => return Ok(Some(ComponentChange::Added)),
        (true, true) => {}
        _ => return Ok(None),
    }

    if body_action == BodyAction::Default {
        let limit = config.body_size_small_enough_to_diff;
        if let (Some(p), Some(n)) = (small_body(store, prev, limit)?, small_body(store, next, limit)?) {
            let rows = diff_rows(&p, &n);
            if rows.is_empty() {
                return Ok(None);
            }
            if rows.len() <= config.max_enumerated_changes {
                return Ok(Some(ComponentChange::Rows { changes: rows }));
            }
            return Ok(Some(ComponentChange::Percent {
                percent: percent_changed(&p, &n),
            }));
        }
    }

    let (mut p, mut n) = match (open_body(store, prev)?, open_body(store, next)?) {
        (Some(p), Some(n)) => (p, n),
        _ => return Ok(None),
    };
    log::debug!("body too big for an exact diff, estimating change percentage");
    let percent = percent_changed_streaming(p.as_mut(), n.as_mut())?;
    Ok(Some(ComponentChange::Percent { percent }))
}

/// Field-level diff of one head component given as JSON values
fn diff_component(prev: Option<Value>, next: Option<Value>) -> Option<ComponentChange> {
    let present = |v: &Option<Value>| match v {
        None | Some(Value::Null) => false,
        Some(Value::Object(m)) => !m.is_empty(),
        Some(_) => true,
    };
    match (present(&prev), present(&next)) {
        (false, false) => None,
        (false, true) => Some(ComponentChange::Added),
        (true, false) => Some(ComponentChange::Removed),
        (true, true) => {
            let changes = diff_fields(prev.as_ref().unwrap_or(&Value::Null), next.as_ref().unwrap_or(&Value::Null));
            if changes.is_empty() {
                None
            } else {
                Some(ComponentChange::Fields { changes })
            }
        }
    }
}

/// Head components as JSON, with derived values dropped
fn head_components(ds: &Dataset) -> Result<Vec<(&'static str, Option<Value>)>> {
    let mut ds = ds.clone();
    ds.drop_derived_values();
    let meta = ds.meta.filter(|m| !m.is_empty()).map(serde_json::to_value).transpose()?;
    let structure = ds
        .structure
        .filter(|s| !s.is_empty())
        .map(serde_json::to_value)
        .transpose()?;
    let readme = ds.readme.filter(|r| !r.is_empty()).map(serde_json::to_value).transpose()?;
    let transform = ds
        .transform
        .filter(|t| !t.is_empty())
        .map(|t| Value::String(t.text));
    Ok(vec![
        ("meta", meta),
        ("structure", structure),
        ("readme", readme),
        ("transform", transform),
    ])
}

/// Every component-level change from `prev` to `next`, in display order
pub fn detect_changes(
    store: &dyn ContentStore,
    next: &Dataset,
    prev: &Dataset,
    body_action: BodyAction,
    config: &SaveConfig,
) -> Result<Vec<KindChange>> {
    let mut changes = Vec::new();
    for ((kind, p), (_, n)) in head_components(prev)?.into_iter().zip(head_components(next)?) {
        if let Some(change) = diff_component(p, n) {
            changes.push(KindChange {
                kind: kind.to_string(),
                change,
            });
        }
    }
    if let Some(change) = diff_body(store, next, prev, body_action, config)? {
        changes.push(KindChange {
            kind: "body".to_string(),
            change,
        });
    }
    Ok(changes)
}

/// Short title and long message describing `prev` → `next`
pub fn generate_commit_descriptions(
    store: &dyn ContentStore,
    next: &Dataset,
    prev: &Dataset,
    body_action: BodyAction,
    force: bool,
    config: &SaveConfig,
) -> Result<(String, String)> {
    if prev.is_empty() {
        return Ok(("created dataset".to_string(), "created dataset".to_string()));
    }
    if force {
        return Ok(("forced update".to_string(), "forced update".to_string()));
    }

    let changes = detect_changes(store, next, prev, body_action, config)?;
    match changes.as_slice() {
        [] => Err(DatasnapError::NoChanges),
        [only] => Ok((only.short(), only.long())),
        many => {
            let kinds: Vec<String> = many.iter().map(|c| c.kind.clone()).collect();
            let long: Vec<String> = many.iter().map(KindChange::long).collect();
            Ok((format!("updated {}", oxford_join(&kinds)), long.join("\n")))
        }
    }
}
