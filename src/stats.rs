//! Streaming summary statistics over body entries

use crate::codec::Entry;
use crate::error::{DatasnapError, Result};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Default)]
struct NumericStats {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
}

impl NumericStats {
    fn add(&mut self, n: f64) {
        if self.count == 0 {
            self.min = n;
            self.max = n;
        } else {
            self.min = self.min.min(n);
            self.max = self.max.max(n);
        }
        self.sum += n;
        self.count += 1;
    }
}

#[derive(Debug, Clone, Default)]
struct StringStats {
    count: u64,
    min_length: usize,
    max_length: usize,
}

impl StringStats {
    fn add(&mut self, s: &str) {
        let len = s.chars().count();
        if self.count == 0 {
            self.min_length = len;
            self.max_length = len;
        } else {
            self.min_length = self.min_length.min(len);
            self.max_length = self.max_length.max(len);
        }
        self.count += 1;
    }
}

/// Running statistics for one column (or one key of object entries)
#[derive(Debug, Clone, Default)]
struct ColumnAccumulator {
    count: u64,
    null_count: u64,
    nested_count: u64,
    true_count: u64,
    false_count: u64,
    numeric: Option<NumericStats>,
    string: Option<StringStats>,
}

impl ColumnAccumulator {
    fn add(&mut self, value: &Value) {
        self.count += 1;
        match value {
            Value::Null => self.null_count += 1,
            Value::Bool(true) => self.true_count += 1,
            Value::Bool(false) => self.false_count += 1,
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    self.numeric.get_or_insert_with(NumericStats::default).add(f);
                }
            }
            Value::String(s) => self.string.get_or_insert_with(StringStats::default).add(s),
            Value::Array(_) | Value::Object(_) => self.nested_count += 1,
        }
    }

    fn to_value(&self, title: &str) -> Value {
        let mut out = Map::new();
        out.insert("title".to_string(), json!(title));
        out.insert("count".to_string(), json!(self.count));
        if self.null_count > 0 {
            out.insert("nullCount".to_string(), json!(self.null_count));
        }
        if self.nested_count > 0 {
            out.insert("nestedCount".to_string(), json!(self.nested_count));
        }
        if self.true_count + self.false_count > 0 {
            out.insert(
                "boolean".to_string(),
                json!({"trueCount": self.true_count, "falseCount": self.false_count}),
            );
        }
        if let Some(n) = &self.numeric {
            out.insert(
                "numeric".to_string(),
                json!({
                    "count": n.count,
                    "min": n.min,
                    "max": n.max,
                    "mean": n.sum / n.count as f64,
                }),
            );
        }
        if let Some(s) = &self.string {
            out.insert(
                "string".to_string(),
                json!({"count": s.count, "minLength": s.min_length, "maxLength": s.max_length}),
            );
        }
        Value::Object(out)
    }
}

/// Ingests entries one at a time; results are readable only after [`close`](Accumulator::close)
#[derive(Debug, Default)]
pub struct Accumulator {
    titles: Vec<String>,
    columns: IndexMap<String, ColumnAccumulator>,
    entries: u64,
    closed: bool,
}

impl Accumulator {
    /// `titles` names tabular columns by position; unnamed positions become `field_N`
    pub fn new(titles: Vec<String>) -> Self {
        Self {
            titles,
            ..Default::default()
        }
    }

    fn column_title(&self, i: usize) -> String {
        self.titles
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("field_{}", i + 1))
    }

    pub fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        if self.closed {
            return Err(DatasnapError::invalid_input("cannot write to a closed stats accumulator"));
        }
        self.entries += 1;
        match &entry.value {
            Value::Array(cells) => {
                for (i, cell) in cells.iter().enumerate() {
                    let title = self.column_title(i);
                    self.columns.entry(title).or_default().add(cell);
                }
            }
            Value::Object(fields) => {
                for (key, field) in fields {
                    self.columns.entry(key.clone()).or_default().add(field);
                }
            }
            scalar => self.columns.entry("value".to_string()).or_default().add(scalar),
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(DatasnapError::invalid_input("stats accumulator already closed"));
        }
        self.closed = true;
        Ok(())
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Per-column statistics in first-seen column order
    pub fn to_value(&self) -> Result<Value> {
        if !self.closed {
            return Err(DatasnapError::invalid_input("stats accumulator must be closed before reading"));
        }
        Ok(Value::Array(
            self.columns
                .iter()
                .map(|(title, col)| col.to_value(title))
                .collect(),
        ))
    }
}
