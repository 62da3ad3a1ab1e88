//! Entry readers and writers for body formats
//!
//! A body is a top-level JSON array or object, a newline-delimited stream of
//! JSON values, or CSV rows. Readers yield one [`Entry`] at a time so bodies
//! never need to be materialized.

use crate::dataset::{BodySource, Structure};
use crate::error::{DatasnapError, Result};
use serde_json::{json, Map, Value};
use std::io::{BufRead, BufReader, Read, Write};

/// Supported body formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Ndjson,
    Csv,
}

impl DataFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            "csv" => Ok(Self::Csv),
            "" => Err(DatasnapError::invalid_input("no body format specified")),
            other => Err(DatasnapError::invalid_input(format!("unsupported body format: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Ndjson => "ndjson",
            Self::Csv => "csv",
        }
    }

    /// Format of a body source judged by its name, skipping a trailing `.zst`
    pub fn detect(source: &BodySource) -> Result<(Self, Option<String>)> {
        let name = source.name().to_ascii_lowercase();
        let (stem, compression) = match name.strip_suffix(".zst") {
            Some(stem) => (stem.to_string(), Some("zst".to_string())),
            None => (name, None),
        };
        let ext = std::path::Path::new(&stem)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();
        Ok((Self::parse(&ext)?, compression))
    }
}

/// One record of a body
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub index: usize,
    /// Set when the body is a top-level object
    pub key: Option<String>,
    pub value: Value,
}

/// Record-sequential reader
pub trait EntryReader {
    /// Next entry, or `None` at end of body
    fn read_entry(&mut self) -> Result<Option<Entry>>;
}

/// Record-sequential writer
pub trait EntryWriter {
    fn write_entry(&mut self, entry: &Entry) -> Result<()>;

    /// Write any closing bytes; must be called once after the last entry
    fn close(&mut self) -> Result<()>;
}

/// Wrap a raw byte stream with the decompressor the structure calls for
pub fn decompress<'a>(structure: &Structure, reader: Box<dyn Read + Send + 'a>) -> Result<Box<dyn Read + Send + 'a>> {
    match structure.compression.as_deref() {
        None | Some("") => Ok(reader),
        Some("zst") => Ok(Box::new(zstd::stream::read::Decoder::new(reader)?)),
        Some(other) => Err(DatasnapError::invalid_input(format!("unsupported compression: {}", other))),
    }
}

/// Build an entry reader for a raw (possibly compressed) body stream
pub fn entry_reader<'a>(structure: &Structure, reader: Box<dyn Read + Send + 'a>) -> Result<Box<dyn EntryReader + Send + 'a>> {
    let reader = decompress(structure, reader)?;
    match DataFormat::parse(&structure.format)? {
        DataFormat::Json => Ok(Box::new(JsonReader::new(reader))),
        DataFormat::Ndjson => Ok(Box::new(NdjsonReader::new(reader))),
        DataFormat::Csv => Ok(Box::new(CsvEntryReader::new(structure, reader))),
    }
}

/// Read every entry of a stream into memory
pub fn read_all_entries(reader: &mut dyn EntryReader) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    while let Some(entry) = reader.read_entry()? {
        entries.push(entry);
    }
    Ok(entries)
}

/// Collect entries back into the single JSON value they came from
pub fn entries_to_value(entries: &[Entry]) -> Value {
    if entries.iter().any(|e| e.key.is_some()) {
        let map: Map<String, Value> = entries
            .iter()
            .map(|e| (e.key.clone().unwrap_or_default(), e.value.clone()))
            .collect();
        Value::Object(map)
    } else {
        Value::Array(entries.iter().map(|e| e.value.clone()).collect())
    }
}

/// Split an in-memory body value into entries
pub fn value_to_entries(body: &Value) -> Vec<Entry> {
    match body {
        Value::Object(map) => map
            .iter()
            .enumerate()
            .map(|(index, (k, v))| Entry {
                index,
                key: Some(k.clone()),
                value: v.clone(),
            })
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, v)| Entry {
                index,
                key: None,
                value: v.clone(),
            })
            .collect(),
        other => vec![Entry {
            index: 0,
            key: None,
            value: other.clone(),
        }],
    }
}

/// Serialize a body value in the format described by the structure
pub fn serialize_body(structure: &Structure, body: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut writer = entry_writer(structure, &mut buf)?;
        for entry in value_to_entries(body) {
            writer.write_entry(&entry)?;
        }
        writer.close()?;
    }
    Ok(buf)
}

pub fn entry_writer<'a, W: Write + 'a>(structure: &Structure, out: W) -> Result<Box<dyn EntryWriter + 'a>> {
    match DataFormat::parse(&structure.format)? {
        DataFormat::Json => Ok(Box::new(JsonWriter::new(out))),
        DataFormat::Ndjson => Ok(Box::new(NdjsonWriter { out })),
        DataFormat::Csv => Ok(Box::new(CsvEntryWriter::new(structure, out))),
    }
}

// ---------------------------------------------------------------------------
// JSON

/// Incremental scanner over a top-level JSON array or object
///
/// Values are sliced out byte by byte, tracking bracket depth and string
/// state, and decoded one at a time.
pub struct JsonReader<R: Read> {
    inner: BufReader<R>,
    started: bool,
    finished: bool,
    object: bool,
    index: usize,
}

impl<R: Read> JsonReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            started: false,
            finished: false,
            object: false,
            index: 0,
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        Ok(self.inner.fill_buf()?.first().copied())
    }

    fn bump(&mut self) -> Result<Option<u8>> {
        let b = self.peek()?;
        if b.is_some() {
            self.inner.consume(1);
        }
        Ok(b)
    }

    fn skip_whitespace(&mut self) -> Result<Option<u8>> {
        while let Some(b) = self.peek()? {
            if b.is_ascii_whitespace() {
                self.inner.consume(1);
            } else {
                return Ok(Some(b));
            }
        }
        Ok(None)
    }

    fn expect(&mut self, want: u8) -> Result<()> {
        match self.skip_whitespace()? {
            Some(b) if b == want => {
                self.inner.consume(1);
                Ok(())
            }
            Some(b) => Err(DatasnapError::decode(format!(
                "invalid json body: expected '{}', found '{}'",
                want as char, b as char
            ))),
            None => Err(DatasnapError::decode(format!(
                "invalid json body: expected '{}', found end of input",
                want as char
            ))),
        }
    }

    fn scan_string(&mut self, raw: &mut Vec<u8>) -> Result<()> {
        // opening quote already pushed
        loop {
            let b = self
                .bump()?
                .ok_or_else(|| DatasnapError::decode("invalid json body: unterminated string"))?;
            raw.push(b);
            match b {
                b'\\' => {
                    let escaped = self
                        .bump()?
                        .ok_or_else(|| DatasnapError::decode("invalid json body: unterminated string"))?;
                    raw.push(escaped);
                }
                b'"' => return Ok(()),
                _ => {}
            }
        }
    }

    fn scan_value(&mut self) -> Result<Vec<u8>> {
        let first = self
            .skip_whitespace()?
            .ok_or_else(|| DatasnapError::decode("invalid json body: unexpected end of input"))?;
        let mut raw = Vec::new();
        match first {
            b'{' | b'[' => {
                let mut depth = 0usize;
                loop {
                    let b = self
                        .bump()?
                        .ok_or_else(|| DatasnapError::decode("invalid json body: unexpected end of input"))?;
                    raw.push(b);
                    match b {
                        b'"' => self.scan_string(&mut raw)?,
                        b'{' | b'[' => depth += 1,
                        b'}' | b']' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
            }
            b'"' => {
                self.inner.consume(1);
                raw.push(b'"');
                self.scan_string(&mut raw)?;
            }
            _ => {
                while let Some(b) = self.peek()? {
                    if b == b',' || b == b']' || b == b'}' || b.is_ascii_whitespace() {
                        break;
                    }
                    raw.push(b);
                    self.inner.consume(1);
                }
            }
        }
        Ok(raw)
    }

    fn decode(raw: &[u8]) -> Result<Value> {
        serde_json::from_slice(raw).map_err(|e| DatasnapError::decode(format!("invalid json body entry: {}", e)))
    }
}

impl<R: Read> EntryReader for JsonReader<R> {
    fn read_entry(&mut self) -> Result<Option<Entry>> {
        if self.finished {
            return Ok(None);
        }

        if !self.started {
            self.started = true;
            match self.skip_whitespace()? {
                Some(b'[') => self.object = false,
                Some(b'{') => self.object = true,
                Some(b) => {
                    return Err(DatasnapError::decode(format!(
                        "invalid json body: top-level value must be an array or object, found '{}'",
                        b as char
                    )))
                }
                None => return Err(DatasnapError::decode("invalid json body: empty input")),
            }
            self.inner.consume(1);
        } else {
            match self.skip_whitespace()? {
                Some(b',') => self.inner.consume(1),
                Some(b']') | Some(b'}') => {}
                Some(b) => {
                    return Err(DatasnapError::decode(format!(
                        "invalid json body: expected ',' between entries, found '{}'",
                        b as char
                    )))
                }
                None => return Err(DatasnapError::decode("invalid json body: unexpected end of input")),
            }
        }

        let close = if self.object { b'}' } else { b']' };
        if self.skip_whitespace()? == Some(close) {
            self.inner.consume(1);
            self.finished = true;
            if self.skip_whitespace()?.is_some() {
                return Err(DatasnapError::decode(
                    "invalid json body: trailing data after top-level value",
                ));
            }
            return Ok(None);
        }

        let key = if self.object {
            let raw = self.scan_value()?;
            let key = match Self::decode(&raw)? {
                Value::String(s) => s,
                _ => return Err(DatasnapError::decode("invalid json body: object keys must be strings")),
            };
            self.expect(b':')?;
            Some(key)
        } else {
            None
        };

        let raw = self.scan_value()?;
        let value = Self::decode(&raw)?;
        let entry = Entry {
            index: self.index,
            key,
            value,
        };
        self.index += 1;
        Ok(Some(entry))
    }
}

pub struct JsonWriter<W: Write> {
    out: W,
    count: usize,
    object: Option<bool>,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            count: 0,
            object: None,
        }
    }
}

impl<W: Write> EntryWriter for JsonWriter<W> {
    fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        if self.object.is_none() {
            let object = entry.key.is_some();
            self.out.write_all(if object { b"{" } else { b"[" })?;
            self.object = Some(object);
        }
        if self.count > 0 {
            self.out.write_all(b",")?;
        }
        if let Some(key) = &entry.key {
            serde_json::to_writer(&mut self.out, key)?;
            self.out.write_all(b":")?;
        }
        serde_json::to_writer(&mut self.out, &entry.value)?;
        self.count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.object {
            None => self.out.write_all(b"[]")?,
            Some(true) => self.out.write_all(b"}")?,
            Some(false) => self.out.write_all(b"]")?,
        }
        self.out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NDJSON

pub struct NdjsonReader<R: Read> {
    inner: BufReader<R>,
    line: String,
    index: usize,
}

impl<R: Read> NdjsonReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: String::new(),
            index: 0,
        }
    }
}

impl<R: Read> EntryReader for NdjsonReader<R> {
    fn read_entry(&mut self) -> Result<Option<Entry>> {
        loop {
            self.line.clear();
            if self.inner.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value = serde_json::from_str(trimmed).map_err(|e| {
                DatasnapError::decode(format!("invalid ndjson body at entry {}: {}", self.index, e))
            })?;
            let entry = Entry {
                index: self.index,
                key: None,
                value,
            };
            self.index += 1;
            return Ok(Some(entry));
        }
    }
}

pub struct NdjsonWriter<W: Write> {
    out: W,
}

impl<W: Write> EntryWriter for NdjsonWriter<W> {
    fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        serde_json::to_writer(&mut self.out, &entry.value)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CSV

/// Column titles and types from a tabular schema
/// (`{"type":"array","items":{"type":"array","items":[{"title":..,"type":..}]}}`)
pub fn tabular_columns(schema: Option<&Value>) -> Vec<(String, String)> {
    schema
        .and_then(|s| s.get("items"))
        .and_then(|items| items.get("items"))
        .and_then(Value::as_array)
        .map(|cols| {
            cols.iter()
                .enumerate()
                .map(|(i, col)| {
                    let title = col
                        .get("title")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("field_{}", i + 1));
                    let kind = col
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("string")
                        .to_string();
                    (title, kind)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Convert one CSV cell into the JSON type its column declares.
/// Cells that don't parse stay strings so validation can count them.
fn type_cell(raw: &str, kind: &str) -> Value {
    match kind {
        "integer" => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        "number" => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
            .unwrap_or_else(|| Value::String(raw.to_string())),
        "boolean" => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        "null" if raw.is_empty() => Value::Null,
        _ => Value::String(raw.to_string()),
    }
}

pub struct CsvEntryReader<R: Read> {
    inner: csv::Reader<R>,
    column_types: Vec<String>,
    record: csv::StringRecord,
    index: usize,
}

impl<R: Read> CsvEntryReader<R> {
    pub fn new(structure: &Structure, reader: R) -> Self {
        let inner = csv::ReaderBuilder::new()
            .has_headers(structure.format_flag("headerRow"))
            .flexible(structure.format_flag("lazyQuotes"))
            .from_reader(reader);
        let column_types = tabular_columns(structure.schema.as_ref())
            .into_iter()
            .map(|(_, kind)| kind)
            .collect();
        Self {
            inner,
            column_types,
            record: csv::StringRecord::new(),
            index: 0,
        }
    }
}

impl<R: Read> EntryReader for CsvEntryReader<R> {
    fn read_entry(&mut self) -> Result<Option<Entry>> {
        if !self.inner.read_record(&mut self.record)? {
            return Ok(None);
        }
        let row: Vec<Value> = self
            .record
            .iter()
            .enumerate()
            .map(|(i, cell)| type_cell(cell, self.column_types.get(i).map(String::as_str).unwrap_or("string")))
            .collect();
        let entry = Entry {
            index: self.index,
            key: None,
            value: Value::Array(row),
        };
        self.index += 1;
        Ok(Some(entry))
    }
}

pub struct CsvEntryWriter<W: Write> {
    inner: csv::Writer<W>,
    header: Option<Vec<String>>,
}

impl<W: Write> CsvEntryWriter<W> {
    pub fn new(structure: &Structure, out: W) -> Self {
        let header = if structure.format_flag("headerRow") {
            Some(
                tabular_columns(structure.schema.as_ref())
                    .into_iter()
                    .map(|(title, _)| title)
                    .collect(),
            )
        } else {
            None
        };
        Self {
            inner: csv::WriterBuilder::new().flexible(true).from_writer(out),
            header,
        }
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl<W: Write> EntryWriter for CsvEntryWriter<W> {
    fn write_entry(&mut self, entry: &Entry) -> Result<()> {
        if let Some(header) = self.header.take() {
            self.inner.write_record(&header)?;
        }
        match &entry.value {
            Value::Array(cells) => self.inner.write_record(cells.iter().map(cell_text))?,
            Value::Object(map) => self.inner.write_record(map.values().map(cell_text))?,
            scalar => self.inner.write_record([cell_text(scalar)])?,
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(header) = self.header.take() {
            self.inner.write_record(&header)?;
        }
        self.inner.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Structure inference

const INFER_SAMPLE_BYTES: u64 = 64 * 1024;

fn infer_cell_type(cell: &str) -> &'static str {
    let cell = cell.trim();
    if cell.parse::<i64>().is_ok() {
        "integer"
    } else if cell.parse::<f64>().is_ok() {
        "number"
    } else if cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false") {
        "boolean"
    } else {
        "string"
    }
}

/// Build a tabular schema from column titles and types
pub fn tabular_schema(columns: &[(String, String)]) -> Value {
    let items: Vec<Value> = columns
        .iter()
        .map(|(title, kind)| json!({"title": title, "type": kind}))
        .collect();
    json!({"type": "array", "items": {"type": "array", "items": items}})
}

/// Fill in format, compression and schema for a body that arrived without
/// a structure, sampling only the head of the source
pub fn infer_structure(source: &BodySource, declared: Option<&Structure>) -> Result<Structure> {
    let mut structure = declared.cloned().unwrap_or_default();
    if structure.format.is_empty() {
        let (format, compression) = DataFormat::detect(source)?;
        structure.format = format.as_str().to_string();
        if structure.compression.is_none() {
            structure.compression = compression;
        }
    }
    if structure.schema.is_some() {
        return Ok(structure);
    }

    let mut sample = Vec::new();
    decompress(&structure, source.open()?)?
        .take(INFER_SAMPLE_BYTES)
        .read_to_end(&mut sample)?;

    let schema = match DataFormat::parse(&structure.format)? {
        DataFormat::Ndjson => json!({"type": "array"}),
        DataFormat::Json => match sample.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => json!({"type": "object"}),
            _ => json!({"type": "array"}),
        },
        DataFormat::Csv => {
            let (columns, header_row) = infer_csv_columns(&sample)?;
            let cfg = structure.format_config.get_or_insert_with(Map::new);
            if !cfg.contains_key("headerRow") {
                cfg.insert("headerRow".to_string(), Value::Bool(header_row));
            }
            tabular_schema(&columns)
        }
    };
    log::debug!("inferred {} schema for {}", structure.format, source.name());
    structure.schema = Some(schema);
    Ok(structure)
}

/// Guess column names and types from the first rows of a CSV sample.
/// The first row is a header when none of its cells look numeric or
/// boolean while the second row has at least one that does.
fn infer_csv_columns(sample: &[u8]) -> Result<(Vec<(String, String)>, bool)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(sample);
    let mut rows = Vec::new();
    for record in reader.records().take(2) {
        match record {
            Ok(r) => rows.push(r),
            // the sample may cut the last row short
            Err(_) => break,
        }
    }
    let first = match rows.first() {
        Some(r) => r,
        None => return Ok((Vec::new(), false)),
    };
    let first_all_text = first.iter().all(|c| infer_cell_type(c) == "string");
    let second_has_typed = rows
        .get(1)
        .map(|r| r.iter().any(|c| infer_cell_type(c) != "string"))
        .unwrap_or(false);
    let header_row = first_all_text && (second_has_typed || rows.len() == 1);

    let columns = if header_row {
        let types: Vec<&str> = rows
            .get(1)
            .map(|r| r.iter().map(infer_cell_type).collect())
            .unwrap_or_default();
        first
            .iter()
            .enumerate()
            .map(|(i, title)| (title.to_string(), types.get(i).copied().unwrap_or("string").to_string()))
            .collect()
    } else {
        first
            .iter()
            .enumerate()
            .map(|(i, cell)| (format!("field_{}", i + 1), infer_cell_type(cell).to_string()))
            .collect()
    };
    Ok((columns, header_row))
}
