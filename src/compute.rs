//! Streaming compute-fields pipeline
//!
//! [`ComputeFieldsFile`] wraps a dataset body. Whatever consumes it (the
//! content store, normally) pulls bytes through [`Read::read`], and every
//! chunk is copied into a bounded channel drained by a background thread.
//! That thread decodes entries and derives the structure fields, the stats
//! component and, for small bodies, an inline copy of the body used for
//! exact diffing.
//!
//! The derived fields are written into the shared dataset under its mutex
//! and become valid once [`ComputeFieldsFile::finish`] returns.

use crate::codec::{entries_to_value, entry_reader, tabular_columns, Entry};
use crate::config::SaveConfig;
use crate::dataset::{Dataset, Stats, Structure};
use crate::error::{DatasnapError, Result, ResultExt};
use crate::progress::{publish_or_log, ProgressSink, SaveEvent};
use crate::schema;
use crate::stats::Accumulator;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde_json::{json, Value};
use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Chunks buffered between the body consumer and the entry decoder
const PIPE_DEPTH: usize = 16;

/// Completion reported before the body size is known
const UNKNOWN_SIZE_COMPLETION: f64 = 0.1;

/// How the body should be treated when describing changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyAction {
    /// Diff exactly if an inline body is available
    #[default]
    Default,
    /// Body is byte-identical to the previous version
    Same,
    /// Body streamed past the diff threshold; only approximate reporting
    TooBig,
}

/// What the pipeline hands back besides the fields it wrote into the dataset
#[derive(Debug, Clone)]
pub struct ComputedFields {
    pub stats: Stats,
    pub body_action: BodyAction,
    pub batches: usize,
}

/// Nesting depth of a value: 0 for scalars, 1 + deepest child for containers
pub fn get_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(get_depth).max().unwrap_or(0),
        Value::Object(fields) => 1 + fields.values().map(get_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Read side of the byte pipe; end of stream once every sender is gone
struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Body wrapper that tees every read into the background entry processor
pub struct ComputeFieldsFile {
    source: Box<dyn Read + Send>,
    pipe: Option<Sender<Vec<u8>>>,
    done: Receiver<Result<ComputedFields>>,
    handle: Option<JoinHandle<()>>,
    body_size: Option<u64>,
    bytes_read: Arc<AtomicU64>,
    filename: String,
}

impl ComputeFieldsFile {
    /// Start the pipeline over the next body, or the previous one when the
    /// next dataset carries none. `ds` must already have a structure with a
    /// format.
    pub fn new(
        ds: Arc<Mutex<Dataset>>,
        prev: Option<&Dataset>,
        config: &SaveConfig,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self> {
        let (body, structure, name) = {
            let guard = ds
                .lock()
                .map_err(|_| DatasnapError::invalid_input("dataset lock poisoned"))?;
            let body = guard
                .body_file
                .clone()
                .or_else(|| prev.and_then(|p| p.body_file.clone()))
                .ok_or_else(|| DatasnapError::missing_input("bodyfile or previous bodyfile needed"))?;
            let structure = guard
                .structure
                .clone()
                .filter(|st| !st.format.is_empty())
                .ok_or_else(|| DatasnapError::missing_input("dataset structure with a format is required"))?;
            (body, structure, guard.name.clone())
        };

        let source = body.open()?;
        let body_size = body.size();
        let filename = format!("/{}", structure.body_filename());

        let (pipe_tx, pipe_rx) = bounded::<Vec<u8>>(PIPE_DEPTH);
        let (done_tx, done_rx) = bounded(1);
        let bytes_read = Arc::new(AtomicU64::new(0));

        let processor = RowProcessor {
            ds,
            structure,
            name,
            config: config.clone(),
            sink,
            body_size,
            bytes_read: bytes_read.clone(),
            batches: 0,
            body_action: BodyAction::Default,
            diff_buf: Some(Vec::new()),
        };

        let handle = thread::spawn(move || {
            let result = processor.run(pipe_rx).stage("processing body data");
            if let Err(e) = &result {
                log::debug!("{}", e);
            }
            let _ = done_tx.send(result);
        });

        Ok(Self {
            source,
            pipe: Some(pipe_tx),
            done: done_rx,
            handle: Some(handle),
            body_size,
            bytes_read,
            filename,
        })
    }

    /// Name the body will be stored under, e.g. `/body.csv`
    pub fn file_name(&self) -> &str {
        &self.filename
    }

    pub fn size(&self) -> Option<u64> {
        self.body_size
    }

    /// Bytes pulled from the source so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::SeqCst)
    }

    /// Close the pipe and wait for the background processor. The dataset's
    /// derived structure fields are valid once this returns `Ok`.
    pub fn finish(mut self) -> Result<ComputedFields> {
        self.pipe.take();
        let result = self
            .done
            .recv()
            .map_err(|_| DatasnapError::invalid_input("body processor exited without a result"))
            .stage("processing body data")?;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result
    }
}

impl Read for ComputeFieldsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match self.source.read(buf) {
            Ok(n) => n,
            Err(e) => {
                // the processor sees a truncated stream and fails on its own
                self.pipe.take();
                return Err(e);
            }
        };
        if n == 0 {
            self.pipe.take();
            return Ok(0);
        }
        self.bytes_read.fetch_add(n as u64, Ordering::SeqCst);
        if let Some(pipe) = &self.pipe {
            if pipe.send(buf[..n].to_vec()).is_err() {
                // processor already stopped; its error arrives through `finish`
                self.pipe = None;
            }
        }
        Ok(n)
    }
}

/// State owned by the background thread for one pipeline run
struct RowProcessor {
    ds: Arc<Mutex<Dataset>>,
    structure: Structure,
    name: String,
    config: SaveConfig,
    sink: Arc<dyn ProgressSink>,
    body_size: Option<u64>,
    /// Bytes the body consumer has pulled from the source
    bytes_read: Arc<AtomicU64>,
    batches: usize,
    body_action: BodyAction,
    diff_buf: Option<Vec<Entry>>,
}

impl RowProcessor {
    fn run(mut self, pipe_rx: Receiver<Vec<u8>>) -> Result<ComputedFields> {
        let pipe = PipeReader {
            rx: pipe_rx.clone(),
            chunk: Vec::new(),
            pos: 0,
        };
        let mut reader = entry_reader(&self.structure, Box::new(pipe)).stage("creating entry reader")?;

        let titles = tabular_columns(self.structure.schema.as_ref())
            .into_iter()
            .map(|(title, _)| title)
            .collect();
        let mut acc = Accumulator::new(titles);
        let schema = self.structure.schema.clone().unwrap_or_else(|| json!({}));
        let batch_size = self.config.batch_size.max(1);

        self.publish_progress();

        let mut batch: Vec<Entry> = Vec::with_capacity(batch_size.min(1024));
        let mut err_count = 0usize;
        let mut entries = 0usize;
        let mut depth = 0usize;

        loop {
            let entry = match reader.read_entry() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => return Err(e.in_stage(format!("reading row {}", entries))),
            };
            let i = entries;

            depth = depth.max(get_depth(&entry.value));
            entries += 1;
            acc.write_entry(&entry)?;

            if i % batch_size == 0 && i != 0 {
                err_count += self.flush_batch(&mut batch, &schema)?;
            }

            if let Some(buf) = self.diff_buf.as_mut() {
                buf.push(entry.clone());
            }
            batch.push(entry);
        }

        log::debug!("read all {} entries", entries);
        err_count += self.flush_batch(&mut batch, &schema)?;
        acc.close()?;

        // the decoder may stop short of the source's end; wait for the
        // consumer to reach EOF so the length covers every stored byte
        while pipe_rx.recv().is_ok() {}
        let length = self.bytes_read.load(Ordering::SeqCst);
        {
            let mut ds = self
                .ds
                .lock()
                .map_err(|_| DatasnapError::invalid_input("dataset lock poisoned"))?;
            log::debug!(
                "determined structure values errCount={} entries={} depth={} length={}",
                err_count,
                entries,
                depth,
                length
            );
            let st = ds.structure.get_or_insert_with(Structure::default);
            st.err_count = Some(err_count as u64);
            st.entries = Some(entries as u64);
            // one more for the enclosing document
            st.depth = Some(depth as u64 + 1);
            st.length = Some(length);

            if let Some(buf) = self.diff_buf.take() {
                ds.body = Some(entries_to_value(&buf));
            }
        }

        Ok(ComputedFields {
            stats: Stats {
                path: None,
                stats: acc.to_value()?,
            },
            body_action: self.body_action,
            batches: self.batches,
        })
    }

    /// Validate one batch as a single document; returns its error count
    fn flush_batch(&mut self, batch: &mut Vec<Entry>, schema: &Value) -> Result<usize> {
        log::debug!("flushing batch {}", self.batches);
        self.batches += 1;

        let bytes_read = self.bytes_read.load(Ordering::SeqCst);
        if self.diff_buf.is_some() && bytes_read > self.config.body_size_small_enough_to_diff {
            log::debug!(
                "dropping diff buffer, bytes read exceeds {} bytes",
                self.config.body_size_small_enough_to_diff
            );
            self.diff_buf = None;
            self.body_action = BodyAction::TooBig;
        }

        if batch.is_empty() {
            log::debug!("batch is empty");
            return Ok(0);
        }

        let doc = entries_to_value(batch);
        batch.clear();
        let errs = schema::validate(schema, &doc);

        if self.structure.strict && !errs.is_empty() {
            return Err(DatasnapError::StrictMode { count: errs.len() });
        }

        self.publish_progress();
        Ok(errs.len())
    }

    fn publish_progress(&self) {
        let completion = match self.body_size {
            Some(size) if size > 0 => self.bytes_read.load(Ordering::SeqCst) as f64 / size as f64,
            _ => UNKNOWN_SIZE_COMPLETION,
        };
        publish_or_log(
            self.sink.as_ref(),
            SaveEvent::SaveProgress {
                name: self.name.clone(),
                completion,
            },
        );
    }
}
