//! Hashing utilities for content addressing and row comparison

use blake3::Hasher;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, Write};

/// A hash value represented as a hex string
pub type HashValue = String;

/// Row hash with index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowHash {
    pub row_index: u64,
    pub hash: HashValue,
}

/// Hash a byte slice
pub fn hash_bytes(data: &[u8]) -> HashValue {
    blake3::hash(data).to_hex().to_string()
}

/// Incremental hasher that can sit behind an `io::Write`
#[derive(Default)]
pub struct ContentHasher {
    hasher: Hasher,
    len: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.len += data.len() as u64;
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(&self) -> HashValue {
        self.hasher.finalize().to_hex().to_string()
    }
}

impl Write for ContentHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hash computer for decoded body entries
pub struct HashComputer;

impl HashComputer {
    /// Hash a JSON value through its canonical serialization.
    /// Object keys serialize in sorted order, so equal values hash equally.
    pub fn hash_value(value: &Value) -> HashValue {
        let mut hasher = ContentHasher::new();
        // writing into a hasher can't fail
        let _ = serde_json::to_writer(&mut hasher, value);
        hasher.finalize()
    }

    /// Compute row hashes for a slice of entries
    pub fn hash_rows(rows: &[Value]) -> Vec<RowHash> {
        rows.par_iter()
            .enumerate()
            .map(|(idx, row)| RowHash {
                row_index: idx as u64,
                hash: Self::hash_value(row),
            })
            .collect()
    }

    /// Positions whose hashes differ, plus rows only present on one side
    pub fn compare_row_hashes(base: &[RowHash], compare: &[RowHash]) -> RowHashComparison {
        let common = base.len().min(compare.len());
        let changed_rows = (0..common)
            .into_par_iter()
            .filter(|&i| base[i].hash != compare[i].hash)
            .map(|i| i as u64)
            .collect();
        let added_rows = (common..compare.len()).map(|i| i as u64).collect();
        let removed_rows = (common..base.len()).map(|i| i as u64).collect();

        RowHashComparison {
            changed_rows,
            added_rows,
            removed_rows,
            total_base: base.len(),
            total_compare: compare.len(),
        }
    }
}

/// Result of comparing row hashes
#[derive(Debug, Clone, Default)]
pub struct RowHashComparison {
    pub changed_rows: Vec<u64>,
    pub added_rows: Vec<u64>,
    pub removed_rows: Vec<u64>,
    pub total_base: usize,
    pub total_compare: usize,
}

impl RowHashComparison {
    pub fn has_changes(&self) -> bool {
        !self.changed_rows.is_empty() || !self.added_rows.is_empty() || !self.removed_rows.is_empty()
    }

    pub fn total_changes(&self) -> usize {
        self.changed_rows.len() + self.added_rows.len() + self.removed_rows.len()
    }
}
