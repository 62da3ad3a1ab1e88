//! Content-addressed object stores
//!
//! Addresses are `/<scheme>/<blake3 hex>` strings handed out by the store.
//! Callers never construct them.

use crate::error::{DatasnapError, Result};
use crate::hash::{hash_bytes, ContentHasher};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// Result of streaming an object into a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub address: String,
    pub size: u64,
}

/// Put/get-by-hash object storage
pub trait ContentStore: Send + Sync {
    /// Store a byte slice and return its address
    fn put(&self, data: &[u8]) -> Result<String>;

    /// Store everything a reader yields, consuming it exactly once
    fn put_reader(&self, reader: &mut dyn Read) -> Result<StoredObject>;

    /// Fetch the bytes at an address
    fn get(&self, address: &str) -> Result<Vec<u8>>;

    /// Stream the bytes at an address
    fn open(&self, address: &str) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.get(address)?)))
    }

    fn has(&self, address: &str) -> Result<bool>;

    /// Mark an object as one that must be retained
    fn pin(&self, address: &str) -> Result<()>;

    /// Number of objects currently held
    fn object_count(&self) -> Result<usize>;
}

fn not_found(address: &str) -> DatasnapError {
    DatasnapError::store(format!("path not found: {}", address))
}

fn strip_scheme<'a>(address: &'a str, scheme: &str) -> Result<&'a str> {
    address
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| not_found(address))
}

/// In-memory store, mostly for tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    objects: Arc<Mutex<HashMap<String, Arc<Vec<u8>>>>>,
    pinned: Arc<Mutex<HashSet<String>>>,
}

const MEM_SCHEME: &str = "/mem";

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pinned(&self, address: &str) -> bool {
        self.pinned
            .lock()
            .map(|p| p.contains(address))
            .unwrap_or(false)
    }

    /// All addresses, sorted
    pub fn addresses(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        all.sort();
        all
    }

    fn insert(&self, data: Vec<u8>) -> Result<String> {
        let address = format!("{}/{}", MEM_SCHEME, hash_bytes(&data));
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| DatasnapError::store("memory store lock poisoned"))?;
        objects.entry(address.clone()).or_insert_with(|| Arc::new(data));
        Ok(address)
    }
}

impl ContentStore for MemStore {
    fn put(&self, data: &[u8]) -> Result<String> {
        self.insert(data.to_vec())
    }

    fn put_reader(&self, reader: &mut dyn Read) -> Result<StoredObject> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let size = data.len() as u64;
        let address = self.insert(data)?;
        Ok(StoredObject { address, size })
    }

    fn get(&self, address: &str) -> Result<Vec<u8>> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| DatasnapError::store("memory store lock poisoned"))?;
        objects
            .get(address)
            .map(|data| data.as_ref().clone())
            .ok_or_else(|| not_found(address))
    }

    fn has(&self, address: &str) -> Result<bool> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| DatasnapError::store("memory store lock poisoned"))?;
        Ok(objects.contains_key(address))
    }

    fn pin(&self, address: &str) -> Result<()> {
        if !self.has(address)? {
            return Err(not_found(address));
        }
        self.pinned
            .lock()
            .map_err(|_| DatasnapError::store("memory store lock poisoned"))?
            .insert(address.to_string());
        Ok(())
    }

    fn object_count(&self) -> Result<usize> {
        Ok(self
            .objects
            .lock()
            .map_err(|_| DatasnapError::store("memory store lock poisoned"))?
            .len())
    }
}

/// On-disk store rooted at a directory
///
/// Objects live at `<root>/objects/<hex>`, pins at `<root>/pins/<hex>`.
/// Writes go through a temp file and a rename so readers never observe a
/// partially written object.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

const FS_SCHEME: &str = "/fs";

impl FsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("pins"))?;
        fs::create_dir_all(root.join("tmp"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, address: &str) -> Result<PathBuf> {
        Ok(self.root.join("objects").join(strip_scheme(address, FS_SCHEME)?))
    }

    fn commit_temp(&self, tmp_path: &Path, hex: &str) -> Result<String> {
        let target = self.root.join("objects").join(hex);
        if target.exists() {
            fs::remove_file(tmp_path)?;
        } else {
            fs::rename(tmp_path, &target)?;
        }
        Ok(format!("{}/{}", FS_SCHEME, hex))
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join("tmp").join(format!("{}.tmp", uuid::Uuid::new_v4()))
    }
}

impl ContentStore for FsStore {
    fn put(&self, data: &[u8]) -> Result<String> {
        let tmp_path = self.temp_path();
        fs::write(&tmp_path, data)?;
        self.commit_temp(&tmp_path, &hash_bytes(data))
    }

    fn put_reader(&self, reader: &mut dyn Read) -> Result<StoredObject> {
        let tmp_path = self.temp_path();
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; 64 * 1024];

        let copied: Result<()> = (|| {
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n])?;
            }
            out.flush()?;
            Ok(())
        })();

        if let Err(e) = copied {
            drop(out);
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        drop(out);

        let address = self.commit_temp(&tmp_path, &hasher.finalize())?;
        Ok(StoredObject {
            address,
            size: hasher.len(),
        })
    }

    fn get(&self, address: &str) -> Result<Vec<u8>> {
        let path = self.object_path(address)?;
        if !path.exists() {
            return Err(not_found(address));
        }
        Ok(fs::read(path)?)
    }

    fn open(&self, address: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.object_path(address)?;
        if !path.exists() {
            return Err(not_found(address));
        }
        Ok(Box::new(File::open(path)?))
    }

    fn has(&self, address: &str) -> Result<bool> {
        Ok(self.object_path(address)?.exists())
    }

    fn pin(&self, address: &str) -> Result<()> {
        if !self.has(address)? {
            return Err(not_found(address));
        }
        let hex = strip_scheme(address, FS_SCHEME)?;
        fs::write(self.root.join("pins").join(hex), b"")?;
        Ok(())
    }

    fn object_count(&self) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(self.root.join("objects")).min_depth(1) {
            if entry?.file_type().is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}
