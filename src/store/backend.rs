//! Persistence backends.
//!
//! A backend stores opaque page bytes under keys it chooses, plus one root
//! locator naming the latest committed uber page. Backends never interpret
//! page contents.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::data::ByteReader;

use super::error::{PageError, Result};
use super::page_reference::PageLocator;

/// Byte store behind a page source.
pub trait Backend: Send + Sync {
    /// Stores `bytes` and returns the key to read them back with.
    fn append(&self, bytes: &[u8]) -> Result<u64>;

    /// Returns exactly the `length` bytes stored under `storage_key`.
    fn read(&self, storage_key: u64, length: u32) -> Result<Vec<u8>>;

    /// Replaces the root locator.
    fn write_root(&self, root: &PageLocator) -> Result<()>;

    /// The root locator, or `None` for an empty store.
    fn read_root(&self) -> Result<Option<PageLocator>>;

    /// Makes previous writes durable.
    fn sync(&self) -> Result<()>;
}

const ROOT_RECORD_LEN: usize = 8 + 4 + 32;

fn encode_root(root: &PageLocator) -> Vec<u8> {
    let mut out = Vec::with_capacity(ROOT_RECORD_LEN);
    out.extend_from_slice(&root.storage_key.to_le_bytes());
    out.extend_from_slice(&root.length.to_le_bytes());
    out.extend_from_slice(&root.checksum);
    out
}

fn decode_root(bytes: &[u8]) -> Result<PageLocator> {
    let mut reader = ByteReader::new(bytes);
    let root = PageLocator {
        storage_key: reader.u64()?,
        length: reader.u32()?,
        checksum: reader.bytes32()?,
    };
    reader.finish()?;
    Ok(root)
}

// ============================================================================
// MemoryBackend
// ============================================================================

/// Backend keeping everything in a byte vector.
#[derive(Default)]
pub struct MemoryBackend {
    data: RwLock<Vec<u8>>,
    root: Mutex<Option<PageLocator>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every byte appended so far.
    pub fn contents(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Backend for MemoryBackend {
    fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut data = self.data.write();
        let key = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(key)
    }

    fn read(&self, storage_key: u64, length: u32) -> Result<Vec<u8>> {
        let data = self.data.read();
        let start = storage_key as usize;
        let end = start.checked_add(length as usize);
        match end {
            Some(end) if end <= data.len() => Ok(data[start..end].to_vec()),
            _ => Err(PageError::NotFound { storage_key, length }),
        }
    }

    fn write_root(&self, root: &PageLocator) -> Result<()> {
        *self.root.lock() = Some(*root);
        Ok(())
    }

    fn read_root(&self) -> Result<Option<PageLocator>> {
        Ok(*self.root.lock())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// FileBackend
// ============================================================================

/// Directory-based backend.
///
/// Pages are appended to `pages.dat`, which is read through a read-only
/// memory map refreshed whenever a read reaches past its end. The root
/// locator lives in `root` and is replaced atomically via rename.
pub struct FileBackend {
    dir: PathBuf,
    pages: Mutex<PagesFile>,
    map: RwLock<Option<Mmap>>,
}

struct PagesFile {
    file: File,
    len: u64,
}

impl PagesFile {
    /// Drops bytes a failed write left past `len`. If truncation fails the
    /// length is re-read, so the next key still matches the append offset.
    fn discard_tail(&mut self) {
        if let Err(e) = self.file.set_len(self.len) {
            warn!(error = %e, len = self.len, "failed to truncate torn page tail");
        }
        match self.file.metadata() {
            Ok(meta) => self.len = meta.len(),
            Err(e) => warn!(error = %e, "failed to stat pages file"),
        }
    }
}

impl FileBackend {
    const PAGES_FILE: &'static str = "pages.dat";
    const ROOT_FILE: &'static str = "root";
    const ROOT_TMP_FILE: &'static str = "root.tmp";

    /// Opens or creates a store directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(dir.join(Self::PAGES_FILE))?;
        let len = file.metadata()?.len();
        let backend = Self {
            dir,
            pages: Mutex::new(PagesFile { file, len }),
            map: RwLock::new(None),
        };
        backend.remap()?;
        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn remap(&self) -> Result<()> {
        let pages = self.pages.lock();
        if pages.len == 0 {
            return Ok(());
        }
        // Safety: bytes below `len` are never rewritten; only a torn tail past
        // it is truncated, and it is never mapped because remapping takes
        // the same lock as appending.
        let map = unsafe { Mmap::map(&pages.file)? };
        *self.map.write() = Some(map);
        Ok(())
    }

    /// Appends `bytes` through `write`. A failed write leaves no bytes
    /// behind, so later appends stay addressable.
    pub(crate) fn append_with<F>(&self, bytes: &[u8], write: F) -> Result<u64>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        let mut pages = self.pages.lock();
        let key = pages.len;
        if let Err(e) = write(&mut pages.file, bytes) {
            pages.discard_tail();
            return Err(e.into());
        }
        pages.len += bytes.len() as u64;
        Ok(key)
    }

    fn read_mapped(&self, start: usize, end: usize) -> Option<Vec<u8>> {
        let map = self.map.read();
        map.as_ref()
            .filter(|m| end <= m.len())
            .map(|m| m[start..end].to_vec())
    }
}

impl Backend for FileBackend {
    fn append(&self, bytes: &[u8]) -> Result<u64> {
        self.append_with(bytes, |file, bytes| file.write_all(bytes))
    }

    fn read(&self, storage_key: u64, length: u32) -> Result<Vec<u8>> {
        let start = storage_key as usize;
        let end = start
            .checked_add(length as usize)
            .ok_or(PageError::NotFound { storage_key, length })?;
        if let Some(bytes) = self.read_mapped(start, end) {
            return Ok(bytes);
        }
        self.remap()?;
        self.read_mapped(start, end)
            .ok_or(PageError::NotFound { storage_key, length })
    }

    fn write_root(&self, root: &PageLocator) -> Result<()> {
        let tmp = self.dir.join(Self::ROOT_TMP_FILE);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&encode_root(root))?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.dir.join(Self::ROOT_FILE))?;
        Ok(())
    }

    fn read_root(&self) -> Result<Option<PageLocator>> {
        match fs::read(self.dir.join(Self::ROOT_FILE)) {
            Ok(bytes) => decode_root(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn sync(&self) -> Result<()> {
        self.pages.lock().file.sync_data()?;
        Ok(())
    }
}
