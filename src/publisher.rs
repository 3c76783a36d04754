//! Publishing mapped buffers into consumer-visible state
//!
//! A reconciliation pass reads one buffer's header from its mapping and
//! decides between copying into the array it already published (same
//! version and length) and allocating a fresh one.

use crate::cache::CacheEntry;
use crate::error::{ErrorKind, MirrorError, Result};
use crate::header::{self, HEADER_SIZE, MAGIC};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Result of one reconciliation pass for one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Published, either in place or as a new array
    Updated,
    /// Mapped fine but nothing to publish yet
    NotReady,
    /// Skipped this pass
    Failed(ErrorKind),
}

/// A published byte array: the header followed by the payload, copied from
/// the mapping at publication time.
///
/// Clones share storage, so a holder sees in-place refreshes.
#[derive(Debug, Clone)]
pub struct PublishedBuffer(Arc<RwLock<Box<[u8]>>>);

impl PublishedBuffer {
    fn new(bytes: Box<[u8]>) -> Self {
        Self(Arc::new(RwLock::new(bytes)))
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Total bytes, header included
    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    /// Run `f` over the full array.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.read_guard()[..])
    }

    /// Copy of the full array
    pub fn to_vec(&self) -> Vec<u8> {
        self.read_guard().to_vec()
    }

    /// Copy of the bytes after the header
    pub fn payload(&self) -> Vec<u8> {
        self.with_bytes(|b| b.get(HEADER_SIZE..).unwrap_or_default().to_vec())
    }

    /// Start of the array.
    ///
    /// The lock is released before this returns, so nothing guards the
    /// pointer afterwards. An in-place refresh rewrites the bytes behind it
    /// and a reallocation frees them once the last handle drops. Hosts must
    /// not hold it across [`Bridge::refresh`](crate::Bridge::refresh).
    pub fn as_ptr(&self) -> *const u8 {
        self.read_guard().as_ptr()
    }

    /// True if both handles refer to the same array.
    pub fn ptr_eq(&self, other: &PublishedBuffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Metadata recorded for one published buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub length: u64,
}

/// Informational summary of what has been published
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub version: u32,
    pub buffers: BTreeMap<String, ManifestEntry>,
    #[serde(skip)]
    revision: u64,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            buffers: BTreeMap::new(),
            revision: 0,
        }
    }
}

impl Manifest {
    fn set(&mut self, name: &str, length: u64) {
        self.buffers.insert(name.to_string(), ManifestEntry { length });
        self.revision += 1;
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.buffers.get(name)
    }

    /// Bumped on every entry write
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Everything the consumer side can see, plus the host-state keys it exposes
/// to the bridge
///
/// The manifest and buffer containers are created lazily on the first
/// reconciliation and never recreated.
#[derive(Debug, Default)]
pub struct ConsumerState {
    registry_path: Option<PathBuf>,
    direct_path: Option<PathBuf>,
    manifest: Option<Manifest>,
    buffers: Option<BTreeMap<String, PublishedBuffer>>,
}

impl ConsumerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host-provided registry file path
    pub fn set_registry_path(&mut self, path: Option<PathBuf>) {
        self.registry_path = path;
    }

    pub fn registry_path(&self) -> Option<&Path> {
        self.registry_path.as_deref()
    }

    /// Host-provided single buffer path, used only when no registry is set
    pub fn set_direct_path(&mut self, path: Option<PathBuf>) {
        self.direct_path = path;
    }

    pub fn direct_path(&self) -> Option<&Path> {
        self.direct_path.as_deref()
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// True once the buffer container exists, even if empty
    pub fn has_buffers(&self) -> bool {
        self.buffers.is_some()
    }

    pub fn buffer(&self, name: &str) -> Option<PublishedBuffer> {
        self.buffers.as_ref()?.get(name).cloned()
    }

    pub fn buffer_names(&self) -> Vec<String> {
        self.buffers
            .as_ref()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Create the containers if missing. Returns true if the buffer container
    /// was created by this call.
    fn ensure_containers(&mut self) -> bool {
        self.manifest.get_or_insert_with(Manifest::default);
        let created = self.buffers.is_none();
        self.buffers.get_or_insert_with(BTreeMap::new);
        created
    }
}

/// Reconcile `name` against the file at `path`.
///
/// Failures are folded into [`Outcome::Failed`]; the entry logs once per
/// transition into the failed state.
pub fn reconcile(
    name: &str,
    path: &Path,
    entry: &mut CacheEntry,
    state: &mut ConsumerState,
) -> Outcome {
    match try_reconcile(name, path, entry, state) {
        Ok(outcome) => {
            entry.clear_failed(name);
            outcome
        }
        Err(e) => {
            entry.mark_failed(name, &e);
            Outcome::Failed(e.kind())
        }
    }
}

fn try_reconcile(
    name: &str,
    path: &Path,
    entry: &mut CacheEntry,
    state: &mut ConsumerState,
) -> Result<Outcome> {
    entry.ensure(name, path)?;
    let file = entry.file().ok_or_else(|| MirrorError::Open {
        path: path.to_path_buf(),
        source: std::io::ErrorKind::NotFound.into(),
    })?;

    let header = file.load_header()?;
    if !header.is_valid() {
        return Err(MirrorError::InvalidMagic {
            expected: MAGIC,
            got: header.magic,
        });
    }

    let file_len = file.len();
    let length = header::effective_length(header.length, header::available(file_len));

    let created = state.ensure_containers();

    if header.magic == 0 || length == 0 {
        debug!(name, "shared buffer not ready");
        return Ok(Outcome::NotReady);
    }

    let total = (HEADER_SIZE + length as usize).min(file_len);
    let (last_version, last_length) = entry.last_published();

    if !created && header.version == last_version && length == last_length {
        if let Some(existing) = state.buffer(name) {
            let mut bytes = existing.write_guard();
            if bytes.len() >= total {
                file.copy_into(&mut bytes[..total]);
                return Ok(Outcome::Updated);
            }
        }
    }

    let mut bytes = vec![0u8; total].into_boxed_slice();
    file.copy_into(&mut bytes);

    if let Some(buffers) = state.buffers.as_mut() {
        buffers.insert(name.to_string(), PublishedBuffer::new(bytes));
    }
    if let Some(manifest) = state.manifest.as_mut() {
        manifest.set(name, length);
    }
    entry.record_published(header.version, length);

    info!(name, bytes = total, version = header.version, "published shared buffer");
    Ok(Outcome::Updated)
}
