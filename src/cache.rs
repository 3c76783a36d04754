//! Per-name cache of open buffer mappings
//!
//! Each entry remembers the path it was mapped for, the live mapping, and the
//! `(version, length)` pair last published from it. The `failed` flag only
//! throttles logging: a failed entry is still retried on every pass.

use crate::error::{MirrorError, Result};
use crate::header::HEADER_SIZE;
use crate::shm::MappedFile;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Default)]
pub struct CacheEntry {
    path: Option<PathBuf>,
    file: Option<MappedFile>,
    pub(crate) last_version: u64,
    pub(crate) last_length: u64,
    failed: bool,
}

impl CacheEntry {
    /// Make sure a mapping of `path` is live.
    ///
    /// A path change drops the old mapping before the new one is attempted.
    /// A previously failed, unmapped entry is retried because the file may
    /// have appeared or grown since. Files too short for a header are never
    /// kept mapped, since the mapped length is fixed.
    pub fn ensure(&mut self, name: &str, path: &Path) -> Result<()> {
        if self.path.as_deref() != Some(path) {
            self.file = None;
            self.path = Some(path.to_path_buf());
            self.failed = false;
            self.remap(name, path)
        } else if self.file.is_none() {
            self.remap(name, path)
        } else {
            Ok(())
        }
    }

    /// The live mapping, if any
    #[inline]
    pub fn file(&self) -> Option<&MappedFile> {
        self.file.as_ref()
    }

    fn remap(&mut self, name: &str, path: &Path) -> Result<()> {
        match MappedFile::open(path) {
            Ok(file) if file.len() < HEADER_SIZE => {
                let e = MirrorError::InsufficientData {
                    needed: HEADER_SIZE,
                    got: file.len(),
                };
                self.mark_failed(name, &e);
                Err(e)
            }
            Ok(file) => {
                if self.failed {
                    info!(name, path = %path.display(), "buffer mapping recovered");
                }
                self.file = Some(file);
                self.last_version = 0;
                self.last_length = 0;
                self.failed = false;
                Ok(())
            }
            Err(e) => {
                self.mark_failed(name, &e);
                Err(e)
            }
        }
    }

    /// Enter the failed state, logging only on the transition.
    pub fn mark_failed(&mut self, name: &str, err: &MirrorError) {
        if !self.failed {
            warn!(name, error = %err, "shared buffer unavailable");
            self.failed = true;
        }
    }

    /// Leave the failed state after a good pass.
    pub fn clear_failed(&mut self, name: &str) {
        if self.failed {
            info!(name, "shared buffer readable again");
            self.failed = false;
        }
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Last published `(version, length)`
    pub fn last_published(&self) -> (u64, u64) {
        (self.last_version, self.last_length)
    }

    pub(crate) fn record_published(&mut self, version: u64, length: u64) {
        self.last_version = version;
        self.last_length = length;
    }
}

/// All cache entries of one consumer, keyed by buffer name
#[derive(Default)]
pub struct BufferCache {
    entries: HashMap<String, CacheEntry>,
}

impl BufferCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `name`, created empty on first use.
    pub fn entry(&mut self, name: &str) -> &mut CacheEntry {
        self.entries.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&CacheEntry> {
        self.entries.get(name)
    }

    /// Drop every entry `keep` rejects, releasing its mapping. Returns how
    /// many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|name, _| keep(name));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
