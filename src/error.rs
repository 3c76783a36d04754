//! Error types for Mirrorbuf

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Mirrorbuf operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Coarse failure classes, used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Path or registry missing or unreadable. Retried next cycle.
    NotFound,
    /// Bad magic or undersized header.
    Invalid,
    /// Header present but nothing published yet.
    NotReady,
    /// Writer target too small for the payload.
    Capacity,
    /// Wrong value kind or shape handed in by the host.
    Argument,
}

/// Errors that can occur in Mirrorbuf operations
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Failed to open a buffer file
    #[error("Failed to open buffer file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to stat a buffer file
    #[error("Failed to stat buffer file {path:?}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to map memory
    #[error("Failed to map {path:?}: {source}")]
    Mmap {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create or size a buffer file
    #[error("Failed to create buffer file {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Registry file could not be read or written
    #[error("Registry {path:?} unavailable: {source}")]
    Registry {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writer was called before any registry path was resolved
    #[error("Registry not loaded")]
    RegistryNotLoaded,

    /// Name does not appear in the registry
    #[error("Buffer '{0}' not found in registry")]
    UnknownBuffer(String),

    /// Fewer bytes than a full header
    #[error("Insufficient data: need {needed} bytes, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Magic is neither zero nor the sentinel
    #[error("Invalid magic number: expected 0x{expected:016X}, got 0x{got:016X}")]
    InvalidMagic { expected: u64, got: u64 },

    /// Buffer has no published payload yet
    #[error("Buffer '{0}' not ready")]
    NotReady(String),

    /// Payload does not fit behind the header
    #[error("Buffer too small: capacity {capacity} bytes, got {got} bytes")]
    BufferTooSmall { capacity: usize, got: usize },

    /// Bad argument from the host side
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl MirrorError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::Open { .. }
            | MirrorError::Stat { .. }
            | MirrorError::Mmap { .. }
            | MirrorError::Create { .. }
            | MirrorError::Registry { .. }
            | MirrorError::RegistryNotLoaded
            | MirrorError::UnknownBuffer(_) => ErrorKind::NotFound,
            MirrorError::InsufficientData { .. } | MirrorError::InvalidMagic { .. } => {
                ErrorKind::Invalid
            }
            MirrorError::NotReady(_) => ErrorKind::NotReady,
            MirrorError::BufferTooSmall { .. } => ErrorKind::Capacity,
            MirrorError::InvalidArgument(_) => ErrorKind::Argument,
        }
    }
}
