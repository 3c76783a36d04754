//! The only mutation path of the protocol
//!
//! A write re-reads the registry from disk, maps the target file read-write,
//! copies the payload behind the header and then bumps the version. The
//! mapping and descriptor are released on every return path by `Drop`.
//!
//! One writer per file. Concurrent writers lose updates.

use crate::error::{MirrorError, Result};
use crate::registry::Registry;
use crate::shm::MappedFileMut;
use std::path::Path;
use tracing::{info, warn};

/// Write `payload` into the buffer registered as `name` in the registry at
/// `registry_path`. Returns the new version.
pub fn write(registry_path: &Path, name: &str, payload: &[u8]) -> Result<u64> {
    let result = resolve(registry_path, name, payload)
        .and_then(|path| write_to_path(name, &path, payload));

    if let Err(e) = &result {
        warn!(name, error = %e, "shared buffer write failed");
    }
    result
}

fn resolve(registry_path: &Path, name: &str, payload: &[u8]) -> Result<std::path::PathBuf> {
    if name.is_empty() {
        return Err(MirrorError::InvalidArgument("buffer name is empty"));
    }
    if payload.is_empty() {
        return Err(MirrorError::InvalidArgument("payload is empty"));
    }

    let registry = Registry::load(registry_path)?;
    registry
        .get(name)
        .map(Path::to_path_buf)
        .ok_or_else(|| MirrorError::UnknownBuffer(name.to_string()))
}

/// Write `payload` straight into the buffer file at `path`.
///
/// Fails without touching the file if it cannot hold the payload.
pub fn write_to_path(name: &str, path: &Path, payload: &[u8]) -> Result<u64> {
    if payload.is_empty() {
        return Err(MirrorError::InvalidArgument("payload is empty"));
    }

    let mut file = MappedFileMut::open_for(path, payload.len())?;

    let version = file.version().wrapping_add(1);
    file.write_payload(payload);
    file.publish(version, payload.len() as u64);

    info!(name, bytes = payload.len(), version, "wrote shared buffer");
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_file::{create_buffer_file, inspect};
    use crate::error::ErrorKind;
    use crate::header::HEADER_SIZE;
    use crate::registry::write_registry;

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: std::path::PathBuf,
        buffer: std::path::PathBuf,
    }

    fn fixture(capacity: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let buffer = dir.path().join("state.bin");
        let registry = dir.path().join("registry.txt");
        create_buffer_file(&buffer, capacity).unwrap();
        write_registry(&registry, [("state", buffer.as_path())]).unwrap();
        Fixture {
            _dir: dir,
            registry,
            buffer,
        }
    }

    #[test]
    fn test_versions_count_writes() {
        let fx = fixture(32);
        for k in 1..=5u64 {
            assert_eq!(write(&fx.registry, "state", b"tick").unwrap(), k);
        }
        let info = inspect(&fx.buffer).unwrap();
        assert_eq!(info.header.version, 5);
        assert_eq!(info.header.length, 4);
    }

    #[test]
    fn test_payload_lands_after_header() {
        let fx = fixture(32);
        write(&fx.registry, "state", b"long payload").unwrap();
        write(&fx.registry, "state", b"short").unwrap();

        let raw = std::fs::read(&fx.buffer).unwrap();
        assert_eq!(&raw[HEADER_SIZE..HEADER_SIZE + 5], b"short");
        // old tail stays on disk, cut off by the length field
        assert_eq!(&raw[HEADER_SIZE + 5..HEADER_SIZE + 12], b"payload");
        assert_eq!(inspect(&fx.buffer).unwrap().header.length, 5);
    }

    #[test]
    fn test_too_large_leaves_file_alone() {
        let fx = fixture(8);
        write(&fx.registry, "state", b"fits").unwrap();
        let before = std::fs::read(&fx.buffer).unwrap();

        let err = write(&fx.registry, "state", &[1u8; 9]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert_eq!(std::fs::read(&fx.buffer).unwrap(), before);
    }

    #[test]
    fn test_exact_fit() {
        let fx = fixture(8);
        assert_eq!(write(&fx.registry, "state", &[9u8; 8]).unwrap(), 1);
    }

    #[test]
    fn test_unknown_name() {
        let fx = fixture(8);
        let err = write(&fx.registry, "other", b"x").unwrap_err();
        assert!(matches!(err, MirrorError::UnknownBuffer(ref n) if n == "other"));
    }

    #[test]
    fn test_registry_reread_each_write() {
        let fx = fixture(8);
        let other = fx.buffer.with_file_name("other.bin");
        create_buffer_file(&other, 8).unwrap();

        assert!(write(&fx.registry, "other", b"x").is_err());
        write_registry(
            &fx.registry,
            [("state", fx.buffer.as_path()), ("other", other.as_path())],
        )
        .unwrap();
        assert_eq!(write(&fx.registry, "other", b"x").unwrap(), 1);
    }

    #[test]
    fn test_bad_arguments() {
        let fx = fixture(8);
        assert_eq!(
            write(&fx.registry, "state", b"").unwrap_err().kind(),
            ErrorKind::Argument
        );
        assert_eq!(
            write(&fx.registry, "", b"x").unwrap_err().kind(),
            ErrorKind::Argument
        );
        assert_eq!(inspect(&fx.buffer).unwrap().header.version, 0);
    }

    #[test]
    fn test_missing_file() {
        let fx = fixture(8);
        std::fs::remove_file(&fx.buffer).unwrap();
        assert_eq!(
            write(&fx.registry, "state", b"x").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
