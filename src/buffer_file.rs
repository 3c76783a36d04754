//! Producer-side buffer file setup
//!
//! Buffer files are never resized by the protocol, so the producer sizes them
//! once for the largest payload it will ever write.

use crate::error::{MirrorError, Result};
use crate::header::{self, Header, HEADER_SIZE};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

/// Create (or truncate) `path` with room for `capacity` payload bytes and an
/// initialized header: sentinel magic, version 0, length 0.
pub fn create_buffer_file(path: impl AsRef<Path>, capacity: usize) -> Result<()> {
    let path = path.as_ref();
    let create_err = |e| MirrorError::Create {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(create_err)?;

    file.set_len((HEADER_SIZE + capacity) as u64)
        .map_err(create_err)?;

    let mut raw = [0u8; HEADER_SIZE];
    header::write_header(&mut raw, 0, 0)?;
    file.write_all(&raw).map_err(create_err)?;
    file.flush().map_err(create_err)?;
    Ok(())
}

/// Header and size of a buffer file as it sits on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFileInfo {
    pub header: Header,
    pub file_len: u64,
}

impl BufferFileInfo {
    /// Payload bytes the file can hold
    pub fn capacity(&self) -> u64 {
        self.file_len.saturating_sub(HEADER_SIZE as u64)
    }
}

/// Read a buffer file's header without mapping it.
pub fn inspect(path: impl AsRef<Path>) -> Result<BufferFileInfo> {
    let path = path.as_ref();
    let open_err = |e| MirrorError::Open {
        path: path.to_path_buf(),
        source: e,
    };

    let file = std::fs::File::open(path).map_err(open_err)?;
    let file_len = file.metadata().map_err(open_err)?.len();

    let mut raw = Vec::with_capacity(HEADER_SIZE);
    file.take(HEADER_SIZE as u64)
        .read_to_end(&mut raw)
        .map_err(open_err)?;

    Ok(BufferFileInfo {
        header: header::parse_header(&raw)?,
        file_len,
    })
}

/// Read a buffer file's header and the payload it currently describes.
///
/// The length is clamped to what the file holds. Plain file reads carry no
/// ordering with a concurrent writer, so this is for tooling, not for a
/// consumer racing the producer.
pub fn read(path: impl AsRef<Path>) -> Result<(Header, Vec<u8>)> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| MirrorError::Open {
        path: path.to_path_buf(),
        source: e,
    })?;

    let header = header::parse_header(&bytes)?;
    if !header.is_valid() {
        return Err(MirrorError::InvalidMagic {
            expected: header::MAGIC,
            got: header.magic,
        });
    }

    let length = header::effective_length(header.length, header::available(bytes.len()));
    let payload = bytes[HEADER_SIZE..HEADER_SIZE + length as usize].to_vec();
    Ok((header, payload))
}
