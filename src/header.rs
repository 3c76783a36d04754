//! Fixed 64-byte header at the front of every shared buffer file
//!
//! ```text
//! offset  size  field
//!      0     8  magic    (sentinel, or 0 = not initialized)
//!      8     8  version  (bumped by the writer after each payload write)
//!     16     8  length   (valid payload bytes after the header)
//!     24    40  reserved
//!     64     N  payload
//! ```
//!
//! All integers are little-endian.

use crate::error::{MirrorError, Result};

/// Sentinel stored in the magic field of an initialized buffer file
pub const MAGIC: u64 = 0x5455_5242_4F53_4852;

/// Total header size in bytes
pub const HEADER_SIZE: usize = 64;

pub const MAGIC_OFFSET: usize = 0;
pub const VERSION_OFFSET: usize = 8;
pub const LENGTH_OFFSET: usize = 16;

/// Decoded header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub magic: u64,
    pub version: u64,
    pub length: u64,
}

impl Header {
    /// True if the magic is the sentinel or zero.
    #[inline]
    pub fn is_valid(&self) -> bool {
        is_valid_magic(self.magic)
    }

    /// True if the producer has not published anything yet.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.magic != 0 && self.length != 0
    }
}

/// Parse the header from the first [`HEADER_SIZE`] bytes of `bytes`.
pub fn parse_header(bytes: &[u8]) -> Result<Header> {
    if bytes.len() < HEADER_SIZE {
        return Err(MirrorError::InsufficientData {
            needed: HEADER_SIZE,
            got: bytes.len(),
        });
    }

    Ok(Header {
        magic: read_u64_le(bytes, MAGIC_OFFSET),
        version: read_u64_le(bytes, VERSION_OFFSET),
        length: read_u64_le(bytes, LENGTH_OFFSET),
    })
}

/// Zero means "not yet initialized" and is accepted.
#[inline]
pub fn is_valid_magic(magic: u64) -> bool {
    magic == 0 || magic == MAGIC
}

/// Clamp a header length to the bytes actually available behind the header.
#[inline]
pub fn effective_length(length: u64, available: usize) -> u64 {
    length.min(available as u64)
}

/// Payload bytes available in a file of `file_len` bytes.
#[inline]
pub fn available(file_len: usize) -> usize {
    file_len.saturating_sub(HEADER_SIZE)
}

/// Write a full header (sentinel magic) into `buf`.
pub fn write_header(buf: &mut [u8], version: u64, length: u64) -> Result<()> {
    if buf.len() < HEADER_SIZE {
        return Err(MirrorError::InsufficientData {
            needed: HEADER_SIZE,
            got: buf.len(),
        });
    }
    write_u64_le(buf, MAGIC_OFFSET, MAGIC);
    write_u64_le(buf, VERSION_OFFSET, version);
    write_u64_le(buf, LENGTH_OFFSET, length);
    Ok(())
}

#[inline]
pub fn read_u64_le(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
pub fn write_u64_le(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(magic: u64, version: u64, length: u64) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_SIZE];
        write_u64_le(&mut buf, MAGIC_OFFSET, magic);
        write_u64_le(&mut buf, VERSION_OFFSET, version);
        write_u64_le(&mut buf, LENGTH_OFFSET, length);
        buf
    }

    #[test]
    fn test_parse_fields() {
        let header = parse_header(&raw(MAGIC, 7, 42)).unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version, 7);
        assert_eq!(header.length, 42);
        assert!(header.is_valid());
        assert!(header.is_ready());
    }

    #[test]
    fn test_parse_is_little_endian() {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[VERSION_OFFSET] = 0x01;
        buf[VERSION_OFFSET + 1] = 0x02;
        assert_eq!(parse_header(&buf).unwrap().version, 0x0201);
    }

    #[test]
    fn test_short_input() {
        let err = parse_header(&[0u8; HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(
            err,
            MirrorError::InsufficientData { needed: 64, got: 63 }
        ));
    }

    #[test]
    fn test_magic_validity() {
        assert!(is_valid_magic(0));
        assert!(is_valid_magic(MAGIC));
        assert!(!is_valid_magic(0xDEAD_BEEF));

        let uninit = parse_header(&raw(0, 0, 0)).unwrap();
        assert!(uninit.is_valid());
        assert!(!uninit.is_ready());
    }

    #[test]
    fn test_effective_length_clamps() {
        let file_len = HEADER_SIZE + 100;
        let header = parse_header(&raw(MAGIC, 1, 80)).unwrap();
        assert_eq!(effective_length(header.length, available(file_len)), 80);

        let header = parse_header(&raw(MAGIC, 1, 500)).unwrap();
        assert_eq!(effective_length(header.length, available(file_len)), 100);

        assert_eq!(available(10), 0);
    }

    #[test]
    fn test_write_header() {
        let mut buf = vec![0xFFu8; HEADER_SIZE + 8];
        write_header(&mut buf, 3, 8).unwrap();
        let header = parse_header(&buf).unwrap();
        assert_eq!(header, Header { magic: MAGIC, version: 3, length: 8 });

        assert!(write_header(&mut [0u8; 8], 0, 0).is_err());
    }
}
