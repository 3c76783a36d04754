//! Low-level memory mapping of buffer files

use crate::error::{MirrorError, Result};
use crate::header::{self, Header, HEADER_SIZE, LENGTH_OFFSET, VERSION_OFFSET};
use rustix::fd::OwnedFd;
use rustix::fs::{fstat, open, Mode, OFlags};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

/// A live `MAP_SHARED` region. Unmapped on drop.
///
/// Zero-length files get an empty region without calling `mmap`, which would
/// reject a zero length.
struct Region {
    addr: Option<NonNull<u8>>,
    len: usize,
}

impl Region {
    fn map(fd: &OwnedFd, len: usize, prot: ProtFlags, path: &Path) -> Result<Self> {
        if len == 0 {
            return Ok(Self { addr: None, len: 0 });
        }

        let addr = unsafe {
            mmap(std::ptr::null_mut(), len, prot, MapFlags::SHARED, fd, 0).map_err(|e| {
                MirrorError::Mmap {
                    path: path.to_path_buf(),
                    source: e.into(),
                }
            })?
        };

        Ok(Self {
            addr: NonNull::new(addr.cast::<u8>()),
            len,
        })
    }

    #[inline(always)]
    fn ptr(&self) -> *mut u8 {
        self.addr.map_or(NonNull::<u8>::dangling().as_ptr(), NonNull::as_ptr)
    }

    /// Header word at `offset`.
    ///
    /// mmap regions are page aligned, so the 8-byte header words are
    /// naturally aligned for `AtomicU64`.
    #[inline]
    fn word(&self, offset: usize) -> Option<&AtomicU64> {
        if self.len < HEADER_SIZE {
            return None;
        }
        // SAFETY: in bounds, aligned, and lives as long as the mapping
        Some(unsafe { &*(self.ptr().add(offset) as *const AtomicU64) })
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if let Some(addr) = self.addr {
            unsafe {
                let _ = munmap(addr.as_ptr().cast(), self.len);
            }
        }
    }
}

fn open_sized(path: &Path, flags: OFlags) -> Result<(OwnedFd, usize)> {
    let fd = open(path, flags | OFlags::CLOEXEC, Mode::empty()).map_err(|e| MirrorError::Open {
        path: path.to_path_buf(),
        source: e.into(),
    })?;

    let stat = fstat(&fd).map_err(|e| MirrorError::Stat {
        path: path.to_path_buf(),
        source: e.into(),
    })?;

    Ok((fd, stat.st_size.max(0) as usize))
}

/// Read-only view of a buffer file
///
/// The length is fixed at mapping time. Writes made in place by another
/// process through its own shared mapping are visible through this one.
pub struct MappedFile {
    #[allow(dead_code)]
    fd: OwnedFd,
    region: Region,
    path: PathBuf,
}

// SAFETY: the region is only read, and header words go through atomics
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Open and map `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (fd, len) = open_sized(path, OFlags::RDONLY)?;
        let region = Region::map(&fd, len, ProtFlags::READ, path)?;

        Ok(Self {
            fd,
            region,
            path: path.to_path_buf(),
        })
    }

    /// Mapped length in bytes, as of mapping time
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.region.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot the header.
    ///
    /// The version is loaded with `Acquire`, pairing with the writer's
    /// `Release` store, so a payload behind an observed version is complete.
    pub fn load_header(&self) -> Result<Header> {
        let version = self
            .region
            .word(VERSION_OFFSET)
            .ok_or(MirrorError::InsufficientData {
                needed: HEADER_SIZE,
                got: self.len(),
            })?
            .load(Ordering::Acquire);
        let version = u64::from_le(version);

        let mut raw = [0u8; HEADER_SIZE];
        self.copy_into(&mut raw);
        let mut header = header::parse_header(&raw)?;
        header.version = version;
        Ok(header)
    }

    /// Copy the first `dst.len()` mapped bytes into `dst`.
    ///
    /// Panics if `dst` is longer than the mapping.
    #[inline]
    pub fn copy_into(&self, dst: &mut [u8]) {
        assert!(dst.len() <= self.len(), "copy past end of mapping");
        unsafe {
            std::ptr::copy_nonoverlapping(self.region.ptr(), dst.as_mut_ptr(), dst.len());
        }
    }
}

/// Read-write view of a buffer file, used by the writer
pub struct MappedFileMut {
    #[allow(dead_code)]
    fd: OwnedFd,
    region: Region,
}

// SAFETY: only one writer per file is supported
unsafe impl Send for MappedFileMut {}

impl MappedFileMut {
    /// Open `path` read-write and map it if it can hold `HEADER_SIZE + payload_len`.
    ///
    /// The capacity check runs before the mapping exists, so a failure here
    /// never touches the file.
    pub fn open_for(path: impl AsRef<Path>, payload_len: usize) -> Result<Self> {
        let path = path.as_ref();
        let (fd, len) = open_sized(path, OFlags::RDWR)?;

        if len < HEADER_SIZE + payload_len {
            return Err(MirrorError::BufferTooSmall {
                capacity: header::available(len),
                got: payload_len,
            });
        }

        let region = Region::map(&fd, len, ProtFlags::READ | ProtFlags::WRITE, path)?;
        Ok(Self { fd, region })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.region.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    /// Current version word
    #[inline]
    pub fn version(&self) -> u64 {
        self.region
            .word(VERSION_OFFSET)
            .map_or(0, |w| u64::from_le(w.load(Ordering::Acquire)))
    }

    /// Copy `payload` to the bytes right after the header.
    #[inline]
    pub fn write_payload(&mut self, payload: &[u8]) {
        debug_assert!(HEADER_SIZE + payload.len() <= self.len());
        unsafe {
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.region.ptr().add(HEADER_SIZE),
                payload.len(),
            );
        }
    }

    /// Store the length word, then release-store the version word.
    ///
    /// Version goes last: a reader that sees it also sees the payload and length.
    #[inline]
    pub fn publish(&mut self, version: u64, length: u64) {
        if let (Some(len_word), Some(ver_word)) = (
            self.region.word(LENGTH_OFFSET),
            self.region.word(VERSION_OFFSET),
        ) {
            len_word.store(length.to_le(), Ordering::Relaxed);
            std::sync::atomic::fence(Ordering::Release);
            ver_word.store(version.to_le(), Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{write_header, MAGIC};
    use std::io::Write;

    fn temp_buffer(capacity: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut bytes = vec![0u8; HEADER_SIZE + capacity];
        write_header(&mut bytes, 5, 3).unwrap();
        bytes[HEADER_SIZE..HEADER_SIZE + 3].copy_from_slice(b"abc");
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_map_and_read_header() {
        let file = temp_buffer(16);
        let mapped = MappedFile::open(file.path()).unwrap();
        assert_eq!(mapped.len(), HEADER_SIZE + 16);

        let header = mapped.load_header().unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version, 5);
        assert_eq!(header.length, 3);

        let mut out = [0u8; HEADER_SIZE + 3];
        mapped.copy_into(&mut out);
        assert_eq!(&out[HEADER_SIZE..], b"abc");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MappedFile::open(dir.path().join("nope.bin")).err().unwrap();
        assert!(matches!(err, MirrorError::Open { .. }));
    }

    #[test]
    fn test_empty_file_maps_empty() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mapped = MappedFile::open(file.path()).unwrap();
        assert!(mapped.is_empty());
        assert!(matches!(
            mapped.load_header(),
            Err(MirrorError::InsufficientData { got: 0, .. })
        ));
    }

    #[test]
    fn test_writes_visible_through_reader_mapping() {
        let file = temp_buffer(16);
        let reader = MappedFile::open(file.path()).unwrap();

        let mut writer = MappedFileMut::open_for(file.path(), 4).unwrap();
        writer.write_payload(b"wxyz");
        writer.publish(6, 4);
        drop(writer);

        let header = reader.load_header().unwrap();
        assert_eq!(header.version, 6);
        assert_eq!(header.length, 4);
        let mut out = [0u8; HEADER_SIZE + 4];
        reader.copy_into(&mut out);
        assert_eq!(&out[HEADER_SIZE..], b"wxyz");
    }

    #[test]
    fn test_open_for_checks_capacity() {
        let file = temp_buffer(4);
        let err = MappedFileMut::open_for(file.path(), 5).err().unwrap();
        assert!(matches!(
            err,
            MirrorError::BufferTooSmall { capacity: 4, got: 5 }
        ));
    }
}
