//! Name to path registry
//!
//! Plain text, one `name=path` pair per line. Both sides are trimmed, blank
//! lines are ignored and lines without a usable pair are skipped. The file is
//! re-read on every refresh; there is no watch.

use crate::error::{MirrorError, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// One registry line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub path: PathBuf,
}

/// Parse registry text into pairs, in file order.
///
/// Duplicates are kept; see [`Registry`] for last-wins collapsing.
pub fn parse(source: &str) -> Vec<RegistryEntry> {
    source
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, path) = line.split_once('=')?;
            let (name, path) = (name.trim(), path.trim());
            if name.is_empty() || path.is_empty() {
                return None;
            }
            Some(RegistryEntry {
                name: name.to_string(),
                path: PathBuf::from(path),
            })
        })
        .collect()
}

/// A parsed registry with one path per name
///
/// Later lines win over earlier ones; a name keeps the position where it
/// first appeared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn parse(source: &str) -> Self {
        Self::from_entries(parse(source))
    }

    /// Read and parse the registry at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| MirrorError::Registry {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::parse(&text))
    }

    pub fn from_entries(iter: impl IntoIterator<Item = RegistryEntry>) -> Self {
        let mut entries: Vec<RegistryEntry> = Vec::new();
        for entry in iter {
            match entries.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => existing.path = entry.path,
                None => entries.push(entry),
            }
        }
        Self { entries }
    }

    /// Path registered for `name`
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.path.as_path())
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write `entries` to `path` in the format [`parse`] reads.
pub fn write_registry<'a>(
    path: impl AsRef<Path>,
    entries: impl IntoIterator<Item = (&'a str, &'a Path)>,
) -> Result<()> {
    let path = path.as_ref();
    let mut out = String::new();
    for (name, buf_path) in entries {
        let _ = writeln!(out, "{}={}", name, buf_path.display());
    }
    std::fs::write(path, out).map_err(|e| MirrorError::Registry {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Where this refresh pass takes its buffer list from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    /// A registry file
    File(PathBuf),
    /// No registry; a single buffer file published as [`DIRECT_BUFFER_NAME`]
    Direct(PathBuf),
    /// Nothing configured
    None,
}

/// Name under which a direct (registry-less) buffer is published
pub const DIRECT_BUFFER_NAME: &str = "state";

/// Pick a source: config registry, host registry, host direct path, config
/// direct path. First present one wins.
pub fn resolve_source(
    config_registry: Option<&Path>,
    host_registry: Option<&Path>,
    host_direct: Option<&Path>,
    config_direct: Option<&Path>,
) -> RegistrySource {
    fn non_empty(p: Option<&Path>) -> Option<&Path> {
        p.filter(|p| !p.as_os_str().is_empty())
    }

    if let Some(path) = non_empty(config_registry).or(non_empty(host_registry)) {
        return RegistrySource::File(path.to_path_buf());
    }
    if let Some(path) = non_empty(host_direct).or(non_empty(config_direct)) {
        return RegistrySource::Direct(path.to_path_buf());
    }
    RegistrySource::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_broken_lines() {
        let entries = parse("a = /tmp/x\n\nb=/tmp/y\nbroken_line\n");
        assert_eq!(
            entries,
            vec![
                RegistryEntry { name: "a".into(), path: "/tmp/x".into() },
                RegistryEntry { name: "b".into(), path: "/tmp/y".into() },
            ]
        );
    }

    #[test]
    fn test_parse_empty_sides_and_extra_equals() {
        let entries = parse("=/tmp/x\nname=\n  \t \nc=/tmp/a=b\r\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "c");
        assert_eq!(entries[0].path, PathBuf::from("/tmp/a=b"));
    }

    #[test]
    fn test_duplicates_last_wins() {
        let registry = Registry::parse("a=/one\nb=/two\na=/three\n");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("a"), Some(Path::new("/three")));
        assert_eq!(registry.entries()[0].name, "a");
        assert_eq!(registry.get("missing"), None);
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.txt");
        write_registry(
            &path,
            [("state", Path::new("/dev/shm/s.bin")), ("frames", Path::new("/dev/shm/f.bin"))],
        )
        .unwrap();

        let registry = Registry::load(&path).unwrap();
        assert_eq!(registry.get("frames"), Some(Path::new("/dev/shm/f.bin")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Registry::load(dir.path().join("none.txt")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn test_resolve_order() {
        let cfg = Path::new("/cfg/registry");
        let host = Path::new("/host/registry");
        let direct = Path::new("/host/state.bin");
        let cfg_direct = Path::new("/cfg/state.bin");

        assert_eq!(
            resolve_source(Some(cfg), Some(host), Some(direct), None),
            RegistrySource::File(cfg.into())
        );
        assert_eq!(
            resolve_source(Some(Path::new("")), Some(host), None, None),
            RegistrySource::File(host.into())
        );
        assert_eq!(
            resolve_source(None, None, Some(direct), Some(cfg_direct)),
            RegistrySource::Direct(direct.into())
        );
        assert_eq!(
            resolve_source(None, None, None, Some(cfg_direct)),
            RegistrySource::Direct(cfg_direct.into())
        );
        assert_eq!(resolve_source(None, None, None, None), RegistrySource::None);
    }
}
