//! Consumer-facing calls, independent of any particular script runtime
//!
//! A host translates its native values into [`HostValue`] and exposes these
//! calls under whatever names its scripts expect. Absence of data is the only
//! signal a script ever gets; nothing here returns an error to it.

use crate::bridge::Bridge;
use crate::error::MirrorError;
use crate::publisher::{Manifest, PublishedBuffer};
use crate::registry::DIRECT_BUFFER_NAME;
use serde::Serialize;
use tracing::warn;

/// A loosely typed value handed over by a script runtime
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// A byte array (typed array or equivalent)
    Bytes(Vec<u8>),
}

/// Result of the debug introspection call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    /// Whether the buffer container exists yet
    pub has: bool,
    pub keys: Vec<String>,
}

/// The manifest as a host sees it, with the revision it can compare against
/// the last one it translated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestInfo {
    #[serde(flatten)]
    pub manifest: Manifest,
    pub revision: u64,
}

impl Bridge {
    /// Published array for `name`, defaulting to "state".
    pub fn shared_buffer(&self, name: Option<&str>) -> Option<PublishedBuffer> {
        self.state().buffer(name.unwrap_or(DIRECT_BUFFER_NAME))
    }

    /// Names of everything published so far
    pub fn list_buffers(&self) -> Vec<String> {
        self.state().buffer_names()
    }

    /// Snapshot of the manifest; `None` before the first reconciliation.
    pub fn manifest(&self) -> Option<ManifestInfo> {
        self.state().manifest().map(|manifest| ManifestInfo {
            manifest: manifest.clone(),
            revision: manifest.revision(),
        })
    }

    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            has: self.state().has_buffers(),
            keys: self.state().buffer_names(),
        }
    }

    /// Script-facing write: `(name: string, data: bytes) -> bool`.
    ///
    /// Argument shape is checked before any file I/O.
    pub fn write_shared_buffer(&self, args: &[HostValue]) -> bool {
        let (name, data) = match check_write_args(args) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "rejected shared buffer write");
                return false;
            }
        };
        self.write(name, data).is_ok()
    }
}

fn check_write_args(args: &[HostValue]) -> Result<(&str, &[u8]), MirrorError> {
    let [name, data, ..] = args else {
        return Err(MirrorError::InvalidArgument(
            "expected 2 arguments: name and data",
        ));
    };

    let name = match name {
        HostValue::String(s) if !s.is_empty() => s.as_str(),
        HostValue::String(_) => return Err(MirrorError::InvalidArgument("name is empty")),
        _ => return Err(MirrorError::InvalidArgument("name must be a string")),
    };

    let data = match data {
        HostValue::Bytes(b) if !b.is_empty() => b.as_slice(),
        HostValue::Bytes(_) => return Err(MirrorError::InvalidArgument("data is empty")),
        _ => return Err(MirrorError::InvalidArgument("data must be a byte array")),
    };

    Ok((name, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_file::{create_buffer_file, inspect};
    use crate::config::BridgeConfig;
    use crate::registry::write_registry;

    fn bridge() -> (tempfile::TempDir, Bridge, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.bin");
        create_buffer_file(&state, 64).unwrap();
        let registry = dir.path().join("registry.txt");
        write_registry(&registry, [("state", state.as_path())]).unwrap();
        let mut bridge = Bridge::new(BridgeConfig::default().with_registry(registry));
        bridge.refresh().unwrap();
        (dir, bridge, state)
    }

    #[test]
    fn test_nothing_published_yet() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert!(bridge.shared_buffer(None).is_none());
        assert!(bridge.list_buffers().is_empty());
        assert_eq!(bridge.debug_info(), DebugInfo { has: false, keys: vec![] });
    }

    #[test]
    fn test_write_and_read_back() {
        let (_dir, mut bridge, _) = bridge();
        assert_eq!(bridge.debug_info(), DebugInfo { has: true, keys: vec![] });

        let ok = bridge.write_shared_buffer(&[
            HostValue::String("state".into()),
            HostValue::Bytes(b"from script".to_vec()),
        ]);
        assert!(ok);
        bridge.refresh().unwrap();

        let buf = bridge.shared_buffer(None).unwrap();
        assert_eq!(buf.payload(), b"from script");
        assert!(buf.ptr_eq(&bridge.shared_buffer(Some("state")).unwrap()));
        assert_eq!(bridge.list_buffers(), vec!["state".to_string()]);
        assert_eq!(
            serde_json::to_string(&bridge.debug_info()).unwrap(),
            r#"{"has":true,"keys":["state"]}"#
        );
    }

    #[test]
    fn test_manifest_revision_moves_with_publication() {
        let fresh = Bridge::new(BridgeConfig::default());
        assert!(fresh.manifest().is_none());

        let (_dir, mut bridge, _) = bridge();
        let empty = bridge.manifest().unwrap();
        assert_eq!(empty.revision, 0);
        assert!(empty.manifest.buffers.is_empty());

        bridge.write("state", b"1234").unwrap();
        bridge.refresh().unwrap();
        let info = bridge.manifest().unwrap();
        assert_eq!(info.revision, 1);
        assert_eq!(info.manifest.get("state").unwrap().length, 4);
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"version":1,"buffers":{"state":{"length":4}},"revision":1}"#
        );

        // nothing new: a host can skip re-translation
        bridge.refresh().unwrap();
        assert_eq!(bridge.manifest().unwrap().revision, 1);
    }

    #[test]
    fn test_bad_arguments_do_no_io() {
        let (_dir, bridge, state) = bridge();
        let bad: [&[HostValue]; 5] = [
            &[],
            &[HostValue::String("state".into())],
            &[HostValue::Number(1.0), HostValue::Bytes(vec![1])],
            &[HostValue::String("state".into()), HostValue::String("text".into())],
            &[HostValue::String("state".into()), HostValue::Bytes(vec![])],
        ];
        for args in bad {
            assert!(!bridge.write_shared_buffer(args));
        }
        assert_eq!(inspect(&state).unwrap().header.version, 0);
    }

    #[test]
    fn test_unknown_name_fails() {
        let (_dir, bridge, _) = bridge();
        assert!(!bridge.write_shared_buffer(&[
            HostValue::String("nope".into()),
            HostValue::Bytes(vec![1, 2, 3]),
        ]));
    }
}
