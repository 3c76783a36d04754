//! Mirrorbuf - versioned shared buffers mirrored into a script runtime
//!
//! An external producer writes named binary buffers into files under a fixed
//! 64-byte header. This crate maps those files and publishes their contents
//! as byte arrays on the consumer side, refreshed in place as versions move.
//!
//! # Architecture
//!
//! - **Single Writer**: bumps the header version only after the payload is in place
//! - **Multiple Readers**: each [`Bridge`] owns its own mapping cache and state
//!
//! No locks cross the process boundary. The version word is the only
//! coherence mechanism, so a reader that sees nothing new does almost no work.

pub mod error;
pub mod header;
pub mod shm;
pub mod registry;
pub mod cache;
pub mod publisher;
pub mod writer;
pub mod buffer_file;
pub mod config;
pub mod bridge;
pub mod surface;
pub mod bindings;

pub use error::{ErrorKind, MirrorError, Result};
pub use bridge::{Bridge, RefreshReport};
pub use config::BridgeConfig;
pub use publisher::{ConsumerState, Manifest, Outcome, PublishedBuffer};
pub use registry::{Registry, RegistrySource};
pub use surface::{DebugInfo, HostValue, ManifestInfo};
