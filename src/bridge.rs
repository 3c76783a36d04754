//! High-level bridge between buffer files and one consumer
//!
//! A [`Bridge`] owns everything a single consumer needs: its configuration,
//! its mapping cache, and the state it exposes. Hosts call
//! [`Bridge::refresh`] once at startup and then from a recurring timer, or
//! hand control to [`Bridge::run`].

use crate::cache::BufferCache;
use crate::config::BridgeConfig;
use crate::error::{MirrorError, Result};
use crate::publisher::{self, ConsumerState, Outcome, PublishedBuffer};
use crate::registry::{self, Registry, RegistrySource, DIRECT_BUFFER_NAME};
use crate::writer;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What one refresh pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub source: RegistrySource,
    /// Per-buffer outcome, in registry order
    pub outcomes: Vec<(String, Outcome)>,
}

impl RefreshReport {
    pub fn outcome(&self, name: &str) -> Option<Outcome> {
        self.outcomes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, o)| *o)
    }

    /// Number of buffers published this pass
    pub fn updated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == Outcome::Updated)
            .count()
    }

    /// Number of buffers skipped because of a failure
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Failed(_)))
            .count()
    }
}

/// Reader side of the protocol for one consumer, plus access to the writer
pub struct Bridge {
    config: BridgeConfig,
    cache: BufferCache,
    state: ConsumerState,
    registry_path: Option<PathBuf>,
    registry_failed: bool,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        debug!(
            registry = ?config.registry_path,
            direct = ?config.direct_path,
            interval_ms = config.refresh_interval.as_millis() as u64,
            "bridge configured"
        );

        Self {
            config,
            cache: BufferCache::new(),
            state: ConsumerState::new(),
            registry_path: None,
            registry_failed: false,
        }
    }

    /// Bridge configured from `MIRRORBUF_*` environment variables
    pub fn from_env() -> Self {
        Self::new(BridgeConfig::from_env())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> &ConsumerState {
        &self.state
    }

    /// Mutable state, for setting host-provided paths
    pub fn state_mut(&mut self) -> &mut ConsumerState {
        &mut self.state
    }

    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    /// Registry path remembered from the last pass that resolved one
    pub fn registry_path(&self) -> Option<&Path> {
        self.registry_path.as_deref()
    }

    /// Where the next pass will read its buffer list from
    pub fn source(&self) -> RegistrySource {
        registry::resolve_source(
            self.config.registry_path.as_deref(),
            self.state.registry_path(),
            self.state.direct_path(),
            self.config.direct_path.as_deref(),
        )
    }

    /// Run one reconciliation pass over every known buffer.
    ///
    /// Fails only when a registry is configured but unreadable; nothing is
    /// updated in that case. One buffer's failure never stops the others.
    /// Cache entries for names the source no longer lists are dropped, which
    /// closes their mappings; already published arrays stay.
    pub fn refresh(&mut self) -> Result<RefreshReport> {
        let source = self.source();
        let mut outcomes = Vec::new();

        match &source {
            RegistrySource::File(path) => {
                if self.registry_path.as_deref() != Some(path.as_path()) {
                    info!(path = %path.display(), "using shared buffer registry");
                    self.registry_path = Some(path.clone());
                }

                let registry = match Registry::load(path) {
                    Ok(registry) => {
                        self.registry_failed = false;
                        registry
                    }
                    Err(e) => {
                        if !self.registry_failed {
                            warn!(error = %e, "failed to read registry");
                            self.registry_failed = true;
                        }
                        return Err(e);
                    }
                };

                for entry in registry.entries() {
                    let outcome = publisher::reconcile(
                        &entry.name,
                        &entry.path,
                        self.cache.entry(&entry.name),
                        &mut self.state,
                    );
                    outcomes.push((entry.name.clone(), outcome));
                }
                self.evict(|name| registry.get(name).is_some());
            }
            RegistrySource::Direct(path) => {
                let outcome = publisher::reconcile(
                    DIRECT_BUFFER_NAME,
                    path,
                    self.cache.entry(DIRECT_BUFFER_NAME),
                    &mut self.state,
                );
                outcomes.push((DIRECT_BUFFER_NAME.to_string(), outcome));
                self.evict(|name| name == DIRECT_BUFFER_NAME);
            }
            RegistrySource::None => {}
        }

        Ok(RefreshReport { source, outcomes })
    }

    fn evict(&mut self, keep: impl FnMut(&str) -> bool) {
        let dropped = self.cache.retain(keep);
        if dropped > 0 {
            debug!(dropped, "released mappings no longer listed");
        }
    }

    /// Version last published for `name`, if anything was published from its
    /// current mapping
    pub fn version(&self, name: &str) -> Option<u64> {
        self.cache
            .get(name)
            .map(|entry| entry.last_published().0)
            .filter(|v| *v != 0)
    }

    /// Refresh every `refresh_interval` until `name` is published at a
    /// version other than `last_version`, or `timeout` runs out.
    ///
    /// Returns the new version and its array, or `None` on timeout.
    pub fn wait_for_change(
        &mut self,
        name: &str,
        last_version: u64,
        timeout: Duration,
    ) -> Result<Option<(u64, PublishedBuffer)>> {
        let start = Instant::now();
        loop {
            self.refresh()?;
            if let Some(version) = self.version(name).filter(|v| *v != last_version) {
                if let Some(buffer) = self.state.buffer(name) {
                    return Ok(Some((version, buffer)));
                }
            }
            if start.elapsed() >= timeout {
                return Ok(None);
            }
            std::thread::sleep(self.config.refresh_interval);
        }
    }

    /// Push `payload` into the buffer registered as `name`.
    ///
    /// The registry is re-read from disk; the reader-side cache is not
    /// consulted. The next refresh picks the new version up.
    pub fn write(&self, name: &str, payload: &[u8]) -> Result<u64> {
        let registry_path = self.registry_path.as_deref().ok_or_else(|| {
            warn!(name, "write before registry was loaded");
            MirrorError::RegistryNotLoaded
        })?;
        writer::write(registry_path, name, payload)
    }

    /// Refresh now, then every `refresh_interval`, until `keep_going`
    /// returns false.
    pub fn run<F>(&mut self, mut keep_going: F)
    where
        F: FnMut(&Bridge, &Result<RefreshReport>) -> bool,
    {
        loop {
            let report = self.refresh();
            if !keep_going(self, &report) {
                break;
            }
            std::thread::sleep(self.config.refresh_interval);
        }
    }
}
