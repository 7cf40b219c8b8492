#![allow(dead_code)]

use std::path::PathBuf;

use epwatch::config::{ConfigFile, RawConfigFile, WatchEntry, WatcherSection};
use epwatch::types::{EventKind, InterruptPolicy, TriggerMode};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                watcher: WatcherSection::default(),
                watch: Vec::new(),
            },
        }
    }

    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.config.watcher.max_batch = max_batch;
        self
    }

    pub fn on_interrupt(mut self, policy: InterruptPolicy) -> Self {
        self.config.watcher.on_interrupt = policy;
        self
    }

    pub fn with_watch(mut self, entry: WatchEntry) -> Self {
        self.config.watch.push(entry);
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    /// The raw config, for tests that expect validation to fail.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a `[[watch]]` entry.
pub struct WatchEntryBuilder {
    entry: WatchEntry,
}

impl WatchEntryBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            entry: WatchEntry {
                path: path.into(),
                events: vec![],
                mode: TriggerMode::Level,
            },
        }
    }

    pub fn event(mut self, kind: EventKind) -> Self {
        self.entry.events.push(kind);
        self
    }

    pub fn mode(mut self, mode: TriggerMode) -> Self {
        self.entry.mode = mode;
        self
    }

    pub fn build(self) -> WatchEntry {
        self.entry
    }
}
