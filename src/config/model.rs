// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::poll::{Interest, MAX_BATCH, WatcherOptions};
use crate::types::{EventKind, InterruptPolicy, TriggerMode};

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [watcher]
/// max_batch = 64
/// on_interrupt = "deadline"
///
/// [[watch]]
/// path = "/tmp/epwatch.fifo"
/// events = ["in", "rdhup"]
/// mode = "edge"
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watcher: WatcherSection,

    #[serde(default)]
    pub watch: Vec<WatchEntry>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub watcher: WatcherSection,
    pub watch: Vec<WatchEntry>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(watcher: WatcherSection, watch: Vec<WatchEntry>) -> Self {
        Self { watcher, watch }
    }
}

/// `[watcher]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherSection {
    /// Events fetched per wait call (`1..=256`).
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// `"restart"` (default) or `"deadline"`.
    #[serde(default)]
    pub on_interrupt: InterruptPolicy,
}

fn default_max_batch() -> usize {
    MAX_BATCH
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            max_batch: default_max_batch(),
            on_interrupt: InterruptPolicy::default(),
        }
    }
}

impl WatcherSection {
    pub fn options(&self) -> WatcherOptions {
        WatcherOptions {
            max_batch: self.max_batch,
            on_interrupt: self.on_interrupt,
        }
    }
}

/// One `[[watch]]` entry: a path to open and what to wait for on it.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchEntry {
    pub path: PathBuf,

    pub events: Vec<EventKind>,

    #[serde(default)]
    pub mode: TriggerMode,
}

impl WatchEntry {
    /// Interest mask to register: requested events plus delivery mode.
    pub fn interest(&self) -> Interest {
        self.events
            .iter()
            .fold(self.mode.interest(), |acc, kind| acc | kind.interest())
    }
}
