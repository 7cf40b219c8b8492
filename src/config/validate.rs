// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{EpwatchError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::EpwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.watcher, raw.watch))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_watcher_section(cfg)?;
    validate_watch_entries(cfg)?;
    Ok(())
}

fn validate_watcher_section(cfg: &RawConfigFile) -> Result<()> {
    // on_interrupt is strongly typed and validated during deserialization.
    cfg.watcher
        .options()
        .validate()
        .map_err(|e| EpwatchError::ConfigError(format!("[watcher]: {e}")))?;
    Ok(())
}

fn validate_watch_entries(cfg: &RawConfigFile) -> Result<()> {
    for (idx, entry) in cfg.watch.iter().enumerate() {
        if entry.path.as_os_str().is_empty() {
            return Err(EpwatchError::ConfigError(format!(
                "[[watch]] entry #{idx} has an empty `path`"
            )));
        }
        if entry.events.is_empty() {
            return Err(EpwatchError::ConfigError(format!(
                "[[watch]] entry for {:?} must list at least one event in `events`",
                entry.path
            )));
        }
    }
    Ok(())
}
