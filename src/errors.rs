// src/errors.rs

//! Crate-wide error type and result alias.

use std::os::fd::RawFd;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpwatchError {
    /// Malformed call shape; detected before any kernel call.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An underlying OS call failed.
    #[error(
        "{syscall}(2) failed (epoll fd: {}, target fd: {})",
        fmt_fd(.epfd),
        fmt_fd(.fd)
    )]
    ResourceError {
        syscall: &'static str,
        epfd: Option<RawFd>,
        fd: Option<RawFd>,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid state: {0}")]
    StateError(String),

    #[error("wait cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EpwatchError {
    pub(crate) fn resource(
        syscall: &'static str,
        epfd: Option<RawFd>,
        fd: Option<RawFd>,
        source: std::io::Error,
    ) -> Self {
        EpwatchError::ResourceError {
            syscall,
            epfd,
            fd,
            source,
        }
    }

    /// OS error code for `ResourceError`, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            EpwatchError::ResourceError { source, .. } => source.raw_os_error(),
            EpwatchError::IoError(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

fn fmt_fd(fd: &Option<RawFd>) -> String {
    match fd {
        Some(fd) => fd.to_string(),
        None => "-".to_string(),
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EpwatchError>;
