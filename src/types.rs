// src/types.rs

use serde::Deserialize;

use crate::poll::Interest;

/// What a wait does with its timeout after being interrupted by a signal.
///
/// - `Restart`: re-enter `epoll_wait` with the full original timeout. An
///   interrupted wait can therefore last up to one extra timeout. Default.
/// - `Deadline`: re-enter with whatever is left of the original timeout, so
///   the total never exceeds it by more than scheduling slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptPolicy {
    #[default]
    Restart,
    Deadline,
}

/// Event kinds that can be requested from a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    In,
    Out,
    Pri,
    Rdhup,
}

impl EventKind {
    pub fn interest(self) -> Interest {
        match self {
            EventKind::In => Interest::IN,
            EventKind::Out => Interest::OUT,
            EventKind::Pri => Interest::PRI,
            EventKind::Rdhup => Interest::RDHUP,
        }
    }
}

/// Delivery mode of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Report for as long as the condition holds.
    #[default]
    Level,
    /// Report only on transitions (`EPOLLET`).
    Edge,
    /// Report once, then disarm until modified (`EPOLLONESHOT`).
    Oneshot,
}

impl TriggerMode {
    pub fn interest(self) -> Interest {
        match self {
            TriggerMode::Level => Interest::empty(),
            TriggerMode::Edge => Interest::ET,
            TriggerMode::Oneshot => Interest::ONESHOT,
        }
    }
}
