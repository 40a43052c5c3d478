//! Lifecycle of the single gateway link.
//!
//! `ConnectionPhase` tracks where the client is between dialing the
//! gateway and tearing the link down, with validated transitions that
//! return `Result` instead of panicking.

use std::time::Instant;

use crate::error::UssdError;
use crate::header::SessionKey;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of the gateway link.
///
/// ```text
///  Disconnected ──► Connecting ──► LoggingOn ──► Online
///       ▲                │             │           │
///       │                ▼             ▼           ▼
///       └──────────── Closing ◄────────┴───────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No link. Initial and terminal state.
    #[default]
    Disconnected,

    /// TCP connect in progress.
    Connecting,

    /// Logon request sent; waiting for the gateway's answer.
    LoggingOn,

    /// Logged on; keepalives and dialogs are flowing.
    Online {
        since: Instant,
        /// Key taken from the logon response header.
        session_key: SessionKey,
    },

    /// Link is being torn down; in-flight dialogs are draining.
    Closing,
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::LoggingOn => write!(f, "LoggingOn"),
            Self::Online { .. } => write!(f, "Online"),
            Self::Closing => write!(f, "Closing"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Session key of the current logon, if online.
    pub fn session_key(&self) -> Option<SessionKey> {
        match self {
            Self::Online { session_key, .. } => Some(*session_key),
            _ => None,
        }
    }

    /// How long the link has been online. `None` in any other phase.
    pub fn online_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Online { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), UssdError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(UssdError::ProtocolViolation(
                "cannot connect: not in Disconnected state",
            )),
        }
    }

    /// Valid from: `Connecting`.
    pub fn begin_logon(&mut self) -> Result<(), UssdError> {
        match self {
            Self::Connecting => {
                *self = Self::LoggingOn;
                Ok(())
            }
            _ => Err(UssdError::ProtocolViolation(
                "cannot log on: not in Connecting state",
            )),
        }
    }

    /// Valid from: `LoggingOn`.
    pub fn complete_logon(&mut self, session_key: SessionKey) -> Result<(), UssdError> {
        match self {
            Self::LoggingOn => {
                *self = Self::Online {
                    since: Instant::now(),
                    session_key,
                };
                Ok(())
            }
            _ => Err(UssdError::ProtocolViolation(
                "cannot complete logon: not in LoggingOn state",
            )),
        }
    }

    /// Valid from: `LoggingOn`, `Online`.
    pub fn begin_close(&mut self) -> Result<(), UssdError> {
        match self {
            Self::LoggingOn | Self::Online { .. } => {
                *self = Self::Closing;
                Ok(())
            }
            _ => Err(UssdError::ProtocolViolation(
                "cannot close: not in LoggingOn or Online state",
            )),
        }
    }

    /// Valid from: `Closing`, `Connecting` (dial failure), `LoggingOn`
    /// (logon failure).
    pub fn finish_close(&mut self) -> Result<(), UssdError> {
        match self {
            Self::Closing | Self::Connecting | Self::LoggingOn => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(UssdError::ProtocolViolation(
                "cannot finish close: not in a closable state",
            )),
        }
    }

    /// Reset to `Disconnected` regardless of the current phase.
    pub fn force_disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}
