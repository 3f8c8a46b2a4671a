//! Observed lifecycle state of a managed application instance.

use serde::{Deserialize, Serialize};

/// Observed state of a descriptor.
///
/// The engine enforces no transition table; the standard scanners only move
/// between the states documented on each scanner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ApplicationState {
    /// Not yet probed.
    #[default]
    Unknown = 0,
    /// Host reachable and authenticated; application not answering.
    Auth = 1,
    /// Host reachable but rejected our credentials.
    NoAuth = 2,
    /// Host or application address does not resolve.
    Invalid = 3,
    /// Host did not answer in time or the connection failed.
    Unreachable = 4,
    /// Deploy succeeded; not yet confirmed running.
    Launched = 5,
    /// Application answered a liveness call.
    Running = 6,
    /// Application was killed by the engine.
    Killed = 7,
}

impl ApplicationState {
    /// All states, in declaration order.
    pub const ALL: [ApplicationState; 8] = [
        Self::Unknown,
        Self::Auth,
        Self::NoAuth,
        Self::Invalid,
        Self::Unreachable,
        Self::Launched,
        Self::Running,
        Self::Killed,
    ];

    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of `as_u8`. Out-of-range values map to `Unknown`; only values
    /// produced by `as_u8` are ever stored.
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Auth,
            2 => Self::NoAuth,
            3 => Self::Invalid,
            4 => Self::Unreachable,
            5 => Self::Launched,
            6 => Self::Running,
            7 => Self::Killed,
            _ => Self::Unknown,
        }
    }

    /// Lower-case name, as used in logs and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Auth => "auth",
            Self::NoAuth => "no_auth",
            Self::Invalid => "invalid",
            Self::Unreachable => "unreachable",
            Self::Launched => "launched",
            Self::Running => "running",
            Self::Killed => "killed",
        }
    }

    /// True for states the auto-remove scanner evicts.
    pub const fn is_lost(self) -> bool {
        matches!(self, Self::Unreachable | Self::Invalid)
    }
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown application state: {0}")]
pub struct ParseStateError(pub String);

impl std::str::FromStr for ApplicationState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            // DEPLOYED is accepted as an alias for LAUNCHED
            "deployed" => Ok(Self::Launched),
            other => Self::ALL
                .into_iter()
                .find(|state| state.as_str() == other)
                .ok_or_else(|| ParseStateError(s.to_string())),
        }
    }
}
