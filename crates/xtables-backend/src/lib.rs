//! Rule-management backend seam shared by the xtables harness.
//!
//! The harness talks to `iptables`/`ip6tables` only through [`RuleBackend`].
//! Rule operations take argument vectors that are handed straight to the
//! process, so rule text is never re-parsed by a shell. The one exception is
//! [`RuleBackend::run_opaque`], which exists for the `!` escape hatch of the
//! test-file format.

#![forbid(unsafe_code)]

mod command;
mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use command::CommandBackend;
pub use memory::{BackendCall, MemoryBackend};

/// Extension naming fragments, checked in order.
const FILE_NAME_FAMILIES: [(&str, BackendFamily); 3] = [
    ("libipt_", BackendFamily::Ipv4),
    ("libip6t_", BackendFamily::Ipv6),
    ("libxt_", BackendFamily::Ipv4),
];

/// Rule-management tool family a test file is run against.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// `iptables` / `iptables-save`.
    #[default]
    Ipv4,
    /// `ip6tables` / `ip6tables-save`.
    Ipv6,
}

impl BackendFamily {
    /// Pick the family for a test file from its name.
    ///
    /// `libipt_` and `libxt_` files run against IPv4, `libip6t_` against IPv6.
    /// Any other name falls back to IPv4.
    #[must_use]
    pub fn for_test_file(file_name: &str) -> Self {
        FILE_NAME_FAMILIES
            .iter()
            .find(|(fragment, _)| file_name.contains(fragment))
            .map(|(_, family)| *family)
            .unwrap_or_default()
    }

    /// Conventional tool name, used when describing a command to a human.
    #[must_use]
    pub const fn tool_name(self) -> &'static str {
        match self {
            Self::Ipv4 => "iptables",
            Self::Ipv6 => "ip6tables",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        }
    }
}

/// How a backend process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Normal exit with a status code.
    Exited(i32),
    /// Killed by the given signal number.
    Signaled(i32),
}

impl ExitState {
    #[must_use]
    pub const fn success(self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Exit code, if the process exited normally.
    #[must_use]
    pub const fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(_) => None,
        }
    }

    /// Returns true if the process died from a fault signal (segfault, bus
    /// error, illegal instruction, arithmetic fault or abort).
    #[must_use]
    pub fn is_fault(self) -> bool {
        match self {
            Self::Exited(_) => false,
            Self::Signaled(sig) => [
                libc::SIGSEGV,
                libc::SIGBUS,
                libc::SIGILL,
                libc::SIGFPE,
                libc::SIGABRT,
            ]
            .contains(&sig),
        }
    }
}

impl std::fmt::Display for ExitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit status {code}"),
            Self::Signaled(sig) => write!(f, "killed by signal {sig}"),
        }
    }
}

/// Output of a serialized-state dump (`iptables-save`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpOutput {
    pub status: ExitState,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Synchronous rule-management operations used by the harness.
///
/// Implementations block until the underlying process has exited. An `Err`
/// means the operation could not be attempted at all; a rejected rule is an
/// `Ok` carrying a non-zero [`ExitState`].
pub trait RuleBackend {
    /// Append a rule (`-A <rule...>`).
    fn append(&mut self, family: BackendFamily, rule: &[String])
    -> Result<ExitState, BackendError>;

    /// Delete a rule (`-D <rule...>`). Exit status `1` means the rule was not
    /// present.
    fn delete(&mut self, family: BackendFamily, rule: &[String])
    -> Result<ExitState, BackendError>;

    /// Dump the full serialized rule state.
    fn dump_state(&mut self, family: BackendFamily) -> Result<DumpOutput, BackendError>;

    /// Run an arbitrary shell command, discarding its output and status.
    fn run_opaque(&mut self, command: &str) -> Result<(), BackendError>;
}
