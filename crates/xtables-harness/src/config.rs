//! Harness configuration.
//!
//! Defaults match an iptables source checkout, run from its top directory:
//! test files live in `extensions/` and the backends are `iptables` and
//! `ip6tables` on `PATH`. Each default can be replaced through the
//! environment:
//! - `XTABLES_TEST_EXTENSIONS`: directory scanned for `.t` files.
//! - `XTABLES_TEST_IPV4_BIN`: IPv4 rule-management binary.
//! - `XTABLES_TEST_IPV6_BIN`: IPv6 rule-management binary.
//!
//! Command-line flags take precedence over the environment.

use std::path::PathBuf;

use xtables_backend::CommandBackend;

pub const ENV_EXTENSIONS: &str = "XTABLES_TEST_EXTENSIONS";
pub const ENV_IPV4_BIN: &str = "XTABLES_TEST_IPV4_BIN";
pub const ENV_IPV6_BIN: &str = "XTABLES_TEST_IPV6_BIN";

/// Suffix that marks a test file.
pub const TEST_SUFFIX: &str = ".t";
/// Prefix and suffix of an extension source file that should have a test.
pub const SOURCE_PREFIX: &str = "lib";
pub const SOURCE_SUFFIX: &str = ".c";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub extensions_dir: PathBuf,
    pub ipv4_program: String,
    pub ipv6_program: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            extensions_dir: PathBuf::from("extensions"),
            ipv4_program: String::from("iptables"),
            ipv6_program: String::from("ip6tables"),
        }
    }
}

impl HarnessConfig {
    /// Resolve from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve with a custom variable lookup. Empty values are ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();
        Self {
            extensions_dir: var(ENV_EXTENSIONS)
                .map(PathBuf::from)
                .unwrap_or(defaults.extensions_dir),
            ipv4_program: var(ENV_IPV4_BIN).unwrap_or(defaults.ipv4_program),
            ipv6_program: var(ENV_IPV6_BIN).unwrap_or(defaults.ipv6_program),
        }
    }

    /// Replace the extensions directory, e.g. from a CLI flag.
    #[must_use]
    pub fn with_extensions_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.extensions_dir = dir;
        }
        self
    }

    /// Process-backed backend for the configured binaries.
    #[must_use]
    pub fn backend(&self) -> CommandBackend {
        CommandBackend::new(&self.ipv4_program, &self.ipv6_program)
    }
}
