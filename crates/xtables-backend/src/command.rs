//! Process-backed [`RuleBackend`].

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};

use crate::{BackendError, BackendFamily, DumpOutput, ExitState, RuleBackend};

/// Runs the real `iptables`/`ip6tables` binaries.
///
/// The dump program is the family binary with a `-save` suffix. Standard
/// error of every call is discarded.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    ipv4_program: String,
    ipv6_program: String,
}

impl Default for CommandBackend {
    fn default() -> Self {
        Self::new("iptables", "ip6tables")
    }
}

impl CommandBackend {
    #[must_use]
    pub fn new(ipv4_program: impl Into<String>, ipv6_program: impl Into<String>) -> Self {
        Self {
            ipv4_program: ipv4_program.into(),
            ipv6_program: ipv6_program.into(),
        }
    }

    /// Rule-management binary for a family.
    #[must_use]
    pub fn program(&self, family: BackendFamily) -> &str {
        match family {
            BackendFamily::Ipv4 => &self.ipv4_program,
            BackendFamily::Ipv6 => &self.ipv6_program,
        }
    }

    /// Serialized-state dump binary for a family.
    #[must_use]
    pub fn save_program(&self, family: BackendFamily) -> String {
        format!("{}-save", self.program(family))
    }

    fn rule_op(
        &self,
        family: BackendFamily,
        op: &str,
        rule: &[String],
    ) -> Result<ExitState, BackendError> {
        let program = self.program(family);
        let status = Command::new(program)
            .arg(op)
            .args(rule)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| BackendError::Spawn {
                program: program.to_string(),
                source,
            })?;
        Ok(exit_state(status))
    }
}

impl RuleBackend for CommandBackend {
    fn append(
        &mut self,
        family: BackendFamily,
        rule: &[String],
    ) -> Result<ExitState, BackendError> {
        self.rule_op(family, "-A", rule)
    }

    fn delete(
        &mut self,
        family: BackendFamily,
        rule: &[String],
    ) -> Result<ExitState, BackendError> {
        self.rule_op(family, "-D", rule)
    }

    fn dump_state(&mut self, family: BackendFamily) -> Result<DumpOutput, BackendError> {
        let program = self.save_program(family);
        let output = Command::new(&program)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| BackendError::Spawn { program, source })?;
        Ok(DumpOutput {
            status: exit_state(output.status),
            text: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn run_opaque(&mut self, command: &str) -> Result<(), BackendError> {
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| BackendError::Spawn {
                program: String::from("sh"),
                source,
            })?;
        Ok(())
    }
}

fn exit_state(status: ExitStatus) -> ExitState {
    match (status.code(), status.signal()) {
        (Some(code), _) => ExitState::Exited(code),
        (None, Some(sig)) => ExitState::Signaled(sig),
        // Unreachable on unix.
        (None, None) => ExitState::Exited(-1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_program_appends_suffix() {
        let backend = CommandBackend::new("/usr/sbin/iptables-legacy", "ip6tables");
        assert_eq!(
            backend.save_program(BackendFamily::Ipv4),
            "/usr/sbin/iptables-legacy-save"
        );
        assert_eq!(backend.save_program(BackendFamily::Ipv6), "ip6tables-save");
    }

    #[test]
    fn default_programs() {
        let backend = CommandBackend::default();
        assert_eq!(backend.program(BackendFamily::Ipv4), "iptables");
        assert_eq!(backend.program(BackendFamily::Ipv6), "ip6tables");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let mut backend = CommandBackend::new(
            "/nonexistent/xtables-harness-test-binary",
            "/nonexistent/xtables-harness-test-binary6",
        );
        let err = backend
            .append(BackendFamily::Ipv4, &[String::from("INPUT")])
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/xtables-harness-test-binary"));
    }

    #[test]
    fn exit_codes_and_signals_map_to_exit_state() {
        let mut backend = CommandBackend::default();
        backend.run_opaque("true").unwrap();

        let ok = Command::new("sh").args(["-c", "exit 0"]).status().unwrap();
        assert_eq!(exit_state(ok), ExitState::Exited(0));
        let one = Command::new("sh").args(["-c", "exit 1"]).status().unwrap();
        assert_eq!(exit_state(one), ExitState::Exited(1));
        let segv = Command::new("sh")
            .args(["-c", "kill -SEGV $$"])
            .status()
            .unwrap();
        assert_eq!(exit_state(segv), ExitState::Signaled(libc::SIGSEGV));
        assert!(exit_state(segv).is_fault());
    }
}
