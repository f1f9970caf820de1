//! Test-case execution: insert, verify through a state dump, delete.
//!
//! Each step is one synchronous backend call. Any rule that was inserted is
//! deleted again before the next test case runs, whatever the verdict, so a
//! failing case does not leave state behind for later ones.

use serde::{Deserialize, Serialize};
use xtables_backend::{BackendError, BackendFamily, ExitState, RuleBackend};

use crate::directive::TestCase;

/// Delete status meaning "no such rule".
const DELETE_NOT_FOUND: i32 = 1;
/// Status a shell gives a command line with unbalanced quotes.
const QUOTING_ERROR: ExitState = ExitState::Exited(2);

/// Why a test case failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Declared `OK`, rejected by the backend.
    CannotLoad,
    /// Declared `FAIL`, accepted by the backend.
    ShouldHaveFailed,
    /// The state dump died from a fault signal.
    DumpCrashed,
    /// The expected text is missing from the state dump.
    NotFoundInDump,
    /// The rule could not be deleted afterwards.
    CannotDelete,
}

impl FailureCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CannotLoad => "cannot load",
            Self::ShouldHaveFailed => "should have failed to load",
            Self::DumpCrashed => "backend crashed while dumping state",
            Self::NotFoundInDump => "rule not found in dumped state",
            Self::CannotDelete => "cannot delete",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed assertion, located in its test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: String,
    pub line: usize,
    pub chain: String,
    pub category: FailureCategory,
    /// The backend command the failure refers to, for humans.
    pub command: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: ERROR: line {} ({}: {})",
            self.file, self.line, self.category, self.command
        )
    }
}

/// What the backend did compared to what the test declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Declared `OK`, loaded, found in the dump and deleted.
    Accepted,
    /// Declared `FAIL` and rejected.
    Rejected,
    /// Anything else.
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub outcome: TestOutcome,
    /// The failure first, then a rollback failure if the cleanup after it
    /// went wrong too. Empty on pass.
    pub diagnostics: Vec<Diagnostic>,
    /// Exit state of the append step.
    pub append_status: ExitState,
}

impl TestResult {
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        match self.outcome {
            TestOutcome::Accepted | TestOutcome::Rejected => Verdict::Pass,
            TestOutcome::Mismatch => Verdict::Fail,
        }
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict() == Verdict::Pass
    }

    /// Category of the first failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<FailureCategory> {
        self.diagnostics.first().map(|d| d.category)
    }
}

/// One test case bound to one chain.
#[derive(Debug, Clone, Copy)]
pub struct TestInvocation<'a> {
    pub family: BackendFamily,
    pub chain: &'a str,
    /// Empty for the backend's default table.
    pub table: &'a str,
    pub case: &'a TestCase,
    pub file: &'a str,
    pub line: usize,
}

impl TestInvocation<'_> {
    /// `<chain> [-t <table>] <rule...>` as process arguments, or `None` if
    /// the rule's quoting is unbalanced.
    #[must_use]
    pub fn rule_args(&self) -> Option<Vec<String>> {
        let rule = self.case.rule_args.as_ref()?;
        let mut args = self.qualifier();
        args.extend(rule.iter().cloned());
        Some(args)
    }

    fn qualifier(&self) -> Vec<String> {
        let mut args = vec![self.chain.to_string()];
        if !self.table.is_empty() {
            args.push(String::from("-t"));
            args.push(self.table.to_string());
        }
        args
    }

    /// Text that must appear in the state dump.
    ///
    /// The table is selected on the command line only; the dump prints rules
    /// under a `*table` header, so the searched text is chain and rule alone.
    #[must_use]
    pub fn expected_save(&self) -> String {
        format!("{} {}", self.chain, self.case.save_text())
    }

    fn describe(&self, op: &str, rule: &[String]) -> String {
        format!("{} {op} {}", self.family.tool_name(), rule.join(" "))
    }

    fn diagnostic(&self, category: FailureCategory, command: String) -> Diagnostic {
        Diagnostic {
            file: self.file.to_string(),
            line: self.line,
            chain: self.chain.to_string(),
            category,
            command,
        }
    }
}

/// Run one test case against one chain.
///
/// `Err` only when the backend could not be run at all.
pub fn run_test_case<B: RuleBackend + ?Sized>(
    backend: &mut B,
    inv: &TestInvocation<'_>,
) -> Result<TestResult, BackendError> {
    let (rule, append_status) = match inv.rule_args() {
        Some(rule) => {
            let status = backend.append(inv.family, &rule)?;
            (rule, status)
        }
        // Never reaches the backend; fails like the shell would.
        None => {
            let mut rule = inv.qualifier();
            rule.push(inv.case.rule_spec.clone());
            (rule, QUOTING_ERROR)
        }
    };
    let expects_rejection = inv.case.outcome.expects_rejection();

    let mismatch = |diagnostics: Vec<Diagnostic>| TestResult {
        outcome: TestOutcome::Mismatch,
        diagnostics,
        append_status,
    };

    if !append_status.success() {
        // Nothing was inserted, nothing to roll back.
        if expects_rejection {
            return Ok(TestResult {
                outcome: TestOutcome::Rejected,
                diagnostics: Vec::new(),
                append_status,
            });
        }
        return Ok(mismatch(vec![inv.diagnostic(
            FailureCategory::CannotLoad,
            inv.describe("-A", &rule),
        )]));
    }

    let failure = if expects_rejection {
        Some(FailureCategory::ShouldHaveFailed)
    } else {
        let dump = backend.dump_state(inv.family)?;
        if dump.status.is_fault() {
            Some(FailureCategory::DumpCrashed)
        } else if !dump.text.contains(&inv.expected_save()) {
            Some(FailureCategory::NotFoundInDump)
        } else {
            None
        }
    };

    let mut diagnostics = Vec::new();
    if let Some(category) = failure {
        diagnostics.push(inv.diagnostic(category, inv.describe("-A", &rule)));
    }
    if let Some(rollback) = roll_back(backend, inv, &rule)? {
        diagnostics.push(rollback);
    }

    if diagnostics.is_empty() {
        Ok(TestResult {
            outcome: TestOutcome::Accepted,
            diagnostics,
            append_status,
        })
    } else {
        Ok(mismatch(diagnostics))
    }
}

fn roll_back<B: RuleBackend + ?Sized>(
    backend: &mut B,
    inv: &TestInvocation<'_>,
    rule: &[String],
) -> Result<Option<Diagnostic>, BackendError> {
    let status = backend.delete(inv.family, rule)?;
    if status.code() == Some(DELETE_NOT_FOUND) {
        return Ok(Some(
            inv.diagnostic(FailureCategory::CannotDelete, inv.describe("-D", rule)),
        ));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Directive, parse_line};
    use xtables_backend::{BackendCall, MemoryBackend};

    fn case(line: &str) -> TestCase {
        match parse_line(line, 1).unwrap() {
            Directive::TestCase(case) => case,
            other => panic!("not a test case: {other:?}"),
        }
    }

    fn run(backend: &mut MemoryBackend, chain: &str, table: &str, line: &str) -> TestResult {
        let case = case(line);
        let inv = TestInvocation {
            family: BackendFamily::Ipv4,
            chain,
            table,
            case: &case,
            file: "libxt_test.t",
            line: 3,
        };
        run_test_case(backend, &inv).unwrap()
    }

    fn deletes(backend: &MemoryBackend) -> usize {
        backend
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Delete(..)))
            .count()
    }

    #[test]
    fn accepted_rule_found_and_deleted_passes() {
        let mut backend = MemoryBackend::new();
        let result = run(&mut backend, "INPUT", "", "-p tcp --dport 80 -j ACCEPT;=;OK");
        assert_eq!(result.outcome, TestOutcome::Accepted);
        assert!(result.passed());
        assert!(result.diagnostics.is_empty());
        assert_eq!(backend.rule_count(BackendFamily::Ipv4), 0);
        assert_eq!(backend.calls.len(), 3);
    }

    #[test]
    fn rejected_rule_declared_fail_passes_without_delete() {
        let mut backend = MemoryBackend::new().rejecting("invalidproto");
        let result = run(&mut backend, "INPUT", "", "-p invalidproto -j ACCEPT;=;FAIL");
        assert_eq!(result.outcome, TestOutcome::Rejected);
        assert!(result.passed());
        assert_eq!(deletes(&backend), 0);
        assert_eq!(backend.calls.len(), 1);
    }

    #[test]
    fn rejected_rule_declared_ok_cannot_load() {
        let mut backend = MemoryBackend::new().rejecting("invalidproto");
        let result = run(&mut backend, "INPUT", "", "-p invalidproto -j ACCEPT;=;OK");
        assert_eq!(result.verdict(), Verdict::Fail);
        assert_eq!(result.failure(), Some(FailureCategory::CannotLoad));
        assert_eq!(result.append_status, ExitState::Exited(2));
        assert_eq!(deletes(&backend), 0);
        assert_eq!(
            result.diagnostics[0].to_string(),
            "libxt_test.t: ERROR: line 3 (cannot load: iptables -A INPUT -p invalidproto -j ACCEPT)"
        );
    }

    #[test]
    fn unexpected_acceptance_is_rolled_back() {
        let mut backend = MemoryBackend::new();
        let result = run(&mut backend, "INPUT", "", "-j ACCEPT;=;FAIL");
        assert_eq!(result.failure(), Some(FailureCategory::ShouldHaveFailed));
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(deletes(&backend), 1);
        assert!(!backend.calls.contains(&BackendCall::Dump(BackendFamily::Ipv4)));
        assert_eq!(backend.rule_count(BackendFamily::Ipv4), 0);
    }

    #[test]
    fn dump_crash_fails_and_rolls_back() {
        let mut backend = MemoryBackend::new().crashing_dump(libc::SIGSEGV);
        let result = run(&mut backend, "OUTPUT", "", "-j DROP;=;OK");
        assert_eq!(result.failure(), Some(FailureCategory::DumpCrashed));
        assert_eq!(deletes(&backend), 1);
        assert_eq!(backend.rule_count(BackendFamily::Ipv4), 0);
    }

    #[test]
    fn missing_save_text_fails_and_rolls_back() {
        let mut backend = MemoryBackend::new().rewriting_save("-p tcp", "-p tcp -m tcp");
        let result = run(&mut backend, "INPUT", "", "-p tcp --dport 80;=;OK");
        assert_eq!(result.failure(), Some(FailureCategory::NotFoundInDump));
        assert_eq!(deletes(&backend), 1);
        assert_eq!(backend.rule_count(BackendFamily::Ipv4), 0);
    }

    #[test]
    fn normalized_save_text_is_matched() {
        let mut backend = MemoryBackend::new().rewriting_save("-p tcp", "-p tcp -m tcp");
        let result = run(
            &mut backend,
            "INPUT",
            "",
            "-p tcp --dport 80;-p tcp -m tcp --dport 80;OK",
        );
        assert!(result.passed(), "{result:?}");
    }

    #[test]
    fn undeletable_rule_is_a_failure() {
        let mut backend = MemoryBackend::new().with_sticky_rules();
        let result = run(&mut backend, "INPUT", "", "-j ACCEPT;=;OK");
        assert_eq!(result.failure(), Some(FailureCategory::CannotDelete));
        assert!(result.diagnostics[0].command.starts_with("iptables -D INPUT"));
    }

    #[test]
    fn rollback_failure_after_a_failure_is_reported_second() {
        let mut backend = MemoryBackend::new().with_sticky_rules();
        let result = run(&mut backend, "INPUT", "", "-j ACCEPT;=;FAIL");
        let categories: Vec<_> = result.diagnostics.iter().map(|d| d.category).collect();
        assert_eq!(
            categories,
            [FailureCategory::ShouldHaveFailed, FailureCategory::CannotDelete]
        );
    }

    #[test]
    fn table_is_passed_after_chain() {
        let mut backend = MemoryBackend::new();
        let result = run(&mut backend, "PREROUTING", "nat", "-j REDIRECT;=;OK");
        assert!(result.passed(), "{result:?}");
        assert_eq!(
            backend.calls[0],
            BackendCall::Append(
                BackendFamily::Ipv4,
                ["PREROUTING", "-t", "nat", "-j", "REDIRECT"]
                    .map(String::from)
                    .to_vec()
            )
        );
    }

    #[test]
    fn unbalanced_quote_declared_ok_cannot_load() {
        let mut backend = MemoryBackend::new();
        let result = run(
            &mut backend,
            "INPUT",
            "",
            r#"-m comment --comment "open -j ACCEPT;=;OK"#,
        );
        assert_eq!(result.failure(), Some(FailureCategory::CannotLoad));
        assert_eq!(result.append_status, ExitState::Exited(2));
        assert!(backend.calls.is_empty());
        assert_eq!(
            result.diagnostics[0].command,
            r#"iptables -A INPUT -m comment --comment "open -j ACCEPT"#
        );
    }

    #[test]
    fn unbalanced_quote_declared_fail_passes() {
        let mut backend = MemoryBackend::new();
        let result = run(
            &mut backend,
            "INPUT",
            "nat",
            "-m comment --comment 'open -j ACCEPT;=;FAIL",
        );
        assert_eq!(result.outcome, TestOutcome::Rejected);
        assert!(result.passed());
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn unknown_outcome_token_behaves_as_ok() {
        let mut backend = MemoryBackend::new().rejecting("bogus");
        let result = run(&mut backend, "INPUT", "", "-m bogus;=;MAYBE");
        assert_eq!(result.failure(), Some(FailureCategory::CannotLoad));
    }
}
