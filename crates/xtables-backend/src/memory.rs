//! In-memory [`RuleBackend`] that keeps rule state like the real tool.
//!
//! Used by the harness tests in place of `iptables`. Appended rules are
//! stored per family and table, deletions remove the first exact match, and
//! the dump renders the state in `iptables-save` layout. Every call is
//! recorded in [`MemoryBackend::calls`].

use std::collections::BTreeMap;

use crate::{BackendError, BackendFamily, DumpOutput, ExitState, RuleBackend};

const DEFAULT_TABLE: &str = "filter";
/// Status `iptables` uses for a bad rule.
const REJECT_STATUS: i32 = 2;
/// Status `iptables -D` uses for a missing rule.
const NOT_FOUND_STATUS: i32 = 1;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Append(BackendFamily, Vec<String>),
    Delete(BackendFamily, Vec<String>),
    Dump(BackendFamily),
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct StoredRule {
    table: String,
    chain: String,
    spec: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    rules: BTreeMap<BackendFamily, Vec<StoredRule>>,
    rejected_words: Vec<String>,
    save_rewrites: Vec<(String, String)>,
    dump_signal: Option<i32>,
    sticky_rules: bool,
    pub calls: Vec<BackendCall>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any appended rule containing this argument.
    #[must_use]
    pub fn rejecting(mut self, word: impl Into<String>) -> Self {
        self.rejected_words.push(word.into());
        self
    }

    /// Print `from` as `to` in dumps, the way the real tool normalizes
    /// matches (`-p tcp --dport 80` becomes `-p tcp -m tcp --dport 80`).
    #[must_use]
    pub fn rewriting_save(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.save_rewrites.push((from.into(), to.into()));
        self
    }

    /// Make every dump die with `signal`.
    #[must_use]
    pub fn crashing_dump(mut self, signal: i32) -> Self {
        self.dump_signal = Some(signal);
        self
    }

    /// Accept rules but refuse to delete them, reporting "not found".
    #[must_use]
    pub fn with_sticky_rules(mut self) -> Self {
        self.sticky_rules = true;
        self
    }

    /// Number of rules currently installed for a family.
    #[must_use]
    pub fn rule_count(&self, family: BackendFamily) -> usize {
        self.rules.get(&family).map_or(0, Vec::len)
    }

    /// Commands passed to [`RuleBackend::run_opaque`], in order.
    #[must_use]
    pub fn opaque_commands(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Opaque(command) => Some(command.as_str()),
                _ => None,
            })
            .collect()
    }

    fn render(&self, family: BackendFamily) -> String {
        let mut by_table: BTreeMap<&str, Vec<&StoredRule>> = BTreeMap::new();
        for rule in self.rules.get(&family).into_iter().flatten() {
            by_table.entry(rule.table.as_str()).or_default().push(rule);
        }

        let mut out = String::from("# Generated by xtables-backend memory dump\n");
        for (table, rules) in by_table {
            out.push_str(&format!("*{table}\n"));
            for rule in rules {
                let mut spec = rule.spec.join(" ");
                for (from, to) in &self.save_rewrites {
                    spec = spec.replace(from.as_str(), to);
                }
                out.push_str(&format!("-A {} {spec}\n", rule.chain));
            }
            out.push_str("COMMIT\n");
        }
        out
    }
}

/// Split `<chain> [-t <table>] <spec...>` into its parts.
fn parse_rule(rule: &[String]) -> Option<StoredRule> {
    let (chain, rest) = rule.split_first()?;
    let (table, spec) = match rest {
        [flag, table, spec @ ..] if flag == "-t" => (table.clone(), spec.to_vec()),
        spec => (DEFAULT_TABLE.to_string(), spec.to_vec()),
    };
    Some(StoredRule {
        table,
        chain: chain.clone(),
        spec,
    })
}

impl RuleBackend for MemoryBackend {
    fn append(
        &mut self,
        family: BackendFamily,
        rule: &[String],
    ) -> Result<ExitState, BackendError> {
        self.calls.push(BackendCall::Append(family, rule.to_vec()));
        let Some(parsed) = parse_rule(rule) else {
            return Ok(ExitState::Exited(REJECT_STATUS));
        };
        if parsed.chain.is_empty()
            || parsed
                .spec
                .iter()
                .any(|arg| self.rejected_words.contains(arg))
        {
            return Ok(ExitState::Exited(REJECT_STATUS));
        }
        self.rules.entry(family).or_default().push(parsed);
        Ok(ExitState::Exited(0))
    }

    fn delete(
        &mut self,
        family: BackendFamily,
        rule: &[String],
    ) -> Result<ExitState, BackendError> {
        self.calls.push(BackendCall::Delete(family, rule.to_vec()));
        if self.sticky_rules {
            return Ok(ExitState::Exited(NOT_FOUND_STATUS));
        }
        let installed = self.rules.entry(family).or_default();
        let position =
            parse_rule(rule).and_then(|parsed| installed.iter().position(|r| *r == parsed));
        match position {
            Some(index) => {
                installed.remove(index);
                Ok(ExitState::Exited(0))
            }
            None => Ok(ExitState::Exited(NOT_FOUND_STATUS)),
        }
    }

    fn dump_state(&mut self, family: BackendFamily) -> Result<DumpOutput, BackendError> {
        self.calls.push(BackendCall::Dump(family));
        if let Some(signal) = self.dump_signal {
            return Ok(DumpOutput {
                status: ExitState::Signaled(signal),
                text: String::new(),
            });
        }
        Ok(DumpOutput {
            status: ExitState::Exited(0),
            text: self.render(family),
        })
    }

    fn run_opaque(&mut self, command: &str) -> Result<(), BackendError> {
        self.calls.push(BackendCall::Opaque(command.to_string()));
        Ok(())
    }
}
