//! Runs one test file: parses each line, tracks the active chains and table,
//! and dispatches every test line once per chain.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use xtables_backend::{BackendFamily, RuleBackend};

use crate::config::TEST_SUFFIX;
use crate::directive::{Directive, TestCase, parse_line};
use crate::error::HarnessError;
use crate::executor::{Diagnostic, TestInvocation, TestResult, run_test_case};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Everything a run writes to or executes against.
pub struct Session<'a> {
    pub backend: &'a mut dyn RuleBackend,
    /// Human-readable progress (stdout in the CLI).
    pub console: &'a mut dyn Write,
    pub log: &'a mut LogEmitter,
}

impl<'a> Session<'a> {
    pub fn new(
        backend: &'a mut dyn RuleBackend,
        console: &'a mut dyn Write,
        log: &'a mut LogEmitter,
    ) -> Self {
        Self {
            backend,
            console,
            log,
        }
    }

    pub(crate) fn say(&mut self, args: std::fmt::Arguments<'_>) -> Result<(), HarnessError> {
        writeln!(self.console, "{args}").map_err(HarnessError::Output)
    }

    pub(crate) fn record(&mut self, entry: LogEntry) -> Result<(), HarnessError> {
        self.log.emit_entry(entry).map_err(HarnessError::Output)
    }
}

/// Per-file counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    /// Test lines seen, regardless of how many chains each ran on.
    pub tests: usize,
    /// Test lines that passed on every chain.
    pub passed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub family: BackendFamily,
    pub stats: FileStats,
    /// Not a `.t` file; nothing was read.
    pub skipped: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl FileReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.stats.passed == self.stats.tests
    }
}

/// State threaded through one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContext {
    pub chains: Vec<String>,
    /// Empty selects the default table.
    pub table: String,
    pub family: BackendFamily,
}

impl FileContext {
    #[must_use]
    pub fn for_file(file: &str) -> Self {
        Self {
            chains: Vec::new(),
            table: String::new(),
            family: BackendFamily::for_test_file(file),
        }
    }
}

/// Run a test file from disk. Files without the `.t` suffix are skipped.
pub fn run_test_file(session: &mut Session<'_>, path: &Path) -> Result<FileReport, HarnessError> {
    let file = path.display().to_string();
    if !file.ends_with(TEST_SUFFIX) {
        let family = BackendFamily::for_test_file(&file);
        let entry = session
            .log
            .entry(LogLevel::Warn, "file_skipped")
            .with_location(file.as_str(), None)
            .with_family(family.as_str())
            .with_outcome(Outcome::Skip);
        session.record(entry)?;
        return Ok(FileReport {
            family,
            file,
            stats: FileStats::default(),
            skipped: true,
            diagnostics: Vec::new(),
        });
    }
    let handle = File::open(path).map_err(|e| HarnessError::io(path, e))?;
    run_test_source(session, &file, BufReader::new(handle))
}

/// Run test-file content read from `reader`. `file` names it in output.
pub fn run_test_source(
    session: &mut Session<'_>,
    file: &str,
    reader: impl BufRead,
) -> Result<FileReport, HarnessError> {
    let mut ctx = FileContext::for_file(file);
    let mut report = FileReport {
        file: file.to_string(),
        family: ctx.family,
        stats: FileStats::default(),
        skipped: false,
        diagnostics: Vec::new(),
    };

    let entry = session
        .log
        .entry(LogLevel::Info, "file_start")
        .with_location(file, None)
        .with_family(ctx.family.as_str());
    session.record(entry)?;

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| HarnessError::io(file, e))?;
        let directive = parse_line(&line, line_number).map_err(|source| HarnessError::Parse {
            file: file.to_string(),
            source,
        })?;

        match directive {
            Directive::Comment => {}
            Directive::ChainSet(chains) => ctx.chains = chains,
            Directive::TableSelect(table) => ctx.table = table,
            Directive::ExternalCommand(command) => {
                session.backend.run_opaque(&command)?;
                let entry = session
                    .log
                    .entry(LogLevel::Debug, "external_command")
                    .with_location(file, Some(line_number))
                    .with_details(serde_json::json!({ "command": command }));
                session.record(entry)?;
            }
            Directive::TestCase(case) => {
                if ctx.chains.is_empty() {
                    return Err(HarnessError::MissingChain {
                        file: file.to_string(),
                        line: line_number,
                    });
                }
                report.stats.tests += 1;
                if run_on_chains(session, &ctx, &case, file, line_number, &mut report)? {
                    report.stats.passed += 1;
                }
            }
        }
    }

    let (outcome, label) = if report.all_passed() {
        (Outcome::Pass, "OK")
    } else {
        (Outcome::Fail, "FAIL")
    };
    session.say(format_args!("{file}: {label}"))?;
    let entry = session
        .log
        .entry(LogLevel::Info, "file_done")
        .with_location(file, None)
        .with_family(ctx.family.as_str())
        .with_outcome(outcome)
        .with_details(serde_json::json!({
            "tests": report.stats.tests,
            "passed": report.stats.passed,
        }));
    session.record(entry)?;

    Ok(report)
}

/// Run one test line on every active chain, stopping at the first failure.
/// Returns whether every chain passed.
fn run_on_chains(
    session: &mut Session<'_>,
    ctx: &FileContext,
    case: &TestCase,
    file: &str,
    line: usize,
    report: &mut FileReport,
) -> Result<bool, HarnessError> {
    for chain in &ctx.chains {
        let inv = TestInvocation {
            family: ctx.family,
            chain,
            table: &ctx.table,
            case,
            file,
            line,
        };
        let result = run_test_case(&mut *session.backend, &inv)?;
        log_result(session, &inv, &result)?;
        for diagnostic in &result.diagnostics {
            session.say(format_args!("{diagnostic}"))?;
        }
        let passed = result.passed();
        report.diagnostics.extend(result.diagnostics);
        if !passed {
            return Ok(false);
        }
    }
    Ok(true)
}

fn log_result(
    session: &mut Session<'_>,
    inv: &TestInvocation<'_>,
    result: &TestResult,
) -> Result<(), HarnessError> {
    let level = if result.passed() {
        LogLevel::Info
    } else {
        LogLevel::Error
    };
    let mut entry = session
        .log
        .entry(level, "test_case")
        .with_location(inv.file, Some(inv.line))
        .with_chain(inv.chain)
        .with_table(inv.table)
        .with_family(inv.family.as_str())
        .with_details(serde_json::json!({
            "rule": inv.case.rule_spec,
            "declared": inv.case.outcome.as_str(),
            "append_status": result.append_status.to_string(),
        }));
    entry = match result.diagnostics.first() {
        Some(diagnostic) => entry
            .with_outcome(Outcome::Fail)
            .with_failure(diagnostic.category.as_str(), diagnostic.command.as_str()),
        None => entry.with_outcome(Outcome::Pass),
    };
    session.record(entry)
}
