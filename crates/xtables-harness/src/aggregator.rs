//! Run-level driver: picks the test files, runs them one after another and
//! sums their counters. Also hosts the missing-test audit.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{SOURCE_PREFIX, SOURCE_SUFFIX, TEST_SUFFIX};
use crate::error::HarnessError;
use crate::interpreter::{FileReport, FileStats, Session, run_test_file};
use crate::structured_log::{LogLevel, Outcome};

/// What an execute-mode run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// Every `.t` file in a directory.
    Directory(PathBuf),
    /// Exactly this file.
    File(PathBuf),
}

/// Totals for a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub files: usize,
    pub tests: usize,
    pub passed: usize,
}

impl RunStatistics {
    /// Fold one file's counters in.
    pub fn add_file(&mut self, stats: FileStats) {
        self.files += 1;
        self.tests += stats.tests;
        self.passed += stats.passed;
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.tests - self.passed
    }

    /// The closing summary line.
    #[must_use]
    pub fn summary_line(&self) -> String {
        format!(
            "{} test files, {} unit tests, {} passed",
            self.files, self.tests, self.passed
        )
    }
}

/// Result of an execute-mode run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub stats: RunStatistics,
    pub files: Vec<FileReport>,
}

/// Run every file of `target` and print the summary line.
///
/// An explicitly named file always counts as examined. In directory mode a
/// file counts only if it held at least one test.
pub fn run_suite(
    session: &mut Session<'_>,
    target: &RunTarget,
) -> Result<RunOutcome, HarnessError> {
    let mut outcome = RunOutcome {
        stats: RunStatistics::default(),
        files: Vec::new(),
    };

    let entry = session
        .log
        .entry(LogLevel::Info, "run_start")
        .with_details(serde_json::json!({ "target": describe(target) }));
    session.record(entry)?;

    match target {
        RunTarget::File(path) => {
            let report = run_test_file(session, path)?;
            outcome.stats.add_file(report.stats);
            outcome.files.push(report);
        }
        RunTarget::Directory(dir) => {
            for path in test_files(dir)? {
                let report = run_test_file(session, &path)?;
                if report.stats.tests > 0 {
                    outcome.stats.add_file(report.stats);
                }
                outcome.files.push(report);
            }
        }
    }

    let stats = outcome.stats;
    session.say(format_args!("{}", stats.summary_line()))?;
    let result = if stats.failed() == 0 {
        Outcome::Pass
    } else {
        Outcome::Fail
    };
    let entry = session
        .log
        .entry(LogLevel::Info, "run_summary")
        .with_outcome(result)
        .with_details(serde_json::json!({
            "files": stats.files,
            "tests": stats.tests,
            "passed": stats.passed,
        }));
    session.record(entry)?;

    Ok(outcome)
}

fn describe(target: &RunTarget) -> String {
    match target {
        RunTarget::Directory(dir) => dir.display().to_string(),
        RunTarget::File(file) => file.display().to_string(),
    }
}

/// Entry names of a directory, sorted.
pub fn list_dir(dir: &Path) -> Result<Vec<String>, HarnessError> {
    let entries = std::fs::read_dir(dir).map_err(|e| HarnessError::io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| HarnessError::io(dir, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Paths of the `.t` files in `dir`, sorted by name.
pub fn test_files(dir: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    Ok(list_dir(dir)?
        .into_iter()
        .filter(|name| name.ends_with(TEST_SUFFIX))
        .map(|name| dir.join(name))
        .collect())
}

/// Test files that should exist but don't: for each `lib*.c` entry, the
/// matching `lib*.t`. Sorted.
#[must_use]
pub fn missing_tests_in<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let tests: BTreeSet<&str> = names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| name.ends_with(TEST_SUFFIX))
        .collect();

    let mut missing: Vec<String> = names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| name.starts_with(SOURCE_PREFIX))
        .filter_map(|name| name.strip_suffix(SOURCE_SUFFIX))
        .map(|stem| format!("{stem}{TEST_SUFFIX}"))
        .filter(|expected| !tests.contains(expected.as_str()))
        .collect();
    missing.sort();
    missing.dedup();
    missing
}

/// Audit `dir` for extension sources without a test file.
pub fn missing_tests(dir: &Path) -> Result<Vec<String>, HarnessError> {
    Ok(missing_tests_in(&list_dir(dir)?))
}
