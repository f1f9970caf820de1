//! Declarative test harness for iptables/ip6tables extensions.
//!
//! This crate provides:
//! - Test-file parsing: one directive per line (chains, table, shell escape, test case)
//! - Test execution: insert a rule, verify it in the dumped state, roll it back
//! - Run aggregation: per-file and per-run counters, missing-test audit
//! - Structured logging: JSONL events with a validation contract
//! - Report generation: human-readable + machine-readable run reports

pub mod aggregator;
pub mod config;
pub mod directive;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod privilege;
pub mod report;
pub mod structured_log;

pub use aggregator::{RunOutcome, RunStatistics, RunTarget, missing_tests, run_suite};
pub use config::HarnessConfig;
pub use directive::{Directive, ParseError, TestCase, parse_line};
pub use error::HarnessError;
pub use executor::{Diagnostic, FailureCategory, TestResult, run_test_case};
pub use interpreter::{FileReport, FileStats, Session, run_test_file, run_test_source};
pub use report::RunReport;
pub use structured_log::LogEmitter;
