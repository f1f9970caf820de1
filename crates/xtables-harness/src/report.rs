//! Report generation for harness runs.

use serde::{Deserialize, Serialize};

use crate::aggregator::{RunOutcome, RunStatistics};
use crate::interpreter::FileReport;

/// A run report: totals plus per-file results and failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Report title.
    pub title: String,
    /// Run identifier, shared with the structured log.
    pub run_id: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    pub stats: RunStatistics,
    pub files: Vec<FileReport>,
}

impl RunReport {
    #[must_use]
    pub fn new(title: impl Into<String>, run_id: impl Into<String>, outcome: RunOutcome) -> Self {
        Self {
            title: title.into(),
            run_id: run_id.into(),
            timestamp: crate::structured_log::now_utc(),
            stats: outcome.stats,
            files: outcome.files,
        }
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Run: {}\n", self.run_id));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Files: {}\n", self.stats.files));
        out.push_str(&format!("- Tests: {}\n", self.stats.tests));
        out.push_str(&format!("- Passed: {}\n", self.stats.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.stats.failed()));

        out.push_str("| File | Family | Tests | Passed | Status |\n");
        out.push_str("|------|--------|-------|--------|--------|\n");
        for f in self.files.iter().filter(|f| !f.skipped) {
            let status = if f.all_passed() { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                f.file,
                f.family.as_str(),
                f.stats.tests,
                f.stats.passed,
                status
            ));
        }

        let failures: Vec<_> = self.files.iter().flat_map(|f| &f.diagnostics).collect();
        if !failures.is_empty() {
            out.push_str("\n## Failures\n\n");
            out.push_str("| File | Line | Chain | Reason | Command |\n");
            out.push_str("|------|------|-------|--------|---------|\n");
            for d in failures {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | `{}` |\n",
                    d.file, d.line, d.chain, d.category, d.command
                ));
            }
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
