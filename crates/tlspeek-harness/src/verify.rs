//! Verification results and the report built from them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::structured_log::now_utc;

/// Result of verifying a single scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Name of the scenario.
    pub case_name: String,
    /// Whether the outcome and (when pinned) the read sequence matched.
    pub passed: bool,
    /// Expected outcome, `0x...` or an error kind name.
    pub expected: String,
    /// Actual outcome, same format as `expected`.
    pub actual: String,
    /// Addresses read, in order.
    pub reads: Vec<String>,
    /// Trace event names emitted during the resolution.
    pub trace: Vec<String>,
    /// What differed, if the case failed.
    pub diff: Option<String>,
}

/// A verification run over one fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Fixture path as given on the command line.
    pub fixture: String,
    /// SHA-256 of the fixture bytes, hex encoded.
    pub fixture_sha256: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<VerificationResult>,
}

impl VerificationReport {
    /// Build a report from the fixture bytes and the per-case results.
    #[must_use]
    pub fn new(fixture: impl Into<String>, fixture_bytes: &[u8], results: Vec<VerificationResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            fixture: fixture.into(),
            fixture_sha256: sha256_hex(fixture_bytes),
            timestamp: now_utc(),
            total,
            passed,
            failed: total - passed,
            results,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# tlspeek fixture verification\n\n");
        out.push_str(&format!("- Fixture: {}\n", self.fixture));
        out.push_str(&format!("- SHA-256: {}\n", self.fixture_sha256));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Total: {}\n", self.total));
        out.push_str(&format!("- Passed: {}\n", self.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.failed));

        out.push_str("| Case | Expected | Actual | Status |\n");
        out.push_str("|------|----------|--------|--------|\n");
        for r in &self.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                r.case_name, r.expected, r.actual, status
            ));
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
