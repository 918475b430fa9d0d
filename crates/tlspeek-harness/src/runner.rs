//! Scenario execution engine.

use tlspeek_core::{MemorySink, ResolveError, TraceFilter, TraceSink, Tracer, pthread_getspecific_remote};
use tlspeek_membrane::RecordingReader;

use crate::fixtures::{FixtureError, ScenarioCase, ScenarioSet};
use crate::stats::OutcomeStats;
use crate::structured_log::{JsonlSink, LogEntry, LogLevel, Outcome};
use crate::verify::VerificationResult;

/// Replays scenarios against their snapshot images.
#[derive(Debug, Default)]
pub struct ScenarioRunner<'s> {
    log: Option<&'s JsonlSink>,
    filter: TraceFilter,
    stats: OutcomeStats,
}

impl<'s> ScenarioRunner<'s> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also forward trace records passing `filter` to `log`, plus one
    /// summary entry per case.
    #[must_use]
    pub fn with_log(log: &'s JsonlSink, filter: TraceFilter) -> Self {
        Self {
            log: Some(log),
            filter,
            stats: OutcomeStats::new(),
        }
    }

    /// Outcome counters across every case run so far.
    #[must_use]
    pub fn stats(&self) -> &OutcomeStats {
        &self.stats
    }

    /// Run all scenarios in a set. Stops at the first case that cannot be
    /// decoded.
    pub fn run(&self, set: &ScenarioSet) -> Result<Vec<VerificationResult>, FixtureError> {
        set.cases.iter().map(|case| self.run_case(case)).collect()
    }

    pub fn run_case(&self, case: &ScenarioCase) -> Result<VerificationResult, FixtureError> {
        let prepared = case.prepare()?;
        let reader = RecordingReader::new(prepared.memory);
        let sink = MemorySink::new();
        let actual = pthread_getspecific_remote(
            &reader,
            &prepared.task,
            &prepared.libc,
            prepared.key,
            &Tracer::new(&sink, TraceFilter::Debug),
        );
        self.stats.observe(&actual);

        let records = sink.take();
        let trace: Vec<String> = records.iter().map(|r| r.event.to_string()).collect();
        let addresses = reader.addresses();

        let expected = match prepared.expect {
            Ok(v) => format!("{v:#x}"),
            Err(kind) => kind.as_str().to_string(),
        };
        let actual_str = render_outcome(&actual);
        let outcome_ok = match (prepared.expect, &actual) {
            (Ok(want), Ok(got)) => want == *got,
            (Err(kind), Err(err)) => kind == err.kind(),
            _ => false,
        };

        let mut diffs = Vec::new();
        if !outcome_ok {
            diffs.push(format!("outcome: expected {expected}, got {actual_str}"));
        }
        if let Some(want) = &case.expected_reads {
            let want: Vec<u64> = want.iter().map(|h| h.0).collect();
            if want != addresses {
                diffs.push(format!(
                    "reads: expected {}, got {}",
                    join_hex(&want),
                    join_hex(&addresses)
                ));
            }
        }
        let passed = diffs.is_empty();

        if let Some(log) = self.log {
            log.set_case(&case.name);
            for record in records {
                if self.filter.allows(record.level) {
                    log.record(record);
                }
            }
            let level = if passed { LogLevel::Info } else { LogLevel::Warn };
            let outcome = if passed { Outcome::Pass } else { Outcome::Fail };
            log.emit_entry(
                LogEntry::new("", level, "verify.case")
                    .with_case(&case.name)
                    .with_outcome(outcome)
                    .with_details(serde_json::json!({
                        "expected": expected,
                        "actual": actual_str,
                        "reads": addresses.len(),
                    })),
            )?;
        }

        Ok(VerificationResult {
            case_name: case.name.clone(),
            passed,
            expected,
            actual: actual_str,
            reads: addresses.iter().map(|a| format!("{a:#x}")).collect(),
            trace,
            diff: (!passed).then(|| diffs.join("\n")),
        })
    }
}

/// `0x...` for a value, the error kind name otherwise.
#[must_use]
pub fn render_outcome(result: &Result<u64, ResolveError>) -> String {
    match result {
        Ok(v) => format!("{v:#x}"),
        Err(e) => e.kind().as_str().to_string(),
    }
}

fn join_hex(addrs: &[u64]) -> String {
    let parts: Vec<String> = addrs.iter().map(|a| format!("{a:#x}")).collect();
    format!("[{}]", parts.join(", "))
}
