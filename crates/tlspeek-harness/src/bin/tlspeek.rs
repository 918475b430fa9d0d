//! CLI entrypoint for tlspeek.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tlspeek_core::trace::trace_filter;
use tlspeek_core::{LibcVariant, LibraryDescriptor, TlsKey};
use tlspeek_harness::fixtures::{HexU64, ScenarioSet};
use tlspeek_harness::runner::ScenarioRunner;
use tlspeek_harness::structured_log::{JsonlSink, LogEmitter};
use tlspeek_harness::verify::VerificationReport;

/// Read `pthread_getspecific` values of threads you cannot run code in.
#[derive(Debug, Parser)]
#[command(name = "tlspeek")]
#[command(about = "Resolve thread-specific values from outside the thread")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve a key for threads of a running process.
    Resolve {
        /// Target process id.
        #[arg(long)]
        pid: i32,
        /// Single thread to resolve (defaults to the main thread).
        #[arg(long, conflicts_with = "all_threads")]
        tid: Option<i32>,
        /// Resolve every thread of the process.
        #[arg(long)]
        all_threads: bool,
        /// C library of the target: glibc or musl.
        #[arg(long, value_parser = parse_variant)]
        variant: LibcVariant,
        /// Size of `struct pthread` (used on aarch64).
        #[arg(long, value_parser = parse_u64, default_value = "0")]
        pthread_size: u64,
        /// Offset of the key storage inside `struct pthread`.
        #[arg(long, value_parser = parse_u64)]
        specific_offset: u64,
        /// Key returned by `pthread_key_create`.
        #[arg(long, allow_hyphen_values = true)]
        key: i32,
        /// Structured JSONL trace output path.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Replay scenario fixtures against snapshot memory.
    Verify {
        /// Scenario fixture JSON file.
        #[arg(long)]
        fixture: PathBuf,
        /// Output report path (`.md` for markdown, JSON otherwise).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Structured JSONL trace output path.
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

fn parse_u64(s: &str) -> Result<u64, String> {
    HexU64::parse(s)
        .map(|h| h.0)
        .ok_or_else(|| format!("not an integer: {s:?}"))
}

fn parse_variant(s: &str) -> Result<LibcVariant, String> {
    LibcVariant::from_str_loose(s).ok_or_else(|| format!("unknown libc variant: {s:?}"))
}

fn open_log(path: Option<&Path>, run_id: &str) -> Result<Option<JsonlSink>, String> {
    path.map(|p| {
        LogEmitter::to_file(p, run_id)
            .map(JsonlSink::new)
            .map_err(|e| format!("failed to open log {}: {e}", p.display()))
    })
    .transpose()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Resolve {
            pid,
            tid,
            all_threads,
            variant,
            pthread_size,
            specific_offset,
            key,
            log,
        } => {
            let libc = LibraryDescriptor {
                variant,
                pthread_size,
                specific_block_offset: specific_offset,
            };
            let log = open_log(log.as_deref(), &format!("resolve-{pid}"))?;
            resolve(pid, tid, all_threads, &libc, TlsKey(key), log.as_ref())?;
            if let Some(log) = &log {
                log.flush()?;
            }
        }
        Command::Verify {
            fixture,
            report,
            log,
        } => {
            let bytes = std::fs::read(&fixture)
                .map_err(|e| format!("failed to read {}: {e}", fixture.display()))?;
            let set = ScenarioSet::from_json(&String::from_utf8_lossy(&bytes))?;
            let log = open_log(log.as_deref(), "verify")?;
            let runner = match &log {
                Some(sink) => ScenarioRunner::with_log(sink, trace_filter()),
                None => ScenarioRunner::new(),
            };
            let results = runner.run(&set)?;
            let summary =
                VerificationReport::new(fixture.display().to_string(), &bytes, results);

            for r in &summary.results {
                let status = if r.passed { "PASS" } else { "FAIL" };
                eprintln!("[{status}] {}", r.case_name);
                if let Some(diff) = &r.diff {
                    eprintln!("    {}", diff.replace('\n', "\n    "));
                }
            }
            eprintln!(
                "total={} passed={} failed={} sha256={}",
                summary.total, summary.passed, summary.failed, summary.fixture_sha256
            );

            if let Some(path) = report {
                let body = if path.extension().is_some_and(|e| e == "md") {
                    summary.to_markdown()
                } else {
                    summary.to_json()
                };
                std::fs::write(&path, body)?;
                eprintln!("Report written to {}", path.display());
            }
            if let Some(log) = &log {
                log.flush()?;
            }
            if !summary.all_passed() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn resolve(
    pid: i32,
    tid: Option<i32>,
    all_threads: bool,
    libc: &LibraryDescriptor,
    key: TlsKey,
    log: Option<&JsonlSink>,
) -> Result<(), Box<dyn std::error::Error>> {
    use tlspeek_core::{StderrSink, TraceSink};
    use tlspeek_harness::live::LiveResolver;

    let sink: &dyn TraceSink = match log {
        Some(sink) => sink,
        None => &StderrSink,
    };
    let resolver = LiveResolver::open(pid, sink)
        .map_err(|e| format!("failed to open process {pid}: {e}"))?;
    let tids = if all_threads {
        resolver.threads()?
    } else {
        vec![tid.unwrap_or(pid)]
    };
    for outcome in resolver.resolve_all(&tids, libc, key) {
        println!("{}", serde_json::to_string(&outcome)?);
    }

    let stats = resolver.stats().snapshot();
    let reads = resolver.read_metrics();
    eprintln!(
        "resolved={} invalid_key={} unsupported_key_range={} read_failure={} capture_failure={} reads={}/{}",
        stats.resolved,
        stats.invalid_key,
        stats.unsupported_key_range,
        stats.read_failure,
        stats.capture_failure,
        reads.succeeded,
        reads.attempted,
    );
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn resolve(
    _pid: i32,
    _tid: Option<i32>,
    _all_threads: bool,
    _libc: &LibraryDescriptor,
    _key: TlsKey,
    _log: Option<&JsonlSink>,
) -> Result<(), Box<dyn std::error::Error>> {
    Err("live resolution requires Linux".into())
}
