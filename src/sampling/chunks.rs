//! Run the external sampler in parallel chunks.
//!
//! The sampler splits its parameter hypercube into `--tot` chunks and processes
//! chunk `--id`, appending results to `<id>.acquisition_external_product`. We
//! start one process per chunk on a pool of exactly `chunks` workers and wait
//! for all of them before returning. A failing chunk is recorded with its
//! captured output; it never cancels its siblings.

use std::path::Path;
use std::process::Command;

use chrono::{Duration, Local};
use rayon::prelude::*;

use crate::domain::SamplingConfig;
use crate::error::{AppError, NoiseError};

/// Default sampler invocation (the sampling crate, built natively).
pub const DEFAULT_SAMPLER_COMMAND: &str =
    "RUSTFLAGS=\"-C target-cpu=native -Awarnings\" cargo run --quiet --release --";

/// Result of one sampler process.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub id: usize,
    /// Exit code, `None` if the process was killed by a signal or never started.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ChunkOutcome {
    /// Failure as a domain error, if this chunk failed.
    pub fn failure(&self) -> Option<NoiseError> {
        if self.success {
            return None;
        }
        Some(NoiseError::ExternalProcessFailure {
            chunk: self.id,
            status: match self.status {
                Some(code) => format!("exit code {code}"),
                None => "no exit code".to_string(),
            },
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Summary of a full sampling run.
#[derive(Debug, Clone)]
pub struct SamplingReport {
    pub requested: usize,
    pub outcomes: Vec<ChunkOutcome>,
}

impl SamplingReport {
    pub fn failures(&self) -> Vec<NoiseError> {
        self.outcomes.iter().filter_map(ChunkOutcome::failure).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }
}

/// Shell command line for chunk `id`.
pub fn chunk_command_line(config: &SamplingConfig, id: usize) -> String {
    let mut line = format!("{} --tot {} --id {id}", config.command, config.chunks);
    for arg in &config.extra_args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Format a duration as `h:m:s`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{}:{}:{}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn run_chunk(config: &SamplingConfig, id: usize, working_dir: &Path) -> ChunkOutcome {
    let line = chunk_command_line(config, id);
    let start = Local::now();
    log::info!("External product sampling chunk #{id} starting");
    log::debug!("Chunk #{id} command: {line}");

    let output = Command::new("sh").arg("-c").arg(&line).current_dir(working_dir).output();
    let elapsed = Local::now().signed_duration_since(start);

    let outcome = match output {
        Ok(output) => ChunkOutcome {
            id,
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            elapsed,
        },
        Err(e) => ChunkOutcome {
            id,
            status: None,
            success: false,
            stdout: String::new(),
            stderr: format!("failed to start sampler: {e}"),
            elapsed,
        },
    };

    if outcome.success {
        log::info!(
            "External product sampling chunk #{id} successfully done in {}",
            format_elapsed(elapsed)
        );
    } else {
        log::error!(
            "External product sampling chunk #{id} failed after {}\nSTDOUT: {}\nSTDERR: {}",
            format_elapsed(elapsed),
            outcome.stdout.trim(),
            outcome.stderr.trim()
        );
    }
    outcome
}

/// Run every chunk and wait for all of them.
pub fn run_sampling(config: &SamplingConfig, working_dir: &Path) -> Result<SamplingReport, AppError> {
    if config.chunks == 0 {
        return Err(AppError::new(2, "Number of chunks must be > 0."));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.chunks)
        .thread_name(|i| format!("sampling-chunk-{i}"))
        .build()
        .map_err(|e| AppError::new(2, format!("Failed to start sampling workers: {e}")))?;

    let mut outcomes: Vec<ChunkOutcome> = pool.install(|| {
        (0..config.chunks)
            .into_par_iter()
            .map(|id| run_chunk(config, id, working_dir))
            .collect()
    });
    outcomes.sort_by_key(|o| o.id);

    let report = SamplingReport {
        requested: config.chunks,
        outcomes,
    };
    let failed = report.outcomes.len() - report.succeeded();
    if failed > 0 {
        log::warn!("{failed} of {} sampling chunk(s) failed", config.chunks);
    }
    Ok(report)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config(command: &str, chunks: usize) -> SamplingConfig {
        SamplingConfig {
            chunks,
            command: command.to_string(),
            extra_args: vec!["--repetitions".to_string(), "3".to_string()],
        }
    }

    #[test]
    fn command_line_appends_chunk_arguments() {
        let line = chunk_command_line(&config("sampler", 4), 2);
        assert_eq!(line, "sampler --tot 4 --id 2 --repetitions 3");
    }

    #[test]
    fn every_chunk_runs_and_writes_its_file() {
        let dir = tempfile::tempdir().unwrap();
        // `$4` is the chunk id: `--tot N --id <id> ...`.
        let cmd = r#"f() { echo "$4, $2" > "$4.acquisition_external_product"; }; f"#;
        let report = run_sampling(&config(cmd, 3), dir.path()).unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.succeeded(), 3);
        for id in 0..3 {
            let content = std::fs::read_to_string(dir.path().join(format!("{id}.acquisition_external_product"))).unwrap();
            assert_eq!(content.trim(), format!("{id}, 3"));
        }
    }

    #[test]
    fn failures_are_captured_without_cancelling_siblings() {
        let dir = tempfile::tempdir().unwrap();
        // Chunk 1 fails, the others succeed.
        let cmd = r#"f() { if [ "$4" = 1 ]; then echo boom >&2; exit 7; fi; touch "$4.ok"; }; f"#;
        let report = run_sampling(&config(cmd, 3), dir.path()).unwrap();

        assert_eq!(report.succeeded(), 2);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        match &failures[0] {
            NoiseError::ExternalProcessFailure { chunk, status, stderr } => {
                assert_eq!(*chunk, 1);
                assert_eq!(status, "exit code 7");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected failure {other:?}"),
        }
        assert!(dir.path().join("0.ok").exists());
        assert!(dir.path().join("2.ok").exists());
    }

    #[test]
    fn zero_chunks_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_sampling(&config("true", 0), dir.path()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::seconds(3725)), "1:2:5");
    }
}
