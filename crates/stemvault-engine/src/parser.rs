//! External project-parser invocation
//!
//! The parser turns a native project upload into the canonical snapshot
//! document. It runs as a child process under the configured timeout; an
//! overrun kills the child and fails the operation.

#![allow(clippy::result_large_err)]

use crate::config::ParserConfig;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use stemvault_core::errors::{ExError, Result, VaultError};
use stemvault_core::{log_op_end, log_op_error, log_op_start, ProjectSnapshot, SNAPSHOT_FILE_NAME};
use tokio::process::Command;

const STDERR_EXCERPT_CHARS: usize = 400;

fn parser_failed(reason: impl Into<String>) -> ExError {
    ExError::from(VaultError::ParserFailed {
        reason: reason.into(),
    })
    .with_op("run_parser")
}

fn excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    match trimmed.char_indices().nth(STDERR_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

/// Run the parser on `input_dir`, writing into `output_dir`, and return the
/// validated snapshot bytes it produced.
///
/// # Errors
///
/// - `ParseTimeout` when the parser outlives `timeout_secs` (it is killed)
/// - `ParserFailure` when it cannot start, exits non-zero, or leaves no
///   valid snapshot behind
pub async fn run_parser(
    config: &ParserConfig,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<u8>> {
    log_op_start!("run_parser", command = %config.command);
    let start = Instant::now();

    let result = run_parser_impl(config, input_dir, output_dir)
        .await
        .map_err(|e| {
            log_op_error!(
                "run_parser",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

    log_op_end!(
        "run_parser",
        duration_ms = start.elapsed().as_millis() as u64,
        snapshot_bytes = result.len()
    );
    Ok(result)
}

async fn run_parser_impl(
    config: &ParserConfig,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<Vec<u8>> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| parser_failed(format!("cannot create output dir: {}", e)))?;

    let child = Command::new(&config.command)
        .args(&config.args)
        .arg(input_dir)
        .arg(output_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| parser_failed(format!("cannot start {}: {}", config.command, e)))?;

    let output = tokio::time::timeout(
        Duration::from_secs(config.timeout_secs),
        child.wait_with_output(),
    )
    .await
    .map_err(|_| {
        ExError::from(VaultError::ParseTimeout {
            timeout_secs: config.timeout_secs,
        })
        .with_op("run_parser")
    })?
    .map_err(|e| parser_failed(format!("waiting for parser: {}", e)))?;

    if !output.stderr.is_empty() {
        tracing::debug!(stderr = %excerpt(&output.stderr), "Parser stderr");
    }
    if !output.status.success() {
        return Err(parser_failed(format!(
            "{}: {}",
            output.status,
            excerpt(&output.stderr)
        )));
    }

    let snapshot_path = output_dir.join(SNAPSHOT_FILE_NAME);
    let bytes = tokio::fs::read(&snapshot_path)
        .await
        .map_err(|e| parser_failed(format!("no {} produced: {}", SNAPSHOT_FILE_NAME, e)))?;

    ProjectSnapshot::from_slice(&bytes).map_err(|e| {
        parser_failed(format!("invalid snapshot produced: {}", e.message())).with_source(e)
    })?;

    Ok(bytes)
}
