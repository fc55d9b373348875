//! STRATA command line entry point
//!
//! Reads one JSON document per line from stdin. By default each line is a
//! package submitted to the debounced dispatch queue and every flush report
//! is printed as it completes. With `--batch` each line is a batch request
//! applied immediately. Envelopes go to stdout, logs to stderr.

use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use strata_core::{
    BatchRequest, ConfigError, Envelope, Package, RandomIdGenerator, StorageError, StrataConfig,
    StrataResult,
};
use strata_storage::Database;
use strata_tools::telemetry::{init_tracing, TelemetryConfig};
use strata_tools::{BatchCoordinator, DispatchQueue, ToolRegistry};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Queue,
    Batch,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing(&TelemetryConfig::from_env()) {
        eprintln!("failed to initialize logging: {}", e);
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "strata exited with an error");
            eprintln!("strata: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_mode() -> StrataResult<Mode> {
    let mut mode = Mode::Queue;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--batch" => mode = Mode::Batch,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "argument".to_string(),
                    value: other.to_string(),
                    reason: "expected no arguments or --batch".to_string(),
                }
                .into())
            }
        }
    }
    Ok(mode)
}

async fn run() -> StrataResult<()> {
    let mode = parse_mode()?;
    let config = StrataConfig::from_env()?;
    let db = Arc::new(Database::open(&config)?);
    let registry = Arc::new(ToolRegistry::standard(Arc::new(RandomIdGenerator)));
    tracing::info!(
        mode = ?mode,
        tables = db.catalog().data_tables().count(),
        "STRATA ready"
    );

    let lines = BufReader::new(tokio::io::stdin()).lines();
    match mode {
        Mode::Batch => run_batch(lines, BatchCoordinator::new(db, registry)).await,
        Mode::Queue => run_queue(lines, DispatchQueue::new(db, registry, config.dispatch)).await,
    }
}

async fn next_line(lines: &mut Lines<BufReader<Stdin>>) -> StrataResult<Option<String>> {
    Ok(lines.next_line().await.map_err(|e| ConfigError::Io {
        path: "stdin".to_string(),
        reason: e.to_string(),
    })?)
}

fn emit<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}

async fn run_batch(
    mut lines: Lines<BufReader<Stdin>>,
    coordinator: BatchCoordinator,
) -> StrataResult<()> {
    while let Some(line) = next_line(&mut lines).await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: BatchRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                emit(&Envelope::failed(format!("invalid batch request: {}", e)));
                continue;
            }
        };
        let coordinator = coordinator.clone();
        let envelope = tokio::task::spawn_blocking(move || coordinator.handle_batch(&request))
            .await
            .map_err(|e| StorageError::TaskFailed {
                reason: e.to_string(),
            })??;
        emit(&envelope);
    }
    Ok(())
}

async fn run_queue(mut lines: Lines<BufReader<Stdin>>, queue: DispatchQueue) -> StrataResult<()> {
    let mut reports = queue.subscribe();

    loop {
        tokio::select! {
            line = next_line(&mut lines) => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Package>(&line) {
                    Ok(package) => {
                        queue.submit(package)?;
                    }
                    Err(e) => emit(&Envelope::failed(format!("invalid package: {}", e))),
                }
            }
            report = reports.recv() => match report {
                Ok(report) => emit(&report),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Flush reports dropped before printing");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    queue.shutdown().await?;
    while let Ok(report) = reports.try_recv() {
        emit(&report);
    }
    Ok(())
}
