//! Concurrent per-descriptor check execution for one scanner cycle.
//!
//! Host probes are slow and individually unreliable, so every descriptor
//! gets its own task, the fan-out is bounded by the scanner's worker
//! permits, and the whole cycle is bounded by the scanner's budget.
//! Checks still running at the deadline are aborted and abandoned.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use drover_id::{CycleSeq, DescriptorId};
use futures_util::FutureExt;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use super::Scanner;
use crate::network::Network;

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle number, starting at 1.
    pub cycle: CycleSeq,
    /// Checks submitted.
    pub total: usize,
    /// Checks that returned `Ok`.
    pub succeeded: usize,
    /// Checks skipped because the scanner was disabled when they started.
    pub skipped: usize,
    /// Checks that returned an error or panicked.
    pub failed: usize,
    /// Checks abandoned at the deadline.
    pub timed_out: usize,
    /// Wall time spent on checks.
    pub elapsed: Duration,
}

impl CycleReport {
    /// True when every submitted check finished inside the budget.
    pub fn completed_in_time(&self) -> bool {
        self.timed_out == 0
    }
}

enum CheckOutcome {
    Done,
    Skipped,
    Failed(anyhow::Error),
    Panicked(String),
}

/// Run one full cycle of `scanner` over `network`.
///
/// Never fails: check errors and panics are logged and counted. After the
/// checks, [`Scanner::cycle_finished`] runs, then the scanner waits for its
/// `sync_with` dependencies and releases its own gate.
#[instrument(
    skip_all,
    fields(scanner = scanner.name(), scanner_id = %scanner.id())
)]
pub async fn run_cycle(scanner: &Arc<dyn Scanner>, network: &Network) -> CycleReport {
    let started = Instant::now();
    let deadline = started + scanner.scan_timeout();

    let mut checks = JoinSet::new();
    for descriptor in network.descriptors() {
        let scanner = Arc::clone(scanner);
        let network = network.clone();
        let workers = scanner.core().workers();

        checks.spawn(async move {
            let id = descriptor.id();
            // The semaphore is owned by the scanner and never closed.
            let _permit = workers.acquire_owned().await.ok();

            if !scanner.is_enabled() {
                return (id, CheckOutcome::Skipped);
            }

            let outcome = AssertUnwindSafe(scanner.check(&network, &descriptor))
                .catch_unwind()
                .await;

            let outcome = match outcome {
                Ok(Ok(())) => CheckOutcome::Done,
                Ok(Err(e)) => CheckOutcome::Failed(e),
                Err(panic) => CheckOutcome::Panicked(panic_message(panic.as_ref())),
            };
            (id, outcome)
        });
    }

    let mut report = CycleReport {
        total: checks.len(),
        ..Default::default()
    };

    loop {
        match tokio::time::timeout_at(deadline, checks.join_next()).await {
            Ok(Some(joined)) => record(&mut report, joined),
            Ok(None) => break,
            Err(_) => {
                abandon_pending(&mut report, &mut checks);
                warn!(
                    pending = report.timed_out,
                    budget_ms = scanner.scan_timeout().as_millis() as u64,
                    "Cycle budget exhausted, abandoning pending checks"
                );
                break;
            }
        }
    }
    report.elapsed = started.elapsed();

    scanner.cycle_finished(&report).await;
    report.cycle = scanner.core().finish_cycle().await;

    debug!(
        cycle = %report.cycle,
        total = report.total,
        succeeded = report.succeeded,
        skipped = report.skipped,
        failed = report.failed,
        timed_out = report.timed_out,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Cycle complete"
    );

    report
}

/// Tally checks that finished but were not joined yet, then abort and count
/// the rest as timed out.
fn abandon_pending(report: &mut CycleReport, checks: &mut JoinSet<(DescriptorId, CheckOutcome)>) {
    while let Some(joined) = checks.try_join_next() {
        record(report, joined);
    }
    report.timed_out = checks.len();
    checks.abort_all();
}

fn record(report: &mut CycleReport, joined: Result<(DescriptorId, CheckOutcome), JoinError>) {
    match joined {
        Ok((id, outcome)) => tally(report, id, outcome),
        Err(join_error) => {
            // Only cancellation reaches here; panics are caught in the task.
            debug!(error = %join_error, "Check task cancelled");
            report.failed += 1;
        }
    }
}

fn tally(report: &mut CycleReport, id: DescriptorId, outcome: CheckOutcome) {
    match outcome {
        CheckOutcome::Done => report.succeeded += 1,
        CheckOutcome::Skipped => report.skipped += 1,
        CheckOutcome::Failed(e) => {
            warn!(descriptor_id = %id, error = %e, "Check failed");
            report.failed += 1;
        }
        CheckOutcome::Panicked(message) => {
            error!(descriptor_id = %id, panic = %message, "Check panicked");
            report.failed += 1;
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
