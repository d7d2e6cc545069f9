use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::os::OsDetector;
use crate::report::{FileReporter, ReportError, Reporter, ScanReport};
use crate::scanner::{ScanError, ScanOutcome, Scanner};
use crate::validate::ScanTarget;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("failed to save reports to {}: {source}", dir.display())]
    Report {
        dir: PathBuf,
        #[source]
        source: ReportError,
    },
}

#[derive(Debug)]
pub enum AuditOutcome {
    /// Scan finished and the report was printed and written to disk.
    Reported {
        report: ScanReport,
        written: Vec<PathBuf>,
    },
    /// Cancelled before the report was written. Nothing was saved.
    Interrupted,
}

/// Scan `target`, fingerprint the OS and write the report into `output_dir`.
///
/// `cancel` is honoured up to the moment the report files are created: a
/// cancelled scan or a cancel during OS detection returns `Interrupted`
/// without touching `output_dir`.
pub async fn run_audit(
    scanner: &Scanner,
    target: &ScanTarget,
    worker_count: usize,
    detector: &dyn OsDetector,
    output_dir: &Path,
    cancel: CancellationToken,
) -> Result<AuditOutcome, AuditError> {
    let began = Instant::now();
    let results = match scanner.scan(target, worker_count, cancel.clone()).await? {
        ScanOutcome::Completed(results) => results,
        ScanOutcome::Interrupted { .. } => return Ok(AuditOutcome::Interrupted),
    };
    println!(
        "\n\nScan completed! ({} ports in {:.2}s)",
        results.scanned_done,
        began.elapsed().as_secs_f64()
    );

    let os_guess = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("interrupted during OS detection");
            return Ok(AuditOutcome::Interrupted);
        }
        guess = detector.detect_os(target.address()) => guess,
    };

    let report = ScanReport::build(results.target, results.open_ports, os_guess);
    if cancel.is_cancelled() {
        return Ok(AuditOutcome::Interrupted);
    }
    let written = FileReporter::new(output_dir)
        .generate_report(&report)
        .map_err(|source| AuditError::Report {
            dir: output_dir.to_path_buf(),
            source,
        })?;
    Ok(AuditOutcome::Reported { report, written })
}
