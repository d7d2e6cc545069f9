use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use time::{format_description, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::info;

use port_audit::audit::{run_audit, AuditOutcome};
use port_audit::logging;
use port_audit::os::{HttpOsDetector, OsDetector, SkipOsDetection};
use port_audit::scanner::{ConsoleProgress, ScanConfig, Scanner};
use port_audit::validate::ScanTarget;

/// port-audit: concurrent TCP port scanner with banner grabbing and a static weakness report.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-audit",
    version,
    about = "Concurrent TCP port scanner with service identification and a security report.",
    long_about = None,
    allow_negative_numbers = true
)]
struct Cli {
    /// Target IPv4 or IPv6 address (no hostnames).
    target: String,

    /// First port of the inclusive range.
    #[arg(short, long, default_value_t = 1)]
    start: i64,

    /// Last port of the inclusive range.
    #[arg(short, long, default_value_t = 1024)]
    end: i64,

    /// Number of concurrent workers.
    #[arg(short, long, default_value_t = 100)]
    threads: usize,

    /// Connect timeout per port in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Banner grab timeout in milliseconds.
    #[arg(long = "banner-timeout-ms", default_value_t = 2000)]
    banner_timeout_ms: u64,

    /// Directory for security_report.json / security_report.csv.
    #[arg(short, long = "output-dir", default_value = "reports")]
    output_dir: PathBuf,

    /// Also write logs to security_scan.log in the output directory.
    #[arg(long = "log-file", default_value_t = false)]
    log_file: bool,

    /// Skip the HTTP-based OS fingerprint.
    #[arg(long = "no-os-detect", default_value_t = false)]
    no_os_detect: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.log_file.then_some(cli.output_dir.as_path());
    if let Err(e) = logging::init_logging(cli.verbose, log_dir) {
        eprintln!("Warning: logging disabled: {e:#}");
    }

    let target = ScanTarget::new(&cli.target, cli.start, cli.end).map_err(|e| anyhow!(e))?;
    let config = ScanConfig {
        probe_timeout: Duration::from_millis(cli.timeout_ms),
        banner_timeout: Duration::from_millis(cli.banner_timeout_ms),
        grab_banners: true,
    };
    info!(
        target = %target.address(),
        start = target.start_port(),
        end = target.end_port(),
        threads = cli.threads,
        timeout_ms = cli.timeout_ms,
        banner_timeout_ms = cli.banner_timeout_ms,
        output_dir = %cli.output_dir.display(),
        "configuration"
    );

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    println!("\nStarting scan on {}", target.address());
    println!("Time started: {}\n", started_at());

    let scanner = Scanner::new(config).with_progress(Arc::new(ConsoleProgress));
    let detector: Box<dyn OsDetector> = if cli.no_os_detect {
        Box::new(SkipOsDetection)
    } else {
        Box::new(HttpOsDetector::default())
    };
    let outcome = run_audit(
        &scanner,
        &target,
        cli.threads,
        detector.as_ref(),
        &cli.output_dir,
        cancel,
    )
    .await?;

    match outcome {
        AuditOutcome::Reported { written, .. } => {
            for path in &written {
                println!("Saved {}", path.display());
            }
        }
        AuditOutcome::Interrupted => println!("\nScan interrupted by user. Exiting..."),
    }
    Ok(())
}

fn started_at() -> String {
    let now = OffsetDateTime::now_utc();
    format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second] UTC")
        .ok()
        .and_then(|fmt| now.format(&fmt).ok())
        .unwrap_or_else(|| now.to_string())
}
