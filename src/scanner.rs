use std::io::Write;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::probe::{PortProbe, TcpConnectProbe};
use crate::service::{ServiceDetector, StandardServiceDetector};
use crate::types::{OpenPortRecord, ProbeResult, ResultCollection, ScanResults, ServiceInfo};
use crate::validate::{ScanTarget, TargetError};
use crate::vulns::{StaticVulnerabilityTable, VulnerabilityScanner};

/// Per-scan tunables.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    /// Bound on each connect probe.
    pub probe_timeout: Duration,
    /// Bound on each banner connect/read/write step.
    pub banner_timeout: Duration,
    /// When false, open ports get an empty banner and no follow-up connection.
    pub grab_banners: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(1),
            banner_timeout: Duration::from_secs(2),
            grab_banners: true,
        }
    }
}

/// Lifecycle of one scan.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Validating,
    Running,
    Draining,
    Completed,
    Failed,
    Interrupted,
}

/// Snapshot published after each finished port.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub completed: u64,
    pub total: u64,
}

impl ProgressUpdate {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.completed)
    }
}

/// Observer for scan lifecycle and progress. Called only from the coordinator.
pub trait ProgressSink: Send + Sync {
    fn on_phase(&self, _phase: ScanPhase) {}
    fn on_progress(&self, update: ProgressUpdate);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _update: ProgressUpdate) {}
}

/// Rewrites a single progress line on stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn on_progress(&self, update: ProgressUpdate) {
        let mut out = std::io::stdout().lock();
        let _ = write!(
            out,
            "\rProgress: {:.1}% - Ports remaining: {}",
            update.percent(),
            update.remaining()
        );
        let _ = out.flush();
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    InvalidTarget(#[from] TargetError),
    #[error("scan worker failed: {0}")]
    WorkerFailed(String),
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Completed(ScanResults),
    /// Cancelled before every port was processed; partial results are discarded.
    Interrupted { scanned_done: u64, scanned_total: u64 },
}

/// Hands out each port of the range exactly once.
#[derive(Debug)]
struct PortQueue {
    next: AtomicU32,
    end: u32,
}

impl PortQueue {
    fn new(target: &ScanTarget) -> Self {
        Self {
            next: AtomicU32::new(u32::from(target.start_port())),
            end: u32::from(target.end_port()),
        }
    }

    fn claim(&self) -> Option<u16> {
        let port = self.next.fetch_add(1, Ordering::Relaxed);
        // Lossless: port <= end <= u16::MAX.
        (port <= self.end).then(|| port as u16)
    }

    fn is_exhausted(&self) -> bool {
        self.next.load(Ordering::Relaxed) > self.end
    }
}

/// What a worker sends back for each port it finishes.
#[derive(Debug)]
struct PortDone {
    result: ProbeResult,
    record: Option<OpenPortRecord>,
}

/// Bounded worker pool over a port range.
///
/// Workers claim ports from a shared cursor, probe them, enrich open ports
/// with service and weakness data, and send one message per port back to the
/// coordinator. The coordinator owns the result collection and is the only
/// publisher of progress. Each call to [`Scanner::run`] or [`Scanner::scan`]
/// owns its own queue and collection, so independent scans can share one
/// `Scanner`.
#[derive(Clone)]
pub struct Scanner {
    config: ScanConfig,
    probe: Arc<dyn PortProbe>,
    services: Arc<dyn ServiceDetector>,
    vulns: Arc<dyn VulnerabilityScanner>,
    progress: Arc<dyn ProgressSink>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            probe: Arc::new(TcpConnectProbe),
            services: Arc::new(StandardServiceDetector),
            vulns: Arc::new(StaticVulnerabilityTable),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_service_detector(mut self, services: Arc<dyn ServiceDetector>) -> Self {
        self.services = services;
        self
    }

    pub fn with_vulnerability_scanner(mut self, vulns: Arc<dyn VulnerabilityScanner>) -> Self {
        self.vulns = vulns;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Validate raw inputs, then scan. Invalid input fails before any socket is opened.
    pub async fn run(
        &self,
        address: &str,
        start: i64,
        end: i64,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        self.set_phase(ScanPhase::Idle);
        self.set_phase(ScanPhase::Validating);
        let target = match ScanTarget::new(address, start, end) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "rejecting scan input");
                self.set_phase(ScanPhase::Failed);
                return Err(e.into());
            }
        };
        self.scan(&target, worker_count, cancel).await
    }

    /// Scan an already validated target with `min(worker_count, ports)` workers.
    pub async fn scan(
        &self,
        target: &ScanTarget,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        let total = target.port_count();
        let workers = (worker_count.max(1) as u64).min(total) as usize;
        let addr = target.address();
        info!(
            target = %addr,
            start = target.start_port(),
            end = target.end_port(),
            workers,
            "starting scan"
        );

        let queue = Arc::new(PortQueue::new(target));
        let (tx, mut rx) = mpsc::channel::<PortDone>(workers * 2);
        let mut pool = JoinSet::new();
        self.set_phase(ScanPhase::Running);
        for _ in 0..workers {
            let scanner = self.clone();
            let queue = queue.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            pool.spawn(async move { scanner.worker(addr, queue, tx, cancel).await });
        }
        // Workers hold the remaining senders; the channel closes once they all return.
        drop(tx);

        let mut collection = ResultCollection::default();
        let mut completed = 0u64;
        let mut draining = false;
        let mut interrupted = false;

        loop {
            let done = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(done) => done,
                    None => break,
                },
            };

            completed += 1;
            debug!(port = done.result.port, state = %done.result.state, "port finished");
            if let Some(record) = done.record {
                if !collection.insert(record) {
                    warn!(port = done.result.port, "duplicate open-port record ignored");
                }
            }
            self.progress.on_progress(ProgressUpdate { completed, total });

            if !draining && queue.is_exhausted() {
                draining = true;
                self.set_phase(ScanPhase::Draining);
            }
        }

        if interrupted {
            pool.abort_all();
            while pool.join_next().await.is_some() {}
            info!(completed, total, "scan interrupted");
            self.set_phase(ScanPhase::Interrupted);
            return Ok(ScanOutcome::Interrupted {
                scanned_done: completed,
                scanned_total: total,
            });
        }

        if !draining {
            self.set_phase(ScanPhase::Draining);
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                self.set_phase(ScanPhase::Failed);
                return Err(ScanError::WorkerFailed(e.to_string()));
            }
        }

        let open_ports = collection.into_sorted_vec();
        info!(open = open_ports.len(), scanned = completed, "scan completed");
        self.set_phase(ScanPhase::Completed);
        Ok(ScanOutcome::Completed(ScanResults {
            target: target.clone(),
            scanned_total: total,
            scanned_done: completed,
            open_ports,
        }))
    }

    async fn worker(
        &self,
        addr: IpAddr,
        queue: Arc<PortQueue>,
        tx: mpsc::Sender<PortDone>,
        cancel: CancellationToken,
    ) {
        while !cancel.is_cancelled() {
            let Some(port) = queue.claim() else { break };
            let done = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                done = self.inspect_port(addr, port) => done,
            };
            if tx.send(done).await.is_err() {
                break;
            }
        }
    }

    /// Probe one port and, if it is open, identify the service and its weaknesses.
    async fn inspect_port(&self, addr: IpAddr, port: u16) -> PortDone {
        let state = self.probe.probe(addr, port, self.config.probe_timeout).await;
        let result = ProbeResult { port, state };
        if !state.is_open() {
            return PortDone {
                result,
                record: None,
            };
        }

        let service_name = self.services.service_name(port);
        let banner = if self.config.grab_banners {
            self.services
                .banner(addr, port, self.config.banner_timeout)
                .await
        } else {
            String::new()
        };
        let vulnerabilities = self.vulns.check_vulnerabilities(port, &service_name);
        info!(port, service = %service_name, "open port");

        PortDone {
            result,
            record: Some(OpenPortRecord {
                port,
                service: ServiceInfo {
                    service_name,
                    banner,
                },
                vulnerabilities,
            }),
        }
    }

    fn set_phase(&self, phase: ScanPhase) {
        debug!(?phase, "scan phase");
        self.progress.on_phase(phase);
    }
}
