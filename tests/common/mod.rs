#![allow(dead_code)]

use async_trait::async_trait;
use port_audit::probe::PortProbe;
use port_audit::scanner::{ProgressSink, ProgressUpdate, ScanPhase};
use port_audit::service::{self, ServiceDetector};
use port_audit::types::ProbeState;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory probe: reports `open` ports as open and counts every call.
pub struct CountingProbe {
    open: HashSet<u16>,
    delay: Duration,
    calls: Mutex<HashMap<u16, u32>>,
}

impl CountingProbe {
    pub fn new(open: impl IntoIterator<Item = u16>) -> Self {
        Self::with_delay(open, Duration::ZERO)
    }

    pub fn with_delay(open: impl IntoIterator<Item = u16>, delay: Duration) -> Self {
        Self {
            open: open.into_iter().collect(),
            delay,
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> HashMap<u16, u32> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PortProbe for CountingProbe {
    async fn probe(&self, _target: IpAddr, port: u16, _timeout: Duration) -> ProbeState {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        *self.calls.lock().unwrap().entry(port).or_default() += 1;
        if self.open.contains(&port) {
            ProbeState::Open
        } else {
            ProbeState::Closed
        }
    }
}

/// Real name table, canned banner, no network.
pub struct CannedServices;

#[async_trait]
impl ServiceDetector for CannedServices {
    fn service_name(&self, port: u16) -> String {
        service::service_name(port).to_string()
    }

    async fn banner(&self, _target: IpAddr, port: u16, _timeout: Duration) -> String {
        format!("banner-{port}")
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub phases: Mutex<Vec<ScanPhase>>,
    pub updates: Mutex<Vec<ProgressUpdate>>,
}

impl ProgressSink for RecordingSink {
    fn on_phase(&self, phase: ScanPhase) {
        self.phases.lock().unwrap().push(phase);
    }

    fn on_progress(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
