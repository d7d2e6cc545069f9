use serde::{Deserialize, Serialize};
use std::collections::{btree_map::Entry, BTreeMap};
use std::fmt;

use crate::validate::ScanTarget;

/// Outcome of a single connect attempt.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    Open,
    Closed,
    Unreachable,
}

impl ProbeState {
    pub fn is_open(self) -> bool {
        matches!(self, ProbeState::Open)
    }
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeState::Open => write!(f, "open"),
            ProbeState::Closed => write!(f, "closed"),
            ProbeState::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// One probe outcome for one port. Produced once by the worker that claimed the port.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub state: ProbeState,
}

/// Service label and banner text attached to an open port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    #[serde(rename = "service")]
    pub service_name: String,
    pub banner: String,
}

/// Known-weakness tags for a port, in weakness-table order. Never holds duplicates.
pub type VulnerabilityFindings = Vec<String>;

/// The unit stored in the scan's result collection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenPortRecord {
    pub port: u16,
    #[serde(flatten)]
    pub service: ServiceInfo,
    pub vulnerabilities: VulnerabilityFindings,
}

/// Open-port records keyed by port; holds at most one record per port.
#[derive(Debug, Clone, Default)]
pub struct ResultCollection {
    records: BTreeMap<u16, OpenPortRecord>,
}

impl ResultCollection {
    /// Insert a record. Returns `false` and keeps the existing one if the port is already present.
    pub fn insert(&mut self, record: OpenPortRecord) -> bool {
        match self.records.entry(record.port) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consume the collection, yielding records sorted by port ascending.
    pub fn into_sorted_vec(self) -> Vec<OpenPortRecord> {
        self.records.into_values().collect()
    }
}

/// Final state of a completed scan, handed to the report builder.
#[derive(Debug, Clone)]
pub struct ScanResults {
    pub target: ScanTarget,
    pub scanned_total: u64,
    pub scanned_done: u64,
    pub open_ports: Vec<OpenPortRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(port: u16, banner: &str) -> OpenPortRecord {
        OpenPortRecord {
            port,
            service: ServiceInfo {
                service_name: "unknown".into(),
                banner: banner.into(),
            },
            vulnerabilities: VulnerabilityFindings::new(),
        }
    }

    #[test]
    fn collection_dedups_and_sorts() {
        let mut c = ResultCollection::default();
        assert!(c.insert(record(443, "first")));
        assert!(c.insert(record(22, "")));
        assert!(!c.insert(record(443, "second")));
        assert_eq!(c.len(), 2);

        let out = c.into_sorted_vec();
        assert_eq!(out.iter().map(|r| r.port).collect::<Vec<_>>(), vec![22, 443]);
        assert_eq!(out[1].service.banner, "first");
    }

    #[test]
    fn record_serializes_flat() {
        let json = serde_json::to_value(record(80, "hi")).unwrap();
        assert_eq!(json["port"], 80);
        assert_eq!(json["service"], "unknown");
        assert_eq!(json["banner"], "hi");
        assert!(json["vulnerabilities"].as_array().unwrap().is_empty());
    }
}
