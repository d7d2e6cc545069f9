use serde::Serialize;
use std::net::IpAddr;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Input errors detected before any socket is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),
    #[error("invalid port range {start}-{end} (ports must be 0-65535 and start <= end)")]
    InvalidPortRange { start: i64, end: i64 },
}

/// True iff `address` is an IPv4 or IPv6 literal. No DNS lookups.
pub fn validate(address: &str) -> bool {
    address.parse::<IpAddr>().is_ok()
}

/// True iff both bounds lie in `0..=65535` and `start <= end`.
pub fn validate_port_range(start: i64, end: i64) -> bool {
    let valid = 0..=i64::from(u16::MAX);
    valid.contains(&start) && valid.contains(&end) && start <= end
}

/// A validated scan target: an IP literal plus an inclusive port range.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    address: IpAddr,
    start_port: u16,
    end_port: u16,
}

impl ScanTarget {
    /// Validate the raw inputs. The address is checked first so the caller can
    /// report the specific field at fault.
    pub fn new(address: &str, start: i64, end: i64) -> Result<Self, TargetError> {
        let addr = address
            .parse::<IpAddr>()
            .map_err(|_| TargetError::InvalidAddress(address.to_string()))?;
        if !validate_port_range(start, end) {
            return Err(TargetError::InvalidPortRange { start, end });
        }
        // Both casts are in range after validation.
        Ok(Self {
            address: addr,
            start_port: start as u16,
            end_port: end as u16,
        })
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn start_port(&self) -> u16 {
        self.start_port
    }

    pub fn end_port(&self) -> u16 {
        self.end_port
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start_port..=self.end_port
    }

    /// Number of ports in the range, always at least 1.
    pub fn port_count(&self) -> u64 {
        u64::from(self.end_port) - u64::from(self.start_port) + 1
    }
}
