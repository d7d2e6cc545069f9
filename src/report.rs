use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ::time::{format_description::well_known, OffsetDateTime};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::os::OsGuess;
use crate::types::OpenPortRecord;
use crate::validate::ScanTarget;

pub const JSON_REPORT_NAME: &str = "security_report.json";
pub const CSV_REPORT_NAME: &str = "security_report.csv";
pub const CSV_HEADER: [&str; 4] = ["Port", "Service", "Banner", "Vulnerabilities"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize JSON report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV report: {0}")]
    Csv(#[from] csv::Error),
}

/// Immutable result of one completed scan.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub target: ScanTarget,
    pub os_guess: OsGuess,
    pub open_ports: Vec<OpenPortRecord>,
    pub timestamp: String,
}

impl ScanReport {
    /// Aggregate scan output into a report stamped with the current UTC time.
    /// Records are deduplicated and sorted by port regardless of input order.
    pub fn build(target: ScanTarget, open_ports: Vec<OpenPortRecord>, os_guess: OsGuess) -> Self {
        Self::build_at(target, open_ports, os_guess, OffsetDateTime::now_utc())
    }

    pub fn build_at(
        target: ScanTarget,
        mut open_ports: Vec<OpenPortRecord>,
        os_guess: OsGuess,
        at: OffsetDateTime,
    ) -> Self {
        open_ports.sort_by_key(|r| r.port);
        open_ports.dedup_by_key(|r| r.port);
        Self {
            target,
            os_guess,
            open_ports,
            timestamp: rfc3339(at),
        }
    }
}

/// Anything that can publish a finished report.
pub trait Reporter {
    fn generate_report(&self, report: &ScanReport) -> Result<Vec<PathBuf>, ReportError>;
}

/// Prints the console summary and writes JSON and CSV into one directory.
#[derive(Debug, Clone)]
pub struct FileReporter {
    output_dir: PathBuf,
}

impl FileReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Reporter for FileReporter {
    fn generate_report(&self, report: &ScanReport) -> Result<Vec<PathBuf>, ReportError> {
        print!("{}", render_console(report));
        let json_path = self.output_dir.join(JSON_REPORT_NAME);
        let csv_path = self.output_dir.join(CSV_REPORT_NAME);
        write_json(report, &json_path)?;
        write_csv(report, &csv_path)?;
        Ok(vec![json_path, csv_path])
    }
}

/// Human-readable summary of the report.
pub fn render_console(report: &ScanReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Security Assessment Report ===");
    let _ = writeln!(out, "\nTarget: {}", report.target.address());
    let _ = writeln!(
        out,
        "Port range: {}-{}",
        report.target.start_port(),
        report.target.end_port()
    );
    let _ = writeln!(out, "OS Detection: {}", report.os_guess);
    let _ = writeln!(out, "\nOpen Ports and Security Findings:");

    if report.open_ports.is_empty() {
        let _ = writeln!(out, "\nNo open ports found.");
        return out;
    }
    for rec in &report.open_ports {
        let _ = writeln!(out, "\n[OPEN] Port {}", rec.port);
        let _ = writeln!(out, "Service: {}", rec.service.service_name);
        let _ = writeln!(out, "Banner: {}", rec.service.banner);
        if !rec.vulnerabilities.is_empty() {
            let _ = writeln!(out, "Potential Vulnerabilities:");
            for v in &rec.vulnerabilities {
                let _ = writeln!(out, "  - {v}");
            }
        }
    }
    out
}

/// Write the full report as JSON with four-space indentation.
pub fn write_json(report: &ScanReport, path: &Path) -> Result<(), ReportError> {
    let file = create_file(path)?;
    let mut w = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut w, formatter);
    report.serialize(&mut ser)?;
    w.flush().map_err(|source| io_error(path, source))?;
    info!(path = %path.display(), "wrote JSON report");
    Ok(())
}

/// Write one CSV row per open port, vulnerabilities joined by `"; "`.
pub fn write_csv(report: &ScanReport, path: &Path) -> Result<(), ReportError> {
    let file = create_file(path)?;
    let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
    wtr.write_record(CSV_HEADER)?;
    for rec in &report.open_ports {
        let vulns = rec
            .vulnerabilities
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ");
        wtr.write_record([
            rec.port.to_string().as_str(),
            rec.service.service_name.as_str(),
            rec.service.banner.as_str(),
            vulns.as_str(),
        ])?;
    }
    wtr.flush().map_err(|source| io_error(path, source))?;
    info!(path = %path.display(), "wrote CSV report");
    Ok(())
}

fn create_file(path: &Path) -> Result<File, ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    File::create(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ReportError {
    ReportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServiceInfo, VulnerabilityFindings};

    fn rec(port: u16) -> OpenPortRecord {
        OpenPortRecord {
            port,
            service: ServiceInfo {
                service_name: crate::service::service_name(port).into(),
                banner: String::new(),
            },
            vulnerabilities: crate::vulns::lookup(port),
        }
    }

    #[test]
    fn build_sorts_and_dedups() {
        let target = ScanTarget::new("10.0.0.5", 1, 1024).unwrap();
        let report = ScanReport::build_at(
            target,
            vec![rec(443), rec(22), rec(443)],
            OsGuess::Unknown,
            OffsetDateTime::UNIX_EPOCH,
        );
        let ports: Vec<u16> = report.open_ports.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![22, 443]);
        assert_eq!(report.timestamp, "1970-01-01T00:00:00Z");
    }

    #[test]
    fn console_lists_findings() {
        let target = ScanTarget::new("10.0.0.5", 1, 100).unwrap();
        let report = ScanReport::build(target, vec![rec(80)], OsGuess::LinuxApache);
        let text = render_console(&report);
        assert!(text.contains("Target: 10.0.0.5"));
        assert!(text.contains("OS Detection: Linux (Apache)"));
        assert!(text.contains("[OPEN] Port 80"));
        assert!(text.contains("Service: http"));
        assert!(text.contains("  - SQL Injection"));
    }

    #[test]
    fn console_without_open_ports() {
        let target = ScanTarget::new("10.0.0.5", 1, 100).unwrap();
        let report = ScanReport::build(target, Vec::new(), OsGuess::DetectionFailed);
        assert!(render_console(&report).contains("No open ports found."));
    }

    #[test]
    fn empty_findings_render_no_vuln_header() {
        let target = ScanTarget::new("10.0.0.5", 1, 9000).unwrap();
        let mut r = rec(8080);
        r.vulnerabilities = VulnerabilityFindings::new();
        let report = ScanReport::build(target, vec![r], OsGuess::Unknown);
        assert!(!render_console(&report).contains("Potential Vulnerabilities"));
    }
}
