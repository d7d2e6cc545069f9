use crate::types::VulnerabilityFindings;

/// Known weaknesses commonly associated with well-known ports.
const COMMON_VULNERABILITIES: &[(u16, &[&str])] = &[
    (21, &["Anonymous FTP login", "FTP Bounce Attack"]),
    (22, &["OpenSSH < 7.7 Username Enumeration", "SSH Protocol 1.0"]),
    (23, &["Telnet Unencrypted", "Default Credentials"]),
    (80, &["Directory Traversal", "SQL Injection", "XSS"]),
    (443, &["Heartbleed", "POODLE", "BEAST"]),
    (3306, &["MySQL Weak Password", "CVE-2016-6662"]),
    (3389, &["BlueKeep (CVE-2019-0708)", "RDP Session Hijacking"]),
];

/// Maps an open port (and its service label) to weakness tags.
pub trait VulnerabilityScanner: Send + Sync {
    fn check_vulnerabilities(&self, port: u16, service: &str) -> VulnerabilityFindings;
}

/// Lookup against the compiled-in port table. The service label is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticVulnerabilityTable;

impl VulnerabilityScanner for StaticVulnerabilityTable {
    fn check_vulnerabilities(&self, port: u16, _service: &str) -> VulnerabilityFindings {
        lookup(port)
    }
}

/// Weakness tags for `port`; empty for unmapped ports.
pub fn lookup(port: u16) -> VulnerabilityFindings {
    COMMON_VULNERABILITIES
        .iter()
        .find(|(p, _)| *p == port)
        .map(|(_, tags)| tags.iter().map(|t| t.to_string()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_has_two_tags() {
        let found = lookup(22);
        assert_eq!(found.len(), 2);
        assert_eq!(
            found,
            vec!["OpenSSH < 7.7 Username Enumeration", "SSH Protocol 1.0"]
        );
    }

    #[test]
    fn tags_keep_table_order() {
        assert_eq!(lookup(443), vec!["Heartbleed", "POODLE", "BEAST"]);
        assert_eq!(lookup(3306), vec!["MySQL Weak Password", "CVE-2016-6662"]);
    }

    #[test]
    fn table_rows_have_no_duplicate_tags() {
        for (port, tags) in COMMON_VULNERABILITIES {
            let unique: std::collections::HashSet<_> = tags.iter().collect();
            assert_eq!(unique.len(), tags.len(), "duplicate tag for port {port}");
        }
        let ports: std::collections::HashSet<_> =
            COMMON_VULNERABILITIES.iter().map(|(p, _)| p).collect();
        assert_eq!(ports.len(), COMMON_VULNERABILITIES.len());
    }

    #[test]
    fn unmapped_port_is_empty() {
        assert!(lookup(8080).is_empty());
        assert!(lookup(0).is_empty());
    }

    #[test]
    fn scanner_ignores_service_label() {
        let table = StaticVulnerabilityTable;
        assert_eq!(table.check_vulnerabilities(443, "unknown"), lookup(443));
    }
}
