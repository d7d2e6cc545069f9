use port_audit::validate::{validate, validate_port_range, ScanTarget, TargetError};
use std::net::IpAddr;

#[test]
fn literals_only() {
    assert!(validate("192.168.1.1"));
    assert!(validate("2001:db8::1"));
    assert!(!validate("999.1.1.1"));
    assert!(!validate("example.com"));
    assert!(!validate("10.0.0.1/24"));
}

#[test]
fn range_checks() {
    assert!(validate_port_range(0, 0));
    assert!(validate_port_range(1, 1024));
    assert!(!validate_port_range(10, 5));
    assert!(!validate_port_range(0, 70000));
}

#[test]
fn target_exposes_inclusive_range() {
    let t = ScanTarget::new("::1", 20, 25).expect("valid");
    assert_eq!(t.address(), "::1".parse::<IpAddr>().unwrap());
    assert_eq!(t.ports().collect::<Vec<_>>(), vec![20, 21, 22, 23, 24, 25]);
    assert_eq!(t.port_count(), 6);
}

#[test]
fn error_messages_name_the_field() {
    let e = ScanTarget::new("999.1.1.1", 1, 2).unwrap_err();
    assert_eq!(e.to_string(), "invalid IP address: 999.1.1.1");
    let e = ScanTarget::new("127.0.0.1", 10, 5).unwrap_err();
    assert!(matches!(e, TargetError::InvalidPortRange { .. }));
    assert!(e.to_string().contains("10-5"));
}
