//! Library crate for port-audit: concurrent TCP connect scanning, service
//! identification, a static weakness table and report writers.
pub mod audit;
pub mod logging;
pub mod os;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod service;
pub mod types;
pub mod validate;
pub mod vulns;
