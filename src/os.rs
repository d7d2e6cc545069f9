use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

const HTTP_PORT: u16 = 80;
const PROBE_REQUEST: &[u8] = b"GET / HTTP/1.1\r\n\r\n";

/// Advisory operating-system label derived from an HTTP response.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum OsGuess {
    #[serde(rename = "Windows")]
    Windows,
    #[serde(rename = "Ubuntu Linux")]
    UbuntuLinux,
    #[serde(rename = "Linux (Apache)")]
    LinuxApache,
    #[serde(rename = "Unknown OS")]
    Unknown,
    #[serde(rename = "OS Detection Failed")]
    DetectionFailed,
    #[serde(rename = "Skipped")]
    Skipped,
}

impl OsGuess {
    pub fn label(self) -> &'static str {
        match self {
            OsGuess::Windows => "Windows",
            OsGuess::UbuntuLinux => "Ubuntu Linux",
            OsGuess::LinuxApache => "Linux (Apache)",
            OsGuess::Unknown => "Unknown OS",
            OsGuess::DetectionFailed => "OS Detection Failed",
            OsGuess::Skipped => "Skipped",
        }
    }
}

impl fmt::Display for OsGuess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[async_trait]
pub trait OsDetector: Send + Sync {
    async fn detect_os(&self, target: IpAddr) -> OsGuess;
}

/// Fingerprints the host from whatever answers a bare GET on port 80.
#[derive(Debug, Clone, Copy)]
pub struct HttpOsDetector {
    pub timeout: Duration,
}

impl Default for HttpOsDetector {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
        }
    }
}

#[async_trait]
impl OsDetector for HttpOsDetector {
    async fn detect_os(&self, target: IpAddr) -> OsGuess {
        match fetch_http_response(target, self.timeout).await {
            Ok(bytes) => analyze_response(&bytes),
            Err(e) => {
                debug!(%target, error = %e, "OS detection failed");
                OsGuess::DetectionFailed
            }
        }
    }
}

/// Used when OS detection is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipOsDetection;

#[async_trait]
impl OsDetector for SkipOsDetection {
    async fn detect_os(&self, _target: IpAddr) -> OsGuess {
        OsGuess::Skipped
    }
}

async fn fetch_http_response(target: IpAddr, timeout: Duration) -> std::io::Result<Vec<u8>> {
    let addr = SocketAddr::new(target, HTTP_PORT);
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(PROBE_REQUEST).await?;
        let mut buf = vec![0u8; 1024];
        let n = stream.read(&mut buf).await?;
        buf.truncate(n);
        Ok::<_, std::io::Error>(buf)
    };
    time::timeout(timeout, exchange)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out"))?
}

/// Match known platform tokens, first hit wins.
pub fn analyze_response(response: &[u8]) -> OsGuess {
    let text = String::from_utf8_lossy(response);
    if text.contains("Windows") {
        OsGuess::Windows
    } else if text.contains("Ubuntu") {
        OsGuess::UbuntuLinux
    } else if text.contains("Apache") {
        OsGuess::LinuxApache
    } else {
        OsGuess::Unknown
    }
}
