use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

/// Banners longer than this many characters are cut.
pub const MAX_BANNER_CHARS: usize = 100;

/// Label returned when a port has no well-known service name.
pub const UNKNOWN_SERVICE: &str = "unknown";

const READ_BUF_LEN: usize = 1024;

/// Well-known TCP service names, sorted by port.
const WELL_KNOWN: &[(u16, &str)] = &[
    (7, "echo"),
    (9, "discard"),
    (13, "daytime"),
    (19, "chargen"),
    (20, "ftp-data"),
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (37, "time"),
    (43, "whois"),
    (53, "domain"),
    (70, "gopher"),
    (79, "finger"),
    (80, "http"),
    (88, "kerberos"),
    (110, "pop3"),
    (111, "sunrpc"),
    (113, "auth"),
    (119, "nntp"),
    (123, "ntp"),
    (135, "epmap"),
    (139, "netbios-ssn"),
    (143, "imap2"),
    (161, "snmp"),
    (179, "bgp"),
    (389, "ldap"),
    (443, "https"),
    (445, "microsoft-ds"),
    (465, "submissions"),
    (513, "login"),
    (514, "shell"),
    (515, "printer"),
    (554, "rtsp"),
    (587, "submission"),
    (631, "ipp"),
    (636, "ldaps"),
    (873, "rsync"),
    (993, "imaps"),
    (995, "pop3s"),
    (1080, "socks"),
    (1433, "ms-sql-s"),
    (1521, "oracle"),
    (1723, "pptp"),
    (1883, "mqtt"),
    (2049, "nfs"),
    (3260, "iscsi-target"),
    (3306, "mysql"),
    (3389, "ms-wbt-server"),
    (5432, "postgresql"),
    (5672, "amqp"),
    (5900, "rfb"),
    (6379, "redis"),
    (8080, "http-alt"),
    (8443, "https-alt"),
    (11211, "memcache"),
    (27017, "mongodb"),
];

/// Service labelling and banner collection for open ports.
#[async_trait]
pub trait ServiceDetector: Send + Sync {
    fn service_name(&self, port: u16) -> String;

    /// Never fails: every error becomes a descriptive string.
    async fn banner(&self, target: IpAddr, port: u16, timeout: Duration) -> String;
}

/// Static name table plus passive read, with HTTP/HTTPS follow-ups on 80/443.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardServiceDetector;

#[async_trait]
impl ServiceDetector for StandardServiceDetector {
    fn service_name(&self, port: u16) -> String {
        service_name(port).to_string()
    }

    async fn banner(&self, target: IpAddr, port: u16, timeout: Duration) -> String {
        banner(target, port, timeout).await
    }
}

/// Look up the well-known name for `port`, or `"unknown"`.
pub fn service_name(port: u16) -> &'static str {
    WELL_KNOWN
        .binary_search_by_key(&port, |&(p, _)| p)
        .map(|idx| WELL_KNOWN[idx].1)
        .unwrap_or(UNKNOWN_SERVICE)
}

/// Grab a banner from `target:port` over a fresh connection.
pub async fn banner(target: IpAddr, port: u16, timeout: Duration) -> String {
    match grab_banner(target, port, timeout).await {
        Ok(text) => truncate_banner(&text),
        Err(e) => {
            debug!(%target, port, error = %e, "banner grab failed");
            failure_banner(&e)
        }
    }
}

/// Placeholder banner for a failed grab, held to the same length limit.
fn failure_banner(err: &anyhow::Error) -> String {
    truncate_banner(&format!("Banner grab failed: {err:#}"))
}

async fn grab_banner(target: IpAddr, port: u16, timeout: Duration) -> Result<String> {
    let addr = SocketAddr::new(target, port);
    let mut stream = time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| anyhow!("timed out"))?
        .with_context(|| format!("connect to {addr}"))?;

    let unsolicited = read_text(&mut stream, timeout).await;
    if !unsolicited.is_empty() {
        return Ok(unsolicited);
    }

    let text = match port {
        80 => http_banner(&mut stream, target, timeout).await,
        443 => https_banner(stream, target, timeout).await,
        _ => String::new(),
    };
    Ok(text)
}

/// Read once with a timeout and decode lossily. Empty on timeout, EOF or error.
async fn read_text<S>(stream: &mut S, timeout: Duration) -> String
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_LEN];
    match time::timeout(timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => String::from_utf8_lossy(&buf[..n]).trim().to_string(),
        _ => String::new(),
    }
}

async fn http_banner<S>(stream: &mut S, target: IpAddr, timeout: Duration) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = http_request(target);
    match time::timeout(timeout, stream.write_all(request.as_bytes())).await {
        Ok(Ok(())) => read_text(stream, timeout).await,
        _ => String::new(),
    }
}

async fn https_banner(stream: TcpStream, target: IpAddr, timeout: Duration) -> String {
    // Arbitrary hosts rarely present certificates we could validate.
    let connector = match native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .use_sni(false)
        .build()
    {
        Ok(c) => tokio_native_tls::TlsConnector::from(c),
        Err(e) => {
            debug!(error = %e, "failed to build TLS connector");
            return String::new();
        }
    };

    let domain = target.to_string();
    match time::timeout(timeout, connector.connect(&domain, stream)).await {
        Ok(Ok(mut tls)) => http_banner(&mut tls, target, timeout).await,
        Ok(Err(e)) => {
            debug!(%target, error = %e, "TLS handshake failed");
            String::new()
        }
        Err(_) => String::new(),
    }
}

fn http_request(target: IpAddr) -> String {
    let host = match target {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    };
    format!("GET / HTTP/1.1\r\nHost: {host}\r\n\r\n")
}

/// Keep at most [`MAX_BANNER_CHARS`] characters, never splitting a code point.
pub fn truncate_banner(text: &str) -> String {
    text.chars().take(MAX_BANNER_CHARS).collect()
}
