//! ICMP echo probe with a `ping` command fallback.
//!
//! The native path runs a blocking socket on the blocking pool so the round
//! trip is timed without scheduler noise.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::process::Command;

use super::ProbeError;

const ECHO_PACKET_LEN: usize = 64;

static ICMP_AVAILABLE: OnceLock<bool> = OnceLock::new();
static SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// ICMP message types for one address family.
#[derive(Debug, Clone, Copy)]
struct Family {
    domain: Domain,
    protocol: Protocol,
    request: u8,
    reply: u8,
}

impl Family {
    fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self {
                domain: Domain::IPV4,
                protocol: Protocol::ICMPV4,
                request: 8,
                reply: 0,
            },
            IpAddr::V6(_) => Self {
                domain: Domain::IPV6,
                protocol: Protocol::ICMPV6,
                request: 128,
                reply: 129,
            },
        }
    }
}

/// Send one echo request to `host` and return the round trip time.
pub async fn ping(host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    if *ICMP_AVAILABLE.get_or_init(icmp_available) {
        let ip = resolve_host(host).await?;

        let result = tokio::task::spawn_blocking(move || echo(ip, timeout))
            .await
            .map_err(|e| ProbeError::Network(format!("ping task failed: {}", e)))?;

        match result {
            Err(ProbeError::Network(msg)) if is_permission_error(&msg) => {
                tracing::warn!("Native ping to {} not permitted, using ping command: {}", host, msg);
            }
            other => return other,
        }
    }

    ping_command(host, timeout).await
}

fn icmp_available() -> bool {
    let available = [Type::RAW, Type::DGRAM]
        .into_iter()
        .any(|ty| Socket::new(Domain::IPV4, ty, Some(Protocol::ICMPV4)).is_ok());

    if available {
        tracing::info!("Ping probe: using native ICMP sockets");
    } else {
        tracing::info!("Ping probe: native ICMP unavailable, using ping command");
    }
    available
}

fn is_permission_error(msg: &str) -> bool {
    msg.contains("Permission") || msg.contains("not permitted") || msg.contains("denied")
}

/// Resolve a host name (or literal) to its first address.
pub async fn resolve_host(host: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("No addresses found for {}", host)))
}

fn echo(ip: IpAddr, timeout: Duration) -> Result<Duration, ProbeError> {
    let family = Family::of(&ip);

    // RAW needs CAP_NET_RAW; DGRAM works unprivileged where ping_group_range allows.
    let (socket, raw) = match Socket::new(family.domain, Type::RAW, Some(family.protocol)) {
        Ok(s) => (s, true),
        Err(_) => (
            Socket::new(family.domain, Type::DGRAM, Some(family.protocol))
                .map_err(|e| ProbeError::Network(format!("Failed to create ICMP socket: {}", e)))?,
            false,
        ),
    };

    socket
        .connect(&SocketAddr::new(ip, 0).into())
        .map_err(|e| ProbeError::Network(format!("Failed to connect: {}", e)))?;
    let socket: UdpSocket = socket.into();

    let identifier: u16 = rand::random();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let packet = echo_request(family.request, identifier, sequence, ip.is_ipv4());

    let start = Instant::now();
    socket
        .send(&packet)
        .map_err(|e| ProbeError::Network(format!("Failed to send: {}", e)))?;

    let mut buf = [0u8; 1500];
    loop {
        let remaining = timeout
            .checked_sub(start.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or(ProbeError::Timeout(timeout))?;
        socket
            .set_read_timeout(Some(remaining))
            .map_err(|e| ProbeError::Network(format!("Failed to set timeout: {}", e)))?;

        let len = socket.recv(&mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => ProbeError::Timeout(timeout),
            _ => ProbeError::Network(format!("Failed to receive: {}", e)),
        })?;
        let elapsed = start.elapsed();

        // DGRAM sockets get their identifier rewritten by the kernel, which
        // also filters replies per socket.
        let expect_id = raw.then_some(identifier);
        if is_echo_reply(&buf[..len], family.reply, expect_id, sequence) {
            return Ok(elapsed);
        }
    }
}

/// Build an echo request; the v6 checksum is left to the kernel.
fn echo_request(kind: u8, identifier: u16, sequence: u16, with_checksum: bool) -> Vec<u8> {
    let mut packet = vec![0u8; ECHO_PACKET_LEN];
    packet[0] = kind;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    packet[8..16].copy_from_slice(&stamp.to_be_bytes());

    if with_checksum {
        let checksum = icmp_checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    }
    packet
}

/// Whether `buf` (optionally prefixed by an IPv4 header) is our echo reply.
fn is_echo_reply(buf: &[u8], reply: u8, identifier: Option<u16>, sequence: u16) -> bool {
    let offset = match buf.first() {
        Some(b) if b >> 4 == 4 => usize::from(b & 0x0f) * 4,
        _ => 0,
    };
    let Some(icmp) = buf.get(offset..offset + 8) else {
        return false;
    };

    let id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let seq = u16::from_be_bytes([icmp[6], icmp[7]]);
    icmp[0] == reply && seq == sequence && identifier.map_or(true, |want| want == id)
}

/// RFC 1071 internet checksum.
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

async fn ping_command(host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let timeout_secs = timeout.as_secs().max(1);

    let output = Command::new("ping")
        .args(["-c", "1", "-W", &timeout_secs.to_string(), host])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("timeout") || stdout.contains("100% packet loss") || stdout.contains("100.0% packet loss") {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Command(format!("ping failed: {}", stdout.trim())));
    }

    parse_ping_output(&stdout)
}

/// Round trip from `ping` output: the per-reply `time=` first, then the
/// summary average.
fn parse_ping_output(output: &str) -> Result<Duration, ProbeError> {
    static REPLY: OnceLock<Regex> = OnceLock::new();
    static SUMMARY: OnceLock<Regex> = OnceLock::new();

    let reply = REPLY.get_or_init(|| Regex::new(r"time[=<](?P<ms>[0-9.]+)\s*ms").unwrap());
    let summary = SUMMARY.get_or_init(|| {
        Regex::new(r"(?:rtt|round-trip)\s+min/avg/max/(?:mdev|stddev)\s*=\s*[0-9.]+/(?P<ms>[0-9.]+)/").unwrap()
    });

    [reply, summary]
        .iter()
        .filter_map(|re| re.captures(output))
        .filter_map(|caps| caps.name("ms")?.as_str().parse::<f64>().ok())
        .next()
        .map(|ms| Duration::from_secs_f64(ms / 1000.0))
        .ok_or_else(|| ProbeError::Command(format!("failed to parse ping output: {}", output)))
}
