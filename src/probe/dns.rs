//! DNS probe over raw UDP.

use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

use super::ProbeError;

/// Name looked up by the resolver probe.
pub const PROBE_NAME: &str = "cloudflare.com";

/// Ask `resolver` for the A record of `name` and return the round trip.
///
/// `resolver` may carry a port; 53 is assumed otherwise.
pub async fn resolve_via(resolver: &str, name: &str, timeout: Duration) -> Result<Duration, ProbeError> {
    let target = resolver_addr(resolver);
    let packet = build_query(name)?;
    let tx_id = u16::from_be_bytes([packet[0], packet[1]]);

    let bind = if target.starts_with('[') { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(bind)
        .await
        .map_err(|e| ProbeError::Network(format!("failed to bind socket: {}", e)))?;
    socket
        .connect(&target)
        .await
        .map_err(|e| ProbeError::Network(format!("failed to connect to {}: {}", target, e)))?;

    let start = Instant::now();
    socket
        .send(&packet)
        .await
        .map_err(|e| ProbeError::Network(format!("failed to send: {}", e)))?;

    let mut response = [0u8; 512];
    let n = tokio::time::timeout(timeout, socket.recv(&mut response))
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(|e| ProbeError::Network(format!("failed to recv: {}", e)))?;
    let elapsed = start.elapsed();

    check_response(&response[..n], tx_id)?;
    Ok(elapsed)
}

fn resolver_addr(resolver: &str) -> String {
    match resolver.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V6(v6)) => format!("[{}]:53", v6),
        Ok(std::net::IpAddr::V4(v4)) => format!("{}:53", v4),
        Err(_) if resolver.contains(':') => resolver.to_string(),
        Err(_) => format!("{}:53", resolver),
    }
}

/// Build a recursive A/IN query for `name`.
fn build_query(name: &str) -> Result<Vec<u8>, ProbeError> {
    let tx_id: u16 = rand::random();

    let mut packet = Vec::with_capacity(32 + name.len());
    packet.extend_from_slice(&tx_id.to_be_bytes());
    packet.extend_from_slice(&0x0100u16.to_be_bytes()); // RD
    packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    packet.extend_from_slice(&[0u8; 6]); // AN/NS/AR

    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(ProbeError::Config(format!("invalid DNS name: {}", name)));
        }
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0);

    packet.extend_from_slice(&1u16.to_be_bytes()); // A
    packet.extend_from_slice(&1u16.to_be_bytes()); // IN
    Ok(packet)
}

fn check_response(response: &[u8], tx_id: u16) -> Result<(), ProbeError> {
    if response.len() < 12 {
        return Err(ProbeError::Network(format!("response too short: {} bytes", response.len())));
    }

    let resp_tx_id = u16::from_be_bytes([response[0], response[1]]);
    if resp_tx_id != tx_id {
        return Err(ProbeError::Network(format!(
            "transaction ID mismatch: got {}, expected {}",
            resp_tx_id, tx_id
        )));
    }

    if response[2] & 0x80 == 0 {
        return Err(ProbeError::Network("not a response".to_string()));
    }

    let rcode = response[3] & 0x0F;
    if rcode != 0 {
        return Err(ProbeError::Network(format!("DNS error RCODE: {}", rcode)));
    }

    let answers = u16::from_be_bytes([response[6], response[7]]);
    if answers == 0 {
        return Err(ProbeError::Network("no answers".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        let packet = build_query(PROBE_NAME).unwrap();
        // header + 1+10 + 1+3 + root + type/class
        assert_eq!(packet.len(), 12 + 16 + 4);
        assert_eq!(&packet[12..23], b"\x0acloudflare");
        assert_eq!(packet[4..6], [0, 1]);
        assert!(build_query("bad..name").is_err());
    }

    #[test]
    fn test_resolver_addr() {
        assert_eq!(resolver_addr("1.1.1.1"), "1.1.1.1:53");
        assert_eq!(resolver_addr("2606:4700:4700::1111"), "[2606:4700:4700::1111]:53");
        assert_eq!(resolver_addr("9.9.9.9:5353"), "9.9.9.9:5353");
    }

    #[test]
    fn test_check_response() {
        let mut response = vec![0u8; 12];
        response[0..2].copy_from_slice(&0x4242u16.to_be_bytes());
        response[2] = 0x81;
        response[3] = 0x80;
        response[7] = 1;
        assert!(check_response(&response, 0x4242).is_ok());
        assert!(check_response(&response, 0x4243).is_err());

        response[3] = 0x83; // NXDOMAIN
        assert!(check_response(&response, 0x4242).is_err());
        assert!(check_response(&response[..6], 0x4242).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_resolver_times_out() {
        // TEST-NET-1, never answers.
        let result = resolve_via("192.0.2.1", PROBE_NAME, Duration::from_millis(100)).await;
        assert!(result.is_err());
    }
}
