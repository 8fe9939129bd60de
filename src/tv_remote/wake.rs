//! Wake-on-LAN.

use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;

pub const MAGIC_PACKET_LEN: usize = 102;
const SEND_PACING: Duration = Duration::from_millis(100);

/// Six `0xFF` bytes followed by the MAC address sixteen times.
pub fn magic_packet(mac: [u8; 6]) -> [u8; MAGIC_PACKET_LEN] {
    let mut packet = [0xFFu8; MAGIC_PACKET_LEN];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    packet
}

/// Subnet-directed broadcast address: `ip | !mask` per octet.
pub fn broadcast_address(ip: Ipv4Addr, subnet: Ipv4Addr) -> Ipv4Addr {
    let ip = ip.octets();
    let mask = subnet.octets();
    Ipv4Addr::from(std::array::from_fn::<u8, 4, _>(|i| ip[i] | (mask[i] ^ 0xFF)))
}

/// Resolves `host` to its first IPv4 address.
pub async fn resolve_ipv4(host: &str, port: u16) -> Result<Ipv4Addr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Could not resolve address: {}", host))?
        .find_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .with_context(|| format!("Could not resolve address: {}", host))
}

/// Broadcasts `packet` to `target` `repeat` times, 100 ms apart.
///
/// Socket failures are logged, never returned: the TV may simply not be
/// reachable yet and the caller re-probes anyway.
pub async fn send_magic_packets(target: SocketAddrV4, packet: &[u8], repeat: usize) {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(e) => {
            log::warn!("Cannot turn the TV on: {}", e);
            return;
        }
    };
    if let Err(e) = socket.set_broadcast(true) {
        log::warn!("Cannot turn the TV on: {}", e);
        return;
    }

    for _ in 0..repeat {
        if let Err(e) = socket.send_to(packet, target).await {
            log::warn!("Failed to send WOL packet to {}: {}", target, e);
        }
        tokio::time::sleep(SEND_PACING).await;
    }
}
