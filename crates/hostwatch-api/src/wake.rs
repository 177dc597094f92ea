// ── Wake-on-LAN ──
//
// Magic packet: 6 bytes of 0xFF followed by the target MAC repeated
// 16 times, sent as a UDP broadcast.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::Error;

const MAGIC_LEN: usize = 6 + 16 * 6;
const WOL_PORT: u16 = 9;

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Build the 102-byte magic packet for this address.
    pub fn magic_packet(&self) -> [u8; MAGIC_LEN] {
        let mut packet = [0xFF_u8; MAGIC_LEN];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();
        if hex.len() != 12 {
            return Err(Error::Wake(format!("invalid MAC address '{s}'")));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            let pair = hex
                .get(i * 2..i * 2 + 2)
                .ok_or_else(|| Error::Wake(format!("invalid MAC address '{s}'")))?;
            *octet = u8::from_str_radix(pair, 16)
                .map_err(|_| Error::Wake(format!("invalid MAC address '{s}'")))?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Broadcast a magic packet for `mac` on the local network.
pub async fn send_magic_packet(mac: MacAddress) -> Result<(), Error> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(|e| Error::Wake(e.to_string()))?;
    socket
        .set_broadcast(true)
        .map_err(|e| Error::Wake(e.to_string()))?;

    let target = SocketAddr::from((Ipv4Addr::BROADCAST, WOL_PORT));
    socket
        .send_to(&mac.magic_packet(), target)
        .await
        .map_err(|e| Error::Wake(e.to_string()))?;

    debug!(%mac, "sent wake-on-LAN packet");
    Ok(())
}
