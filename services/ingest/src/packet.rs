//! Decoded packet model.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Transport protocol identified by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    /// IPv4 carrying a protocol other than TCP or UDP
    Other,
    /// Not IPv4, or the frame could not be decoded
    #[default]
    Unknown,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Other => "OTHER",
            Protocol::Unknown => "UNKNOWN",
        }
    }

    /// Whether this protocol carries ports.
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing one of the textual packet field forms.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldParseError {
    #[error("unknown protocol: {0}")]
    Protocol(String),

    #[error("invalid MAC address: {0}")]
    MacAddr(String),

    #[error("unknown TCP flag: {0}")]
    TcpFlag(String),
}

impl FromStr for Protocol {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            "OTHER" => Ok(Protocol::Other),
            "UNKNOWN" => Ok(Protocol::Unknown),
            _ => Err(FieldParseError::Protocol(s.to_string())),
        }
    }
}

/// Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Build from the first six bytes of `bytes`; callers guarantee the length.
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&bytes[..6]);
        MacAddr(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| FieldParseError::MacAddr(s.to_string()))?;
            *octet =
                u8::from_str_radix(part, 16).map_err(|_| FieldParseError::MacAddr(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(FieldParseError::MacAddr(s.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The six classic TCP control bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const PSH: u8 = 0x08;
    pub const ACK: u8 = 0x10;
    pub const URG: u8 = 0x20;

    const MASK: u8 = 0x3f;

    const NAMES: [(u8, &'static str); 6] = [
        (Self::FIN, "FIN"),
        (Self::SYN, "SYN"),
        (Self::RST, "RST"),
        (Self::PSH, "PSH"),
        (Self::ACK, "ACK"),
        (Self::URG, "URG"),
    ];

    /// Keeps only the low six bits of the raw flag byte.
    pub fn from_bits(bits: u8) -> Self {
        TcpFlags(bits & Self::MASK)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    /// Names of the set flags, lowest bit first.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join("|"))
    }
}

impl FromStr for TcpFlags {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bits = 0u8;
        for name in s.split('|').map(str::trim).filter(|n| !n.is_empty()) {
            let (bit, _) = Self::NAMES
                .iter()
                .find(|(_, known)| known.eq_ignore_ascii_case(name))
                .ok_or_else(|| FieldParseError::TcpFlag(name.to_string()))?;
            bits |= bit;
        }
        Ok(TcpFlags(bits))
    }
}

impl Serialize for TcpFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TcpFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Structured view of one link-layer frame.
///
/// Ports and flags are only ever set for TCP/UDP. When `decode_error` is
/// set, every field except `length` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodedPacket {
    pub src_mac: Option<MacAddr>,
    pub dst_mac: Option<MacAddr>,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Option<Ipv4Addr>,
    pub protocol: Protocol,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub tcp_flags: Option<TcpFlags>,
    /// Length of the raw frame in bytes
    pub length: usize,
    pub decode_error: Option<String>,
}

impl DecodedPacket {
    /// A packet that could not be decoded.
    pub fn failed(length: usize, reason: impl Into<String>) -> Self {
        Self {
            length,
            decode_error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.decode_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse_is_case_insensitive() {
        assert_eq!("tcp".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!(" Udp ".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert!(matches!(
            "icmp".parse::<Protocol>(),
            Err(FieldParseError::Protocol(_))
        ));
    }

    #[test]
    fn test_mac_display_and_parse() {
        let mac = MacAddr([0x00, 0x1b, 0x44, 0x11, 0x3a, 0xb7]);
        assert_eq!(mac.to_string(), "00:1b:44:11:3a:b7");
        assert_eq!("00:1B:44:11:3A:B7".parse::<MacAddr>().unwrap(), mac);
        assert!("00:1b:44:11:3a".parse::<MacAddr>().is_err());
        assert!("00:1b:44:11:3a:b7:ff".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_tcp_flags_mask_and_names() {
        let flags = TcpFlags::from_bits(0xd2);
        assert_eq!(flags.bits(), 0x12);
        assert!(flags.contains(TcpFlags::SYN));
        assert!(flags.contains(TcpFlags::ACK));
        assert!(!flags.contains(TcpFlags::FIN));
        assert_eq!(flags.to_string(), "SYN|ACK");
        assert_eq!("syn|ack".parse::<TcpFlags>().unwrap(), flags);
    }

    #[test]
    fn test_failed_packet_carries_only_length() {
        let packet = DecodedPacket::failed(9, "frame shorter than Ethernet header");
        assert!(!packet.is_decoded());
        assert_eq!(packet.length, 9);
        assert_eq!(packet.protocol, Protocol::Unknown);
        assert!(packet.src_mac.is_none());
        assert!(packet.dst_port.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let packet = DecodedPacket {
            src_mac: Some(MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01])),
            src_ip: Some(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: Some(Ipv4Addr::new(10, 0, 0, 2)),
            protocol: Protocol::Tcp,
            src_port: Some(51000),
            dst_port: Some(443),
            tcp_flags: Some(TcpFlags::from_bits(TcpFlags::SYN)),
            length: 60,
            ..Default::default()
        };

        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(value["src_mac"], "aa:bb:cc:dd:ee:01");
        assert_eq!(value["src_ip"], "10.0.0.1");
        assert_eq!(value["protocol"], "TCP");
        assert_eq!(value["tcp_flags"], "SYN");
        assert_eq!(value["dst_port"], 443);
        assert!(value["decode_error"].is_null());

        let back: DecodedPacket = serde_json::from_value(value).unwrap();
        assert_eq!(back, packet);
    }
}
