//! Ethernet / IPv4 / TCP / UDP frame decoding.
//!
//! Decoding is a pure function of the frame bytes. Malformed input never
//! fails the caller: the returned [`DecodedPacket`] carries the reason in
//! `decode_error` and nothing but the frame length.

use crate::packet::{DecodedPacket, MacAddr, Protocol, TcpFlags};
use base64::Engine;
use std::net::Ipv4Addr;
use thiserror::Error;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Ethernet header plus a minimal 20-byte IPv4 header.
pub const MIN_IPV4_FRAME_LEN: usize = ETHERNET_HEADER_LEN + 20;

const IP_PROTO_TCP: u8 = 6;
const IP_PROTO_UDP: u8 = 17;

/// Bytes of TCP header needed to reach the flag byte.
const TCP_DECODE_LEN: usize = 14;
const TCP_FLAGS_OFFSET: usize = 13;
const UDP_HEADER_LEN: usize = 8;

/// Reasons a frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame shorter than Ethernet header ({0} bytes)")]
    TruncatedEthernet(usize),

    #[error("frame too short for IPv4 header ({0} bytes)")]
    TruncatedIpv4(usize),

    #[error("unsupported IP version {0}")]
    BadIpVersion(u8),

    #[error("invalid IPv4 header length ({0} words)")]
    BadHeaderLength(u8),

    #[error("IPv4 header of {header_len} bytes exceeds frame ({available} bytes after Ethernet)")]
    HeaderOverrun { header_len: usize, available: usize },
}

/// Decode a raw link-layer frame.
pub fn decode(raw: &[u8]) -> DecodedPacket {
    match decode_layers(raw) {
        Ok(packet) => packet,
        Err(e) => DecodedPacket::failed(raw.len(), e.to_string()),
    }
}

/// Decode a standard-alphabet base64 payload, then the frame it contains.
pub fn decode_base64(encoded: &str) -> Result<DecodedPacket, base64::DecodeError> {
    let raw = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    Ok(decode(&raw))
}

fn decode_layers(raw: &[u8]) -> Result<DecodedPacket, DecodeError> {
    if raw.len() < ETHERNET_HEADER_LEN {
        return Err(DecodeError::TruncatedEthernet(raw.len()));
    }

    let mut packet = DecodedPacket {
        dst_mac: Some(MacAddr::from_slice(&raw[0..6])),
        src_mac: Some(MacAddr::from_slice(&raw[6..12])),
        length: raw.len(),
        ..Default::default()
    };

    let ethertype = u16::from_be_bytes([raw[12], raw[13]]);
    if ethertype != ETHERTYPE_IPV4 {
        return Ok(packet);
    }

    if raw.len() < MIN_IPV4_FRAME_LEN {
        return Err(DecodeError::TruncatedIpv4(raw.len()));
    }

    let ip = &raw[ETHERNET_HEADER_LEN..];
    let version = ip[0] >> 4;
    if version != 4 {
        return Err(DecodeError::BadIpVersion(version));
    }

    let ihl = ip[0] & 0x0f;
    if ihl < 5 {
        return Err(DecodeError::BadHeaderLength(ihl));
    }

    let header_len = usize::from(ihl) * 4;
    if header_len > ip.len() {
        return Err(DecodeError::HeaderOverrun {
            header_len,
            available: ip.len(),
        });
    }

    packet.src_ip = Some(Ipv4Addr::new(ip[12], ip[13], ip[14], ip[15]));
    packet.dst_ip = Some(Ipv4Addr::new(ip[16], ip[17], ip[18], ip[19]));

    let transport = &ip[header_len..];
    match ip[9] {
        IP_PROTO_TCP => {
            packet.protocol = Protocol::Tcp;
            if transport.len() >= TCP_DECODE_LEN {
                let (src, dst) = ports(transport);
                packet.src_port = Some(src);
                packet.dst_port = Some(dst);
                packet.tcp_flags = Some(TcpFlags::from_bits(transport[TCP_FLAGS_OFFSET]));
            }
        }
        IP_PROTO_UDP => {
            packet.protocol = Protocol::Udp;
            if transport.len() >= UDP_HEADER_LEN {
                let (src, dst) = ports(transport);
                packet.src_port = Some(src);
                packet.dst_port = Some(dst);
            }
        }
        _ => packet.protocol = Protocol::Other,
    }

    Ok(packet)
}

fn ports(header: &[u8]) -> (u16, u16) {
    (
        u16::from_be_bytes([header[0], header[1]]),
        u16::from_be_bytes([header[2], header[3]]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DST_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
    const SRC_MAC: [u8; 6] = [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];

    fn ethernet(ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ETHERNET_HEADER_LEN + payload.len());
        frame.extend_from_slice(&DST_MAC);
        frame.extend_from_slice(&SRC_MAC);
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    fn ipv4(protocol: u8, options: &[u8], transport: &[u8]) -> Vec<u8> {
        let ihl = 5 + (options.len() / 4) as u8;
        let mut header = vec![0u8; 20];
        header[0] = 0x40 | ihl;
        header[9] = protocol;
        header[12..16].copy_from_slice(&[192, 168, 1, 10]);
        header[16..20].copy_from_slice(&[8, 8, 4, 4]);
        header.extend_from_slice(options);
        header.extend_from_slice(transport);
        header
    }

    fn tcp(src: u16, dst: u16, flags: u8) -> Vec<u8> {
        let mut header = vec![0u8; 20];
        header[0..2].copy_from_slice(&src.to_be_bytes());
        header[2..4].copy_from_slice(&dst.to_be_bytes());
        header[12] = 0x50;
        header[13] = flags;
        header
    }

    fn udp(src: u16, dst: u16) -> Vec<u8> {
        let mut header = vec![0u8; 8];
        header[0..2].copy_from_slice(&src.to_be_bytes());
        header[2..4].copy_from_slice(&dst.to_be_bytes());
        header
    }

    #[test]
    fn test_short_frames_only_carry_length() {
        for len in 0..ETHERNET_HEADER_LEN {
            let raw = vec![0xffu8; len];
            let packet = decode(&raw);
            assert_eq!(packet.length, len);
            assert!(packet.decode_error.is_some());
            assert!(packet.src_mac.is_none());
            assert!(packet.dst_mac.is_none());
            assert!(packet.src_ip.is_none());
            assert!(packet.dst_port.is_none());
            assert!(packet.tcp_flags.is_none());
        }
    }

    #[test]
    fn test_tcp_frame() {
        let raw = ethernet(
            ETHERTYPE_IPV4,
            &ipv4(6, &[], &tcp(51514, 443, TcpFlags::SYN | TcpFlags::ACK)),
        );
        let packet = decode(&raw);

        assert!(packet.is_decoded());
        assert_eq!(packet.dst_mac, Some(MacAddr(DST_MAC)));
        assert_eq!(packet.src_mac, Some(MacAddr(SRC_MAC)));
        assert_eq!(packet.src_ip, Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(packet.dst_ip, Some(Ipv4Addr::new(8, 8, 4, 4)));
        assert_eq!(packet.protocol, Protocol::Tcp);
        assert_eq!(packet.src_port, Some(51514));
        assert_eq!(packet.dst_port, Some(443));
        assert_eq!(packet.tcp_flags.map(|f| f.to_string()).as_deref(), Some("SYN|ACK"));
        assert_eq!(packet.length, raw.len());
    }

    #[test]
    fn test_udp_frame() {
        let raw = ethernet(ETHERTYPE_IPV4, &ipv4(17, &[], &udp(5353, 53)));
        let packet = decode(&raw);

        assert_eq!(packet.protocol, Protocol::Udp);
        assert_eq!(packet.src_port, Some(5353));
        assert_eq!(packet.dst_port, Some(53));
        assert!(packet.tcp_flags.is_none());
    }

    #[test]
    fn test_other_ip_protocol_has_no_ports() {
        // ICMP echo request
        let raw = ethernet(ETHERTYPE_IPV4, &ipv4(1, &[], &[8, 0, 0, 0, 0, 1, 0, 1]));
        let packet = decode(&raw);

        assert!(packet.is_decoded());
        assert_eq!(packet.protocol, Protocol::Other);
        assert!(packet.src_ip.is_some());
        assert!(packet.src_port.is_none());
        assert!(packet.dst_port.is_none());
        assert!(packet.tcp_flags.is_none());
    }

    #[test]
    fn test_non_ipv4_ethertype_is_unknown() {
        // ARP
        let raw = ethernet(0x0806, &[0u8; 28]);
        let packet = decode(&raw);

        assert!(packet.is_decoded());
        assert_eq!(packet.protocol, Protocol::Unknown);
        assert_eq!(packet.src_mac, Some(MacAddr(SRC_MAC)));
        assert!(packet.src_ip.is_none());
        assert!(packet.dst_port.is_none());
    }

    #[test]
    fn test_bare_ethernet_header_decodes() {
        let raw = ethernet(0x86dd, &[]);
        let packet = decode(&raw);
        assert!(packet.is_decoded());
        assert_eq!(packet.protocol, Protocol::Unknown);
        assert_eq!(packet.length, ETHERNET_HEADER_LEN);
    }

    #[test]
    fn test_truncated_ipv4_is_error() {
        let raw = ethernet(ETHERTYPE_IPV4, &[0x45; 10]);
        let packet = decode(&raw);
        assert!(!packet.is_decoded());
        assert!(packet.src_mac.is_none());
        assert_eq!(packet.protocol, Protocol::Unknown);
    }

    #[test]
    fn test_bad_version_and_header_length() {
        let mut ip = ipv4(6, &[], &tcp(1, 2, 0));
        ip[0] = 0x65;
        assert!(decode(&ethernet(ETHERTYPE_IPV4, &ip))
            .decode_error
            .unwrap()
            .contains("version 6"));

        ip[0] = 0x44;
        let packet = decode(&ethernet(ETHERTYPE_IPV4, &ip));
        assert!(packet.decode_error.unwrap().contains("header length"));
    }

    #[test]
    fn test_ihl_with_options_shifts_transport() {
        let options = [1u8, 1, 1, 0, 1, 1, 1, 0];
        let raw = ethernet(ETHERTYPE_IPV4, &ipv4(6, &options, &tcp(40000, 22, TcpFlags::PSH)));
        let packet = decode(&raw);

        assert_eq!(packet.src_port, Some(40000));
        assert_eq!(packet.dst_port, Some(22));
        assert_eq!(packet.tcp_flags, Some(TcpFlags::from_bits(TcpFlags::PSH)));
    }

    #[test]
    fn test_ihl_overrun_is_error() {
        let mut ip = ipv4(17, &[], &[]);
        ip[0] = 0x4f;
        let packet = decode(&ethernet(ETHERTYPE_IPV4, &ip));
        assert!(packet.decode_error.unwrap().contains("exceeds frame"));
        assert_eq!(packet.protocol, Protocol::Unknown);
    }

    #[test]
    fn test_truncated_transport_is_partial() {
        let raw = ethernet(ETHERTYPE_IPV4, &ipv4(6, &[], &[0x01, 0xbb, 0x00, 0x50]));
        let packet = decode(&raw);

        assert!(packet.is_decoded());
        assert_eq!(packet.protocol, Protocol::Tcp);
        assert!(packet.dst_ip.is_some());
        assert!(packet.src_port.is_none());
        assert!(packet.tcp_flags.is_none());

        let raw = ethernet(ETHERTYPE_IPV4, &ipv4(17, &[], &[0, 53, 0]));
        let packet = decode(&raw);
        assert_eq!(packet.protocol, Protocol::Udp);
        assert!(packet.dst_port.is_none());
    }

    #[test]
    fn test_flag_byte_high_bits_are_masked() {
        // ECE and CWR set alongside FIN
        let raw = ethernet(ETHERTYPE_IPV4, &ipv4(6, &[], &tcp(1, 2, 0xc1)));
        let flags = decode(&raw).tcp_flags.unwrap();
        assert_eq!(flags.bits(), TcpFlags::FIN);
        assert_eq!(flags.to_string(), "FIN");
    }

    #[test]
    fn test_length_always_matches_input() {
        let frames = [
            vec![],
            vec![0u8; 13],
            ethernet(ETHERTYPE_IPV4, &[0x45; 5]),
            ethernet(ETHERTYPE_IPV4, &ipv4(6, &[], &tcp(1, 80, 0))),
            ethernet(0x0806, &[0u8; 1600]),
        ];
        for raw in frames {
            assert_eq!(decode(&raw).length, raw.len());
        }
    }

    #[test]
    fn test_decode_base64() {
        let raw = ethernet(ETHERTYPE_IPV4, &ipv4(17, &[], &udp(1234, 53)));
        let encoded = base64::engine::general_purpose::STANDARD.encode(&raw);

        let packet = decode_base64(&encoded).unwrap();
        assert_eq!(packet.dst_port, Some(53));
        assert_eq!(packet.length, raw.len());

        assert!(decode_base64("not base64!").is_err());
    }
}
