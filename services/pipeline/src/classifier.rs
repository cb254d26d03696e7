//! Rule-based packet classification.
//!
//! Rules are evaluated in table order and the first match wins, so the
//! order of [`DEFAULT_RULES`] is part of the classification contract.

use packetlens_ingest::{DecodedPacket, Protocol};
use serde::Serialize;
use std::fmt;

/// Labels the classifier can assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Dns,
    HttpHttps,
    TcpWellKnown,
    AnomalyLargePacket,
    Unknown,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Dns => "DNS",
            Label::HttpHttps => "HTTP/HTTPS",
            Label::TcpWellKnown => "TCP-wellknown",
            Label::AnomalyLargePacket => "ANOMALY-large-packet",
            Label::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Label {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A named classification rule.
#[derive(Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub predicate: fn(&DecodedPacket) -> bool,
    pub label: Label,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("label", &self.label)
            .finish()
    }
}

/// Frames above the Ethernet MTU are flagged as anomalies.
pub const LARGE_PACKET_THRESHOLD: usize = 1500;

fn dst_port_in(packet: &DecodedPacket, ports: &[u16]) -> bool {
    packet.dst_port.is_some_and(|port| ports.contains(&port))
}

fn is_dns(packet: &DecodedPacket) -> bool {
    dst_port_in(packet, &[53, 5353])
}

fn is_web(packet: &DecodedPacket) -> bool {
    dst_port_in(packet, &[80, 8080, 443])
}

fn is_tcp_well_known(packet: &DecodedPacket) -> bool {
    packet.protocol == Protocol::Tcp && packet.dst_port.is_some_and(|port| port > 0 && port < 1024)
}

fn is_large(packet: &DecodedPacket) -> bool {
    packet.length > LARGE_PACKET_THRESHOLD
}

/// The default rule table, in evaluation order.
pub const DEFAULT_RULES: &[Rule] = &[
    Rule {
        name: "dns-port",
        predicate: is_dns,
        label: Label::Dns,
    },
    Rule {
        name: "web-port",
        predicate: is_web,
        label: Label::HttpHttps,
    },
    Rule {
        name: "tcp-well-known-port",
        predicate: is_tcp_well_known,
        label: Label::TcpWellKnown,
    },
    Rule {
        name: "large-packet",
        predicate: is_large,
        label: Label::AnomalyLargePacket,
    },
];

/// Ordered-rule classifier. Packets matching no rule are [`Label::Unknown`].
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec())
    }
}

impl Classifier {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn classify(&self, packet: &DecodedPacket) -> Label {
        first_match(&self.rules, packet)
    }
}

/// Classify with the default rule table.
pub fn classify(packet: &DecodedPacket) -> Label {
    first_match(DEFAULT_RULES, packet)
}

fn first_match(rules: &[Rule], packet: &DecodedPacket) -> Label {
    rules
        .iter()
        .find(|rule| (rule.predicate)(packet))
        .map_or(Label::Unknown, |rule| rule.label)
}
