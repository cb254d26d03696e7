//! Frame sources.
//!
//! A [`FrameSource`] yields raw frames one blocking poll at a time; a
//! [`SourceOpener`] turns an interface name into a source. The live
//! implementation sits on top of `pnet` datalink channels.

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use chrono::{DateTime, Utc};
use pnet::datalink::{self, Channel, DataLinkReceiver, NetworkInterface};
use std::io;
use tracing::{debug, info};

/// A link-layer frame as read from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Frame bytes, at most the snapshot length
    pub data: Vec<u8>,

    /// Length of the frame on the wire
    pub original_len: usize,

    /// When the frame was captured
    pub captured_at: DateTime<Utc>,

    /// Position of the frame within its session or file, starting at 0
    pub sequence: u64,
}

impl RawFrame {
    /// Build a frame, truncating `data` to `snapshot_len` bytes.
    pub fn new(
        mut data: Vec<u8>,
        original_len: usize,
        captured_at: DateTime<Utc>,
        sequence: u64,
        snapshot_len: usize,
    ) -> Self {
        let original_len = original_len.max(data.len());
        data.truncate(snapshot_len);
        Self {
            data,
            original_len,
            captured_at,
            sequence,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One open capture handle.
pub trait FrameSource: Send {
    /// Block until a frame arrives or the poll timeout elapses.
    ///
    /// `Ok(None)` means the timeout elapsed with no frame.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;
}

/// Opens frame sources by interface name.
pub trait SourceOpener: Send + Sync {
    fn open(
        &self,
        interface: &str,
        config: &CaptureConfig,
    ) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// Names of the interfaces frames can be captured on.
pub fn list_interfaces() -> Vec<String> {
    datalink::interfaces()
        .into_iter()
        .map(|iface| iface.name)
        .collect()
}

/// Opens live datalink channels.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveOpener;

impl SourceOpener for LiveOpener {
    fn open(
        &self,
        interface: &str,
        config: &CaptureConfig,
    ) -> Result<Box<dyn FrameSource>, CaptureError> {
        let iface = find_interface(interface)?;

        let channel_config = datalink::Config {
            read_timeout: Some(config.poll_timeout()),
            read_buffer_size: config.read_buffer_size,
            promiscuous: config.promiscuous,
            ..Default::default()
        };

        let rx = match datalink::channel(&iface, channel_config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => {
                return Err(CaptureError::InterfaceNotFound {
                    interface: interface.to_string(),
                    reason: "unsupported datalink channel type".to_string(),
                })
            }
            Err(e) => {
                return Err(CaptureError::InterfaceNotFound {
                    interface: interface.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        info!(
            interface = %interface,
            promiscuous = config.promiscuous,
            snapshot_len = config.snapshot_len,
            poll_timeout_ms = config.poll_timeout_ms,
            "Opened capture handle"
        );

        Ok(Box::new(LiveSource {
            interface: interface.to_string(),
            rx,
            snapshot_len: config.snapshot_len,
            sequence: 0,
        }))
    }
}

fn find_interface(name: &str) -> Result<NetworkInterface, CaptureError> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| CaptureError::InterfaceNotFound {
            interface: name.to_string(),
            reason: "no such device".to_string(),
        })
}

/// A live datalink receive channel.
pub struct LiveSource {
    interface: String,
    rx: Box<dyn DataLinkReceiver>,
    snapshot_len: usize,
    sequence: u64,
}

impl FrameSource for LiveSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        match self.rx.next() {
            Ok(bytes) => {
                let frame = RawFrame::new(
                    bytes.to_vec(),
                    bytes.len(),
                    Utc::now(),
                    self.sequence,
                    self.snapshot_len,
                );
                self.sequence += 1;
                Ok(Some(frame))
            }
            Err(e) if is_poll_timeout(&e) => Ok(None),
            Err(e) => Err(CaptureError::PollFailed {
                interface: self.interface.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        debug!(
            interface = %self.interface,
            frames = self.sequence,
            "Released capture handle"
        );
    }
}

fn is_poll_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
