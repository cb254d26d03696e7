//! PacketLens ingest: frame acquisition and decoding.
//!
//! Frames come either from a live interface, through a [`CaptureSession`]
//! that owns one capture handle and a worker thread, or from a capture file
//! via [`decode_file`]. [`decode`] turns a frame into a [`DecodedPacket`].

pub mod config;
pub mod decoder;
pub mod error;
pub mod offline;
pub mod packet;
pub mod session;
pub mod source;

pub use config::{CaptureConfig, ConfigValidationError};
pub use decoder::{decode, decode_base64, DecodeError};
pub use error::CaptureError;
pub use offline::decode_file;
pub use packet::{DecodedPacket, FieldParseError, MacAddr, Protocol, TcpFlags};
pub use session::{CaptureSession, CaptureState, SessionStats, SessionStatus, StartOutcome};
pub use source::{list_interfaces, FrameSource, LiveOpener, RawFrame, SourceOpener};
