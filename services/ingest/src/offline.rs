//! Offline replay of capture files.
//!
//! Reads legacy pcap and pcapng files sequentially and hands every packet
//! block to a callback in file order. No capture handle or worker thread
//! is involved.

use crate::error::CaptureError;
use crate::source::RawFrame;
use chrono::{DateTime, Utc};
use pcap_parser::{create_reader, Block, Linktype, PcapBlockOwned, PcapError};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// Upper bound on bytes kept per frame.
pub const MAX_SNAPSHOT_LEN: usize = 65536;

const READER_CAPACITY: usize = 256 * 1024;

const MICROS: u64 = 1_000_000;
const NANOS: u64 = 1_000_000_000;

/// Read every frame of the capture file at `path`, calling `on_frame` once
/// per frame in file order.
///
/// Returns the number of frames read. Fails with
/// [`CaptureError::CaptureFileUnreadable`] if the file cannot be opened, is
/// not a pcap/pcapng file, or is truncated.
pub fn decode_file<P, F>(path: P, mut on_frame: F) -> Result<u64, CaptureError>
where
    P: AsRef<Path>,
    F: FnMut(RawFrame),
{
    let path = path.as_ref();
    let unreadable = |reason: String| CaptureError::CaptureFileUnreadable {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| unreadable(e.to_string()))?;
    let mut reader = create_reader(READER_CAPACITY, file)
        .map_err(|e| unreadable(format!("not a capture file: {e}")))?;

    let mut clock = BlockClock::default();
    let mut frames = 0u64;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let Some((data, original_len, captured_at)) = clock.packet(block) {
                    on_frame(RawFrame::new(
                        data,
                        original_len,
                        captured_at,
                        frames,
                        MAX_SNAPSHOT_LEN,
                    ));
                    frames += 1;
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| unreadable(format!("read failed: {e}")))?;
            }
            Err(e) => {
                warn!(path = %path.display(), frames = frames, error = %e, "Capture file ended abruptly");
                return Err(unreadable(e.to_string()));
            }
        }
    }

    info!(path = %path.display(), frames = frames, "Capture file replayed");
    Ok(frames)
}

/// Per-file timestamp context.
#[derive(Debug, Default)]
struct BlockClock {
    /// Legacy pcap: fractional part is nanoseconds
    nanosecond: bool,
    /// pcapng: (units per second, offset in seconds) for each interface
    interfaces: Vec<(u64, i64)>,
}

impl BlockClock {
    /// Extract the packet carried by `block`, or update context and return
    /// `None` for non-packet blocks.
    fn packet(&mut self, block: PcapBlockOwned) -> Option<(Vec<u8>, usize, DateTime<Utc>)> {
        match block {
            PcapBlockOwned::LegacyHeader(header) => {
                self.nanosecond = header.is_nanosecond_precision();
                if header.network != Linktype::ETHERNET {
                    warn!(linktype = %header.network, "Capture file is not Ethernet; frames decoded as Ethernet");
                }
                None
            }
            PcapBlockOwned::Legacy(b) => {
                let units = if self.nanosecond { NANOS } else { MICROS };
                let captured_at = timestamp(i64::from(b.ts_sec), u64::from(b.ts_usec), units);
                let data = clamp(b.data, b.caplen as usize);
                Some((data.to_vec(), b.origlen as usize, captured_at))
            }
            PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                self.interfaces.clear();
                None
            }
            PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                let resolution = idb.ts_resolution().unwrap_or(MICROS);
                self.interfaces.push((resolution, idb.if_tsoffset));
                None
            }
            PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                let (resolution, offset) = self
                    .interfaces
                    .get(epb.if_id as usize)
                    .copied()
                    .unwrap_or((MICROS, 0));
                let ticks = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);
                let captured_at = timestamp(
                    offset.saturating_add((ticks / resolution) as i64),
                    ticks % resolution,
                    resolution,
                );
                let data = clamp(epb.data, epb.caplen as usize);
                Some((data.to_vec(), epb.origlen as usize, captured_at))
            }
            PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                // No timestamp in simple packet blocks
                let data = clamp(spb.data, spb.origlen as usize);
                Some((data.to_vec(), spb.origlen as usize, Utc::now()))
            }
            PcapBlockOwned::NG(_) => {
                debug!("Skipping non-packet pcapng block");
                None
            }
        }
    }
}

/// Drop block padding beyond the captured length.
fn clamp(data: &[u8], len: usize) -> &[u8] {
    &data[..len.min(data.len())]
}

fn timestamp(secs: i64, fraction: u64, units_per_sec: u64) -> DateTime<Utc> {
    let nanos = (u128::from(fraction) * u128::from(NANOS) / u128::from(units_per_sec.max(1))) as u32;
    DateTime::from_timestamp(secs, nanos.min(999_999_999)).unwrap_or_else(Utc::now)
}
