//! Frame reassembly
//!
//! Splits one received datagram on `;` and decodes each frame with the
//! best-effort parsers, dispatching on the frame's first byte. A frame that
//! fails to decode is dropped and scanning resumes after its terminator.
//!
//! Each datagram is decoded on its own; a command split across two
//! datagrams is lost. Since every `;` ends a frame, a name or payload
//! containing `;` does not survive the bus.

use super::wire::WireCodec;
use crate::types::Message;
use tracing::debug;

/// Per-chunk decode counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Frames decoded into messages
    pub frames_decoded: u64,
    /// Frames dropped as malformed, unrecognized or unterminated
    pub frames_dropped: u64,
}

/// Result of decoding one chunk
#[derive(Debug, Clone, Default)]
pub struct Reassembled {
    /// Decoded messages in arrival order
    pub messages: Vec<Message>,
    /// Decode counters for this chunk
    pub stats: ReassemblerStats,
}

/// Datagram-to-message decoder
#[derive(Debug, Clone, Default)]
pub struct FrameReassembler {
    codec: WireCodec,
}

impl FrameReassembler {
    /// Create a reassembler using `codec`
    pub fn new(codec: WireCodec) -> Self {
        Self { codec }
    }

    /// Decode every frame in `chunk`
    pub fn decode(&self, chunk: &[u8]) -> Reassembled {
        let mut out = Reassembled::default();
        let mut rest = chunk;

        while let Some(end) = rest.iter().position(|&b| b == b';') {
            let (frame, tail) = rest.split_at(end + 1);
            rest = tail;

            match self.decode_frame(frame) {
                Some(message) => {
                    out.messages.push(message);
                    out.stats.frames_decoded += 1;
                },
                None => {
                    out.stats.frames_dropped += 1;
                    debug!(frame = %String::from_utf8_lossy(frame), "Dropping undecodable frame");
                },
            }
        }

        if !rest.is_empty() {
            out.stats.frames_dropped += 1;
            debug!(frame = %String::from_utf8_lossy(rest), "Dropping unterminated frame");
        }

        out
    }

    /// Decode one `;`-terminated frame
    fn decode_frame(&self, frame: &[u8]) -> Option<Message> {
        let text = std::str::from_utf8(frame).ok()?;
        match frame.first()? {
            b'e' => self.codec.parse_event_lossy(text).0.map(Message::Event),
            b'd' => self.codec.parse_data_lossy(text).0.map(Message::Data),
            _ => None,
        }
    }
}
