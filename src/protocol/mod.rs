//! Telemetry protocol
//!
//! - [`wire`]: the `event` / `data` / `status` command grammar and renderers
//! - [`frame`]: splitting received datagrams into decoded messages
//! - [`json`]: JSON-bodied data and metric records
//! - [`legacy`]: older line and timespec formats
//! - [`error`]: parse error types shared by all decoders

pub mod error;
pub mod frame;
pub mod json;
pub mod legacy;
pub mod wire;

pub use error::{ParseError, ParseErrorKind};
pub use frame::{FrameReassembler, Reassembled, ReassemblerStats};
pub use json::{parse_json_data, parse_json_metric, JsonRecordDecoder};
pub use legacy::{parse_event_legacy, parse_timespec, Timespec};
pub use wire::{
    parse_data, parse_double, parse_event, parse_status, parse_uint, render_batch, render_data,
    render_event, render_message, render_status, CodecConfig, WireCodec, DEFAULT_MAX_PACKET,
};
