//! Wire protocol codec
//!
//! Grammar (every command ends with `;`, names and payloads are length
//! prefixed so their content is never ambiguous):
//!
//! ```text
//! event  ::= "event " <len> "|" <name> " " <double> " " <double> ";"
//! data   ::= "data "  <len> "|" <name> " " <len> "|" <json> " " <double> ";"
//! status ::= "status " <int> ";"
//! ```
//!
//! Parsers take the raw text and return the decoded value together with
//! the unconsumed suffix. Renderers produce text the parsers accept.
//!
//! # Example
//!
//! ```rust
//! use kuba_databus::protocol::wire::{parse_event, render_event};
//! use kuba_databus::types::Event;
//!
//! let (event, rest) = parse_event("event 4|temp 23.5 1000;").unwrap();
//! assert_eq!(event, Event::new("temp", 23.5, 1000.0));
//! assert_eq!(rest, "");
//! assert_eq!(render_event(&event), "event 4|temp 23.5 1000;");
//! ```

use super::error::{ParseError, ParseErrorKind};
use crate::types::{Data, Event, Message, MAX_EVENT_NAME_LEN};

/// Default maximum serialized payload size in bytes
pub const DEFAULT_MAX_PACKET: usize = 32 * 1024;

/// Literals checked before the generic numeric scan, in match order
const SPECIAL_DOUBLES: [(&str, f64); 6] = [
    ("nan", f64::NAN),
    ("NaN", f64::NAN),
    ("inf", f64::INFINITY),
    ("Infinity", f64::INFINITY),
    ("-inf", f64::NEG_INFINITY),
    ("-Infinity", f64::NEG_INFINITY),
];

fn is_double_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')
}

fn unexpected(input: &str, expected: &str) -> ParseErrorKind {
    match input.chars().next() {
        Some(c) => ParseErrorKind::UnexpectedChar {
            char: c,
            expected: expected.to_string(),
        },
        None => ParseErrorKind::UnexpectedEof,
    }
}

/// Parse a floating-point literal, including the IEEE special values
///
/// Returns the value and the text following the literal.
pub fn parse_double(input: &str) -> Result<(f64, &str), ParseError> {
    for (literal, value) in SPECIAL_DOUBLES {
        if let Some(rest) = input.strip_prefix(literal) {
            return Ok((value, rest));
        }
    }

    let end = input
        .find(|c: char| !is_double_char(c))
        .unwrap_or(input.len());
    let (literal, rest) = input.split_at(end);

    if literal.is_empty() {
        return Err(ParseError::new(unexpected(input, "number")).with_context(input));
    }

    literal.parse::<f64>().map(|v| (v, rest)).map_err(|_| {
        ParseError::new(ParseErrorKind::InvalidNumber {
            literal: literal.to_string(),
        })
    })
}

/// Parse an unsigned decimal integer; at least one digit is required
pub fn parse_uint(input: &str) -> Result<(u64, &str), ParseError> {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, rest) = input.split_at(end);

    if digits.is_empty() {
        return Err(ParseError::new(unexpected(input, "digit")).with_context(input));
    }

    digits.parse::<u64>().map(|v| (v, rest)).map_err(|_| {
        ParseError::new(ParseErrorKind::InvalidNumber {
            literal: digits.to_string(),
        })
    })
}

/// Position-tracking reader over one command
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(kind)
            .at_column(self.pos)
            .with_context(self.rest())
    }

    fn advance_to(&mut self, rest: &'a str) {
        self.pos = self.input.len() - rest.len();
    }

    fn expect(&mut self, literal: &str) -> Result<(), ParseError> {
        match self.rest().strip_prefix(literal) {
            Some(rest) => {
                self.advance_to(rest);
                Ok(())
            },
            None => Err(self.error(unexpected(self.rest(), &format!("'{}'", literal)))),
        }
    }

    fn uint(&mut self) -> Result<u64, ParseError> {
        let (value, rest) = parse_uint(self.rest()).map_err(|e| e.at_column(self.pos))?;
        self.advance_to(rest);
        Ok(value)
    }

    fn length(&mut self) -> Result<usize, ParseError> {
        let start = self.pos;
        let value = self.uint()?;
        usize::try_from(value).map_err(|_| {
            ParseError::new(ParseErrorKind::InvalidNumber {
                literal: value.to_string(),
            })
            .at_column(start)
        })
    }

    fn double(&mut self) -> Result<f64, ParseError> {
        let (value, rest) = parse_double(self.rest()).map_err(|e| e.at_column(self.pos))?;
        self.advance_to(rest);
        Ok(value)
    }

    fn take(&mut self, len: usize) -> Result<&'a str, ParseError> {
        let rest = self.rest();
        if rest.len() < len {
            return Err(self.error(ParseErrorKind::UnexpectedEof));
        }
        if !rest.is_char_boundary(len) {
            return Err(self.error(ParseErrorKind::InvalidUtf8));
        }
        let (taken, rest) = rest.split_at(len);
        self.advance_to(rest);
        Ok(taken)
    }

    fn terminator(&mut self) -> Result<&'a str, ParseError> {
        match self.rest().strip_prefix(';') {
            Some(rest) => Ok(rest),
            None => Err(self.error(ParseErrorKind::MissingTerminator)),
        }
    }
}

/// Codec configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    /// Maximum serialized size of a `data` payload in bytes
    pub max_packet: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_packet: DEFAULT_MAX_PACKET,
        }
    }
}

/// Parser for the `event`, `data` and `status` commands
#[derive(Debug, Clone, Default)]
pub struct WireCodec {
    config: CodecConfig,
}

impl WireCodec {
    /// Create a codec with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with custom configuration
    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Maximum accepted payload size
    pub fn max_packet(&self) -> usize {
        self.config.max_packet
    }

    /// Parse an `event` command
    pub fn parse_event<'a>(&self, input: &'a str) -> Result<(Event, &'a str), ParseError> {
        let mut c = Cursor::new(input);
        c.expect("event ")?;
        let len = c.length()?;
        if len > MAX_EVENT_NAME_LEN {
            return Err(c.error(ParseErrorKind::NameTooLong {
                len,
                max: MAX_EVENT_NAME_LEN,
            }));
        }
        c.expect("|")?;
        let name = c.take(len)?;
        c.expect(" ")?;
        let value = c.double()?;
        c.expect(" ")?;
        let timestamp = c.double()?;
        let rest = c.terminator()?;

        Ok((Event::new(name, value, timestamp), rest))
    }

    /// Parse a `data` command
    pub fn parse_data<'a>(&self, input: &'a str) -> Result<(Data, &'a str), ParseError> {
        let mut c = Cursor::new(input);
        c.expect("data ")?;
        let name_len = c.length()?;
        c.expect("|")?;
        let name = c.take(name_len)?;
        c.expect(" ")?;
        let payload_len = c.length()?;
        if payload_len > self.config.max_packet {
            return Err(c.error(ParseErrorKind::PayloadTooLarge {
                size: payload_len,
                max: self.config.max_packet,
            }));
        }
        c.expect("|")?;
        let payload_at = c.pos;
        let payload = c.take(payload_len)?;
        c.expect(" ")?;
        let timestamp = c.double()?;
        let rest = c.terminator()?;

        let value = serde_json::from_str(payload).map_err(|e| {
            ParseError::new(ParseErrorKind::InvalidJson {
                reason: e.to_string(),
            })
            .at_column(payload_at)
            .with_context(payload)
        })?;

        Ok((Data::new(name, value, timestamp), rest))
    }

    /// Parse a `status` command, returning the status code
    pub fn parse_status<'a>(&self, input: &'a str) -> Result<(u64, &'a str), ParseError> {
        let mut c = Cursor::new(input);
        c.expect("status ")?;
        let code = c.uint()?;
        let rest = c.terminator()?;
        Ok((code, rest))
    }

    /// Best-effort `event` parse: any failure yields `(None, "")`
    pub fn parse_event_lossy<'a>(&self, input: &'a str) -> (Option<Event>, &'a str) {
        match self.parse_event(input) {
            Ok((event, rest)) => (Some(event), rest),
            Err(_) => (None, ""),
        }
    }

    /// Best-effort `data` parse: any failure yields `(None, "")`
    pub fn parse_data_lossy<'a>(&self, input: &'a str) -> (Option<Data>, &'a str) {
        match self.parse_data(input) {
            Ok((data, rest)) => (Some(data), rest),
            Err(_) => (None, ""),
        }
    }

    /// Best-effort `status` parse
    pub fn parse_status_lossy<'a>(&self, input: &'a str) -> Option<(u64, &'a str)> {
        self.parse_status(input).ok()
    }
}

/// Parse an `event` command with the default codec
pub fn parse_event(input: &str) -> Result<(Event, &str), ParseError> {
    WireCodec::new().parse_event(input)
}

/// Parse a `data` command with the default codec
pub fn parse_data(input: &str) -> Result<(Data, &str), ParseError> {
    WireCodec::new().parse_data(input)
}

/// Parse a `status` command with the default codec
pub fn parse_status(input: &str) -> Result<(u64, &str), ParseError> {
    WireCodec::new().parse_status(input)
}

/// Render a double so that [`parse_double`] reads back the same value
pub fn render_double(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        value.to_string()
    }
}

/// Render an event command
pub fn render_event(event: &Event) -> String {
    format!(
        "event {}|{} {} {};",
        event.name.len(),
        event.name,
        render_double(event.value),
        render_double(event.timestamp)
    )
}

/// Render a data command
pub fn render_data(data: &Data) -> String {
    let payload = data.value.to_string();
    format!(
        "data {}|{} {}|{} {};",
        data.name.len(),
        data.name,
        payload.len(),
        payload,
        render_double(data.timestamp)
    )
}

/// Render a status command
pub fn render_status(code: u64) -> String {
    format!("status {};", code)
}

/// Render a single message
pub fn render_message(message: &Message) -> String {
    match message {
        Message::Event(e) => render_event(e),
        Message::Data(d) => render_data(d),
    }
}

/// Render a batch of messages into one packet
pub fn render_batch(messages: &[Message]) -> Vec<u8> {
    let mut packet = Vec::new();
    for message in messages {
        packet.extend_from_slice(render_message(message).as_bytes());
    }
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_double_special_values() {
        let cases = [
            ("nan", 3),
            ("NaN", 3),
            ("inf", 3),
            ("Infinity", 8),
            ("-inf", 4),
            ("-Infinity", 9),
        ];

        for (literal, consumed) in cases {
            let input = format!("{} tail", literal);
            let (value, rest) = parse_double(&input).unwrap();
            assert_eq!(rest.len(), input.len() - consumed, "literal {}", literal);
            assert_eq!(rest, " tail");
            if literal.to_lowercase().contains("nan") {
                assert!(value.is_nan());
            } else if literal.starts_with('-') {
                assert_eq!(value, f64::NEG_INFINITY);
            } else {
                assert_eq!(value, f64::INFINITY);
            }
        }
    }

    #[test]
    fn test_parse_double_numeric() {
        assert_eq!(parse_double("23.5 x").unwrap(), (23.5, " x"));
        assert_eq!(parse_double("-1e3;").unwrap(), (-1000.0, ";"));
        assert_eq!(parse_double("1E-2").unwrap(), (0.01, ""));
        assert_eq!(parse_double("+4").unwrap(), (4.0, ""));
    }

    #[test]
    fn test_parse_double_errors() {
        assert!(parse_double("").unwrap_err().is_syntax_error());
        assert!(parse_double("x1").unwrap_err().is_syntax_error());
        let err = parse_double("1-2").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidNumber { .. }));
    }

    #[test]
    fn test_parse_uint() {
        assert_eq!(parse_uint("123|x").unwrap(), (123, "|x"));
        assert_eq!(parse_uint("0").unwrap(), (0, ""));
        assert!(parse_uint("|x").is_err());
        assert!(parse_uint("").is_err());
        assert!(parse_uint("99999999999999999999999").is_err());
    }

    #[test]
    fn test_parse_event() {
        let (event, rest) = parse_event("event 4|temp 23.5 1000;").unwrap();
        assert_eq!(event, Event::new("temp", 23.5, 1000.0));
        assert_eq!(rest, "");
    }

    #[test]
    fn test_parse_event_keeps_suffix() {
        let (event, rest) = parse_event("event 3|cpu 1.0 2000;event 1|x 1 2;").unwrap();
        assert_eq!(event.name, "cpu");
        assert_eq!(rest, "event 1|x 1 2;");
    }

    #[test]
    fn test_parse_event_name_with_separators() {
        let (event, _) = parse_event("event 9|a b|c;d;e 1 2;").unwrap();
        assert_eq!(event.name, "a b|c;d;e");
    }

    #[test]
    fn test_parse_event_special_values() {
        let (event, _) = parse_event("event 1|x nan -Infinity;").unwrap();
        assert!(event.value.is_nan());
        assert_eq!(event.timestamp, f64::NEG_INFINITY);
    }

    #[test]
    fn test_parse_event_requires_terminator() {
        let err = parse_event("event 4|temp 23.5 1000").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingTerminator);
        assert_eq!(err.column, Some(22));

        let err = parse_event("event 4|temp 23.5 1000 ;").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingTerminator);
    }

    #[test]
    fn test_parse_event_syntax_errors() {
        assert!(parse_event("evnt 4|temp 1 2;").unwrap_err().is_syntax_error());
        assert!(parse_event("event |temp 1 2;").unwrap_err().is_syntax_error());
        assert!(parse_event("event 10|temp 1 2;").unwrap_err().is_syntax_error());
        assert!(parse_event("event 4|temp  1 2;").unwrap_err().is_syntax_error());
    }

    #[test]
    fn test_parse_event_name_limit() {
        let name = "n".repeat(256);
        let input = format!("event 256|{} 1 2;", name);
        let err = parse_event(&input).unwrap_err();
        assert!(err.is_size_limit());
    }

    #[test]
    fn test_parse_event_length_splitting_a_char() {
        let err = parse_event("event 1|é 1 2;").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidUtf8);
    }

    #[test]
    fn test_parse_data() {
        let (data, rest) = parse_data(r#"data 4|temp 7|{"a":1} 1000;"#).unwrap();
        assert_eq!(data, Data::new("temp", json!({"a": 1}), 1000.0));
        assert_eq!(rest, "");
    }

    #[test]
    fn test_parse_data_payload_with_semicolon() {
        let (data, _) = parse_data(r#"data 1|x 9|["a;b",1] 5;"#).unwrap();
        assert_eq!(data.value, json!(["a;b", 1]));
    }

    #[test]
    fn test_parse_data_invalid_json() {
        let err = parse_data("data 1|x 3|{a} 5;").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::InvalidJson { .. }));
    }

    #[test]
    fn test_parse_data_size_limit() {
        let codec = WireCodec::with_config(CodecConfig { max_packet: 4 });
        let err = codec.parse_data(r#"data 1|x 7|{"a":1} 5;"#).unwrap_err();
        assert!(err.is_size_limit());
        assert!(!err.is_syntax_error());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("status 0;").unwrap(), (0, ""));
        assert_eq!(parse_status("status 200;rest").unwrap(), (200, "rest"));
        assert!(parse_status("status -1;").is_err());
        assert!(parse_status("status 1").is_err());

        let codec = WireCodec::new();
        assert_eq!(codec.parse_status_lossy("status 0;"), Some((0, "")));
        assert_eq!(codec.parse_status_lossy("status ;"), None);
    }

    #[test]
    fn test_lossy_variants() {
        let codec = WireCodec::new();
        assert_eq!(codec.parse_event_lossy("event 4|te"), (None, ""));
        assert_eq!(codec.parse_data_lossy("data x"), (None, ""));

        let (event, rest) = codec.parse_event_lossy("event 1|a 1 2;tail");
        assert_eq!(event, Some(Event::new("a", 1.0, 2.0)));
        assert_eq!(rest, "tail");
    }

    #[test]
    fn test_render_and_parse_back() {
        let event = Event::new("disk.used", 0.1 + 0.2, 1_700_000_000.125);
        let rendered = render_event(&event);
        let (parsed, rest) = parse_event(&rendered).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(rest, "");

        let data = Data::new("cfg", json!({"k": [1, 2, "x;y"]}), 3.5);
        let rendered = render_data(&data);
        let (parsed, _) = parse_data(&rendered).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_render_special_doubles() {
        assert_eq!(render_double(f64::NAN), "nan");
        assert_eq!(render_double(f64::INFINITY), "inf");
        assert_eq!(render_double(f64::NEG_INFINITY), "-inf");
        assert_eq!(render_double(1000.0), "1000");
        assert_eq!(render_status(7), "status 7;");
    }

    #[test]
    fn test_render_batch_concatenates() {
        let batch = vec![
            Message::from(Event::new("a", 1.0, 2.0)),
            Message::from(Event::new("b", 3.0, 4.0)),
        ];
        assert_eq!(
            render_batch(&batch),
            b"event 1|a 1 2;event 1|b 3 4;".to_vec()
        );
    }
}
