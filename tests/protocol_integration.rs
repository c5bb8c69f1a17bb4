//! Protocol integration tests across the wire, JSON and legacy decoders

use kuba_databus::protocol::{
    parse_data, parse_event, parse_event_legacy, parse_json_metric, parse_status, render_batch,
    render_status, CodecConfig, FrameReassembler, ParseErrorKind, WireCodec,
};
use kuba_databus::types::{Data, Event, Message, MetricKind};
use serde_json::json;

#[test]
fn test_parsers_chain_through_rest() {
    let input = r#"event 4|temp 23.5 1000;data 4|conf 7|{"a":1} 1000;status 0;"#;

    let (event, rest) = parse_event(input).unwrap();
    assert_eq!(event, Event::new("temp", 23.5, 1000.0));

    let (data, rest) = parse_data(rest).unwrap();
    assert_eq!(data, Data::new("conf", json!({"a": 1}), 1000.0));

    let (code, rest) = parse_status(rest).unwrap();
    assert_eq!(code, 0);
    assert_eq!(rest, "");
}

#[test]
fn test_special_doubles_on_the_wire() {
    let (nan, _) = parse_event("event 1|x nan 5;").unwrap();
    assert!(nan.value.is_nan());

    let (inf, _) = parse_event("event 1|x -Infinity 5;").unwrap();
    assert_eq!(inf.value, f64::NEG_INFINITY);

    let packet = render_batch(&[Message::Event(Event::new("x", f64::INFINITY, 5.0))]);
    assert_eq!(packet, b"event 1|x inf 5;");
}

#[test]
fn test_rendered_batch_decodes_identically() {
    let messages = vec![
        Message::Event(Event::new("name with spaces | and pipes", -0.25, 1.5)),
        Message::Data(Data::new("d", json!(["x", {"y": null}]), 2.0)),
        Message::Event(Event::new("ünïcödé", 1e-9, 3.0)),
    ];
    let decoded = FrameReassembler::default().decode(&render_batch(&messages));
    assert_eq!(decoded.messages, messages);
    assert_eq!(decoded.stats.frames_dropped, 0);
}

#[test]
fn test_codec_packet_limit() {
    let codec = WireCodec::with_config(CodecConfig { max_packet: 4 });
    let err = codec.parse_data(r#"data 1|d 7|{"a":1} 1;"#).unwrap_err();
    assert!(err.is_size_limit());
    assert!(matches!(err.kind, ParseErrorKind::PayloadTooLarge { size: 7, max: 4 }));

    let reassembler = FrameReassembler::new(codec);
    let out = reassembler.decode(br#"data 1|d 7|{"a":1} 1;event 1|e 1 1;"#);
    assert_eq!(out.messages, vec![Message::Event(Event::new("e", 1.0, 1.0))]);
}

#[test]
fn test_status_render_parse() {
    let rendered = render_status(42);
    assert_eq!(parse_status(&rendered).unwrap(), (42, ""));
    assert!(parse_status("status -1;").is_err());
}

#[test]
fn test_json_and_legacy_agree_with_wire() {
    let metrics =
        parse_json_metric(r#"[{"value": 23.5, "type": "gauge", "timestamp": 1000}]"#, "temp")
            .unwrap();
    assert_eq!(metrics[0].kind(), MetricKind::Gauge);

    let legacy = parse_event_legacy("temp: 23.5 1000").unwrap();
    let (wire, _) = parse_event("event 4|temp 23.5 1000;").unwrap();

    assert_eq!(metrics[0].reading(), &wire);
    assert_eq!(legacy, wire);
}

#[test]
fn test_legacy_name_truncation() {
    let long = "n".repeat(300);
    let event = parse_event_legacy(&format!("{}: 1 2", long)).unwrap();
    assert_eq!(event.name.len(), 255);

    // Wire names over the limit are rejected instead
    let frame = format!("event {}|{} 1 2;", long.len(), long);
    assert!(parse_event(&frame).unwrap_err().is_size_limit());
}
