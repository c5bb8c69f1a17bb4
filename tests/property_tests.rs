//! Property-based tests for the codec and slot addressing

use kuba_databus::protocol::{
    parse_double, parse_event, render_batch, wire::render_double, wire::render_event,
    FrameReassembler,
};
use kuba_databus::storage::{
    norm_field, norm_hostname, slot_to_time, time_to_slot, SLOTS_PER_DAY,
};
use kuba_databus::types::{Event, Message};
use proptest::prelude::*;

fn finite() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::ZERO | prop::num::f64::SUBNORMAL
}

proptest! {
    #[test]
    fn prop_event_round_trip(
        name in "\\PC{0,60}",
        value in finite(),
        timestamp in 0.0f64..4_000_000_000.0,
    ) {
        let event = Event::new(name, value, timestamp);
        let rendered = render_event(&event);
        let (parsed, rest) = parse_event(&rendered).unwrap();
        prop_assert_eq!(parsed, event);
        prop_assert_eq!(rest, "");
    }

    #[test]
    fn prop_double_round_trip(value in finite()) {
        let rendered = render_double(value);
        let (parsed, rest) = parse_double(&rendered).unwrap();
        prop_assert_eq!(parsed, value);
        prop_assert!(rest.is_empty());
    }

    #[test]
    fn prop_slot_bijection(index in 0u32..SLOTS_PER_DAY as u32) {
        let (hour, minute) = slot_to_time(index).unwrap();
        prop_assert!(hour < 24 && minute < 60);
        prop_assert_eq!(time_to_slot(hour, minute).unwrap().index(), index);
    }

    #[test]
    fn prop_out_of_range_rejected(hour in 24u32..1000, minute in 60u32..1000, slot in 1440u32..100_000) {
        prop_assert!(time_to_slot(hour, 0).is_err());
        prop_assert!(time_to_slot(0, minute).is_err());
        prop_assert!(slot_to_time(slot).is_err());
    }

    #[test]
    fn prop_normalization_idempotent(raw in "[ -~]{0,32}") {
        let host = norm_hostname(&raw);
        prop_assert_eq!(norm_hostname(&host), host.clone());
        prop_assert!(!host.contains(':') && !host.contains('-'));

        let field = norm_field(&raw);
        prop_assert_eq!(norm_field(&field), field.clone());
    }

    #[test]
    fn prop_reassembler_never_panics(chunk in prop::collection::vec(any::<u8>(), 0..512)) {
        let out = FrameReassembler::default().decode(&chunk);
        prop_assert!(out.messages.len() as u64 == out.stats.frames_decoded);
    }

    #[test]
    fn prop_batch_survives_reassembly(
        names in prop::collection::vec("[a-z| ]{1,16}", 1..20),
    ) {
        let messages: Vec<Message> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Message::Event(Event::new(name, i as f64, 1.0)))
            .collect();
        let decoded = FrameReassembler::default().decode(&render_batch(&messages));
        prop_assert_eq!(decoded.messages, messages);
    }
}
