use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kuba_databus::protocol::{parse_event, render_batch, FrameReassembler};
use kuba_databus::types::{Data, Event, Message};
use serde_json::json;

fn create_messages(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            if i % 5 == 0 {
                Message::Data(Data::new(
                    format!("host{}|app|config", i),
                    json!({"seq": i, "tags": ["a", "b"]}),
                    1_700_000_000.0 + i as f64,
                ))
            } else {
                Message::Event(Event::new(
                    format!("host{}|nginx|requests", i),
                    100.0 + (i as f64 * 0.5),
                    1_700_000_000.0 + i as f64,
                ))
            }
        })
        .collect()
}

fn bench_parse_event(c: &mut Criterion) {
    let frame = "event 20|web01|nginx|requests 1234.5 1700000000;";
    c.bench_function("parse_event", |b| {
        b.iter(|| black_box(parse_event(black_box(frame)).unwrap()))
    });
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_batch");

    for size in [10, 100, 1000].iter() {
        let messages = create_messages(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(render_batch(&messages)))
        });
    }

    group.finish();
}

fn bench_reassemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassemble");
    let reassembler = FrameReassembler::default();

    for size in [10, 100, 1000].iter() {
        let packet = render_batch(&create_messages(*size));
        group.throughput(Throughput::Bytes(packet.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(reassembler.decode(&packet)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_event, bench_render, bench_reassemble);
criterion_main!(benches);
