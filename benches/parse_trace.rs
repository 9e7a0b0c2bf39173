//! Trace-parsing throughput benchmarks.
//!
//! Measures the line parser over a synthetic trace body, which dominates
//! the wall-clock time of a real analysis pass.

use std::io::Cursor;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use kvmlat::event::{ReasonTable, Source};
use kvmlat::parse::TraceStream;

const LINES: usize = 10_000;

fn synthetic_trace() -> String {
    let mut text = String::with_capacity(LINES * 96);
    text.push_str("# tracer: nop\n");
    for i in 0..LINES {
        let ts = 381_900_000_000i64 + (i as i64) * 937;
        let line = match i % 4 {
            0 => format!(
                "{:>23} [002] d... {}: kvm_exit: reason EPT_MISCONFIG rip 0xf info 0 0\n",
                "qemu-system-x86-1123", ts
            ),
            1 => format!(
                "{:>23} [002] d... {}: kvm_mmio: mmio write len 4 gpa 0xfebc0034 val 0x1\n",
                "qemu-system-x86-1123", ts
            ),
            2 => format!(
                "{:>23} [002] d... {}: kvm_entry: vcpu 0\n",
                "qemu-system-x86-1123", ts
            ),
            _ => format!(
                "{:>23} [001] .... {}: sys_sendto(fd: 4, buff: 7ffe, len: 64)\n",
                "netperf-2156", ts
            ),
        };
        text.push_str(&line);
    }
    text
}

fn bench_parse_stream(c: &mut Criterion) {
    let text = synthetic_trace();
    let reasons = ReasonTable::builtin();

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("trace_stream_10k_lines", |b| {
        b.iter(|| {
            let stream =
                TraceStream::parse(Cursor::new(text.as_bytes()), Source::Host, &reasons)
                    .expect("synthetic trace parses");
            black_box(stream.events.len());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_parse_stream);
criterion_main!(benches);
