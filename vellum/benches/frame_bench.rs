use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vellum::frame::{flags, FrameHeader, FrameType};

fn header_encode_bench(c: &mut Criterion) {
    c.bench_function("frame_header_encode", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(9);
            FrameHeader::new(black_box(16_384), FrameType::Data, flags::END_STREAM, black_box(7)).encode(&mut out);
            black_box(out);
        });
    });
}

fn header_decode_bench(c: &mut Criterion) {
    let mut buf = Vec::new();
    FrameHeader::new(16_384, FrameType::Data, flags::END_STREAM, 7).encode(&mut buf);

    c.bench_function("frame_header_decode", |b| {
        b.iter(|| black_box(FrameHeader::decode(black_box(&buf))));
    });
}

fn write_frame_bench(c: &mut Criterion) {
    let payload = vec![0u8; 16_384];

    c.bench_function("frame_write_max_size_data_frame", |b| {
        b.iter(|| {
            let mut out = Vec::new();
            FrameHeader::write_frame(FrameType::Data, 0, 1, black_box(&payload), &mut out);
            black_box(out);
        });
    });
}

criterion_group!(benches, header_encode_bench, header_decode_bench, write_frame_bench);
criterion_main!(benches);
