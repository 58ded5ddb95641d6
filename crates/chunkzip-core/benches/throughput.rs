use criterion::{Criterion, Throughput, criterion_group, criterion_main};

use chunkzip_core::{ChunkCodec, ChunkFraming, GzipCodec, Pipeline, PipelineOptions};

const INPUT_SIZE: usize = 8 * 1024 * 1024;

fn build_input() -> Vec<u8> {
    let line = b"the quick brown fox jumps over the lazy dog 0123456789\n";
    line.iter().copied().cycle().take(INPUT_SIZE).collect()
}

fn bench_codec(c: &mut Criterion) {
    let data = build_input();
    let chunk = &data[..1024 * 1024];
    let codec = GzipCodec::default();

    let mut group = c.benchmark_group("gzip_codec");
    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("encode_1mb", |b| {
        b.iter(|| codec.encode(std::hint::black_box(chunk)))
    });

    let encoded = match codec.encode(chunk) {
        Ok(encoded) => encoded.payload,
        Err(error) => panic!("encode failed: {error}"),
    };
    group.bench_function("decode_1mb", |b| {
        b.iter(|| codec.decode(std::hint::black_box(&encoded), chunk.len()))
    });
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let data = build_input();
    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(error) => panic!("tempdir failed: {error}"),
    };
    let plain = dir.path().join("input.bin");
    let packed = dir.path().join("input.cz");
    let restored = dir.path().join("restored.bin");
    if let Err(error) = std::fs::write(&plain, &data) {
        panic!("fixture write failed: {error}");
    }

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for framing in [ChunkFraming::LengthPrefixed, ChunkFraming::GzipMember] {
        group.bench_function(format!("compress_8mb_{framing}"), |b| {
            b.iter(|| {
                let options = PipelineOptions::compress(&plain, &packed)
                    .with_chunk_size(256 * 1024)
                    .with_framing(framing);
                Pipeline::create(options).and_then(|pipeline| pipeline.process())
            })
        });

        group.bench_function(format!("decompress_8mb_{framing}"), |b| {
            b.iter(|| {
                let options = PipelineOptions::decompress(&packed, &restored).with_framing(framing);
                Pipeline::create(options).and_then(|pipeline| pipeline.process())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_pipeline);
criterion_main!(benches);
