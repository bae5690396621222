//! Benchmarks for the per-sentence codecs, the hot path of both query-time
//! example rendering and the precompute scan.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use collox::codec::{decode_lemma_ids_into, decode_tokens, encode_lemma_ids, encode_tokens};
use collox::Token;

/// Sentence lengths covering the realistic range (median ~20, long tail).
const SENTENCE_LENGTHS: &[usize] = &[10, 50, 200];

fn make_tokens(len: usize) -> Vec<Token> {
    (0..len)
        .map(|i| Token {
            position: i as u32,
            word: format!("word{i}"),
            lemma: format!("lemma{i}"),
            tag: if i % 3 == 0 { "nn" } else { "vbz" }.to_string(),
            start: (i * 6) as u32,
            end: (i * 6 + 5) as u32,
            deprel: Some("nsubj".to_string()),
        })
        .collect()
}

fn bench_token_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_codec");
    for &len in SENTENCE_LENGTHS {
        let tokens = make_tokens(len);
        let mut blob = Vec::new();
        encode_tokens(&tokens, true, &mut blob);
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("encode", len), &tokens, |b, tokens| {
            b.iter(|| {
                let mut buf = Vec::new();
                encode_tokens(black_box(tokens), true, &mut buf);
                buf
            })
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &blob, |b, blob| {
            b.iter(|| decode_tokens(black_box(blob), true).unwrap())
        });
    }
    group.finish();
}

fn bench_lemma_id_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("lemma_id_codec");
    for &len in SENTENCE_LENGTHS {
        let ids: Vec<u32> = (0..len as u32).map(|i| i * 37 % 50_000).collect();
        let mut blob = Vec::new();
        encode_lemma_ids(&ids, &mut blob);
        group.throughput(Throughput::Elements(len as u64));

        group.bench_with_input(BenchmarkId::new("decode_into", len), &blob, |b, blob| {
            let mut buf = Vec::new();
            b.iter(|| {
                decode_lemma_ids_into(black_box(blob), &mut buf).unwrap();
                buf.len()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_token_codec, bench_lemma_id_codec);
criterion_main!(benches);
