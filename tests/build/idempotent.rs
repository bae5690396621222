//! Idempotent-build and statistics-consistency properties.

use std::io::Cursor;

use collox::{
    build_corpus, BuildConfig, CancellationToken, LexiconReader, StatsReader, LEXICON_FILE,
    STATS_FILE, STATS_TSV_FILE,
};

use crate::common::*;

#[test]
fn building_twice_is_byte_identical() {
    let corpus = corpus_b();
    let text = conllu(&corpus);
    let dirs = [tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap()];
    for dir in &dirs {
        build_corpus(
            Cursor::new(text.as_str()),
            dir.path(),
            &BuildConfig::default(),
            &CancellationToken::new(),
        )
        .unwrap();
    }
    for file in [LEXICON_FILE, STATS_FILE, STATS_TSV_FILE] {
        let a = std::fs::read(dirs[0].path().join(file)).unwrap();
        let b = std::fs::read(dirs[1].path().join(file)).unwrap();
        assert_eq!(a, b, "{file} differs between identical builds");
    }
    // Segment files too: same input, same bytes.
    let seg_a = std::fs::read(dirs[0].path().join("index/seg-00000.clxs")).unwrap();
    let seg_b = std::fs::read(dirs[1].path().join("index/seg-00000.clxs")).unwrap();
    assert_eq!(seg_a, seg_b);
}

#[test]
fn lexicon_ids_are_dense_and_recoverable() {
    let dir = build_test_corpus(&corpus_a());
    let lexicon = LexiconReader::open(&dir.path().join(LEXICON_FILE)).unwrap();
    assert!(!lexicon.is_empty());
    for id in 0..lexicon.len() as u32 {
        let lemma = lexicon.lemma_of(id).unwrap();
        assert!(!lemma.is_empty());
        assert_eq!(lexicon.id_of(lemma), Some(id), "reverse lookup of {lemma:?}");
    }
}

#[test]
fn statistics_are_consistent_with_totals() {
    let dir = build_test_corpus(&corpus_b());
    let lexicon = LexiconReader::open(&dir.path().join(LEXICON_FILE)).unwrap();
    let stats = StatsReader::open(&dir.path().join(STATS_FILE)).unwrap();

    assert_eq!(stats.total_tokens(), lexicon.total_tokens());
    assert_eq!(stats.total_sentences(), lexicon.total_sentences());

    let mut sum = 0u64;
    for id in 0..stats.len() as u32 {
        sum += stats.frequency_of_id(id);
        let lemma = lexicon.lemma_of(id).unwrap();
        assert!(
            stats.doc_frequency_of(lemma) <= stats.total_sentences(),
            "doc_freq({lemma}) exceeds sentence count"
        );
        assert_eq!(stats.frequency_of(lemma), lexicon.frequency_of(lemma));
    }
    assert_eq!(sum, stats.total_tokens());
}

#[test]
fn tsv_sidecar_agrees_with_binary_stats() {
    let dir = build_test_corpus(&corpus_a());
    let stats = StatsReader::open(&dir.path().join(STATS_FILE)).unwrap();
    let tsv = std::fs::read_to_string(dir.path().join(STATS_TSV_FILE)).unwrap();

    for line in tsv.lines().filter(|l| !l.starts_with('#')) {
        let mut fields = line.split('\t');
        let lemma = fields.next().unwrap();
        let freq: u64 = fields.next().unwrap().parse().unwrap();
        let doc_freq: u64 = fields.next().unwrap().parse().unwrap();
        assert_eq!(stats.frequency_of(lemma), freq, "tsv freq for {lemma:?}");
        assert_eq!(stats.doc_frequency_of(lemma), doc_freq);
    }
}

#[test]
fn sentence_ids_follow_ingestion_order() {
    let corpus = corpus_c();
    let (_dir, engine) = open_engine(&corpus);
    let index = engine.index();
    assert_eq!(index.doc_count() as usize, corpus.len());
    for (expected_id, words) in corpus.iter().enumerate() {
        let sentence = index.sentence(expected_id as u32).unwrap();
        assert_eq!(sentence.id, expected_id as u32);
        assert_eq!(sentence.tokens.len(), words.len());
        for (token, (word, lemma, _)) in sentence.tokens.iter().zip(words) {
            assert_eq!(token.word, *word);
            assert_eq!(token.lemma, *lemma);
        }
    }
}
