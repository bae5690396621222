//! Precomputation pipeline: agreement with the online path, resume after
//! interruption, and small-capacity spill behavior.

use collox::{
    CancellationToken, Engine, Error, PrecomputeConfig, QueryConfig, SketchReader,
};

use crate::common::*;

fn online(
    engine: &Engine,
    head: &str,
    relation: &str,
) -> Vec<collox::Collocation> {
    engine
        .find_collocations(head, relation, &QueryConfig::default(), &CancellationToken::new())
        .unwrap()
        .into_complete()
        .unwrap()
}

#[test]
fn precompute_agrees_with_online_counts_and_scores() {
    let mut corpus = corpus_a();
    corpus.extend(corpus_c());
    let dir = build_test_corpus(&corpus);
    let engine = Engine::open(dir.path(), test_catalog()).unwrap();

    // Capture the online answers before any .cx files exist.
    let online_answers: Vec<(&str, Vec<collox::Collocation>)> = ["dog", "house", "cat", "wall"]
        .iter()
        .map(|head| (*head, online(&engine, head, "adj_mod")))
        .collect();

    engine
        .precompute(PrecomputeConfig::default(), &CancellationToken::new())
        .unwrap();
    drop(engine);

    let engine = Engine::open(dir.path(), test_catalog()).unwrap();
    for (head, expected) in online_answers {
        let served = online(&engine, head, "adj_mod");
        assert_eq!(served.len(), expected.len(), "head {head:?}");
        for (got, want) in served.iter().zip(&expected) {
            assert_eq!(got.lemma, want.lemma, "head {head:?}");
            assert_eq!(got.cooccurrence, want.cooccurrence, "head {head:?}");
            assert!(
                (got.score - want.score).abs() < 1e-4,
                "head {head:?}: {} vs {}",
                got.score,
                want.score
            );
        }
    }
}

#[test]
fn precomputed_reader_exposes_zero_copy_entries() {
    let dir = build_test_corpus(&corpus_c());
    let engine = Engine::open(dir.path(), test_catalog()).unwrap();
    engine
        .precompute(PrecomputeConfig::default(), &CancellationToken::new())
        .unwrap();
    drop(engine);

    let reader = SketchReader::open(&dir.path().join("noun_compound.cx")).unwrap();
    let entry = reader.lookup("house").unwrap().unwrap();
    assert_eq!(entry.head, "house");
    assert_eq!(entry.collocates[0].lemma, "coffee");
    assert_eq!(entry.collocates[0].cooccurrence, 1);
    assert!(reader.lookup("zzz").unwrap().is_none());
}

#[test]
fn cancelled_precompute_resumes_to_identical_output() {
    let mut corpus = corpus_a();
    corpus.extend(corpus_b());
    corpus.extend(corpus_c());

    // Reference: one uninterrupted run.
    let reference_dir = build_test_corpus(&corpus);
    let engine = Engine::open(reference_dir.path(), test_catalog()).unwrap();
    engine
        .precompute(PrecomputeConfig::default(), &CancellationToken::new())
        .unwrap();
    drop(engine);

    // Interrupted run: cancel immediately, then resume.
    let resumed_dir = build_test_corpus(&corpus);
    let engine = Engine::open(resumed_dir.path(), test_catalog()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine
        .precompute(PrecomputeConfig::default(), &cancel)
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    engine
        .precompute(PrecomputeConfig::default(), &CancellationToken::new())
        .unwrap();
    drop(engine);

    for relation in ["adj_mod", "adj_predicate", "noun_compound", "near"] {
        let file = format!("{relation}.cx");
        let a = std::fs::read(reference_dir.path().join(&file)).unwrap();
        let b = std::fs::read(resumed_dir.path().join(&file)).unwrap();
        assert_eq!(a, b, "{file} differs after resume");
    }
}

#[test]
fn tiny_flush_threshold_spills_and_merges_correctly() {
    let mut corpus = corpus_a();
    corpus.extend(corpus_c());
    let dir = build_test_corpus(&corpus);
    let engine = Engine::open(dir.path(), test_catalog()).unwrap();

    // Flush after every sentence: every pair crosses the run-file path.
    let config = PrecomputeConfig {
        flush_entries: 1,
        num_shards: 4,
        ..Default::default()
    };
    engine.precompute(config, &CancellationToken::new()).unwrap();
    drop(engine);

    let reader = SketchReader::open(&dir.path().join("adj_mod.cx")).unwrap();
    let entry = reader.lookup("dog").unwrap().unwrap();
    assert_eq!(entry.collocates[0].lemma, "big");
    assert_eq!(entry.collocates[0].cooccurrence, 1);

    let house = reader.lookup("house").unwrap().unwrap();
    assert_eq!(house.collocates[0].lemma, "red");
}
