//! Shared fixtures: tiny CoNLL-U corpora and a relation catalog covering
//! the common grammatical configurations.

#![allow(dead_code)]

use std::io::Cursor;

use tempfile::TempDir;

use collox::{build_corpus, BuildConfig, CancellationToken, Engine, RelationCatalog};

/// One test token: (word, lemma, xpos).
pub type Tok = (&'static str, &'static str, &'static str);

/// Render sentences as CoNLL-U. The sentence text joins the word forms
/// with single spaces.
pub fn conllu(sentences: &[Vec<Tok>]) -> String {
    let mut out = String::new();
    for tokens in sentences {
        let text: Vec<&str> = tokens.iter().map(|(w, _, _)| *w).collect();
        out.push_str(&format!("# text = {}\n", text.join(" ")));
        for (i, (word, lemma, xpos)) in tokens.iter().enumerate() {
            out.push_str(&format!(
                "{}\t{}\t{}\t_\t{}\t_\t0\tdep\t_\t_\n",
                i + 1,
                word,
                lemma,
                xpos
            ));
        }
        out.push('\n');
    }
    out
}

/// Build a corpus directory from test sentences.
pub fn build_test_corpus(sentences: &[Vec<Tok>]) -> TempDir {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("tempdir");
    build_corpus(
        Cursor::new(conllu(sentences)),
        dir.path(),
        &BuildConfig::default(),
        &CancellationToken::new(),
    )
    .expect("corpus build");
    dir
}

/// The relation catalog the scenario tests run against.
pub fn test_catalog() -> RelationCatalog {
    let json = r#"{
        "relations": [
            {
                "id": "adj_mod",
                "name": "adjective immediately before noun",
                "pattern": "[tag=jj] [tag=nn]",
                "head_index": 2,
                "collocate_index": 1,
                "window": 1
            },
            {
                "id": "adj_predicate",
                "name": "adjectival predicate with copula",
                "pattern": "[tag=nn] [lemma=be|seem|prove|appear] [tag=jj]",
                "head_index": 1,
                "collocate_index": 3,
                "window": 2
            },
            {
                "id": "noun_compound",
                "name": "noun compound",
                "pattern": "[tag=nn] [tag=nn]",
                "head_index": 2,
                "collocate_index": 1,
                "window": 1
            },
            {
                "id": "near",
                "name": "nearby words",
                "window": 3,
                "dual": true
            }
        ]
    }"#;
    let catalog: RelationCatalog = serde_json::from_str(json).expect("catalog json");
    catalog
}

/// Open an engine over a freshly built corpus.
pub fn open_engine(sentences: &[Vec<Tok>]) -> (TempDir, Engine) {
    let dir = build_test_corpus(sentences);
    let engine = Engine::open(dir.path(), test_catalog()).expect("engine open");
    (dir, engine)
}

/// Scenario A corpus: adjacent-adjective modifiers.
pub fn corpus_a() -> Vec<Vec<Tok>> {
    vec![
        vec![("big", "big", "JJ"), ("dog", "dog", "NN"), ("runs", "run", "VBZ")],
        vec![("red", "red", "JJ"), ("house", "house", "NN"), ("stands", "stand", "VBZ")],
        vec![("big", "big", "JJ"), ("cat", "cat", "NN"), ("sleeps", "sleep", "VBZ")],
        vec![("dog", "dog", "NN"), ("runs", "run", "VBZ"), ("fast", "fast", "RB")],
    ]
}

/// Scenario B corpus: copular predicates.
pub fn corpus_b() -> Vec<Vec<Tok>> {
    vec![
        vec![("theory", "theory", "NN"), ("is", "be", "VBZ"), ("correct", "correct", "JJ")],
        vec![("solution", "solution", "NN"), ("seems", "seem", "VBZ"), ("simple", "simple", "JJ")],
        vec![("theory", "theory", "NN"), ("proves", "prove", "VBZ"), ("useful", "useful", "JJ")],
        vec![("big", "big", "JJ"), ("dog", "dog", "NN"), ("runs", "run", "VBZ")],
    ]
}

/// Scenario C corpus: noun compounds.
pub fn corpus_c() -> Vec<Vec<Tok>> {
    vec![
        vec![("coffee", "coffee", "NN"), ("house", "house", "NN"), ("opens", "open", "VBZ")],
        vec![("stone", "stone", "NN"), ("wall", "wall", "NN"), ("stands", "stand", "VBZ")],
        vec![("big", "big", "JJ"), ("house", "house", "NN"), ("stands", "stand", "VBZ")],
    ]
}
