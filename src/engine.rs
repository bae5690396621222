//! The engine handle: one opened corpus directory, ready for queries.
//!
//! An [`Engine`] owns read-only memory maps of the sentence index, the
//! lexicon, the statistics store, and any precomputed relation files found
//! next to them. It is safe to share across query tasks; nothing in the
//! query path mutates or locks. The caller drives the lifecycle: open,
//! query, drop (which releases the maps).
//!
//! Query dispatch: a `(head, relation)` query first consults the
//! precomputed store; only when the relation has no precomputed file does
//! the online path (compile, retrieve, verify, aggregate, score) run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::build::INDEX_DIR;
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::index::IndexReader;
use crate::lexicon::{LexiconReader, LEXICON_FILE};
use crate::precompute::{PrecomputeConfig, Precomputer, SketchReader, SKETCH_EXT};
use crate::query::compile::compile;
use crate::query::executor::{ConcordanceLine, Executor};
use crate::relations::{Relation, RelationCatalog};
use crate::scoring::ScoreKind;
use crate::stats::{StatsReader, STATS_FILE};
use crate::types::{normalize, Collocation, QueryConfig, QueryOutcome};

/// An opened, queryable corpus.
pub struct Engine {
    dir: PathBuf,
    index: IndexReader,
    lexicon: LexiconReader,
    stats: StatsReader,
    catalog: RelationCatalog,
    precomputed: HashMap<String, SketchReader>,
    score_kind: ScoreKind,
}

impl Engine {
    /// Open a corpus directory: `index/`, `lexicon.bin`, `stats.bin`, and
    /// zero or more `<relation_id>.cx` precomputed files.
    pub fn open(dir: &Path, catalog: RelationCatalog) -> Result<Self> {
        let index = IndexReader::open(&dir.join(INDEX_DIR))?;
        let lexicon = LexiconReader::open(&dir.join(LEXICON_FILE))?;
        let stats = StatsReader::open(&dir.join(STATS_FILE))?;

        let mut precomputed = HashMap::new();
        for relation in catalog.iter() {
            let path = dir.join(format!("{}.{SKETCH_EXT}", relation.id));
            if path.exists() {
                precomputed.insert(relation.id.clone(), SketchReader::open(&path)?);
            }
        }
        info!(
            "opened corpus at {}: {} sentences, {} lemmas, {} precomputed relations",
            dir.display(),
            index.doc_count(),
            lexicon.len(),
            precomputed.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            index,
            lexicon,
            stats,
            catalog,
            precomputed,
            score_kind: ScoreKind::default(),
        })
    }

    /// Use a non-default association measure for online scoring.
    pub fn with_score_kind(mut self, kind: ScoreKind) -> Self {
        self.score_kind = kind;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn index(&self) -> &IndexReader {
        &self.index
    }

    pub fn lexicon(&self) -> &LexiconReader {
        &self.lexicon
    }

    pub fn stats(&self) -> &StatsReader {
        &self.stats
    }

    pub fn catalog(&self) -> &RelationCatalog {
        &self.catalog
    }

    fn executor(&self) -> Executor<'_> {
        let mut executor = Executor::new(&self.index, &self.lexicon, &self.stats);
        executor.score_kind = self.score_kind;
        executor
    }

    /// Total corpus frequency of a lemma; 0 when absent.
    pub fn total_frequency(&self, lemma: &str) -> u64 {
        self.stats.frequency_of(lemma)
    }

    /// Ranked collocates of `head` under a stored relation.
    ///
    /// Serves from the precomputed store when the relation has one,
    /// otherwise runs the online path.
    pub fn find_collocations(
        &self,
        head: &str,
        relation_id: &str,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome<Vec<Collocation>>> {
        let relation = self.catalog.get(relation_id).ok_or_else(|| {
            Error::PatternUnsupported(format!("unknown relation {relation_id:?}"))
        })?;
        let head = normalize(head);
        if self.stats.frequency_of(&head) == 0 {
            return Ok(QueryOutcome::Complete(Vec::new()));
        }

        if let Some(sketch) = self.precomputed.get(relation_id) {
            debug!("serving {head:?}/{relation_id:?} from precomputed store");
            return self.from_precomputed(&head, relation, sketch, config, cancel);
        }
        self.executor()
            .find_collocations(&head, relation, config, cancel)
    }

    /// Ranked collocates under an ad-hoc inline pattern. Always online.
    pub fn find_collocations_with_pattern(
        &self,
        head: &str,
        pattern: &str,
        head_index: usize,
        collocate_index: usize,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome<Vec<Collocation>>> {
        let relation = Relation {
            id: String::from("inline"),
            name: String::from("inline pattern"),
            pattern: Some(pattern.to_string()),
            head_index,
            collocate_index,
            head_pos: None,
            collocate_pos: None,
            window: 5,
            dual: false,
            exploration: false,
        };
        relation.validate()?;
        self.executor()
            .find_collocations(head, &relation, config, cancel)
    }

    /// Concordance: earliest sentences containing both lemmas within
    /// `max_gap` token positions.
    pub fn find_examples(
        &self,
        lemma_a: &str,
        lemma_b: &str,
        max_gap: u32,
        limit: usize,
    ) -> Result<Vec<ConcordanceLine>> {
        self.executor().find_examples(lemma_a, lemma_b, max_gap, limit)
    }

    /// Build (or resume) precomputed files for the catalog. Reopen the
    /// engine afterwards to serve queries from them.
    pub fn precompute(&self, config: PrecomputeConfig, cancel: &CancellationToken) -> Result<()> {
        Precomputer::new(&self.index, &self.lexicon, &self.dir, config).run(&self.catalog, cancel)
    }

    fn from_precomputed(
        &self,
        head: &str,
        relation: &Relation,
        sketch: &SketchReader,
        config: &QueryConfig,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome<Vec<Collocation>>> {
        let Some(entry) = sketch.lookup(head)? else {
            return Ok(QueryOutcome::Complete(Vec::new()));
        };
        let gap = self.example_gap(relation);

        let executor = self.executor();
        let mut results = Vec::new();
        let mut total_examples = 0usize;
        for collocate in entry.collocates {
            if cancel.is_cancelled() {
                return Ok(QueryOutcome::Cancelled);
            }
            if (collocate.score as f64) < config.min_score {
                continue;
            }
            if results.len() >= config.top_k.max(1) {
                break;
            }
            let budget = config
                .examples_per_collocate
                .min(config.max_total_examples.saturating_sub(total_examples));
            let examples = if budget > 0 {
                executor
                    .find_examples(head, collocate.lemma, gap, budget)?
                    .into_iter()
                    .map(|line| crate::types::Example {
                        sentence_id: line.sentence_id,
                        text: line.text,
                        head_position: line.position_a,
                        collocate_position: line.position_b,
                        highlighted: line.highlighted,
                    })
                    .collect()
            } else {
                Vec::new()
            };
            total_examples += examples.len();
            results.push(Collocation {
                lemma: collocate.lemma.to_string(),
                tag: collocate.pos.to_string(),
                cooccurrence: collocate.cooccurrence,
                collocate_frequency: collocate.frequency,
                score: collocate.score as f64,
                examples,
            });
        }
        Ok(QueryOutcome::Complete(results))
    }

    /// Token gap for example retrieval: wide enough to cover any match the
    /// relation's pattern can span.
    fn example_gap(&self, relation: &Relation) -> u32 {
        let pattern_window = relation
            .pattern
            .as_deref()
            .and_then(|source| crate::pattern::parse_pattern(source).ok())
            .and_then(|pattern| compile(&pattern).ok())
            .map(|clauses| clauses.iter().map(|c| c.window).max().unwrap_or(0))
            .unwrap_or(0);
        relation.window.max(pattern_window).max(1)
    }
}
