//! Precomputation engine: one sequential scan over the sentence index, an
//! external sort through per-shard run files, and a merge that emits one
//! `(head → top-K collocates)` file per relation.
//!
//! The scan decodes each sentence's lemma-id column into a reusable buffer
//! and feeds every configured relation: window relations count positional
//! cooccurrence directly; pattern relations run the verifier against the
//! decoded token sequence. Pair counts accumulate in a primitive
//! open-addressed map; when the map fills up, a sorted run is spilled per
//! shard (`shard = head_id & (num_shards − 1)`) and the manifest checkpoint
//! advances, so an interrupted build resumes from the last flushed sentence.
//!
//! The reduce stage is embarrassingly parallel across shards: k-way merge
//! the shard's runs, aggregate counts, keep each head's top K by score, and
//! finally publish `<relation_id>.cx` by atomic rename.

pub mod merge;
pub mod pair_map;
pub mod reader;
pub mod runs;

pub use merge::{HeadEntry, ScoredCollocate};
pub use pair_map::{pair_key, split_key, PairCountMap};
pub use reader::{
    SketchCollocate, SketchEntry, SketchFileCollocate, SketchFileEntry, SketchReader, SKETCH_EXT,
};

use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::codec::decode_tokens;
use crate::error::{Error, Result};
use crate::index::IndexReader;
use crate::lexicon::LexiconReader;
use crate::pattern::{parse_pattern, Pattern};
use crate::query::verify::verify_at;
use crate::relations::{Relation, RelationCatalog};
use crate::scoring::ScoreKind;
use crate::types::Token;
use crate::util::write_atomic;

/// Working subdirectory inside the corpus directory.
pub const PRECOMPUTE_DIR: &str = "precompute";
pub const PRECOMPUTE_MANIFEST: &str = "precompute.json";
const MANIFEST_VERSION: u32 = 1;

/// Precompute knobs.
#[derive(Debug, Clone)]
pub struct PrecomputeConfig {
    /// Collocates kept per head.
    pub top_k: usize,
    /// Heads below this corpus frequency are skipped.
    pub min_head_frequency: u64,
    /// Shard count; rounded up to a power of two.
    pub num_shards: u32,
    /// Map entries that trigger a spill to disk.
    pub flush_entries: usize,
    pub score: ScoreKind,
}

impl Default for PrecomputeConfig {
    fn default() -> Self {
        Self {
            top_k: 100,
            min_head_frequency: 1,
            num_shards: 8,
            flush_entries: 1 << 20,
            score: ScoreKind::LogDice,
        }
    }
}

/// Crash-safe progress record, replaced write-then-rename at every
/// checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PrecomputeManifest {
    version: u32,
    /// Next sentence id the scan will process.
    next_doc: u32,
    relations: Vec<RelationProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelationProgress {
    id: String,
    /// Run files per shard, relative to the relation's work directory.
    shards: Vec<Vec<String>>,
    /// The relation's output file has been published.
    output_done: bool,
}

impl PrecomputeManifest {
    fn load_or_new(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let manifest: PrecomputeManifest = serde_json::from_str(&content)
                .map_err(|e| Error::format(format!("invalid precompute manifest: {e}")))?;
            if manifest.version != MANIFEST_VERSION {
                return Err(Error::format(format!(
                    "unsupported precompute manifest version {}",
                    manifest.version
                )));
            }
            Ok(manifest)
        } else {
            Ok(Self {
                version: MANIFEST_VERSION,
                next_doc: 0,
                relations: Vec::new(),
            })
        }
    }

    fn store(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::invariant(format!("manifest serialization failed: {e}")))?;
        write_atomic(path, json.as_bytes())
    }

    fn progress_mut(&mut self, id: &str, num_shards: usize) -> &mut RelationProgress {
        let at = match self.relations.iter().position(|r| r.id == id) {
            Some(at) => at,
            None => {
                self.relations.push(RelationProgress {
                    id: id.to_string(),
                    shards: vec![Vec::new(); num_shards],
                    output_done: false,
                });
                self.relations.len() - 1
            }
        };
        &mut self.relations[at]
    }
}

/// Per-relation scan state.
struct RelationScan<'a> {
    relation: &'a Relation,
    /// Parsed pattern for pattern-based relations.
    pattern: Option<Pattern>,
    map: PairCountMap,
}

/// Builds precomputed collocation files for every non-exploration relation
/// in the catalog.
pub struct Precomputer<'a> {
    index: &'a IndexReader,
    lexicon: &'a LexiconReader,
    dir: PathBuf,
    config: PrecomputeConfig,
}

impl<'a> Precomputer<'a> {
    pub fn new(
        index: &'a IndexReader,
        lexicon: &'a LexiconReader,
        dir: &Path,
        config: PrecomputeConfig,
    ) -> Self {
        Self {
            index,
            lexicon,
            dir: dir.to_path_buf(),
            config,
        }
    }

    fn num_shards(&self) -> u32 {
        self.config.num_shards.next_power_of_two().max(1)
    }

    fn work_dir(&self) -> PathBuf {
        self.dir.join(PRECOMPUTE_DIR)
    }

    fn manifest_path(&self) -> PathBuf {
        self.work_dir().join(PRECOMPUTE_MANIFEST)
    }

    /// Run (or resume) precomputation for the catalog. Completed relations
    /// are skipped; an interrupted run continues from the last checkpoint.
    pub fn run(&self, catalog: &RelationCatalog, cancel: &CancellationToken) -> Result<()> {
        let work_dir = self.work_dir();
        std::fs::create_dir_all(&work_dir)?;
        let mut manifest = PrecomputeManifest::load_or_new(&self.manifest_path())?;
        let num_shards = self.num_shards() as usize;

        let mut scans: Vec<RelationScan<'_>> = Vec::new();
        for relation in catalog.iter().filter(|r| !r.exploration) {
            let pattern = match &relation.pattern {
                Some(source) => {
                    let pattern = parse_pattern(source)?;
                    if pattern.references_head() {
                        warn!(
                            "relation {:?} uses %head placeholder, cannot precompute",
                            relation.id
                        );
                        continue;
                    }
                    Some(pattern)
                }
                None => None,
            };
            manifest.progress_mut(&relation.id, num_shards);
            scans.push(RelationScan {
                relation,
                pattern,
                map: PairCountMap::new(),
            });
        }

        self.scan(&mut scans, &mut manifest, cancel)?;
        self.reduce(&scans, &mut manifest, cancel)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // scan stage
    // -------------------------------------------------------------------------

    fn scan(
        &self,
        scans: &mut [RelationScan<'_>],
        manifest: &mut PrecomputeManifest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let doc_count = self.index.doc_count();
        if manifest.next_doc >= doc_count {
            return Ok(());
        }
        info!(
            "precompute scan: sentences {}..{} across {} relations",
            manifest.next_doc,
            doc_count,
            scans.len()
        );

        let needs_tokens = scans.iter().any(|s| s.pattern.is_some());
        let mut lemma_ids: Vec<u32> = Vec::new();
        let mut skipped = 0u64;

        for doc_id in manifest.next_doc..doc_count {
            if cancel.is_cancelled() {
                self.flush_all(scans, manifest, doc_id)?;
                return Err(Error::Cancelled);
            }

            if let Err(err) = self.index.lemma_ids_into(doc_id, &mut lemma_ids) {
                if err.is_recoverable() {
                    skipped += 1;
                    warn!("precompute skipping sentence {doc_id}: {err}");
                    continue;
                }
                return Err(err);
            }

            let tokens: Option<Vec<Token>> = if needs_tokens {
                match self
                    .index
                    .columns(doc_id)
                    .and_then(|c| decode_tokens(c.tokens_blob, self.index.has_deprels()))
                {
                    Ok(tokens) => Some(tokens),
                    Err(err) if err.is_recoverable() => {
                        skipped += 1;
                        warn!("precompute skipping sentence {doc_id}: {err}");
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            } else {
                None
            };

            for scan in scans.iter_mut() {
                match (&scan.pattern, &tokens) {
                    (None, _) => self.scan_window(scan, &lemma_ids),
                    (Some(_), Some(tokens)) => self.scan_pattern(scan, &lemma_ids, tokens),
                    (Some(_), None) => {}
                }
            }

            if scans.iter().any(|s| s.map.len() >= self.config.flush_entries) {
                self.flush_all(scans, manifest, doc_id + 1)?;
            }
        }

        if skipped > 0 {
            warn!("precompute scan skipped {skipped} undecodable sentences");
        }
        self.flush_all(scans, manifest, doc_count)?;
        Ok(())
    }

    fn scan_window(&self, scan: &mut RelationScan<'_>, ids: &[u32]) {
        let window = scan.relation.window.max(1) as usize;
        for (i, &head_id) in ids.iter().enumerate() {
            if self.lexicon.frequency_of_id(head_id) < self.config.min_head_frequency {
                continue;
            }
            let lo = i.saturating_sub(window);
            let hi = (i + window).min(ids.len().saturating_sub(1));
            for j in lo..=hi {
                if j != i {
                    scan.map.add(pair_key(head_id, ids[j]), 1);
                }
            }
        }
    }

    fn scan_pattern(&self, scan: &mut RelationScan<'_>, ids: &[u32], tokens: &[Token]) {
        let Some(pattern) = &scan.pattern else {
            return;
        };
        let relation = scan.relation;
        if tokens.len() != ids.len() {
            warn!("token/lemma-id column mismatch, skipping sentence in precompute");
            return;
        }
        for (i, token) in tokens.iter().enumerate() {
            let head_id = ids[i];
            if self.lexicon.frequency_of_id(head_id) < self.config.min_head_frequency {
                continue;
            }
            if let Some(class) = relation.head_pos {
                if !class.matches_tag(&token.tag) {
                    continue;
                }
            }
            let Some(hit) = verify_at(tokens, pattern, relation.head_index, i as u32) else {
                continue;
            };
            let collocate_pos = hit
                .captures
                .get(&(relation.collocate_index as u32))
                .copied()
                .or_else(|| hit.element_position(relation.collocate_index));
            let Some(collocate_pos) = collocate_pos else {
                continue;
            };
            if collocate_pos as usize >= ids.len() || collocate_pos == i as u32 {
                continue;
            }
            if let Some(class) = relation.collocate_pos {
                if !class.matches_tag(&tokens[collocate_pos as usize].tag) {
                    continue;
                }
            }
            let coll_id = ids[collocate_pos as usize];
            scan.map.add(pair_key(head_id, coll_id), 1);
            if relation.dual
                && self.lexicon.frequency_of_id(coll_id) >= self.config.min_head_frequency
            {
                scan.map.add(pair_key(coll_id, head_id), 1);
            }
        }
    }

    /// Spill every relation's map as per-shard sorted runs and advance the
    /// checkpoint to `next_doc`.
    fn flush_all(
        &self,
        scans: &mut [RelationScan<'_>],
        manifest: &mut PrecomputeManifest,
        next_doc: u32,
    ) -> Result<()> {
        let num_shards = self.num_shards();
        let shard_mask = (num_shards - 1) as u64;
        for scan in scans.iter_mut() {
            if scan.map.is_empty() {
                continue;
            }
            let drained = scan.map.drain_sorted();
            let mut by_shard: Vec<Vec<(u64, u32)>> = vec![Vec::new(); num_shards as usize];
            for (key, count) in drained {
                let shard = ((key >> 32) & shard_mask) as usize;
                by_shard[shard].push((key, count));
            }

            let relation_dir = self.work_dir().join(&scan.relation.id);
            let progress = manifest.progress_mut(&scan.relation.id, num_shards as usize);
            for (shard, records) in by_shard.into_iter().enumerate() {
                if records.is_empty() {
                    continue;
                }
                let shard_dir = relation_dir.join(format!("shard-{shard}"));
                std::fs::create_dir_all(&shard_dir)?;
                let file = format!("run-{:05}.clxr", progress.shards[shard].len());
                runs::write_run(&shard_dir.join(&file), &records)?;
                progress.shards[shard].push(file);
            }
        }
        manifest.next_doc = next_doc;
        manifest.store(&self.manifest_path())
    }

    // -------------------------------------------------------------------------
    // reduce stage
    // -------------------------------------------------------------------------

    fn reduce(
        &self,
        scans: &[RelationScan<'_>],
        manifest: &mut PrecomputeManifest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for scan in scans {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let relation = scan.relation;
            let already_done = manifest
                .relations
                .iter()
                .find(|r| r.id == relation.id)
                .map(|r| r.output_done)
                .unwrap_or(false);
            if already_done {
                continue;
            }

            let progress = manifest.progress_mut(&relation.id, self.num_shards() as usize);
            let relation_dir = self.work_dir().join(&relation.id);
            let shard_runs: Vec<Vec<PathBuf>> = progress
                .shards
                .iter()
                .enumerate()
                .map(|(shard, files)| {
                    files
                        .iter()
                        .map(|f| relation_dir.join(format!("shard-{shard}")).join(f))
                        .collect()
                })
                .collect();

            let entries = self.reduce_relation(&shard_runs)?;
            let output = self
                .dir
                .join(format!("{}.{SKETCH_EXT}", relation.id));
            reader::write_sketch_file(
                &output,
                &entries,
                relation.window,
                self.config.top_k as u32,
                self.lexicon.total_tokens(),
            )?;
            info!(
                "precomputed {:?}: {} heads → {}",
                relation.id,
                entries.len(),
                output.display()
            );

            manifest.progress_mut(&relation.id, self.num_shards() as usize).output_done = true;
            manifest.store(&self.manifest_path())?;
            let _ = std::fs::remove_dir_all(&relation_dir);
        }
        Ok(())
    }

    fn reduce_relation(&self, shard_runs: &[Vec<PathBuf>]) -> Result<Vec<SketchFileEntry>> {
        let reduce_one = |paths: &Vec<PathBuf>| -> Result<Vec<HeadEntry>> {
            let loaded = paths
                .iter()
                .map(|p| runs::read_run(p))
                .collect::<Result<Vec<_>>>()?;
            let merged = runs::merge_runs(loaded);
            merge::reduce_shard(merged, self.config.top_k, self.config.score, self.lexicon)
        };

        #[cfg(feature = "parallel")]
        let per_shard: Vec<Vec<HeadEntry>> = shard_runs
            .par_iter()
            .map(reduce_one)
            .collect::<Result<Vec<_>>>()?;

        #[cfg(not(feature = "parallel"))]
        let per_shard: Vec<Vec<HeadEntry>> = shard_runs
            .iter()
            .map(reduce_one)
            .collect::<Result<Vec<_>>>()?;

        let mut entries = Vec::new();
        for head_entry in per_shard.into_iter().flatten() {
            entries.push(self.resolve_entry(head_entry)?);
        }
        entries.sort_by(|a, b| a.head.cmp(&b.head));
        Ok(entries)
    }

    /// Swap lemma ids for strings via the lexicon. A missing id means the
    /// runs and the lexicon disagree.
    fn resolve_entry(&self, entry: HeadEntry) -> Result<SketchFileEntry> {
        let head = self.lexicon.lemma_of(entry.head_id)?.to_string();
        let head_frequency = self.lexicon.frequency_of_id(entry.head_id);
        let collocates = entry
            .collocates
            .into_iter()
            .map(|c| {
                Ok(SketchFileCollocate {
                    lemma: self.lexicon.lemma_of(c.lemma_id)?.to_string(),
                    pos: self.lexicon.most_frequent_pos_of(c.lemma_id)?.to_string(),
                    cooccurrence: c.cooccurrence,
                    frequency: c.frequency,
                    score: c.score as f32,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SketchFileEntry {
            head,
            head_frequency,
            collocates,
        })
    }
}
