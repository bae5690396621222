//! The relation catalog: named grammatical relations between a headword and
//! its collocates.
//!
//! Relations arrive from an external configuration document (JSON here);
//! the engine never looks anything up by reflection; a relation is a plain
//! record. A relation is either *pattern-based* (a pattern expression with
//! head and collocate element indices) or *window-based* (pure positional
//! cooccurrence within a token window).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pattern::parse_pattern;
use crate::types::PosClass;

fn default_window() -> u32 {
    5
}

/// One configured relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Stable identifier; also names the precomputed file (`<id>.cx`).
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Pattern expression; absent for window-based relations.
    #[serde(default)]
    pub pattern: Option<String>,
    /// 1-based index of the head element within the pattern sequence.
    #[serde(default)]
    pub head_index: usize,
    /// 1-based index of the collocate element.
    #[serde(default)]
    pub collocate_index: usize,
    /// Coarse POS class the head must belong to, when constrained.
    #[serde(default)]
    pub head_pos: Option<PosClass>,
    /// Coarse POS class the collocate must belong to, when constrained.
    #[serde(default)]
    pub collocate_pos: Option<PosClass>,
    /// Default distance window, used by window-based cooccurrence and by
    /// example retrieval.
    #[serde(default = "default_window")]
    pub window: u32,
    /// Emit both directions (head→collocate and collocate→head).
    #[serde(default)]
    pub dual: bool,
    /// Exploratory relation: excluded from precomputation by default.
    #[serde(default)]
    pub exploration: bool,
}

impl Relation {
    pub fn is_pattern_based(&self) -> bool {
        self.pattern.is_some()
    }

    /// Validate structural invariants: the pattern parses, and the head and
    /// collocate indices are distinct and inside every alternative.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::invariant("relation with empty id"));
        }
        let Some(source) = &self.pattern else {
            if self.window == 0 {
                return Err(Error::invariant(format!(
                    "window relation {:?} with zero window",
                    self.id
                )));
            }
            return Ok(());
        };
        let pattern = parse_pattern(source)?;
        if self.head_index == 0 || self.collocate_index == 0 {
            return Err(Error::invariant(format!(
                "relation {:?} has unset head/collocate indices",
                self.id
            )));
        }
        if self.head_index == self.collocate_index {
            return Err(Error::invariant(format!(
                "relation {:?} has identical head and collocate indices",
                self.id
            )));
        }
        let max_index = self.head_index.max(self.collocate_index);
        for (i, alt) in pattern.alternatives.iter().enumerate() {
            if max_index > alt.elements.len() {
                return Err(Error::invariant(format!(
                    "relation {:?} alternative {} has {} elements, index {} out of range",
                    self.id,
                    i,
                    alt.elements.len(),
                    max_index
                )));
            }
        }
        Ok(())
    }
}

/// The full set of configured relations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationCatalog {
    pub relations: Vec<Relation>,
}

impl RelationCatalog {
    pub fn new(relations: Vec<Relation>) -> Result<Self> {
        let catalog = Self { relations };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a JSON catalog document.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: RelationCatalog = serde_json::from_str(&content)
            .map_err(|e| Error::format(format!("invalid relation catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        for relation in &self.relations {
            relation.validate()?;
        }
        let mut ids: Vec<&str> = self.relations.iter().map(|r| r.id.as_str()).collect();
        ids.sort_unstable();
        for pair in ids.windows(2) {
            if pair[0] == pair[1] {
                return Err(Error::invariant(format!("duplicate relation id {:?}", pair[0])));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relation> {
        self.relations.iter()
    }
}
