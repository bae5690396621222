//! Association scores for collocation ranking.
//!
//! All four measures are pure functions of the contingency counts:
//! `f_ab` (cooccurrence), `f_a` (headword frequency), `f_b` (collocate
//! frequency) and `n` (corpus token count). logDice is the canonical
//! ranking; the others are offered for callers that want them.
//!
//! # Invariants
//!
//! - logDice is clamped to `[0, 14]` and returns 0 whenever any input
//!   frequency is non-positive.
//! - t-score and log-likelihood are finite for any input with all three
//!   frequencies positive.

use serde::{Deserialize, Serialize};

/// Which association measure to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    #[default]
    LogDice,
    Mi3,
    TScore,
    LogLikelihood,
}

/// Dispatch on a [`ScoreKind`].
pub fn score(kind: ScoreKind, f_ab: u64, f_a: u64, f_b: u64, n: u64) -> f64 {
    match kind {
        ScoreKind::LogDice => log_dice(f_ab, f_a, f_b),
        ScoreKind::Mi3 => mi3(f_ab, f_a, f_b, n),
        ScoreKind::TScore => t_score(f_ab, f_a, f_b, n),
        ScoreKind::LogLikelihood => log_likelihood(f_ab, f_a, f_b, n),
    }
}

/// logDice: `14 + log2(2·f_ab / (f_a + f_b))`, clamped to `[0, 14]`.
pub fn log_dice(f_ab: u64, f_a: u64, f_b: u64) -> f64 {
    if f_ab == 0 || f_a == 0 || f_b == 0 {
        return 0.0;
    }
    let dice = 2.0 * f_ab as f64 / (f_a as f64 + f_b as f64);
    (14.0 + dice.log2()).clamp(0.0, 14.0)
}

/// MI³: `log2(f_ab³ · n / (f_a · f_b))`.
pub fn mi3(f_ab: u64, f_a: u64, f_b: u64, n: u64) -> f64 {
    if f_ab == 0 || f_a == 0 || f_b == 0 || n == 0 {
        return 0.0;
    }
    let numerator = (f_ab as f64).powi(3) * n as f64;
    (numerator / (f_a as f64 * f_b as f64)).log2()
}

/// t-score: `(f_ab − f_a·f_b/n) / sqrt(f_ab)`.
pub fn t_score(f_ab: u64, f_a: u64, f_b: u64, n: u64) -> f64 {
    if f_ab == 0 || n == 0 {
        return 0.0;
    }
    let expected = f_a as f64 * f_b as f64 / n as f64;
    (f_ab as f64 - expected) / (f_ab as f64).sqrt()
}

/// Log-likelihood (G²): `2·f_ab·ln(f_ab·n / (f_a·f_b))` for positive
/// `f_ab`, else 0.
pub fn log_likelihood(f_ab: u64, f_a: u64, f_b: u64, n: u64) -> f64 {
    if f_ab == 0 || f_a == 0 || f_b == 0 || n == 0 {
        return 0.0;
    }
    let ratio = f_ab as f64 * n as f64 / (f_a as f64 * f_b as f64);
    2.0 * f_ab as f64 * ratio.ln()
}
