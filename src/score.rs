//! Stage 2: contingency tables and chi-square scores.
//!
//! The global counts travel as a [`Metadata`] side table that every scoring
//! worker reads. It is complete before the first pair is scored, so scoring
//! never depends on the order in which joint counts arrive.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Merge, fold_combine};

/// Global counts shared read-only by all scoring workers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub total_docs: u64,
    pub category_docs: HashMap<String, u64>,
    pub term_total: HashMap<String, u64>,
}

/// Number of documents of `category` that contain `term`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointCount {
    pub term: String,
    pub category: String,
    pub count: u64,
}

/// Document counts for term present/absent × category match/mismatch.
///
/// ```text
///               in category   not in category
/// has term           a               b
/// lacks term         c               d
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContingencyTable {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

impl ContingencyTable {
    /// Build the table from marginal counts. Returns `None` when the counts
    /// cannot describe a real corpus (a cell would be negative).
    pub fn from_counts(
        joint: u64,
        term_total: u64,
        category_docs: u64,
        total_docs: u64,
    ) -> Option<Self> {
        let a = joint;
        let b = term_total.checked_sub(a)?;
        let c = category_docs.checked_sub(a)?;
        let d = total_docs.checked_sub(a)?.checked_sub(b)?.checked_sub(c)?;
        Some(ContingencyTable { a, b, c, d })
    }

    pub fn total(&self) -> u64 {
        self.a + self.b + self.c + self.d
    }

    /// `N (AD - BC)² / ((A+B)(A+C)(B+D)(C+D))`, or 0 when the denominator is 0.
    ///
    /// Products are taken in 128-bit integers and only the final quotient is
    /// floating point. Tables too large for that (around 10^8 documents and
    /// up) are scored entirely in `f64`.
    pub fn chi_square(&self) -> f64 {
        let (a, b, c, d) = (
            self.a as u128,
            self.b as u128,
            self.c as u128,
            self.d as u128,
        );
        let margins = [a + b, a + c, b + d, c + d];
        if margins.contains(&0) {
            return 0.0;
        }
        let n = a + b + c + d;
        let diff = (a * d).abs_diff(b * c);
        let exact = margins
            .iter()
            .try_fold(1u128, |acc, &m| acc.checked_mul(m))
            .zip(n.checked_mul(diff).and_then(|x| x.checked_mul(diff)));
        match exact {
            Some((denom, numer)) => numer as f64 / denom as f64,
            None => {
                let diff = diff as f64;
                let denom: f64 = margins.iter().map(|&m| m as f64).product();
                n as f64 * diff * diff / denom
            }
        }
    }
}

/// Chi-square score of one `(category, term)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareScore {
    pub category: String,
    pub term: String,
    pub score: f64,
}

/// Scores plus the pairs that could not be scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBatch {
    pub scores: Vec<ChiSquareScore>,
    /// Pairs whose category (or term) has no metadata entry.
    pub orphans: u64,
    /// Pairs whose counts contradict the metadata.
    pub inconsistent: u64,
}

impl Merge for ScoreBatch {
    fn merge(&mut self, mut other: Self) {
        if self.scores.len() < other.scores.len() {
            std::mem::swap(&mut self.scores, &mut other.scores);
        }
        self.scores.append(&mut other.scores);
        self.orphans += other.orphans;
        self.inconsistent += other.inconsistent;
    }
}

/// Why a joint count produced no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unscorable {
    /// The category (or term) has no entry in the metadata.
    Orphan,
    /// The joint count is larger than one of its totals.
    Inconsistent,
}

pub struct ScoreEngine<'m> {
    metadata: &'m Metadata,
}

impl<'m> ScoreEngine<'m> {
    pub fn new(metadata: &'m Metadata) -> Self {
        ScoreEngine { metadata }
    }

    pub fn table(&self, joint: &JointCount) -> Result<ContingencyTable, Unscorable> {
        let cat_docs = *self
            .metadata
            .category_docs
            .get(&joint.category)
            .ok_or(Unscorable::Orphan)?;
        let term_total = *self
            .metadata
            .term_total
            .get(&joint.term)
            .ok_or(Unscorable::Orphan)?;
        ContingencyTable::from_counts(
            joint.count,
            term_total,
            cat_docs,
            self.metadata.total_docs,
        )
        .ok_or(Unscorable::Inconsistent)
    }

    pub fn score(&self, joint: &JointCount) -> Result<ChiSquareScore, Unscorable> {
        let table = self.table(joint)?;
        Ok(ChiSquareScore {
            category: joint.category.clone(),
            term: joint.term.clone(),
            score: table.chi_square(),
        })
    }

    /// Score every joint count in parallel. The result is sorted by
    /// `(category, term)`.
    pub fn score_all(&self, joints: &[JointCount]) -> ScoreBatch {
        let mut batch: ScoreBatch = fold_combine(joints, |mut acc: ScoreBatch, j| {
            match self.score(j) {
                Ok(s) => acc.scores.push(s),
                Err(Unscorable::Orphan) => {
                    debug!("dropping ({}, {}): no metadata for this pair", j.term, j.category);
                    acc.orphans += 1;
                }
                Err(Unscorable::Inconsistent) => {
                    warn!(
                        "dropping ({}, {}): joint count {} contradicts the totals",
                        j.term, j.category, j.count
                    );
                    acc.inconsistent += 1;
                }
            }
            acc
        });
        batch.scores.sort_unstable_by(|x, y| {
            x.category
                .cmp(&y.category)
                .then_with(|| x.term.cmp(&y.term))
        });
        info!(
            "scored {} pairs ({} orphaned, {} inconsistent)",
            batch.scores.len(),
            batch.orphans,
            batch.inconsistent
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joint(term: &str, category: &str, count: u64) -> JointCount {
        JointCount {
            term: term.to_string(),
            category: category.to_string(),
            count,
        }
    }

    /// Totals of the three-review corpus used across the test suite.
    fn review_metadata() -> Metadata {
        let term_total = [
            ("great", 2),
            ("well", 2),
            ("phone", 1),
            ("battery", 1),
            ("life", 1),
            ("poor", 1),
            ("story", 1),
            ("written", 1),
        ]
        .into_iter()
        .map(|(t, n)| (t.to_string(), n))
        .collect();
        Metadata {
            total_docs: 3,
            category_docs: HashMap::from([
                ("Electronics".to_string(), 2),
                ("Books".to_string(), 1),
            ]),
            term_total,
        }
    }

    #[test]
    fn worked_example() {
        let t = ContingencyTable { a: 5, b: 3, c: 2, d: 10 };
        assert_eq!(t.total(), 20);
        let score = t.chi_square();
        assert_eq!(score, 38720.0 / 8736.0);
        assert!((score - 4.4322).abs() < 1e-4, "got {score}");
    }

    #[test]
    fn zero_denominator_scores_zero() {
        // every document has the term
        let t = ContingencyTable { a: 4, b: 6, c: 0, d: 0 };
        assert_eq!(t.chi_square(), 0.0);
        let empty = ContingencyTable { a: 0, b: 0, c: 0, d: 0 };
        assert_eq!(empty.chi_square(), 0.0);
    }

    #[test]
    fn huge_tables_fall_back_to_float() {
        // perfect association: chi-square equals N
        let t = ContingencyTable { a: 50_000_000, b: 0, c: 0, d: 50_000_000 };
        let score = t.chi_square();
        assert!((score / 1e8 - 1.0).abs() < 1e-9, "got {score}");

        let t = ContingencyTable {
            a: 3_000_000_000,
            b: 1_000_000_000,
            c: 2_000_000_000,
            d: 4_000_000_000,
        };
        let expected = 1e10 * (12e18_f64 - 2e18).powi(2) / (4e9 * 5e9 * 5e9 * 6e9);
        let score = t.chi_square();
        assert!((score / expected - 1.0).abs() < 1e-9, "got {score}, expected {expected}");
    }

    #[test]
    fn table_cells_sum_to_total_docs() {
        let m = review_metadata();
        let engine = ScoreEngine::new(&m);
        for j in [
            joint("great", "Electronics", 1),
            joint("great", "Books", 1),
            joint("story", "Books", 1),
            joint("phone", "Electronics", 1),
        ] {
            let t = engine.table(&j).unwrap();
            assert_eq!(t.total(), m.total_docs);
            assert!(t.chi_square() >= 0.0);
        }
    }

    #[test]
    fn review_corpus_scores() {
        let m = review_metadata();
        let engine = ScoreEngine::new(&m);

        let phone = engine.table(&joint("phone", "Electronics", 1)).unwrap();
        assert_eq!(phone, ContingencyTable { a: 1, b: 0, c: 1, d: 1 });
        assert_eq!(phone.chi_square(), 0.75);

        for term in ["great", "well"] {
            let s = engine.score(&joint(term, "Electronics", 1)).unwrap();
            assert_eq!(s.score, 0.75, "{term}");
        }
        assert_eq!(engine.score(&joint("story", "Books", 1)).unwrap().score, 3.0);
    }

    #[test]
    fn orphan_category_is_dropped() {
        let m = review_metadata();
        let engine = ScoreEngine::new(&m);
        assert_eq!(engine.score(&joint("great", "Garden", 1)), Err(Unscorable::Orphan));
        assert_eq!(engine.score(&joint("unknown", "Books", 1)), Err(Unscorable::Orphan));
    }

    #[test]
    fn impossible_counts_are_inconsistent() {
        assert_eq!(ContingencyTable::from_counts(3, 2, 5, 10), None);
        assert_eq!(ContingencyTable::from_counts(1, 5, 5, 6), None);
        let m = review_metadata();
        let engine = ScoreEngine::new(&m);
        assert_eq!(
            engine.score(&joint("phone", "Electronics", 2)),
            Err(Unscorable::Inconsistent)
        );
    }

    #[test]
    fn score_all_counts_drops_and_sorts() {
        let m = review_metadata();
        let engine = ScoreEngine::new(&m);
        let joints = vec![
            joint("well", "Electronics", 1),
            joint("great", "Books", 1),
            joint("great", "Garden", 3),
            joint("phone", "Electronics", 9),
            joint("great", "Electronics", 1),
        ];
        let batch = engine.score_all(&joints);
        assert_eq!(batch.orphans, 1);
        assert_eq!(batch.inconsistent, 1);
        let keys: Vec<(&str, &str)> = batch
            .scores
            .iter()
            .map(|s| (s.category.as_str(), s.term.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("Books", "great"), ("Electronics", "great"), ("Electronics", "well")]
        );
    }
}
