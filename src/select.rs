//! Stage 3: per-category top-N selection.

use std::cmp::Ordering;

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::group_by_key;
use crate::score::ChiSquareScore;

/// Highest-scoring terms of one category, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct TopList {
    pub category: String,
    pub entries: Vec<(String, f64)>,
}

impl TopList {
    /// `"<category> term1:score1 term2:score2 ..."`
    ///
    /// Line breaks in the category name are written as `\n` and `\r` so
    /// each category stays on one output line.
    pub fn line(&self) -> String {
        let mut line = escape_line_breaks(&self.category);
        for (term, score) in &self.entries {
            line.push(' ');
            line.push_str(&format_entry(term, *score));
        }
        line
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }
}

fn escape_line_breaks(category: &str) -> String {
    if !category.contains(['\n', '\r']) {
        return category.to_string();
    }
    category.replace('\n', "\\n").replace('\r', "\\r")
}

/// Scores render with `{:?}` so integral values keep a trailing `.0`.
pub fn format_entry(term: &str, score: f64) -> String {
    format!("{term}:{score:?}")
}

/// Score descending, then term ascending.
fn rank_order(a: &(String, f64), b: &(String, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Keep the best `top_n` entries of one category, in rank order.
pub fn top_entries(mut entries: Vec<(String, f64)>, top_n: usize) -> Vec<(String, f64)> {
    if top_n == 0 {
        return Vec::new();
    }
    if entries.len() > top_n {
        entries.select_nth_unstable_by(top_n - 1, rank_order);
        entries.truncate(top_n);
    }
    entries.sort_unstable_by(rank_order);
    entries
}

/// Group scores by category and select each category's top list.
/// Categories come out in ascending name order.
pub fn select_top(scores: Vec<ChiSquareScore>, top_n: usize) -> Vec<TopList> {
    let groups = group_by_key(scores.into_iter().map(|s| (s.category, (s.term, s.score))));
    let lists: Vec<TopList> = groups
        .into_par_iter()
        .map(|(category, entries)| TopList {
            category,
            entries: top_entries(entries, top_n),
        })
        .collect();
    info!(
        "selected top {} terms for {} categories ({} entries)",
        top_n,
        lists.len(),
        lists.iter().map(|l| l.entries.len()).sum::<usize>()
    );
    lists
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    CategoryLine,
    DictionaryTerm,
}

/// Output row of the selector: either a formatted category line or one
/// selected term for the dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRecord {
    pub kind: SelectorKind,
    pub category: String,
    pub value: String,
}

impl SelectorRecord {
    pub fn category_line(list: &TopList) -> Self {
        SelectorRecord {
            kind: SelectorKind::CategoryLine,
            category: list.category.clone(),
            value: list.line(),
        }
    }

    pub fn dictionary_term(category: &str, term: &str) -> Self {
        SelectorRecord {
            kind: SelectorKind::DictionaryTerm,
            category: category.to_owned(),
            value: term.to_owned(),
        }
    }
}

/// One line record per category followed by its dictionary contributions.
pub fn to_records(lists: &[TopList]) -> Vec<SelectorRecord> {
    lists
        .iter()
        .flat_map(|list| {
            std::iter::once(SelectorRecord::category_line(list)).chain(
                list.terms()
                    .map(|t| SelectorRecord::dictionary_term(&list.category, t)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(category: &str, term: &str, score: f64) -> ChiSquareScore {
        ChiSquareScore {
            category: category.to_string(),
            term: term.to_string(),
            score,
        }
    }

    #[test]
    fn ties_break_on_term_name() {
        let scores = vec![
            score("Electronics", "well", 0.75),
            score("Electronics", "zzz", 2.0),
            score("Electronics", "great", 0.75),
            score("Electronics", "phone", 0.75),
        ];
        let lists = select_top(scores, 75);
        assert_eq!(lists.len(), 1);
        let terms: Vec<&str> = lists[0].terms().collect();
        assert_eq!(terms, vec!["zzz", "great", "phone", "well"]);
    }

    #[test]
    fn truncates_to_top_n_deterministically() {
        let mut scores = Vec::new();
        for i in 0..200u32 {
            // many ties: scores cycle over ten values
            scores.push(score("C", &format!("t{i:03}"), f64::from(i % 10)));
        }
        let mut shuffled = scores.clone();
        shuffled.reverse();

        let a = select_top(scores, 75);
        let b = select_top(shuffled, 75);
        assert_eq!(a, b);

        let entries = &a[0].entries;
        assert_eq!(entries.len(), 75);
        // 20 terms score 9.0, 20 score 8.0, 20 score 7.0, then 15 of the 6.0 group
        assert_eq!(entries[0], ("t009".to_string(), 9.0));
        assert_eq!(entries[74], ("t146".to_string(), 6.0));
        for w in entries.windows(2) {
            assert_eq!(rank_order(&w[0], &w[1]), Ordering::Less);
        }
    }

    #[test]
    fn short_categories_are_not_padded() {
        let lists = select_top(vec![score("B", "x", 1.0), score("A", "y", 0.5)], 75);
        let cats: Vec<&str> = lists.iter().map(|l| l.category.as_str()).collect();
        assert_eq!(cats, vec!["A", "B"]);
        assert_eq!(lists[0].entries.len(), 1);
    }

    #[test]
    fn line_format() {
        let list = TopList {
            category: "Books".to_string(),
            entries: vec![("story".to_string(), 3.0), ("great".to_string(), 0.75)],
        };
        assert_eq!(list.line(), "Books story:3.0 great:0.75");
    }

    #[test]
    fn category_line_breaks_are_escaped() {
        let list = TopList {
            category: "Home\nGarden\r".to_string(),
            entries: vec![("hose".to_string(), 2.0)],
        };
        let line = list.line();
        assert_eq!(line, r"Home\nGarden\r hose:2.0");
        assert_eq!(line.lines().count(), 1);
    }

    #[test]
    fn records_carry_line_and_terms() {
        let list = TopList {
            category: "Books".to_string(),
            entries: vec![("story".to_string(), 3.0), ("great".to_string(), 0.75)],
        };
        let records = to_records(std::slice::from_ref(&list));
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, SelectorKind::CategoryLine);
        assert_eq!(records[0].value, "Books story:3.0 great:0.75");
        assert_eq!(records[1], SelectorRecord::dictionary_term("Books", "story"));
        assert_eq!(records[2], SelectorRecord::dictionary_term("Books", "great"));
    }
}
