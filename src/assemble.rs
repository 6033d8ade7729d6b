//! Stage 4: final report assembly.

use std::collections::{BTreeMap, BTreeSet};

use log::info;

use crate::select::{SelectorKind, SelectorRecord};

/// Category lines in category order, plus the merged dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalReport {
    pub category_lines: Vec<String>,
    /// Sorted, deduplicated union of every selected term.
    pub dictionary: Vec<String>,
}

impl FinalReport {
    /// All output lines: one per category, then the dictionary line.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = self.category_lines.clone();
        lines.push(self.dictionary.join(" "));
        lines
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in self.lines() {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    /// Rebuild from the text written by [`FinalReport::to_text`].
    pub fn from_lines(mut lines: Vec<String>) -> Option<Self> {
        let dictionary_line = lines.pop()?;
        Some(FinalReport {
            category_lines: lines,
            dictionary: dictionary_line
                .split(' ')
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect(),
        })
    }
}

/// Split selector records into category lines and dictionary terms.
///
/// A category line seen more than once (a re-executed selector task) is kept
/// once; lines are ordered by category name.
pub fn assemble(records: impl IntoIterator<Item = SelectorRecord>) -> FinalReport {
    let mut lines: BTreeMap<String, String> = BTreeMap::new();
    let mut dictionary: BTreeSet<String> = BTreeSet::new();
    for record in records {
        match record.kind {
            SelectorKind::CategoryLine => {
                lines.insert(record.category, record.value);
            }
            SelectorKind::DictionaryTerm => {
                dictionary.insert(record.value);
            }
        }
    }
    info!(
        "assembled {} category lines, dictionary of {} terms",
        lines.len(),
        dictionary.len()
    );
    FinalReport {
        category_lines: lines.into_values().collect(),
        dictionary: dictionary.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::{TopList, to_records};

    fn list(category: &str, entries: &[(&str, f64)]) -> TopList {
        TopList {
            category: category.to_string(),
            entries: entries.iter().map(|(t, s)| (t.to_string(), *s)).collect(),
        }
    }

    #[test]
    fn dictionary_is_sorted_union() {
        let lists = vec![
            list("Electronics", &[("phone", 2.0), ("great", 1.0)]),
            list("Books", &[("story", 3.0), ("great", 0.5)]),
        ];
        let report = assemble(to_records(&lists));
        assert_eq!(report.dictionary, vec!["great", "phone", "story"]);
        assert_eq!(
            report.category_lines,
            vec!["Books story:3.0 great:0.5", "Electronics phone:2.0 great:1.0"]
        );
        assert_eq!(report.lines().last().unwrap(), "great phone story");
    }

    #[test]
    fn duplicate_records_are_idempotent() {
        let lists = vec![list("A", &[("x", 1.0)])];
        let mut records = to_records(&lists);
        records.extend(to_records(&lists));
        let report = assemble(records);
        assert_eq!(report.category_lines, vec!["A x:1.0"]);
        assert_eq!(report.dictionary, vec!["x"]);
    }

    #[test]
    fn empty_list_still_gets_a_line() {
        let report = assemble(to_records(&[list("Empty", &[])]));
        assert_eq!(report.category_lines, vec!["Empty"]);
        assert!(report.dictionary.is_empty());
        assert_eq!(report.to_text(), "Empty\n\n");
    }

    #[test]
    fn text_round_trip() {
        let report = assemble(to_records(&[list("A", &[("x", 1.0), ("y", 0.5)])]));
        let lines: Vec<String> = report.to_text().lines().map(String::from).collect();
        assert_eq!(FinalReport::from_lines(lines), Some(report));
    }
}
