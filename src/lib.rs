#![forbid(unsafe_code)]
//! # chi2_terms
//!
//! Finds the terms most associated with each category of a labeled corpus,
//! using the chi-square test of independence between "document contains the
//! term" and "document belongs to the category".
//!
//! The work runs as four stages, each consuming the full output of the one
//! before it:
//!
//! 1. **count**: tokenize documents and count document frequencies
//!    ([`counter`]),
//! 2. **chi-square**: build a contingency table per `(term, category)` pair
//!    and score it ([`score`]),
//! 3. **top terms**: keep the best `top_n` terms per category ([`select`]),
//! 4. **final**: format one line per category plus the merged dictionary
//!    ([`assemble`]).
//!
//! ## Example
//! ```
//! use chi2_terms::{Document, PipelineOptions, StopwordSet, analyze_documents};
//!
//! let docs = vec![
//!     Document::new("Electronics", "Great phone works well"),
//!     Document::new("Electronics", "Battery life is poor"),
//!     Document::new("Books", "Great story well written"),
//! ];
//! let stop = StopwordSet::parse("is\nworks\n");
//! let report = analyze_documents(&docs, stop, &PipelineOptions::default()).unwrap();
//! assert_eq!(report.category_lines[0], "Books story:3.0 written:3.0 great:0.75 well:0.75");
//! ```

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub mod aggregate;
pub mod assemble;
pub mod checkpoint;
pub mod config;
pub mod counter;
pub mod error;
pub mod pipeline;
pub mod score;
pub mod select;
pub mod stopwords;
pub mod tokenize;

pub use assemble::{FinalReport, assemble};
pub use checkpoint::{Manifest, Stage, StageStore};
pub use config::PipelineOptions;
pub use counter::{CountTables, Counter, Document};
pub use error::{Chi2Error, RecordError, Result};
pub use pipeline::{OUTPUT_FILE, PipelineReport, analyze_documents, run_pipeline};
pub use score::{ChiSquareScore, ContingencyTable, Metadata, ScoreEngine};
pub use select::{TopList, select_top};
pub use stopwords::StopwordSet;
pub use tokenize::{Tokenizer, split_tokens};

/// Input partitions below `path`, sorted by path.
///
/// A file path is returned as is. Directories are walked recursively; files
/// whose name starts with `.` or `_` (such as `_SUCCESS` markers) are skipped.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(path).map_err(|e| Chi2Error::io(path, e))?;
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = entry.map_err(|e| Chi2Error::io(path, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let hidden = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with('.') || n.starts_with('_'));
        if !hidden {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn collect_files_walks_and_skips_markers() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("b");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("a.json"), "").unwrap();
        fs::write(nested.join("c.json"), "").unwrap();
        fs::write(dir.path().join("_SUCCESS"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.json"), nested.join("c.json")]);
    }

    #[test]
    fn collect_files_accepts_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("_odd_name.json");
        fs::write(&f, "").unwrap();
        assert_eq!(collect_files(&f).unwrap(), vec![f]);
    }

    #[test]
    fn collect_files_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_files(&dir.path().join("missing")).is_err());
    }
}
