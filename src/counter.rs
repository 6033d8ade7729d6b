//! Stage 1: tokenize documents and count document frequencies.
//!
//! Counts are per document, not per occurrence: a document adds at most 1 to
//! any `(term, category)` pair, 1 to its category and 1 to the total.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Merge, fold_combine};
use crate::error::{Chi2Error, RecordError, Result};
use crate::score::{JointCount, Metadata};
use crate::tokenize::Tokenizer;

const INITIAL_BACKOFF_MS: u64 = 50;
const MAX_BACKOFF_MS: u64 = 1000;

/// One labeled document, alive only while it is being tokenized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub category: String,
    pub text: String,
}

#[derive(Deserialize)]
struct RawRecord {
    category: Option<String>,
    #[serde(alias = "reviewText")]
    text: Option<String>,
    summary: Option<String>,
}

impl Document {
    pub fn new(category: impl Into<String>, text: impl Into<String>) -> Self {
        Document {
            category: category.into(),
            text: text.into(),
        }
    }

    /// Decode one JSON line. Text comes from `reviewText` or `text`; with
    /// `include_summary` an optional `summary` is appended to it.
    pub fn from_json_line(
        line: &str,
        include_summary: bool,
    ) -> std::result::Result<Self, RecordError> {
        let raw: RawRecord = serde_json::from_str(line)?;
        let category = raw.category.ok_or(RecordError::MissingField("category"))?;
        if category.trim().is_empty() {
            return Err(RecordError::EmptyField("category"));
        }
        let mut text = raw.text.ok_or(RecordError::MissingField("reviewText"))?;
        if include_summary {
            if let Some(summary) = raw.summary {
                text.push(' ');
                text.push_str(&summary);
            }
        }
        if text.trim().is_empty() {
            return Err(RecordError::EmptyField("reviewText"));
        }
        Ok(Document { category, text })
    }
}

/// The four aggregates produced by the counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountTables {
    pub total_docs: u64,
    pub category_docs: HashMap<String, u64>,
    pub term_total: HashMap<String, u64>,
    /// Keyed by `(term, category)`.
    pub joint: HashMap<(String, String), u64>,
}

impl Merge for CountTables {
    fn merge(&mut self, other: Self) {
        self.total_docs += other.total_docs;
        self.category_docs.merge(other.category_docs);
        self.term_total.merge(other.term_total);
        self.joint.merge(other.joint);
    }
}

impl CountTables {
    /// Count one document given its distinct terms.
    pub fn add_document(&mut self, category: &str, terms: &BTreeSet<String>) {
        self.total_docs += 1;
        *self.category_docs.entry(category.to_owned()).or_insert(0) += 1;
        for term in terms {
            *self.term_total.entry(term.clone()).or_insert(0) += 1;
            *self
                .joint
                .entry((term.clone(), category.to_owned()))
                .or_insert(0) += 1;
        }
    }

    /// Flatten into stage records, ordered by kind and then by key.
    pub fn to_records(&self) -> Vec<CountRecord> {
        let mut records = Vec::with_capacity(
            1 + self.category_docs.len() + self.term_total.len() + self.joint.len(),
        );
        records.push(CountRecord::new(CountKind::TotalDocs, "", "", self.total_docs));

        let mut cats: Vec<_> = self.category_docs.iter().collect();
        cats.sort();
        records.extend(
            cats.into_iter()
                .map(|(c, &n)| CountRecord::new(CountKind::CategoryDocs, "", c, n)),
        );

        let mut terms: Vec<_> = self.term_total.iter().collect();
        terms.sort();
        records.extend(
            terms
                .into_iter()
                .map(|(t, &n)| CountRecord::new(CountKind::TermTotal, t, "", n)),
        );

        let mut joint: Vec<_> = self.joint.iter().collect();
        joint.sort();
        records.extend(
            joint
                .into_iter()
                .map(|((t, c), &n)| CountRecord::new(CountKind::Joint, t, c, n)),
        );
        records
    }

    /// Rebuild from stage records. Repeated keys are summed, so the records of
    /// several partitions can be fed in together.
    pub fn from_records(records: impl IntoIterator<Item = CountRecord>) -> Self {
        let mut tables = CountTables::default();
        for r in records {
            match r.kind {
                CountKind::TotalDocs => tables.total_docs += r.count,
                CountKind::CategoryDocs => {
                    *tables.category_docs.entry(r.category).or_insert(0) += r.count
                }
                CountKind::TermTotal => *tables.term_total.entry(r.term).or_insert(0) += r.count,
                CountKind::Joint => {
                    *tables.joint.entry((r.term, r.category)).or_insert(0) += r.count
                }
            }
        }
        tables
    }

    /// Split into the broadcast side table and the joint-count stream.
    pub fn into_parts(self) -> (Metadata, Vec<JointCount>) {
        let metadata = Metadata {
            total_docs: self.total_docs,
            category_docs: self.category_docs,
            term_total: self.term_total,
        };
        let joint = self
            .joint
            .into_iter()
            .map(|((term, category), count)| JointCount {
                term,
                category,
                count,
            })
            .collect();
        (metadata, joint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountKind {
    TotalDocs,
    CategoryDocs,
    TermTotal,
    Joint,
}

/// One row of the counter's output. Fields a kind does not use are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRecord {
    pub kind: CountKind,
    pub term: String,
    pub category: String,
    pub count: u64,
}

impl CountRecord {
    fn new(kind: CountKind, term: &str, category: &str, count: u64) -> Self {
        CountRecord {
            kind,
            term: term.to_owned(),
            category: category.to_owned(),
            count,
        }
    }
}

/// Counter output for a set of lines, plus how many records were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counted {
    pub tables: CountTables,
    pub skipped: u64,
}

impl Merge for Counted {
    fn merge(&mut self, other: Self) {
        self.tables.merge(other.tables);
        self.skipped += other.skipped;
    }
}

pub struct Counter<'a> {
    tokenizer: &'a Tokenizer,
    include_summary: bool,
}

impl<'a> Counter<'a> {
    pub fn new(tokenizer: &'a Tokenizer, include_summary: bool) -> Self {
        Counter {
            tokenizer,
            include_summary,
        }
    }

    pub fn count_documents(&self, docs: &[Document]) -> CountTables {
        fold_combine(docs, |mut acc: CountTables, doc| {
            acc.add_document(&doc.category, &self.tokenizer.unique_terms(&doc.text));
            acc
        })
    }

    /// Count raw JSON-lines bytes. Undecodable or incomplete records are
    /// logged and skipped.
    pub fn count_bytes(&self, bytes: &[u8], source: &Path) -> Counted {
        let lines: Vec<(usize, &[u8])> = bytes
            .split(|&b| b == b'\n')
            .enumerate()
            .filter(|(_, l)| !l.trim_ascii().is_empty())
            .collect();

        fold_combine(lines, |mut acc: Counted, (idx, raw)| {
            match self.decode(raw) {
                Ok(doc) => {
                    let terms = self.tokenizer.unique_terms(&doc.text);
                    acc.tables.add_document(&doc.category, &terms);
                }
                Err(e) => {
                    warn!("{}:{}: skipping record: {}", source.display(), idx + 1, e);
                    acc.skipped += 1;
                }
            }
            acc
        })
    }

    fn decode(&self, raw: &[u8]) -> std::result::Result<Document, RecordError> {
        let line = std::str::from_utf8(raw)?;
        Document::from_json_line(line, self.include_summary)
    }

    /// Read and count one input partition, retrying the read on I/O errors.
    pub fn count_partition(&self, path: &Path, max_attempts: usize) -> Result<Counted> {
        let started = Instant::now();
        let bytes = read_with_retry(path, max_attempts)?;
        let counted = self.count_bytes(&bytes, path);
        debug!(
            "counted {} ({} docs, {} skipped) in {:?}",
            path.display(),
            counted.tables.total_docs,
            counted.skipped,
            started.elapsed()
        );
        Ok(counted)
    }

    /// Count all partitions in parallel and merge their aggregates.
    pub fn count_partitions(&self, paths: &[PathBuf], max_attempts: usize) -> Result<Counted> {
        let counted = paths
            .par_iter()
            .map(|p| self.count_partition(p, max_attempts))
            .try_reduce(Counted::default, |mut a, b| {
                a.merge(b);
                Ok(a)
            })?;
        info!(
            "counted {} documents in {} partitions ({} records skipped, {} terms, {} categories)",
            counted.tables.total_docs,
            paths.len(),
            counted.skipped,
            counted.tables.term_total.len(),
            counted.tables.category_docs.len()
        );
        Ok(counted)
    }
}

fn read_with_retry(path: &Path, max_attempts: usize) -> Result<Vec<u8>> {
    let mut attempt = 1;
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    loop {
        match fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if attempt < max_attempts && is_transient(e.kind()) => {
                warn!(
                    "reading {} failed (attempt {}/{}), retrying in {}ms: {}",
                    path.display(),
                    attempt,
                    max_attempts,
                    backoff_ms,
                    e
                );
                thread::sleep(Duration::from_millis(backoff_ms));
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                attempt += 1;
            }
            Err(e) => return Err(Chi2Error::io(path, e)),
        }
    }
}

/// Errors a later read of the same file may not hit again.
fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
