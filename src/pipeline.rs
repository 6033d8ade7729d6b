//! Stage orchestration.
//!
//! Stages run strictly one after another; each consumes the complete,
//! materialized output of the previous one. Stage outputs are committed
//! through [`StageStore`], and a committed stage is loaded rather than rerun.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, UNIX_EPOCH};

use log::{debug, info};
use rayon::ThreadPoolBuilder;
use sha2::{Digest, Sha256};

use crate::assemble::{FinalReport, assemble};
use crate::checkpoint::{Stage, StageStore};
use crate::collect_files;
use crate::config::PipelineOptions;
use crate::counter::{CountRecord, CountTables, Counter, Document};
use crate::error::{Chi2Error, Result};
use crate::score::{ChiSquareScore, ScoreEngine};
use crate::select::{SelectorRecord, select_top, to_records};
use crate::stopwords::StopwordSet;
use crate::tokenize::Tokenizer;

/// Name of the merged result file in the output directory.
pub const OUTPUT_FILE: &str = "output.txt";

/// What a pipeline run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub output_path: PathBuf,
    pub report: FinalReport,
    pub documents: u64,
    /// Records skipped by the count stage. Zero when that stage was resumed.
    pub skipped_records: u64,
    pub scored_pairs: usize,
    pub orphaned_pairs: u64,
    /// Stages loaded from an earlier run instead of being computed.
    pub resumed: Vec<Stage>,
}

/// Run all four stages on `input` (a JSON-lines file or a directory of them)
/// and write the result to `<output_dir>/output.txt`.
pub fn run_pipeline(
    input: &Path,
    output_dir: &Path,
    stopwords_path: &Path,
    options: &PipelineOptions,
) -> Result<PipelineReport> {
    options.validate()?;
    let stopwords = StopwordSet::load(stopwords_path)?;
    let files = collect_files(input)?;
    let key = run_key(&files, &stopwords, options)?;
    debug!("run key: {key}");

    let run = || -> Result<PipelineReport> {
        let store = StageStore::open(output_dir, key)?;
        if !options.resume {
            store.invalidate_from(Stage::Counts)?;
        }
        let tokenizer = Tokenizer::new(stopwords, options);
        StageRunner {
            store: &store,
            files: &files,
            tokenizer: &tokenizer,
            options,
            outcome: PipelineReport::default(),
        }
        .run()
    };

    match options.threads {
        Some(n) => ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| Chi2Error::config(format!("cannot start {n} worker threads: {e}")))?
            .install(run),
        None => run(),
    }
}

/// Run the four stages in memory, without touching the file system.
pub fn analyze_documents(
    docs: &[Document],
    stopwords: StopwordSet,
    options: &PipelineOptions,
) -> Result<FinalReport> {
    options.validate()?;
    let tokenizer = Tokenizer::new(stopwords, options);
    let tables = Counter::new(&tokenizer, options.include_summary).count_documents(docs);
    let (metadata, joint) = tables.into_parts();
    let scores = ScoreEngine::new(&metadata).score_all(&joint).scores;
    let lists = select_top(scores, options.top_n);
    Ok(assemble(to_records(&lists)))
}

/// Everything that changes stage output. Thread count, retries and resume do not.
///
/// Partitions are fingerprinted by path, length and modification time, and
/// the stopword list by its contents, so editing either forces a recompute.
fn run_key(
    files: &[PathBuf],
    stopwords: &StopwordSet,
    options: &PipelineOptions,
) -> Result<String> {
    let mut hasher = Sha256::new();
    for path in files {
        let meta = fs::metadata(path).map_err(|e| Chi2Error::io(path, e))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(meta.len().to_be_bytes());
        hasher.update(modified.as_nanos().to_be_bytes());
    }
    let inputs = format!("{:x}", hasher.finalize());

    let mut words: Vec<&str> = stopwords.iter().collect();
    words.sort_unstable();
    let mut hasher = Sha256::new();
    for word in words {
        hasher.update(word.as_bytes());
        hasher.update([b'\n']);
    }
    let stop = format!("{:x}", hasher.finalize());

    Ok(format!(
        "inputs={} partitions={} stopwords={} top_n={} token_len={}..={} summary={}",
        inputs,
        files.len(),
        stop,
        options.top_n,
        options.min_token_len,
        options.max_token_len,
        options.include_summary
    ))
}

struct StageRunner<'a> {
    store: &'a StageStore,
    files: &'a [PathBuf],
    tokenizer: &'a Tokenizer,
    options: &'a PipelineOptions,
    outcome: PipelineReport,
}

impl StageRunner<'_> {
    fn run(mut self) -> Result<PipelineReport> {
        let started = Instant::now();
        let report = self.final_report()?;

        let output_path = self.store.root().join(OUTPUT_FILE);
        fs::write(&output_path, report.to_text()).map_err(|e| Chi2Error::io(&output_path, e))?;
        info!(
            "wrote {} categories and {} dictionary terms to {} in {:?}",
            report.category_lines.len(),
            report.dictionary.len(),
            output_path.display(),
            started.elapsed()
        );

        self.outcome.output_path = output_path;
        self.outcome.report = report;
        Ok(self.outcome)
    }

    fn counts(&mut self) -> Result<CountTables> {
        if let Some(m) = self.store.committed(Stage::Counts)? {
            self.outcome.resumed.push(Stage::Counts);
            let rows: Vec<CountRecord> = self.store.load_rows(Stage::Counts, &m)?;
            let tables = CountTables::from_records(rows);
            self.outcome.documents = tables.total_docs;
            return Ok(tables);
        }
        self.store.invalidate_from(Stage::Counts)?;
        let started = Instant::now();
        info!("{}: counting {} input partitions", Stage::Counts, self.files.len());

        let counted = Counter::new(self.tokenizer, self.options.include_summary)
            .count_partitions(self.files, self.options.max_attempts)?;
        self.store
            .commit_rows(Stage::Counts, &counted.tables.to_records())?;
        info!("{}: done in {:?}", Stage::Counts, started.elapsed());

        self.outcome.documents = counted.tables.total_docs;
        self.outcome.skipped_records = counted.skipped;
        Ok(counted.tables)
    }

    fn chi_square(&mut self) -> Result<Vec<ChiSquareScore>> {
        if let Some(m) = self.store.committed(Stage::ChiSquare)? {
            self.outcome.resumed.push(Stage::ChiSquare);
            let scores: Vec<ChiSquareScore> = self.store.load_rows(Stage::ChiSquare, &m)?;
            self.outcome.scored_pairs = scores.len();
            return Ok(scores);
        }
        let tables = self.counts()?;
        self.store.invalidate_from(Stage::ChiSquare)?;
        let started = Instant::now();

        let (metadata, joint) = tables.into_parts();
        info!(
            "{}: scoring {} pairs against {} categories",
            Stage::ChiSquare,
            joint.len(),
            metadata.category_docs.len()
        );
        let batch = ScoreEngine::new(&metadata).score_all(&joint);
        self.store.commit_rows(Stage::ChiSquare, &batch.scores)?;
        info!("{}: done in {:?}", Stage::ChiSquare, started.elapsed());

        self.outcome.scored_pairs = batch.scores.len();
        self.outcome.orphaned_pairs = batch.orphans;
        Ok(batch.scores)
    }

    fn top_terms(&mut self) -> Result<Vec<SelectorRecord>> {
        if let Some(m) = self.store.committed(Stage::TopTerms)? {
            self.outcome.resumed.push(Stage::TopTerms);
            return self.store.load_rows(Stage::TopTerms, &m);
        }
        let scores = self.chi_square()?;
        self.store.invalidate_from(Stage::TopTerms)?;

        let records = to_records(&select_top(scores, self.options.top_n));
        self.store.commit_rows(Stage::TopTerms, &records)?;
        Ok(records)
    }

    fn final_report(&mut self) -> Result<FinalReport> {
        if let Some(m) = self.store.committed(Stage::Final)? {
            self.outcome.resumed.push(Stage::Final);
            let lines = self.store.load_lines(Stage::Final, &m)?;
            let path = self.store.data_path(Stage::Final);
            return FinalReport::from_lines(lines)
                .ok_or_else(|| Chi2Error::checkpoint(path, "final output is empty"));
        }
        let records = self.top_terms()?;
        self.store.invalidate_from(Stage::Final)?;

        let report = assemble(records);
        self.store.commit_lines(Stage::Final, &report.lines())?;
        Ok(report)
    }
}
