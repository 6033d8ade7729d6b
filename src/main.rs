#![forbid(unsafe_code)]
//! # chi2_terms CLI
//!
//! Command-line front end for the `chi2_terms` crate: reads a JSON-lines
//! corpus (one `{"category": ..., "reviewText": ...}` object per line), ranks
//! the terms of every category by chi-square and writes
//! `<output_dir>/output.txt`.
//!
//! ## Example
//! ```bash
//! cargo run --release -- reviews.json out/ stopwords.txt --top-n 75
//! ```
//!
//! Intermediate stage outputs are kept under `out/1_counts` .. `out/4_final`;
//! a rerun with the same arguments reuses every committed stage unless
//! `--fresh` is given. Set `RUST_LOG=debug` for per-partition details.

use std::path::PathBuf;
use std::process;

use chi2_terms::{PipelineOptions, config, run_pipeline};
use clap::Parser;
use log::{error, info};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON-lines file, or directory of JSON-lines files, to analyze
    input_path: PathBuf,

    /// Directory for stage outputs and the final output.txt
    output_dir: PathBuf,

    /// Stopword file (one word per line)
    stopwords_path: PathBuf,

    /// Number of terms kept per category
    #[arg(long, default_value_t = config::DEFAULT_TOP_N)]
    top_n: usize,

    /// Shortest token (in characters) that is counted
    #[arg(long, default_value_t = config::DEFAULT_MIN_TOKEN_LEN)]
    min_token_len: usize,

    /// Longest token (in characters) that is counted
    #[arg(long, default_value_t = config::DEFAULT_MAX_TOKEN_LEN)]
    max_token_len: usize,

    /// Append each record's optional `summary` field to its text
    #[arg(long, default_value_t = false)]
    include_summary: bool,

    /// Worker threads (default: one per CPU)
    #[arg(long)]
    threads: Option<usize>,

    /// Read attempts per input file before giving up
    #[arg(long, default_value_t = config::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: usize,

    /// Recompute every stage, ignoring committed outputs of earlier runs
    #[arg(long, default_value_t = false)]
    fresh: bool,
}

impl Cli {
    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            top_n: self.top_n,
            min_token_len: self.min_token_len,
            max_token_len: self.max_token_len,
            include_summary: self.include_summary,
            threads: self.threads,
            max_attempts: self.max_attempts,
            resume: !self.fresh,
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run_pipeline(
        &cli.input_path,
        &cli.output_dir,
        &cli.stopwords_path,
        &cli.options(),
    ) {
        Ok(run) => {
            if !run.resumed.is_empty() {
                info!("reused committed stages: {:?}", run.resumed);
            }
            println!("{}", run.output_path.display());
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
