//! Stage outputs on disk.
//!
//! Each stage writes one data file into its own directory under the output
//! directory and then a `_SUCCESS` manifest. A stage counts as committed only
//! once its manifest exists and matches the current run key, so a run that is
//! aborted mid-stage leaves nothing that a later run would reuse.

use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Chi2Error, Result};

const MANIFEST: &str = "_SUCCESS";

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Counts,
    ChiSquare,
    TopTerms,
    Final,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Counts, Stage::ChiSquare, Stage::TopTerms, Stage::Final];

    pub fn dir_name(self) -> &'static str {
        match self {
            Stage::Counts => "1_counts",
            Stage::ChiSquare => "2_chisquare",
            Stage::TopTerms => "3_topterms",
            Stage::Final => "4_final",
        }
    }

    fn data_file(self) -> &'static str {
        match self {
            Stage::Final => "part-00000.txt",
            _ => "part-00000.tsv",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Contents of a stage's `_SUCCESS` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub stage: String,
    /// Identifies the inputs and options the stage was computed from.
    pub run_key: String,
    pub records: usize,
    pub committed_at: String,
}

/// Reads and writes stage outputs below one output directory.
#[derive(Debug, Clone)]
pub struct StageStore {
    root: PathBuf,
    run_key: String,
}

impl StageStore {
    pub fn open(root: &Path, run_key: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| Chi2Error::io(root, e))?;
        Ok(StageStore {
            root: root.to_path_buf(),
            run_key: run_key.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.root.join(stage.dir_name())
    }

    pub fn data_path(&self, stage: Stage) -> PathBuf {
        self.stage_dir(stage).join(stage.data_file())
    }

    fn manifest_path(&self, stage: Stage) -> PathBuf {
        self.stage_dir(stage).join(MANIFEST)
    }

    pub fn manifest(&self, stage: Stage) -> Result<Option<Manifest>> {
        let path = self.manifest_path(stage);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Chi2Error::io(&path, e)),
        };
        let manifest = serde_json::from_str(&text)
            .map_err(|e| Chi2Error::checkpoint(&path, format!("bad manifest: {e}")))?;
        Ok(Some(manifest))
    }

    /// The stage's manifest, if the stage was committed for this run key.
    pub fn committed(&self, stage: Stage) -> Result<Option<Manifest>> {
        Ok(self.manifest(stage)?.filter(|m| {
            let same = m.run_key == self.run_key;
            if !same {
                info!("{stage}: committed output belongs to a different run, recomputing");
            }
            same
        }))
    }

    /// Forget `stage` and every later stage.
    pub fn invalidate_from(&self, stage: Stage) -> Result<()> {
        for s in Stage::ALL.into_iter().filter(|s| *s >= stage) {
            let path = self.manifest_path(s);
            match fs::remove_file(&path) {
                Ok(()) => debug!("{s}: removed stale manifest"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Chi2Error::io(&path, e)),
            }
        }
        Ok(())
    }

    /// Write `rows` as the stage's tab-separated data file and commit the stage.
    pub fn commit_rows<T: Serialize>(&self, stage: Stage, rows: &[T]) -> Result<PathBuf> {
        let path = self.data_path(stage);
        self.write_atomically(stage, |file| {
            let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(file);
            for row in rows {
                wtr.serialize(row).map_err(|e| Chi2Error::Csv {
                    path: path.clone(),
                    source: e,
                })?;
            }
            wtr.flush().map_err(|e| Chi2Error::io(&path, e))
        })?;
        self.write_manifest(stage, rows.len())?;
        Ok(path)
    }

    /// Load the rows of a committed stage.
    pub fn load_rows<T: DeserializeOwned>(
        &self,
        stage: Stage,
        manifest: &Manifest,
    ) -> Result<Vec<T>> {
        let path = self.data_path(stage);
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(&path)
            .map_err(|e| Chi2Error::Csv {
                path: path.clone(),
                source: e,
            })?;
        let rows = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<T>, _>>()
            .map_err(|e| Chi2Error::Csv {
                path: path.clone(),
                source: e,
            })?;
        check_count(&path, rows.len(), manifest)?;
        Ok(rows)
    }

    /// Write plain text lines as the stage's data file and commit the stage.
    pub fn commit_lines(&self, stage: Stage, lines: &[String]) -> Result<PathBuf> {
        let path = self.data_path(stage);
        self.write_atomically(stage, |file| {
            let mut w = BufWriter::new(file);
            for line in lines {
                writeln!(w, "{line}").map_err(|e| Chi2Error::io(&path, e))?;
            }
            w.flush().map_err(|e| Chi2Error::io(&path, e))
        })?;
        self.write_manifest(stage, lines.len())?;
        Ok(path)
    }

    pub fn load_lines(&self, stage: Stage, manifest: &Manifest) -> Result<Vec<String>> {
        let path = self.data_path(stage);
        let file = fs::File::open(&path).map_err(|e| Chi2Error::io(&path, e))?;
        let lines = BufReader::new(file)
            .lines()
            .collect::<std::io::Result<Vec<String>>>()
            .map_err(|e| Chi2Error::io(&path, e))?;
        check_count(&path, lines.len(), manifest)?;
        Ok(lines)
    }

    fn write_atomically<F>(&self, stage: Stage, write: F) -> Result<()>
    where
        F: FnOnce(&mut NamedTempFile) -> Result<()>,
    {
        let dir = self.stage_dir(stage);
        fs::create_dir_all(&dir).map_err(|e| Chi2Error::io(&dir, e))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Chi2Error::io(&dir, e))?;
        write(&mut tmp)?;
        let path = self.data_path(stage);
        tmp.persist(&path).map_err(|e| Chi2Error::io(&path, e.error))?;
        Ok(())
    }

    fn write_manifest(&self, stage: Stage, records: usize) -> Result<()> {
        let manifest = Manifest {
            stage: stage.dir_name().to_string(),
            run_key: self.run_key.clone(),
            records,
            committed_at: Utc::now().to_rfc3339(),
        };
        let path = self.manifest_path(stage);
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| Chi2Error::checkpoint(&path, e.to_string()))?;
        fs::write(&path, json).map_err(|e| Chi2Error::io(&path, e))?;
        info!("{stage}: committed {records} records");
        Ok(())
    }
}

fn check_count(path: &Path, found: usize, manifest: &Manifest) -> Result<()> {
    if found != manifest.records {
        return Err(Chi2Error::checkpoint(
            path,
            format!("expected {} records, found {found}", manifest.records),
        ));
    }
    Ok(())
}
