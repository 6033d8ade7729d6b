//! Stopword list loading.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::{Chi2Error, Result};

/// Read-only set of lowercase stopwords.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopwordSet {
    words: HashSet<String>,
}

impl StopwordSet {
    /// Load a stopword file with one word per line. Blank lines are ignored
    /// and entries are lowercased.
    ///
    /// A missing or unreadable file is a configuration error: the run must
    /// not start without its stopwords.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Chi2Error::Config {
            message: format!("cannot read stopword file {}: {e}", path.display()),
            source: Some(e),
        })?;
        let set = Self::parse(&content);
        info!("loaded {} stopwords from {}", set.len(), path.display());
        Ok(set)
    }

    pub fn parse(content: &str) -> Self {
        content.lines().collect()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for StopwordSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let words = iter
            .into_iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        StopwordSet { words }
    }
}
