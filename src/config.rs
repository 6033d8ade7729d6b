use crate::error::{Chi2Error, Result};

/// Number of terms kept per category unless configured otherwise.
pub const DEFAULT_TOP_N: usize = 75;
/// Shortest token that is counted (in chars).
pub const DEFAULT_MIN_TOKEN_LEN: usize = 2;
/// Longest token that is counted (in chars).
pub const DEFAULT_MAX_TOKEN_LEN: usize = 49;
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Run configuration for [`crate::run_pipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Terms kept per category.
    pub top_n: usize,
    pub min_token_len: usize,
    pub max_token_len: usize,
    /// Append the optional `summary` field of a record to its text.
    pub include_summary: bool,
    /// Worker pool size; `None` uses rayon's global pool.
    pub threads: Option<usize>,
    /// Read attempts per input partition before the run fails.
    pub max_attempts: usize,
    /// Reuse stage outputs that were already committed by an earlier run.
    pub resume: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            top_n: DEFAULT_TOP_N,
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
            include_summary: false,
            threads: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            resume: true,
        }
    }
}

impl PipelineOptions {
    /// Reject option combinations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(Chi2Error::config("top-n must be at least 1"));
        }
        if self.min_token_len == 0 {
            return Err(Chi2Error::config("min-token-len must be at least 1"));
        }
        if self.min_token_len > self.max_token_len {
            return Err(Chi2Error::config(format!(
                "min-token-len ({}) exceeds max-token-len ({})",
                self.min_token_len, self.max_token_len
            )));
        }
        if self.threads == Some(0) {
            return Err(Chi2Error::config("threads must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(Chi2Error::config("max-attempts must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let o = PipelineOptions::default();
        assert!(o.validate().is_ok());
        assert_eq!(o.top_n, 75);
        assert_eq!((o.min_token_len, o.max_token_len), (2, 49));
    }

    #[test]
    fn rejects_bad_values() {
        let mut o = PipelineOptions::default();
        o.top_n = 0;
        assert!(o.validate().is_err());

        let mut o = PipelineOptions::default();
        o.min_token_len = 10;
        o.max_token_len = 5;
        assert!(o.validate().is_err());

        let mut o = PipelineOptions::default();
        o.threads = Some(0);
        assert!(o.validate().is_err());

        let mut o = PipelineOptions::default();
        o.max_attempts = 0;
        assert!(o.validate().is_err());
    }
}
