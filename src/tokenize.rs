use std::collections::BTreeSet;

use crate::config::PipelineOptions;
use crate::stopwords::StopwordSet;

/// Punctuation and symbols that separate tokens, in addition to whitespace and digits.
const SEPARATORS: &[char] = &[
    '(', ')', '[', ']', '{', '}', '.', '!', '?', ',', ';', ':', '+', '=', '-', '_', '"', '\'',
    '`', '~', '#', '@', '&', '*', '%', '€', '$', '§', '\\', '/',
];

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c.is_numeric() || SEPARATORS.contains(&c)
}

///Splits text into lowercase tokens at whitespace, digits and the punctuation in `SEPARATORS`.
/// # Example
/// ```
/// use chi2_terms::split_tokens;
/// let tokens: Vec<String> = split_tokens("Great phone, 10/10!").collect();
/// assert_eq!(tokens, vec!["great".to_string(), "phone".to_string()]);
/// ```
pub fn split_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(is_separator)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Turns document text into the set of distinct terms that get counted.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: StopwordSet,
    min_len: usize,
    max_len: usize,
}

impl Tokenizer {
    pub fn new(stopwords: StopwordSet, options: &PipelineOptions) -> Self {
        Tokenizer {
            stopwords,
            min_len: options.min_token_len,
            max_len: options.max_token_len,
        }
    }

    pub fn stopwords(&self) -> &StopwordSet {
        &self.stopwords
    }

    /// Distinct, lowercased, non-stopword terms of `text` whose length lies in
    /// `[min_len, max_len]`. A term appears once no matter how often it occurs.
    pub fn unique_terms(&self, text: &str) -> BTreeSet<String> {
        split_tokens(text)
            .filter(|t| {
                let len = t.chars().count();
                len >= self.min_len && len <= self.max_len
            })
            .filter(|t| !self.stopwords.contains(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(stop: &str) -> Tokenizer {
        Tokenizer::new(StopwordSet::parse(stop), &PipelineOptions::default())
    }

    #[test]
    fn splits_on_symbols_and_digits() {
        let tokens: Vec<String> = split_tokens("(_test] {test2!= a€b§c\tx/y\\z").collect();
        assert_eq!(tokens, vec!["test", "test", "a", "b", "c", "x", "y", "z"]);
    }

    #[test]
    fn dedups_within_document() {
        let t = tokenizer("");
        let terms = t.unique_terms("Good good GOOD value, good!");
        assert_eq!(
            terms.into_iter().collect::<Vec<_>>(),
            vec!["good".to_string(), "value".to_string()]
        );
    }

    #[test]
    fn drops_stopwords_after_lowercasing() {
        let t = tokenizer("is\nworks\n");
        let terms = t.unique_terms("Great phone WORKS well. It Is fine");
        assert!(!terms.contains("works"));
        assert!(!terms.contains("is"));
        assert!(terms.contains("great"));
        assert!(terms.contains("it"));
    }

    #[test]
    fn enforces_length_bounds() {
        let t = tokenizer("");
        let long_ok = "a".repeat(49);
        let too_long = "b".repeat(50);
        let text = format!("x ok {long_ok} {too_long}");
        let terms = t.unique_terms(&text);
        assert!(!terms.contains("x"));
        assert!(terms.contains("ok"));
        assert!(terms.contains(&long_ok));
        assert!(!terms.contains(&too_long));
    }

    #[test]
    fn length_counts_chars_not_bytes() {
        let t = tokenizer("");
        // two chars, four bytes
        let terms = t.unique_terms("éé");
        assert!(terms.contains("éé"));
    }
}
