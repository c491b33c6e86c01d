use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "me","more","most","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Split text into lowercase alphanumeric terms.
///
/// Input is NFKC-normalized first, so compatibility forms (ligatures,
/// full-width digits) produce the same terms as their plain spellings.
/// Order is preserved and duplicates are kept.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Drop common English function words.
    pub stopwords: bool,
    /// Reduce terms to their English stem.
    pub stemming: bool,
}

/// Tokenizer plus optional filters. Documents and queries must go through
/// the same analyzer or their terms will not line up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self { Self { config } }

    pub fn config(&self) -> AnalyzerConfig { self.config }

    pub fn analyze(&self, text: &str) -> Vec<String> {
        let tokens = tokenize(text);
        if !self.config.stopwords && !self.config.stemming {
            return tokens;
        }
        tokens
            .into_iter()
            .filter(|t| !(self.config.stopwords && is_stopword(t)))
            .map(|t| if self.config.stemming { STEMMER.stem(&t).into_owned() } else { t })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn basic_tokenize() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn splits_on_punctuation_and_underscore() {
        assert_eq!(tokenize("snake_case foo-bar baz.qux"), vec!["snake", "case", "foo", "bar", "baz", "qux"]);
    }

    #[test]
    fn keeps_digits_and_duplicates() {
        assert_eq!(tokenize("cat cat 42 Cat"), vec!["cat", "cat", "42", "cat"]);
    }

    #[test]
    fn empty_and_symbol_only_input() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  --- !!! ").is_empty());
    }

    #[test]
    fn normalizes_compatibility_forms() {
        assert_eq!(tokenize("ﬁle １２"), vec!["file", "12"]);
    }

    #[test]
    fn default_analyzer_matches_tokenize() {
        let a = Analyzer::default();
        assert_eq!(a.analyze("The Running Dogs"), tokenize("The Running Dogs"));
    }

    #[test]
    fn analyzer_filters_and_stems() {
        let a = Analyzer::new(AnalyzerConfig { stopwords: true, stemming: true });
        let terms = a.analyze("The runners are running");
        assert!(!terms.contains(&"the".to_string()));
        assert!(!terms.contains(&"are".to_string()));
        assert!(terms.contains(&"run".to_string()));
    }

    proptest! {
        #[test]
        fn tokens_are_lowercase_alphanumeric(s in "\\PC{0,64}") {
            for t in tokenize(&s) {
                prop_assert!(!t.is_empty());
                prop_assert!(t.chars().all(|c| c.is_alphanumeric()));
                prop_assert_eq!(t.to_lowercase(), t.clone());
            }
        }
    }
}
