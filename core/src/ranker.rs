//! Ranking strategies.
//!
//! A [`Ranker`] turns analyzed query terms into an ordered list of
//! `(doc_id, score)` pairs. The engine picks one at construction time from a
//! [`RankerKind`] and swaps it with `change_ranker`.

use crate::error::{Result, SearchError};
use crate::index::{DocId, InvertedIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankerKind {
    #[default]
    Tfidf,
}

impl RankerKind {
    pub const ALL: &'static [RankerKind] = &[RankerKind::Tfidf];

    pub fn as_str(&self) -> &'static str {
        match self {
            RankerKind::Tfidf => "tfidf",
        }
    }

    pub fn build(self) -> Arc<dyn Ranker> {
        match self {
            RankerKind::Tfidf => Arc::new(TfIdfRanker),
        }
    }
}

impl fmt::Display for RankerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for RankerKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(RankerKind::Tfidf),
            other => Err(SearchError::invalid_input(format!("unsupported ranker type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermContribution {
    pub term: String,
    pub tf: u32,
    pub idf: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub doc_id: DocId,
    pub score: f64,
    pub matching_terms: usize,
    /// Largest contribution first.
    pub contributions: Vec<TermContribution>,
}

pub trait Ranker: Send + Sync {
    fn kind(&self) -> RankerKind;

    /// Human-readable name reported in stats.
    fn name(&self) -> &'static str;

    /// Score every matching document and return the best `top_n`, highest
    /// score first, ties by document id.
    fn score(&self, index: &InvertedIndex, terms: &[String], top_n: usize) -> Vec<(DocId, f64)>;

    /// Break one document's score down per query term. `None` if the
    /// document is not indexed.
    fn explain(&self, index: &InvertedIndex, terms: &[String], doc_id: &str) -> Option<Explanation>;
}

/// Unique query terms in a stable order.
pub fn distinct_terms(terms: &[String]) -> Vec<&str> {
    terms.iter().map(String::as_str).collect::<BTreeSet<_>>().into_iter().collect()
}

/// `score(d) = Σ tf(t, d) · idf(t)` over the distinct query terms.
#[derive(Debug, Default, Clone, Copy)]
pub struct TfIdfRanker;

impl Ranker for TfIdfRanker {
    fn kind(&self) -> RankerKind { RankerKind::Tfidf }

    fn name(&self) -> &'static str { "TF-IDF Ranker" }

    fn score(&self, index: &InvertedIndex, terms: &[String], top_n: usize) -> Vec<(DocId, f64)> {
        if top_n == 0 || index.document_count() == 0 {
            return Vec::new();
        }
        let mut scores: HashMap<&str, f64> = HashMap::new();
        for term in distinct_terms(terms) {
            let idf = index.idf(term);
            for (doc_id, tf) in index.postings(term) {
                *scores.entry(doc_id).or_insert(0.0) += tf as f64 * idf;
            }
        }

        let mut scored: Vec<(&str, f64)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        scored.truncate(top_n);
        scored.into_iter().map(|(d, s)| (d.to_string(), s)).collect()
    }

    fn explain(&self, index: &InvertedIndex, terms: &[String], doc_id: &str) -> Option<Explanation> {
        if !index.contains(doc_id) {
            return None;
        }
        let mut contributions: Vec<TermContribution> = distinct_terms(terms)
            .into_iter()
            .filter_map(|term| {
                let tf = index.term_frequency(term, doc_id);
                (tf > 0).then(|| {
                    let idf = index.idf(term);
                    TermContribution { term: term.to_string(), tf, idf, contribution: tf as f64 * idf }
                })
            })
            .collect();
        contributions.sort_by(|a, b| b.contribution.total_cmp(&a.contribution).then_with(|| a.term.cmp(&b.term)));
        // Summed in query-term order so the total matches `score` exactly.
        let score = distinct_terms(terms)
            .into_iter()
            .map(|t| index.term_frequency(t, doc_id) as f64 * index.idf(t))
            .sum();
        Some(Explanation { doc_id: doc_id.to_string(), score, matching_terms: contributions.len(), contributions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Metadata;
    use proptest::prelude::*;

    fn terms(q: &str) -> Vec<String> { crate::tokenizer::tokenize(q) }

    fn index_with(docs: &[(&str, &str)]) -> InvertedIndex {
        let mut idx = InvertedIndex::default();
        for (id, content) in docs {
            idx.add_or_replace(id, content, Metadata::new()).unwrap();
        }
        idx
    }

    #[test]
    fn higher_tf_ranks_first() {
        let idx = index_with(&[("d1", "cat dog"), ("d2", "cat cat dog")]);
        let ranked = TfIdfRanker.score(&idx, &terms("cat"), 10);
        let ids: Vec<&str> = ranked.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(ids, vec!["d2", "d1"]);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn ties_break_by_doc_id() {
        let idx = index_with(&[("b", "same words"), ("a", "same words"), ("c", "same words")]);
        let ranked = TfIdfRanker.score(&idx, &terms("same"), 10);
        let ids: Vec<&str> = ranked.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn truncates_to_top_n() {
        let idx = index_with(&[("a", "x"), ("b", "x"), ("c", "x")]);
        assert_eq!(TfIdfRanker.score(&idx, &terms("x"), 2).len(), 2);
    }

    #[test]
    fn empty_corpus_and_unknown_terms() {
        let empty = InvertedIndex::default();
        assert!(TfIdfRanker.score(&empty, &terms("anything"), 10).is_empty());
        let idx = index_with(&[("d1", "apple")]);
        assert!(TfIdfRanker.score(&idx, &terms("banana"), 10).is_empty());
        assert!(TfIdfRanker.score(&idx, &[], 10).is_empty());
    }

    #[test]
    fn repeated_query_terms_count_once() {
        let idx = index_with(&[("d1", "cat"), ("d2", "dog")]);
        let once = TfIdfRanker.score(&idx, &terms("cat"), 10);
        let twice = TfIdfRanker.score(&idx, &terms("cat cat"), 10);
        assert_eq!(once, twice);
    }

    #[test]
    fn explain_matches_score() {
        let idx = index_with(&[("d1", "rust search engine"), ("d2", "rust rust")]);
        let q = terms("rust engine missing");
        let ranked = TfIdfRanker.score(&idx, &q, 10);
        let exp = TfIdfRanker.explain(&idx, &q, "d1").unwrap();
        let d1 = ranked.iter().find(|(d, _)| d == "d1").unwrap().1;
        assert_eq!(exp.score, d1);
        assert_eq!(exp.matching_terms, 2);
        assert_eq!(exp.contributions[0].term, "engine");
        assert!(TfIdfRanker.explain(&idx, &q, "nope").is_none());
    }

    #[test]
    fn parses_ranker_kind() {
        assert_eq!("TFIDF".parse::<RankerKind>().unwrap(), RankerKind::Tfidf);
        assert!(matches!("bm25".parse::<RankerKind>(), Err(SearchError::InvalidInput(_))));
        assert_eq!(RankerKind::Tfidf.build().name(), "TF-IDF Ranker");
    }

    proptest! {
        // Adding occurrences of a query term to a document never lowers its
        // score while df stays fixed.
        #[test]
        fn score_is_monotonic_in_tf(base in 1usize..6, extra in 1usize..6, other in 0usize..4) {
            let mut idx = index_with(&[("other", "filler text")]);
            let before_text = format!("{} {}", "needle ".repeat(base), "hay ".repeat(other));
            idx.add_or_replace("d", &before_text, Metadata::new()).unwrap();
            let before = TfIdfRanker.score(&idx, &terms("needle hay"), 10);

            let after_text = format!("{} {}", "needle ".repeat(base + extra), "hay ".repeat(other));
            idx.add_or_replace("d", &after_text, Metadata::new()).unwrap();
            let after = TfIdfRanker.score(&idx, &terms("needle hay"), 10);

            let s = |r: &Vec<(DocId, f64)>| r.iter().find(|(d, _)| d == "d").map(|x| x.1).unwrap_or(0.0);
            prop_assert!(s(&after) >= s(&before));
        }
    }
}
