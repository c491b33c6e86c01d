use crate::error::{Result, SearchError};
use crate::tokenizer::Analyzer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type DocId = String;
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Raw occurrence count of every term in `content`.
    #[serde(default)]
    pub term_counts: BTreeMap<String, u32>,
}

/// Term → document → tf, plus the documents themselves.
///
/// `df(t)` is the size of the term's posting map, so it cannot drift from the
/// postings. Terms whose last posting is removed are dropped.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    analyzer: Analyzer,
    postings: HashMap<String, HashMap<DocId, u32>>,
    docs: HashMap<DocId, Document>,
    num_postings: usize,
}

impl InvertedIndex {
    pub fn new(analyzer: Analyzer) -> Self {
        Self { analyzer, ..Self::default() }
    }

    pub fn analyzer(&self) -> &Analyzer { &self.analyzer }

    /// Index `content` under `doc_id`, replacing any previous version.
    ///
    /// Old postings are removed before the new ones go in, so a re-index
    /// never leaves residue from the prior content.
    pub fn add_or_replace(&mut self, doc_id: &str, content: &str, metadata: Metadata) -> Result<()> {
        if doc_id.is_empty() {
            return Err(SearchError::invalid_input("document id must not be empty"));
        }
        let replaced = self.remove(doc_id);

        let mut term_counts: BTreeMap<String, u32> = BTreeMap::new();
        for term in self.analyzer.analyze(content) {
            *term_counts.entry(term).or_insert(0) += 1;
        }
        for (term, tf) in term_counts.iter() {
            self.postings.entry(term.clone()).or_default().insert(doc_id.to_string(), *tf);
        }
        self.num_postings += term_counts.len();

        tracing::debug!(doc_id, terms = term_counts.len(), replaced, "indexed document");
        self.docs.insert(
            doc_id.to_string(),
            Document { id: doc_id.to_string(), content: content.to_string(), metadata, term_counts },
        );
        Ok(())
    }

    /// Remove a document and all its postings. Returns false if it was not
    /// indexed, in which case nothing changes.
    pub fn remove(&mut self, doc_id: &str) -> bool {
        let Some(doc) = self.docs.remove(doc_id) else { return false };
        for term in doc.term_counts.keys() {
            if let Some(plist) = self.postings.get_mut(term) {
                if plist.remove(doc_id).is_some() {
                    self.num_postings -= 1;
                }
                if plist.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        true
    }

    pub fn get(&self, doc_id: &str) -> Option<&Document> { self.docs.get(doc_id) }

    pub fn contains(&self, doc_id: &str) -> bool { self.docs.contains_key(doc_id) }

    pub fn term_frequency(&self, term: &str, doc_id: &str) -> u32 {
        self.postings.get(term).and_then(|p| p.get(doc_id)).copied().unwrap_or(0)
    }

    pub fn document_frequency(&self, term: &str) -> u32 {
        self.postings.get(term).map_or(0, |p| p.len() as u32)
    }

    /// N, the number of indexed documents.
    pub fn document_count(&self) -> usize { self.docs.len() }

    /// Size of the vocabulary.
    pub fn term_count(&self) -> usize { self.postings.len() }

    pub fn posting_count(&self) -> usize { self.num_postings }

    /// Smoothed inverse document frequency: `ln((N + 1) / (df + 1)) + 1`.
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.document_count() as f64;
        let df = self.document_frequency(term) as f64;
        ((n + 1.0) / (df + 1.0)).ln() + 1.0
    }

    /// `(doc_id, tf)` for every document containing `term`.
    pub fn postings<'a>(&'a self, term: &str) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        self.postings
            .get(term)
            .into_iter()
            .flat_map(|p| p.iter().map(|(d, tf)| (d.as_str(), *tf)))
    }

    /// The document's terms by tf·idf, highest first, ties by term.
    pub fn top_terms(&self, doc_id: &str, limit: usize) -> Option<Vec<(String, f64)>> {
        let doc = self.docs.get(doc_id)?;
        let mut weighted: Vec<(String, f64)> = doc
            .term_counts
            .iter()
            .map(|(t, tf)| (t.clone(), *tf as f64 * self.idf(t)))
            .collect();
        weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        weighted.truncate(limit);
        Some(weighted)
    }

    fn verify_postings(&self, term: &str, plist: &HashMap<DocId, u32>) -> Result<()> {
        if plist.is_empty() {
            return Err(SearchError::corruption(format!("term {term:?} has an empty posting list")));
        }
        for (doc_id, tf) in plist {
            let stored = self.docs.get(doc_id).and_then(|d| d.term_counts.get(term)).copied();
            if stored != Some(*tf) || *tf == 0 {
                return Err(SearchError::corruption(format!(
                    "posting ({term:?}, {doc_id:?}, tf={tf}) disagrees with stored count {stored:?}"
                )));
            }
        }
        Ok(())
    }

    fn verify_document_terms(&self, doc: &Document) -> Result<()> {
        for term in doc.term_counts.keys() {
            if self.term_frequency(term, &doc.id) == 0 {
                return Err(SearchError::corruption(format!(
                    "document {:?} counts term {term:?} but has no posting", doc.id
                )));
            }
        }
        Ok(())
    }

    /// Check that every term `doc_id` counts has a posting. A missing
    /// document passes.
    pub fn verify_document(&self, doc_id: &str) -> Result<()> {
        match self.docs.get(doc_id) {
            Some(doc) => self.verify_document_terms(doc),
            None => Ok(()),
        }
    }

    /// Check only the posting lists of `terms`. Cost is proportional to
    /// those lists, so it suits a check after each mutation.
    pub fn verify_terms<S: AsRef<str>>(&self, terms: &[S]) -> Result<()> {
        for term in terms {
            let term = term.as_ref();
            if let Some(plist) = self.postings.get(term) {
                self.verify_postings(term, plist)?;
            }
        }
        Ok(())
    }

    /// Check that postings, df and per-document term counts agree.
    pub fn verify(&self) -> Result<()> {
        let mut seen = 0usize;
        for (term, plist) in &self.postings {
            self.verify_postings(term, plist)?;
            seen += plist.len();
        }
        for doc in self.docs.values() {
            self.verify_document_terms(doc)?;
        }
        if seen != self.num_postings {
            return Err(SearchError::corruption(format!(
                "posting counter is {} but {seen} postings exist", self.num_postings
            )));
        }
        Ok(())
    }
}
