use crate::config::Number;
use crate::vector_ops::cosine_similarity;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RankError {
    #[error("query dimension mismatch: corpus vectors have {expected} dimensions, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One ranked match. `similarity` is always reported as an `f64` even though
/// the stored vectors are `f32`.
#[derive(Debug, Clone, Serialize)]
pub struct RankResult {
    pub sms_id: String,
    pub text: String,
    pub similarity: f64,
}

/// A read-only collection of (id, text, vector) entries sharing one vector
/// dimensionality. The three arrays are parallel: index i refers to the same
/// logical entry in each.
#[derive(Debug, Clone)]
pub struct Corpus {
    ids: Vec<String>,
    texts: Vec<String>,
    vectors: Vec<Vec<Number>>,
    dimension: usize,
}

impl Corpus {
    pub fn new(
        ids: Vec<String>,
        texts: Vec<String>,
        vectors: Vec<Vec<Number>>,
        dimension: usize,
    ) -> Result<Self> {
        if ids.len() != texts.len() || ids.len() != vectors.len() {
            anyhow::bail!(
                "corpus arrays out of step: {} ids, {} texts, {} vectors",
                ids.len(),
                texts.len(),
                vectors.len()
            );
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            anyhow::bail!(
                "corpus vector has {} dimensions, expected {}",
                bad.len(),
                dimension
            );
        }
        Ok(Self {
            ids,
            texts,
            vectors,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn vectors(&self) -> &[Vec<Number>] {
        &self.vectors
    }
}

/// Per-class corpora in a fixed label order. A class whose embeddings file is
/// absent carries `None` and degrades to an empty result list at rank time.
#[derive(Debug, Default)]
pub struct CorpusSet {
    classes: Vec<(String, Option<Corpus>)>,
}

impl CorpusSet {
    pub fn new(classes: Vec<(String, Option<Corpus>)>) -> Self {
        Self { classes }
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, Option<&Corpus>)> {
        self.classes
            .iter()
            .map(|(label, corpus)| (label.as_str(), corpus.as_ref()))
    }

    pub fn loaded_count(&self) -> usize {
        self.classes.iter().filter(|(_, c)| c.is_some()).count()
    }
}

/// Rank corpus entries by cosine similarity to `query`, best first.
///
/// Entries scoring strictly below `floor` are dropped before ranking; the
/// bound is inclusive, so an entry scoring exactly `floor` is kept. The sort
/// is stable: entries with exactly equal similarity keep their corpus order.
/// At most `top_k` results are returned; fewer when fewer entries qualify.
///
/// An empty corpus yields an empty result list. The only error is a query
/// whose length differs from the corpus dimensionality.
pub fn rank(
    query: &[Number],
    corpus: &Corpus,
    top_k: usize,
    floor: f64,
) -> Result<Vec<RankResult>, RankError> {
    if corpus.is_empty() {
        return Ok(Vec::new());
    }
    if query.len() != corpus.dimension {
        return Err(RankError::DimensionMismatch {
            expected: corpus.dimension,
            actual: query.len(),
        });
    }

    let mut results: Vec<RankResult> = corpus
        .vectors
        .iter()
        .enumerate()
        .filter_map(|(i, vector)| {
            let similarity = cosine_similarity(query, vector);
            if similarity >= floor {
                Some(RankResult {
                    sms_id: corpus.ids[i].clone(),
                    text: corpus.texts[i].clone(),
                    similarity,
                })
            } else {
                None
            }
        })
        .collect();

    // sort_by is stable, so equal similarities retain corpus order.
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    Ok(results)
}

/// Rank independently against every class in `set`, returning one ordered
/// list per class label. Classes with no corpus loaded map to an empty list
/// rather than failing the whole query.
pub fn rank_multi_class(
    query: &[Number],
    set: &CorpusSet,
    top_k: usize,
    floor: f64,
) -> Result<BTreeMap<String, Vec<RankResult>>, RankError> {
    let mut by_class = BTreeMap::new();
    for (label, corpus) in set.classes() {
        let results = match corpus {
            Some(corpus) => rank(query, corpus, top_k, floor)?,
            None => Vec::new(),
        };
        by_class.insert(label.to_string(), results);
    }
    Ok(by_class)
}
