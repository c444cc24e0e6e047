//! Per-segment reference data built once and shared read-only by every metric state.

use crate::error::{MetricError, Result};
use crate::ngram::{self, NgramCounts};
use crate::sequence::{Sequence, Token};

/// References for one source segment plus their clipping ceiling and lengths.
#[derive(Debug, Clone)]
pub struct ReferenceSet<T: Token> {
    references: Vec<Sequence<T>>,
    ceiling: NgramCounts<T>,
    lengths: Vec<usize>,
}

impl<T: Token> ReferenceSet<T> {
    /// Aggregates `references` up to `order`. At least one reference is required.
    pub fn new(references: Vec<Sequence<T>>, order: usize) -> Result<Self> {
        if references.is_empty() {
            return Err(MetricError::InvalidConfig(
                "reference set must contain at least one reference".into(),
            ));
        }
        let (ceiling, lengths) = ngram::aggregate(&references, order);
        Ok(Self {
            references,
            ceiling,
            lengths,
        })
    }

    /// Returns the reference sequences in input order.
    #[must_use]
    pub fn references(&self) -> &[Sequence<T>] {
        &self.references
    }

    /// Returns the per-n-gram maximum count over the references.
    #[must_use]
    pub fn ceiling(&self) -> &NgramCounts<T> {
        &self.ceiling
    }

    /// Returns the token count of each reference in input order.
    #[must_use]
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Reference length closest to `candidate_length`, earliest reference on ties.
    #[must_use]
    pub fn best_match_length(&self, candidate_length: usize) -> usize {
        ngram::best_match_length(&self.lengths, candidate_length)
    }

    /// Mean reference length.
    #[must_use]
    pub fn average_length(&self) -> f64 {
        let total: usize = self.lengths.iter().sum();
        total as f64 / self.lengths.len() as f64
    }
}

/// Reference sets for every segment of a test set, aggregated at a fixed n-gram order.
#[derive(Debug, Clone)]
pub struct ReferenceCorpus<T: Token> {
    sets: Vec<ReferenceSet<T>>,
    order: usize,
}

impl<T: Token> ReferenceCorpus<T> {
    /// Builds the corpus from one list of references per segment.
    pub fn new(references_list: Vec<Vec<Sequence<T>>>, order: usize) -> Result<Self> {
        if order == 0 {
            return Err(MetricError::InvalidConfig(
                "n-gram order must be greater than zero".into(),
            ));
        }
        if references_list.is_empty() {
            return Err(MetricError::InvalidConfig(
                "reference corpus must contain at least one segment".into(),
            ));
        }
        let sets = references_list
            .into_iter()
            .enumerate()
            .map(|(segment, references)| {
                ReferenceSet::new(references, order).map_err(|_| {
                    MetricError::InvalidConfig(format!(
                        "no references found for segment {segment}"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sets, order })
    }

    /// Number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.sets.len()
    }

    /// N-gram order the ceilings were built with.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns the reference set of `segment`.
    #[must_use]
    pub fn get(&self, segment: usize) -> Option<&ReferenceSet<T>> {
        self.sets.get(segment)
    }

    /// Iterates over the reference sets in segment order.
    pub fn iter(&self) -> std::slice::Iter<'_, ReferenceSet<T>> {
        self.sets.iter()
    }

    /// Total number of references over all segments.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.sets.iter().map(|set| set.references.len()).sum()
    }

    /// Flattens every reference of every segment.
    #[must_use]
    pub fn all_references(&self) -> Vec<&Sequence<T>> {
        self.sets
            .iter()
            .flat_map(|set| set.references.iter())
            .collect()
    }
}

impl<T: Token> std::ops::Index<usize> for ReferenceCorpus<T> {
    type Output = ReferenceSet<T>;

    fn index(&self, segment: usize) -> &Self::Output {
        &self.sets[segment]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Sequence<String> {
        text.split_whitespace().map(str::to_owned).collect()
    }

    #[test]
    fn corpus_rejects_segment_without_references() {
        let err = ReferenceCorpus::new(vec![vec![words("a b")], vec![]], 4)
            .expect_err("empty segment must be rejected");
        assert!(matches!(
            err,
            MetricError::InvalidConfig(message) if message.contains("segment 1")
        ));
    }

    #[test]
    fn corpus_rejects_zero_order_and_empty_input() {
        assert!(ReferenceCorpus::new(vec![vec![words("a")]], 0).is_err());
        assert!(ReferenceCorpus::<String>::new(Vec::new(), 4).is_err());
    }

    #[test]
    fn reference_set_exposes_lengths() {
        let set = ReferenceSet::new(vec![words("a b c"), words("a b c d e")], 2)
            .expect("valid references");
        assert_eq!(set.lengths(), &[3, 5]);
        assert_eq!(set.best_match_length(4), 3);
        assert!((set.average_length() - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn corpus_flattens_references() {
        let corpus = ReferenceCorpus::new(
            vec![vec![words("a"), words("b")], vec![words("c")]],
            2,
        )
        .expect("valid corpus");
        assert_eq!(corpus.segment_count(), 2);
        assert_eq!(corpus.reference_count(), 3);
        assert_eq!(corpus.all_references().len(), 3);
        assert_eq!(corpus[1].references()[0], words("c"));
    }
}
