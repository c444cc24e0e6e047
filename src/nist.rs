//! NIST: informativeness-weighted n-gram precision.
//!
//! Every clipped match contributes its informativeness weight instead of 1, the per-order
//! precisions are summed rather than geometrically averaged, and the brevity penalty follows a
//! smooth curve that only bites when the candidate is shorter than the average reference.

use std::hash::Hash;
use std::sync::Arc;

use log::{info, warn};

use crate::config::NistConfig;
use crate::error::{MetricError, Result};
use crate::metric::{
    compare_by_score, finite_or_zero, from_fixed, hash_totals, to_fixed, EvaluationMetric,
    IncrementalMetric, InstanceCounter, MetricState, NBestLists, NgramPrecisionMetric,
    RecombinationFilter,
};
use crate::ngram::future::FutureCounts;
use crate::ngram::{
    clip, count_corpus_ngrams, count_ngrams, ngram_info, possible_match_count, NgramCounts,
    NgramInfo,
};
use crate::references::ReferenceCorpus;
use crate::sequence::{Sequence, Token};
use crate::stats::NgramPrecisionReport;

/// Length ratio at which the brevity penalty equals [`PENALTY_AT_RATIO`].
const RATIO_X: f64 = 1.5;
const PENALTY_AT_RATIO: f64 = 0.5;

/// NIST brevity penalty for candidate length `c` against reference length `r`.
#[must_use]
pub fn brevity_penalty(c: f64, r: f64) -> f64 {
    let ratio = c / r;
    if ratio.is_nan() || ratio <= 0.0 {
        return 0.0;
    }
    if ratio >= 1.0 {
        return 1.0;
    }
    let beta = -PENALTY_AT_RATIO.ln() / RATIO_X.ln() / RATIO_X.ln();
    (-beta * ratio.ln() * ratio.ln()).exp()
}

/// Info-weighted clipped matches per order. N-grams missing from `info` count for nothing.
fn weighted_match_counts<T: Token>(
    clipped: &NgramCounts<T>,
    info: &NgramInfo<T>,
    order: usize,
) -> Vec<f64> {
    let mut counts = vec![0.0; order];
    for (ngram, &count) in clipped {
        if count == 0 || ngram.len() > order {
            continue;
        }
        match info.get(ngram) {
            Some(weight) => counts[ngram.len() - 1] += count as f64 * weight,
            None => warn!("missing informativeness weight for n-gram {ngram:?}"),
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq)]
struct NistSegment {
    match_counts: Vec<f64>,
    possible_match_counts: Vec<usize>,
    candidate_length: usize,
    reference_length: f64,
}

#[derive(Debug)]
struct NistData<T: Token> {
    references: ReferenceCorpus<T>,
    info: NgramInfo<T>,
    config: NistConfig,
    ids: InstanceCounter,
}

/// NIST bound to a reference corpus and its informativeness table.
#[derive(Debug, Clone)]
pub struct NistMetric<T: Token> {
    data: Arc<NistData<T>>,
}

impl<T: Token> NistMetric<T> {
    /// Builds NIST from one list of references per segment.
    pub fn new(references_list: Vec<Vec<Sequence<T>>>, config: NistConfig) -> Result<Self> {
        config.validate()?;
        let references = ReferenceCorpus::new(references_list, config.order)?;
        Self::from_corpus(references, config)
    }

    /// Builds NIST over an already aggregated corpus. The corpus order must match the config.
    pub fn from_corpus(references: ReferenceCorpus<T>, config: NistConfig) -> Result<Self> {
        config.validate()?;
        if references.order() != config.order {
            return Err(MetricError::InvalidConfig(format!(
                "reference corpus aggregated at order {} but NIST order is {}",
                references.order(),
                config.order
            )));
        }
        let (counts, total_words) = count_corpus_ngrams(&references.all_references(), config.order);
        let info = ngram_info(&counts, total_words);
        info!(
            "NIST over {} segments ({} references), order {}, {} weighted n-grams",
            references.segment_count(),
            references.reference_count(),
            config.order,
            info.len()
        );
        Ok(Self {
            data: Arc::new(NistData {
                references,
                info,
                config,
                ids: InstanceCounter::default(),
            }),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &NistConfig {
        &self.data.config
    }

    /// Informativeness weight of `ngram`, if it occurs in the references.
    #[must_use]
    pub fn informativeness(&self, ngram: &Sequence<T>) -> Option<f64> {
        self.data.info.get(ngram).copied()
    }

    /// Creates an empty incremental state.
    #[must_use]
    pub fn incremental(&self) -> NistIncrementalMetric<T> {
        NistIncrementalMetric::new(self, None)
    }

    /// Creates an empty incremental state whose precisions include optimistic counts from
    /// `nbest` for every segment not yet added.
    #[must_use]
    pub fn incremental_with_nbest(&self, nbest: &NBestLists<T>) -> NistIncrementalMetric<T> {
        let data = &self.data;
        let future = FutureCounts::estimate(nbest, &data.references, |clipped| {
            weighted_match_counts(clipped, &data.info, data.config.order)
        });
        NistIncrementalMetric::new(self, Some(Arc::new(future)))
    }

    /// Returns the recombination filter for NIST states.
    #[must_use]
    pub fn recombination_filter(&self) -> NistRecombinationFilter {
        NistRecombinationFilter
    }
}

impl<T: Token> EvaluationMetric<T> for NistMetric<T> {
    fn incremental_state(&self) -> MetricState<T> {
        MetricState::Nist(self.incremental())
    }

    fn incremental_state_with_nbest(&self, nbest: &NBestLists<T>) -> MetricState<T> {
        MetricState::Nist(self.incremental_with_nbest(nbest))
    }

    fn max_score(&self) -> f64 {
        1.0
    }

    fn segment_count(&self) -> usize {
        self.data.references.segment_count()
    }
}

/// Running NIST totals for one hypothesis-scoring session.
#[derive(Debug)]
pub struct NistIncrementalMetric<T: Token> {
    data: Arc<NistData<T>>,
    future: Option<Arc<FutureCounts<f64>>>,
    id: u64,
    segments: Vec<NistSegment>,
    match_counts: Vec<i128>,
    possible_match_counts: Vec<usize>,
    candidate_length: usize,
    reference_length: i128,
}

impl<T: Token> Clone for NistIncrementalMetric<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            future: self.future.clone(),
            id: self.data.ids.next(),
            segments: self.segments.clone(),
            match_counts: self.match_counts.clone(),
            possible_match_counts: self.possible_match_counts.clone(),
            candidate_length: self.candidate_length,
            reference_length: self.reference_length,
        }
    }
}

impl<T: Token> NistIncrementalMetric<T> {
    fn new(metric: &NistMetric<T>, future: Option<Arc<FutureCounts<f64>>>) -> Self {
        let order = metric.data.config.order;
        Self {
            data: Arc::clone(&metric.data),
            future,
            id: metric.data.ids.next(),
            segments: Vec::with_capacity(metric.data.references.segment_count()),
            match_counts: vec![0; order],
            possible_match_counts: vec![0; order],
            candidate_length: 0,
            reference_length: 0,
        }
    }

    /// Info-weighted matches per order over the added segments.
    #[must_use]
    pub fn match_counts(&self) -> Vec<f64> {
        self.match_counts.iter().map(|&count| from_fixed(count)).collect()
    }

    /// Candidate n-grams per order over the added segments.
    #[must_use]
    pub fn possible_match_counts(&self) -> &[usize] {
        &self.possible_match_counts
    }

    /// Sum of per-order precisions, before the brevity penalty.
    #[must_use]
    pub fn ngram_precision_score(&self) -> f64 {
        self.ngram_precisions()
            .into_iter()
            .map(|p| if p.is_nan() { 0.0 } else { p })
            .sum()
    }

    fn segment_stats(&self, index: usize, segment: Option<&Sequence<T>>) -> NistSegment {
        let references = &self.data.references[index];
        let order = self.data.config.order;
        let reference_length = references.average_length();
        let Some(candidate) = segment else {
            return NistSegment {
                match_counts: vec![0.0; order],
                possible_match_counts: vec![0; order],
                candidate_length: 0,
                reference_length,
            };
        };
        let clipped = clip(&count_ngrams(candidate, order), references.ceiling());
        let len = candidate.len();
        NistSegment {
            match_counts: weighted_match_counts(&clipped, &self.data.info, order),
            possible_match_counts: (0..order).map(|k| possible_match_count(k, len)).collect(),
            candidate_length: len,
            reference_length,
        }
    }

    fn apply(&mut self, stats: &NistSegment, sign: i128) {
        for (total, &count) in self.match_counts.iter_mut().zip(&stats.match_counts) {
            *total += sign * to_fixed(count);
        }
        for (total, &count) in self
            .possible_match_counts
            .iter_mut()
            .zip(&stats.possible_match_counts)
        {
            if sign > 0 {
                *total += count;
            } else {
                *total -= count;
            }
        }
        if sign > 0 {
            self.candidate_length += stats.candidate_length;
        } else {
            self.candidate_length -= stats.candidate_length;
        }
        self.reference_length += sign * to_fixed(stats.reference_length);
    }

    fn push(&mut self, segment: Option<&Sequence<T>>) -> Result<()> {
        let position = self.segments.len();
        let available = self.data.references.segment_count();
        if position >= available {
            return Err(MetricError::too_many_candidates(position, available));
        }
        let stats = self.segment_stats(position, segment);
        self.apply(&stats, 1);
        self.segments.push(stats);
        Ok(())
    }
}

impl<T: Token> IncrementalMetric<T> for NistIncrementalMetric<T> {
    fn add(&mut self, segment: Option<&Sequence<T>>) -> Result<()> {
        self.push(segment)
    }

    fn replace(&mut self, index: usize, segment: Option<&Sequence<T>>) -> Result<()> {
        let available = self.data.references.segment_count();
        if index >= available {
            return Err(MetricError::too_many_candidates(index, available));
        }
        while self.segments.len() < index {
            self.push(None)?;
        }
        if index == self.segments.len() {
            return self.push(segment);
        }
        let stats = self.segment_stats(index, segment);
        if stats == self.segments[index] {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.segments[index], stats.clone());
        self.apply(&previous, -1);
        self.apply(&stats, 1);
        Ok(())
    }

    fn score(&self) -> f64 {
        finite_or_zero(self.brevity_penalty() * self.ngram_precision_score())
    }

    fn max_score(&self) -> f64 {
        1.0
    }

    fn size(&self) -> usize {
        self.segments.len()
    }

    fn instance_id(&self) -> u64 {
        self.id
    }

    fn box_clone(&self) -> Box<dyn IncrementalMetric<T>> {
        Box::new(self.clone())
    }
}

impl<T: Token> NgramPrecisionMetric for NistIncrementalMetric<T> {
    fn ngram_precisions(&self) -> Vec<f64> {
        let added = self.segments.len();
        (0..self.match_counts.len())
            .map(|k| {
                let mut matches = from_fixed(self.match_counts[k]);
                let mut possible = self.possible_match_counts[k];
                if let Some(future) = &self.future {
                    let (future_matches, future_possible) = future.remaining(added, k);
                    matches += future_matches;
                    possible += future_possible;
                }
                if possible == 0 {
                    0.0
                } else {
                    matches / possible as f64
                }
            })
            .collect()
    }

    fn ngram_precision_counts(&self) -> Vec<(f64, f64)> {
        self.match_counts
            .iter()
            .zip(&self.possible_match_counts)
            .map(|(&m, &p)| (from_fixed(m), p as f64))
            .collect()
    }

    fn brevity_penalty(&self) -> f64 {
        brevity_penalty(
            self.candidate_length as f64,
            from_fixed(self.reference_length),
        )
    }

    fn candidate_length(&self) -> usize {
        self.candidate_length
    }

    fn effective_reference_length(&self) -> f64 {
        from_fixed(self.reference_length)
    }

    fn report(&self) -> NgramPrecisionReport {
        NgramPrecisionReport {
            metric: "NIST".into(),
            score: self.score(),
            precisions: self.ngram_precisions(),
            counts: self.ngram_precision_counts(),
            brevity_penalty: self.brevity_penalty(),
            candidate_length: self.candidate_length,
            effective_reference_length: self.effective_reference_length(),
            percent: false,
        }
    }
}

impl<T: Token> NistIncrementalMetric<T> {
    /// Ranks two states by score, then by creation order.
    #[must_use]
    pub fn compare(&self, other: &Self) -> std::cmp::Ordering {
        compare_by_score::<T, _, _>(self, other)
    }
}

/// Merges NIST states whose running totals are identical.
#[derive(Debug, Default, Clone, Copy)]
pub struct NistRecombinationFilter;

impl<T: Token> RecombinationFilter<NistIncrementalMetric<T>> for NistRecombinationFilter {
    fn combinable(&self, a: &NistIncrementalMetric<T>, b: &NistIncrementalMetric<T>) -> bool {
        a.candidate_length == b.candidate_length
            && a.reference_length == b.reference_length
            && a.possible_match_counts == b.possible_match_counts
            && a.match_counts == b.match_counts
    }

    fn recombination_hash(&self, state: &NistIncrementalMetric<T>) -> u64 {
        hash_totals(|hasher| {
            state.candidate_length.hash(hasher);
            state.reference_length.hash(hasher);
            state.possible_match_counts.hash(hasher);
            state.match_counts.hash(hasher);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Sequence<String> {
        text.split_whitespace().map(str::to_owned).collect()
    }

    fn metric(refs: &[&[&str]], order: usize) -> NistMetric<String> {
        let references = refs
            .iter()
            .map(|segment| segment.iter().map(|r| words(r)).collect())
            .collect();
        let cfg = NistConfig::builder().order(order).build().expect("valid config");
        NistMetric::new(references, cfg).expect("valid references")
    }

    #[test]
    fn brevity_penalty_curve() {
        assert_eq!(brevity_penalty(5.0, 4.0), 1.0);
        assert_eq!(brevity_penalty(4.0, 4.0), 1.0);
        assert_eq!(brevity_penalty(0.0, 4.0), 0.0);
        assert_eq!(brevity_penalty(0.0, 0.0), 0.0);
        // Fixed point: a ratio of 1/1.5 and of 1.5 are equally far in log space.
        let penalty = brevity_penalty(2.0, 3.0);
        assert!((penalty - 0.5).abs() < 1e-12, "got {penalty}");
    }

    #[test]
    fn weights_rare_ngrams_higher() {
        let metric = metric(&[&["a a a b"]], 2);
        let common = metric.informativeness(&words("a")).expect("weight");
        let rare = metric.informativeness(&words("b")).expect("weight");
        assert!(rare > common);
        assert!((rare - 2.0).abs() < 1e-12);
    }

    #[test]
    fn score_sums_weighted_precisions() {
        let metric = metric(&[&["a b"], &["a c"]], 2);
        let mut state = metric.incremental();
        state.add(Some(&words("a b"))).expect("add");
        // corpus: a=2, b=1, c=1 over 4 words; "a b" follows "a" once out of twice.
        let unigram = (-(2.0f64 / 4.0).log2() + -(1.0f64 / 4.0).log2()) / 2.0;
        let bigram = -(1.0f64 / 2.0).log2();
        assert!((state.ngram_precisions()[0] - unigram).abs() < 1e-12);
        assert!((state.ngram_precisions()[1] - bigram).abs() < 1e-12);
        assert!((state.score() - (unigram + bigram)).abs() < 1e-12);
    }

    #[test]
    fn missing_segment_penalizes_length() {
        let metric = metric(&[&["a b c", "a b c d e"], &["x y"]], 2);
        let mut state = metric.incremental();
        state.add(None).expect("add");
        assert_eq!(state.effective_reference_length(), 4.0);
        assert_eq!(state.score(), 0.0);
        state.add(Some(&words("x y"))).expect("add");
        assert_eq!(state.effective_reference_length(), 6.0);
        assert!(state.brevity_penalty() < 1.0);
    }

    #[test]
    fn replace_restores_totals() {
        let metric = metric(&[&["a b c"], &["d e f"]], 3);
        let mut state = metric.incremental();
        state.add(Some(&words("a b x"))).expect("add");
        state.add(Some(&words("d e f"))).expect("add");
        let before = state.score();
        state.replace(0, Some(&words("a b c"))).expect("replace");
        assert!(state.score() > before);
        state.replace(0, Some(&words("a b x"))).expect("replace back");
        assert!((state.score() - before).abs() < 1e-12);
        assert_eq!(state.size(), 2);
    }

    #[test]
    fn overrun_and_replace_bounds() {
        let metric = metric(&[&["a"]], 1);
        let mut state = metric.incremental();
        state.replace(0, Some(&words("a"))).expect("replace at end appends");
        assert!(matches!(
            state.add(None),
            Err(MetricError::TooManyCandidates { attempted: 2, .. })
        ));
        assert!(state.replace(3, None).is_err());
    }

    #[test]
    fn recombination_ignores_arrival_order() {
        let metric = metric(&[&["a b"], &["c d"]], 2);
        let mut first = metric.incremental();
        first.add(Some(&words("a b"))).expect("add");
        first.add(Some(&words("c d"))).expect("add");
        let mut second = metric.incremental();
        second.replace(1, Some(&words("c d"))).expect("replace");
        second.replace(0, Some(&words("a b"))).expect("replace");
        let filter = metric.recombination_filter();
        assert!(filter.combinable(&first, &second));
        assert_eq!(
            filter.recombination_hash(&first),
            filter.recombination_hash(&second)
        );
    }

    #[test]
    fn future_counts_are_weighted() {
        let metric = metric(&[&["a b"], &["c d"]], 1);
        let nbest = vec![vec![words("a b")], vec![words("c d")]];
        let state = metric.incremental_with_nbest(&nbest);
        let expected = -(1.0f64 / 4.0).log2();
        assert!((state.ngram_precisions()[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn report_is_not_scaled() {
        let metric = metric(&[&["a b"]], 1);
        let mut state = metric.incremental();
        state.add(Some(&words("a b"))).expect("add");
        let report = state.report();
        assert_eq!(report.metric, "NIST");
        assert!(!report.percent);
        assert_eq!(report.counts.len(), 1);
    }
}
