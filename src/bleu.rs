//! BLEU: clipped n-gram precision with a brevity penalty, scored incrementally.
//!
//! Two aggregation modes are supported and deliberately kept apart:
//!
//! * **aggregate** sums clipped matches and possible matches over the corpus and takes the
//!   geometric mean of the per-order ratios (ratio of sums);
//! * **smoothed** computes an add-one smoothed sentence score per segment (BLEU+1, Lin & Och
//!   2004) and averages those scores arithmetically (average of ratios).
//!
//! ```
//! use mteval::{BleuConfig, BleuMetric, IncrementalMetric, Sequence};
//!
//! # fn main() -> mteval::Result<()> {
//! let words = |text: &str| text.split_whitespace().map(str::to_owned).collect::<Sequence<_>>();
//! let metric = BleuMetric::new(vec![vec![words("the cat sat on the mat")]], BleuConfig::default())?;
//! let mut state = metric.incremental();
//! state.add(Some(&words("the cat sat on the mat")))?;
//! assert_eq!(state.score(), 1.0);
//! # Ok(())
//! # }
//! ```

use std::cmp::Ordering;
use std::hash::Hash;
use std::sync::Arc;

use log::info;

use crate::cache::SegmentStatsCache;
use crate::config::BleuConfig;
use crate::error::{MetricError, Result};
use crate::metric::{
    compare_by_score, finite_or_zero, from_fixed, hash_totals, to_fixed, EvaluationMetric,
    IncrementalMetric, InstanceCounter, MetricState, NBestLists, NgramPrecisionMetric,
    RecombinationFilter,
};
use crate::ngram::future::FutureCounts;
use crate::ngram::{clip, count_ngrams, local_match_counts, possible_match_count};
use crate::references::{ReferenceCorpus, ReferenceSet};
use crate::sequence::{Sequence, Token};
use crate::stats::NgramPrecisionReport;

/// Clipped n-gram statistics of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentStats {
    /// Clipped matches per order.
    pub match_counts: Vec<usize>,
    /// Candidate n-grams per order.
    pub possible_match_counts: Vec<usize>,
    /// Candidate length.
    pub candidate_length: usize,
    /// Length-biased reference length closest to the candidate length.
    pub reference_length: usize,
}

impl SegmentStats {
    /// Counts `candidate` against `references`.
    #[must_use]
    pub fn compute<T: Token>(
        candidate: &Sequence<T>,
        references: &ReferenceSet<T>,
        order: usize,
        length_bias: f64,
    ) -> Self {
        let clipped = clip(&count_ngrams(candidate, order), references.ceiling());
        let len = candidate.len();
        Self {
            match_counts: local_match_counts(&clipped, order),
            possible_match_counts: (0..order).map(|k| possible_match_count(k, len)).collect(),
            candidate_length: len,
            reference_length: biased_length(references.best_match_length(len), length_bias),
        }
    }

    /// Statistics of a segment without a hypothesis: nothing matched, nothing proposed, but
    /// the reference length still counts against the brevity penalty.
    #[must_use]
    pub fn missing<T: Token>(references: &ReferenceSet<T>, order: usize, length_bias: f64) -> Self {
        Self {
            match_counts: vec![0; order],
            possible_match_counts: vec![0; order],
            candidate_length: 0,
            reference_length: biased_length(references.best_match_length(0), length_bias),
        }
    }

    /// Add-one smoothed precisions: the unigram ratio is left unsmoothed, every higher order
    /// uses `(m + 1) / (p + 1)`. An empty candidate has unigram precision 0.
    #[must_use]
    pub fn smoothed_precisions(&self) -> Vec<f64> {
        self.match_counts
            .iter()
            .zip(&self.possible_match_counts)
            .enumerate()
            .map(|(k, (&matches, &possible))| {
                if k == 0 {
                    ratio(matches as f64, possible as f64)
                } else {
                    (matches as f64 + 1.0) / (possible as f64 + 1.0)
                }
            })
            .collect()
    }

    /// Sentence-level smoothed BLEU of this segment.
    #[must_use]
    pub fn smoothed_score(&self) -> f64 {
        let order = self.match_counts.len();
        if order == 0 {
            return 0.0;
        }
        let weight = 1.0 / order as f64;
        let log_precision: f64 = self
            .smoothed_precisions()
            .iter()
            .map(|p| weight * p.ln())
            .sum();
        let log_bp = log_brevity_penalty(self.candidate_length, self.reference_length);
        finite_or_zero((log_bp + log_precision).exp())
    }
}

/// Smoothed sentence-level BLEU of `candidate` against `references`.
pub fn sentence_smoothed_bleu<T: Token>(
    candidate: &Sequence<T>,
    references: &[Sequence<T>],
    order: usize,
) -> Result<f64> {
    if order == 0 {
        return Err(MetricError::InvalidConfig(
            "order must be greater than zero".into(),
        ));
    }
    let set = ReferenceSet::new(references.to_vec(), order)?;
    Ok(SegmentStats::compute(candidate, &set, order, 1.0).smoothed_score())
}

fn biased_length(length: usize, length_bias: f64) -> usize {
    // Truncation toward zero, matching integer reference lengths.
    (length_bias * length as f64) as usize
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn log_brevity_penalty(candidate_length: usize, reference_length: usize) -> f64 {
    if candidate_length < reference_length {
        1.0 - reference_length as f64 / candidate_length as f64
    } else {
        0.0
    }
}

#[derive(Debug)]
struct BleuData<T: Token> {
    references: ReferenceCorpus<T>,
    config: BleuConfig,
    smoothed: bool,
    ids: InstanceCounter,
}

/// BLEU bound to a reference corpus.
#[derive(Debug, Clone)]
pub struct BleuMetric<T: Token> {
    data: Arc<BleuData<T>>,
    cache: Option<Arc<SegmentStatsCache>>,
}

impl<T: Token> BleuMetric<T> {
    /// Builds BLEU from one list of references per segment.
    pub fn new(references_list: Vec<Vec<Sequence<T>>>, config: BleuConfig) -> Result<Self> {
        config.validate()?;
        let references = ReferenceCorpus::new(references_list, config.order)?;
        Self::from_corpus(references, config)
    }

    /// Builds BLEU over an already aggregated corpus. The corpus order must match the config.
    pub fn from_corpus(references: ReferenceCorpus<T>, config: BleuConfig) -> Result<Self> {
        config.validate()?;
        if references.order() != config.order {
            return Err(MetricError::InvalidConfig(format!(
                "reference corpus aggregated at order {} but BLEU order is {}",
                references.order(),
                config.order
            )));
        }
        let smoothed = config.mode.is_smoothed(references.segment_count());
        info!(
            "BLEU over {} segments ({} references), order {}, {} mode",
            references.segment_count(),
            references.reference_count(),
            config.order,
            if smoothed { "smoothed" } else { "aggregate" }
        );
        Ok(Self {
            data: Arc::new(BleuData {
                references,
                config,
                smoothed,
                ids: InstanceCounter::default(),
            }),
            cache: None,
        })
    }

    /// Shares `cache` between every state created by this metric.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<SegmentStatsCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BleuConfig {
        &self.data.config
    }

    /// Returns the reference corpus.
    #[must_use]
    pub fn references(&self) -> &ReferenceCorpus<T> {
        &self.data.references
    }

    /// True when per-segment smoothed scores are averaged.
    #[must_use]
    pub fn is_smoothed(&self) -> bool {
        self.data.smoothed
    }

    /// Creates an empty incremental state.
    #[must_use]
    pub fn incremental(&self) -> BleuIncrementalMetric<T> {
        BleuIncrementalMetric::new(self, None)
    }

    /// Creates an empty incremental state whose precisions include optimistic counts from
    /// `nbest` for every segment not yet added.
    #[must_use]
    pub fn incremental_with_nbest(&self, nbest: &NBestLists<T>) -> BleuIncrementalMetric<T> {
        let order = self.data.config.order;
        let future = FutureCounts::estimate(nbest, &self.data.references, |clipped| {
            local_match_counts(clipped, order)
        });
        BleuIncrementalMetric::new(self, Some(Arc::new(future)))
    }

    /// Returns the recombination filter for BLEU states.
    #[must_use]
    pub fn recombination_filter(&self) -> BleuRecombinationFilter {
        BleuRecombinationFilter
    }
}

impl<T: Token> EvaluationMetric<T> for BleuMetric<T> {
    fn incremental_state(&self) -> MetricState<T> {
        MetricState::Bleu(self.incremental())
    }

    fn incremental_state_with_nbest(&self, nbest: &NBestLists<T>) -> MetricState<T> {
        MetricState::Bleu(self.incremental_with_nbest(nbest))
    }

    fn max_score(&self) -> f64 {
        self.data.config.score_multiplier
    }

    fn segment_count(&self) -> usize {
        self.data.references.segment_count()
    }
}

/// Running BLEU totals for one hypothesis-scoring session.
#[derive(Debug)]
pub struct BleuIncrementalMetric<T: Token> {
    data: Arc<BleuData<T>>,
    cache: Option<Arc<SegmentStatsCache>>,
    future: Option<Arc<FutureCounts<usize>>>,
    id: u64,
    segments: Vec<SegmentStats>,
    match_counts: Vec<usize>,
    possible_match_counts: Vec<usize>,
    candidate_length: usize,
    reference_length: usize,
    smooth_sum: i128,
    smooth_count: usize,
}

impl<T: Token> Clone for BleuIncrementalMetric<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            cache: self.cache.clone(),
            future: self.future.clone(),
            id: self.data.ids.next(),
            segments: self.segments.clone(),
            match_counts: self.match_counts.clone(),
            possible_match_counts: self.possible_match_counts.clone(),
            candidate_length: self.candidate_length,
            reference_length: self.reference_length,
            smooth_sum: self.smooth_sum,
            smooth_count: self.smooth_count,
        }
    }
}

impl<T: Token> BleuIncrementalMetric<T> {
    fn new(metric: &BleuMetric<T>, future: Option<Arc<FutureCounts<usize>>>) -> Self {
        let order = metric.data.config.order;
        Self {
            data: Arc::clone(&metric.data),
            cache: metric.cache.clone(),
            future,
            id: metric.data.ids.next(),
            segments: Vec::with_capacity(metric.data.references.segment_count()),
            match_counts: vec![0; order],
            possible_match_counts: vec![0; order],
            candidate_length: 0,
            reference_length: 0,
            smooth_sum: 0,
            smooth_count: 0,
        }
    }

    /// Clipped matches per order over the added segments.
    #[must_use]
    pub fn match_counts(&self) -> &[usize] {
        &self.match_counts
    }

    /// Candidate n-grams per order over the added segments.
    #[must_use]
    pub fn possible_match_counts(&self) -> &[usize] {
        &self.possible_match_counts
    }

    /// Statistics recorded for segment `index`.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&SegmentStats> {
        self.segments.get(index)
    }

    /// True when per-segment smoothed scores are averaged.
    #[must_use]
    pub fn is_smoothed(&self) -> bool {
        self.data.smoothed
    }

    /// Sum of per-segment smoothed scores.
    #[must_use]
    pub fn smoothed_sum(&self) -> f64 {
        from_fixed(self.smooth_sum)
    }

    /// Number of segments in the smoothed average.
    #[must_use]
    pub fn smoothed_count(&self) -> usize {
        self.smooth_count
    }

    /// Log of the brevity penalty over the added segments.
    #[must_use]
    pub fn log_brevity_penalty(&self) -> f64 {
        log_brevity_penalty(self.candidate_length, self.reference_length)
    }

    /// Aggregate log score over all orders, without the score multiplier.
    #[must_use]
    pub fn log_score(&self) -> f64 {
        self.partial_log_score(self.data.config.order)
    }

    /// Log brevity penalty plus the uniformly weighted log precisions of orders `1..=orders`.
    fn partial_log_score(&self, orders: usize) -> f64 {
        let log_bp = self.log_brevity_penalty();
        if orders == 0 {
            return log_bp;
        }
        let weight = 1.0 / orders as f64;
        let log_precision: f64 = self
            .ngram_precisions()
            .iter()
            .take(orders)
            .map(|p| weight * p.ln())
            .sum();
        log_bp + log_precision
    }

    /// Highest order (one-based) with a nonzero precision, `0` when there is none.
    fn max_nonzero_order(&self) -> usize {
        self.ngram_precisions()
            .iter()
            .rposition(|&p| p != 0.0)
            .map_or(0, |idx| idx + 1)
    }

    /// Ranks two states by expected final score.
    ///
    /// Aggregate mode compares the highest order `k` with a nonzero precision, then the log
    /// score over the orders below `k` (the brevity penalty alone when `k <= 1`). Smoothed mode
    /// compares scores. Ties fall back to creation order.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        if self.data.smoothed || other.data.smoothed {
            return compare_by_score::<T, _, _>(self, other);
        }
        let orders = self.max_nonzero_order();
        let window = orders.saturating_sub(1);
        orders
            .cmp(&other.max_nonzero_order())
            .then_with(|| {
                self.partial_log_score(window)
                    .total_cmp(&other.partial_log_score(window))
            })
            .then_with(|| self.id.cmp(&other.id))
    }

    fn segment_stats(
        &self,
        index: usize,
        nbest_id: Option<usize>,
        segment: Option<&Sequence<T>>,
    ) -> SegmentStats {
        let references = &self.data.references[index];
        let order = self.data.config.order;
        let bias = self.data.config.length_bias;
        let Some(candidate) = segment else {
            return SegmentStats::missing(references, order, bias);
        };
        match (&self.cache, nbest_id) {
            (Some(cache), Some(id)) => cache.get_or_insert_with((index, id), || {
                SegmentStats::compute(candidate, references, order, bias)
            }),
            _ => SegmentStats::compute(candidate, references, order, bias),
        }
    }

    fn accumulate(&mut self, stats: &SegmentStats) {
        for (total, &count) in self.match_counts.iter_mut().zip(&stats.match_counts) {
            *total += count;
        }
        for (total, &count) in self
            .possible_match_counts
            .iter_mut()
            .zip(&stats.possible_match_counts)
        {
            *total += count;
        }
        self.candidate_length += stats.candidate_length;
        self.reference_length += stats.reference_length;
        if self.data.smoothed {
            self.smooth_sum += to_fixed(stats.smoothed_score());
            self.smooth_count += 1;
        }
    }

    fn retract(&mut self, stats: &SegmentStats) {
        for (total, &count) in self.match_counts.iter_mut().zip(&stats.match_counts) {
            *total -= count;
        }
        for (total, &count) in self
            .possible_match_counts
            .iter_mut()
            .zip(&stats.possible_match_counts)
        {
            *total -= count;
        }
        self.candidate_length -= stats.candidate_length;
        self.reference_length -= stats.reference_length;
        if self.data.smoothed {
            self.smooth_sum -= to_fixed(stats.smoothed_score());
            self.smooth_count -= 1;
        }
    }

    fn push(&mut self, nbest_id: Option<usize>, segment: Option<&Sequence<T>>) -> Result<()> {
        let position = self.segments.len();
        let available = self.data.references.segment_count();
        if position >= available {
            return Err(MetricError::too_many_candidates(position, available));
        }
        let stats = self.segment_stats(position, nbest_id, segment);
        self.accumulate(&stats);
        self.segments.push(stats);
        Ok(())
    }

    fn set(
        &mut self,
        index: usize,
        nbest_id: Option<usize>,
        segment: Option<&Sequence<T>>,
    ) -> Result<()> {
        let available = self.data.references.segment_count();
        if index >= available {
            return Err(MetricError::too_many_candidates(index, available));
        }
        while self.segments.len() < index {
            self.push(None, None)?;
        }
        if index == self.segments.len() {
            return self.push(nbest_id, segment);
        }
        let stats = self.segment_stats(index, nbest_id, segment);
        if stats == self.segments[index] {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.segments[index], stats.clone());
        self.retract(&previous);
        self.accumulate(&stats);
        Ok(())
    }
}

impl<T: Token> IncrementalMetric<T> for BleuIncrementalMetric<T> {
    fn add(&mut self, segment: Option<&Sequence<T>>) -> Result<()> {
        self.push(None, segment)
    }

    fn add_nbest(&mut self, nbest_id: usize, segment: Option<&Sequence<T>>) -> Result<()> {
        self.push(Some(nbest_id), segment)
    }

    fn replace(&mut self, index: usize, segment: Option<&Sequence<T>>) -> Result<()> {
        self.set(index, None, segment)
    }

    fn replace_nbest(
        &mut self,
        index: usize,
        nbest_id: usize,
        segment: Option<&Sequence<T>>,
    ) -> Result<()> {
        self.set(index, Some(nbest_id), segment)
    }

    fn score(&self) -> f64 {
        if self.data.smoothed {
            if self.smooth_count == 0 {
                return 0.0;
            }
            return finite_or_zero(from_fixed(self.smooth_sum) / self.smooth_count as f64);
        }
        finite_or_zero(self.data.config.score_multiplier * self.log_score().exp())
    }

    fn max_score(&self) -> f64 {
        self.data.config.score_multiplier
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

impl<T: Token> NgramPrecisionMetric for BleuIncrementalMetric<T> {
    fn ngram_precisions(&self) -> Vec<f64> {
        let added = self.segments.len();
        (0..self.match_counts.len())
            .map(|k| {
                let mut matches = self.match_counts[k];
                let mut possible = self.possible_match_counts[k];
                if let Some(future) = &self.future {
                    let (future_matches, future_possible) = future.remaining(added, k);
                    matches += future_matches;
                    possible += future_possible;
                }
                ratio(matches as f64, possible as f64)
            })
            .collect()
    }

    fn ngram_precision_counts(&self) -> Vec<(f64, f64)> {
        self.match_counts
            .iter()
            .zip(&self.possible_match_counts)
            .map(|(&m, &p)| (m as f64, p as f64))
            .collect()
    }

    fn brevity_penalty(&self) -> f64 {
        self.log_brevity_penalty().exp()
    }

    fn candidate_length(&self) -> usize {
        self.candidate_length
    }

    fn effective_reference_length(&self) -> f64 {
        self.reference_length as f64
    }

    fn report(&self) -> NgramPrecisionReport {
        NgramPrecisionReport {
            metric: "BLEU".into(),
            score: self.score(),
            precisions: self.ngram_precisions(),
            counts: self.ngram_precision_counts(),
            brevity_penalty: self.brevity_penalty(),
            candidate_length: self.candidate_length,
            effective_reference_length: self.reference_length as f64,
            percent: true,
        }
    }
}

/// Merges BLEU states whose running totals are identical.
#[derive(Debug, Default, Clone, Copy)]
pub struct BleuRecombinationFilter;

impl<T: Token> RecombinationFilter<BleuIncrementalMetric<T>> for BleuRecombinationFilter {
    fn combinable(&self, a: &BleuIncrementalMetric<T>, b: &BleuIncrementalMetric<T>) -> bool {
        a.reference_length == b.reference_length
            && a.candidate_length == b.candidate_length
            && a.match_counts == b.match_counts
            && a.possible_match_counts == b.possible_match_counts
            && a.smooth_count == b.smooth_count
            && a.smooth_sum == b.smooth_sum
    }

    fn recombination_hash(&self, state: &BleuIncrementalMetric<T>) -> u64 {
        hash_totals(|hasher| {
            state.reference_length.hash(hasher);
            state.candidate_length.hash(hasher);
            state.possible_match_counts.hash(hasher);
            state.match_counts.hash(hasher);
            state.smooth_count.hash(hasher);
            state.smooth_sum.hash(hasher);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BleuMode;

    fn words(text: &str) -> Sequence<String> {
        text.split_whitespace().map(str::to_owned).collect()
    }

    fn metric(refs: &[&[&str]], mode: BleuMode) -> BleuMetric<String> {
        let references = refs
            .iter()
            .map(|segment| segment.iter().map(|r| words(r)).collect())
            .collect();
        let cfg = BleuConfig::builder().mode(mode).build().expect("valid config");
        BleuMetric::new(references, cfg).expect("valid references")
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn exact_match_scores_one_in_both_modes() {
        for mode in [BleuMode::Aggregate, BleuMode::Smoothed] {
            let metric = metric(&[&["the cat sat on the mat"]], mode);
            let mut state = metric.incremental();
            state.add(Some(&words("the cat sat on the mat"))).expect("add");
            assert_close(state.score(), 1.0);
            assert_close(state.brevity_penalty(), 1.0);
        }
    }

    #[test]
    fn aggregate_precisions_for_substitution() {
        let metric = metric(&[&["the cat sat on the mat"]], BleuMode::Aggregate);
        let mut state = metric.incremental();
        state.add(Some(&words("a cat sat on a mat"))).expect("add");
        assert_eq!(state.match_counts(), &[4, 2, 1, 0]);
        assert_eq!(state.possible_match_counts(), &[6, 5, 4, 3]);
        let precisions = state.ngram_precisions();
        assert_close(precisions[0], 4.0 / 6.0);
        assert_close(precisions[3], 0.0);
        // A zero 4-gram precision zeroes the geometric mean.
        assert_eq!(state.score(), 0.0);
    }

    #[test]
    fn smoothed_segment_score_matches_formula() {
        let set = ReferenceSet::new(vec![words("the cat sat on the mat")], 4).expect("refs");
        let stats = SegmentStats::compute(&words("a cat sat on a mat"), &set, 4, 1.0);
        let precisions = stats.smoothed_precisions();
        assert_close(precisions[0], 4.0 / 6.0);
        assert_close(precisions[1], 3.0 / 6.0);
        assert_close(precisions[2], 2.0 / 5.0);
        assert_close(precisions[3], 1.0 / 4.0);
        let expected = (0.25
            * ((4.0f64 / 6.0).ln() + (3.0f64 / 6.0).ln() + (2.0f64 / 5.0).ln() + 0.25f64.ln()))
        .exp();
        assert_close(stats.smoothed_score(), expected);
    }

    #[test]
    fn brevity_penalty_uses_closest_reference() {
        let metric = metric(
            &[&["a b c d e f g h", "a b c d"], &["x y z w"]],
            BleuMode::Aggregate,
        );
        let mut state = metric.incremental();
        state.add(Some(&words("a b c"))).expect("add");
        assert_eq!(state.effective_reference_length(), 4.0);
        assert_close(state.log_brevity_penalty(), 1.0 - 4.0 / 3.0);
    }

    #[test]
    fn length_bias_scales_reference_length() {
        let cfg = BleuConfig::builder()
            .length_bias(1.5)
            .mode(BleuMode::Aggregate)
            .build()
            .expect("cfg");
        let metric = BleuMetric::new(vec![vec![words("a b c")]], cfg).expect("metric");
        let mut state = metric.incremental();
        state.add(Some(&words("a b c"))).expect("add");
        assert_eq!(state.effective_reference_length(), 4.0);
    }

    #[test]
    fn score_multiplier_scales_aggregate_score() {
        let cfg = BleuConfig::builder()
            .score_multiplier(100.0)
            .mode(BleuMode::Aggregate)
            .build()
            .expect("cfg");
        let metric = BleuMetric::new(vec![vec![words("a b c d")]], cfg).expect("metric");
        assert_close(metric.max_score(), 100.0);
        let mut state = metric.incremental();
        state.add(Some(&words("a b c d"))).expect("add");
        assert_close(state.score(), 100.0);
    }

    #[test]
    fn overrun_is_rejected() {
        let metric = metric(&[&["a"]], BleuMode::Auto);
        let mut state = metric.incremental();
        state.add(None).expect("first add");
        let err = state.add(Some(&words("a"))).expect_err("overrun");
        assert_eq!(
            err,
            MetricError::TooManyCandidates {
                attempted: 2,
                available: 1
            }
        );
        assert!(state.replace(1, None).is_err());
    }

    #[test]
    fn replace_pads_with_missing_segments() {
        let metric = metric(&[&["a b"], &["c d"], &["e f"]], BleuMode::Aggregate);
        let mut padded = metric.incremental();
        padded.replace(2, Some(&words("e f"))).expect("replace past end");
        assert_eq!(padded.size(), 3);

        let mut explicit = metric.incremental();
        explicit.add(None).expect("add");
        explicit.add(None).expect("add");
        explicit.add(Some(&words("e f"))).expect("add");
        assert!(BleuRecombinationFilter.combinable(&padded, &explicit));
        assert_eq!(padded.score(), explicit.score());
    }

    #[test]
    fn missing_segment_penalizes_brevity() {
        let metric = metric(&[&["a b c d"], &["e f g h"]], BleuMode::Aggregate);
        let mut state = metric.incremental();
        state.add(Some(&words("a b c d"))).expect("add");
        assert_close(state.score(), 1.0);
        state.add(None).expect("add");
        assert_eq!(state.effective_reference_length(), 8.0);
        assert_close(state.score(), (1.0f64 - 8.0 / 4.0).exp());
    }

    #[test]
    fn only_missing_segments_score_zero() {
        for mode in [BleuMode::Aggregate, BleuMode::Smoothed] {
            let metric = metric(&[&["a b"], &["c d"]], mode);
            let mut state = metric.incremental();
            state.add(None).expect("add");
            state.add(None).expect("add");
            assert_eq!(state.score(), 0.0);
        }
    }

    #[test]
    fn empty_state_scores_zero() {
        let metric = metric(&[&["a b"], &["c d"]], BleuMode::Aggregate);
        assert_eq!(metric.incremental().score(), 0.0);
        let smoothed = BleuMetric::new(
            vec![vec![words("a b")]],
            BleuConfig::builder().smoothed(true).build().expect("cfg"),
        )
        .expect("metric");
        assert_eq!(smoothed.incremental().score(), 0.0);
    }

    #[test]
    fn clone_is_independent_and_gets_new_id() {
        let metric = metric(&[&["a b"], &["c d"]], BleuMode::Aggregate);
        let mut state = metric.incremental();
        state.add(Some(&words("a b"))).expect("add");
        let fork = state.clone();
        state.add(Some(&words("x y"))).expect("add");
        assert_eq!(fork.size(), 1);
        assert_eq!(state.size(), 2);
        assert_ne!(fork.instance_id(), state.instance_id());
        assert_eq!(fork.match_counts(), &[2, 1, 0, 0]);
    }

    #[test]
    fn compare_prefers_higher_nonzero_order() {
        let metric = metric(&[&["a b c d"], &["e f g h"]], BleuMode::Aggregate);
        let mut unigram_only = metric.incremental();
        unigram_only.add(Some(&words("d c b a"))).expect("add");
        let mut bigram = metric.incremental();
        bigram.add(Some(&words("a b x y"))).expect("add");
        assert_eq!(unigram_only.compare(&bigram), Ordering::Less);
        assert_eq!(bigram.compare(&unigram_only), Ordering::Greater);
    }

    #[test]
    fn compare_scores_orders_below_highest_nonzero() {
        let cfg = BleuConfig::builder()
            .order(2)
            .mode(BleuMode::Aggregate)
            .build()
            .expect("cfg");
        let metric =
            BleuMetric::new(vec![vec![words("a b c d e f g h i j k")]], cfg).expect("metric");
        // Precisions [1.0, 0.1]: perfect unigrams, one matching bigram.
        let mut scrambled = metric.incremental();
        scrambled
            .add(Some(&words("a b d f h j c e g i k")))
            .expect("add");
        // Precisions [6/11, 0.5]: higher full score, weaker unigrams.
        let mut truncated = metric.incremental();
        truncated
            .add(Some(&words("a b c d e f x y z w v")))
            .expect("add");
        assert!(truncated.score() > scrambled.score());
        assert_eq!(scrambled.compare(&truncated), Ordering::Greater);
        assert_eq!(truncated.compare(&scrambled), Ordering::Less);
    }

    #[test]
    fn compare_ties_break_by_creation_order() {
        let metric = metric(&[&["a b c d"], &["e f g h"]], BleuMode::Aggregate);
        let mut first = metric.incremental();
        let mut second = metric.incremental();
        first.add(Some(&words("a b c d"))).expect("add");
        second.add(Some(&words("a b c d"))).expect("add");
        assert_eq!(first.compare(&second), Ordering::Less);
        assert_eq!(first.compare(&first), Ordering::Equal);
    }

    #[test]
    fn future_counts_make_precisions_optimistic() {
        let metric = metric(&[&["a b c d"], &["e f g h"]], BleuMode::Aggregate);
        let nbest = vec![
            vec![words("a b c d")],
            vec![words("e f g h"), words("e f")],
        ];
        let mut state = metric.incremental_with_nbest(&nbest);
        assert_eq!(state.size(), 0);
        // Segment 0 exact plus segment 1 best 4 unigram matches over the shortest (2) candidate.
        assert_close(state.ngram_precisions()[0], 8.0 / 6.0);
        state.add(Some(&words("a b c d"))).expect("add");
        assert_close(state.ngram_precisions()[0], 8.0 / 6.0);
        state.add(Some(&words("e f x x"))).expect("add");
        assert_close(state.ngram_precisions()[0], 6.0 / 8.0);
    }

    #[test]
    fn cache_does_not_change_scores() {
        let cache = Arc::new(SegmentStatsCache::new());
        let plain = metric(&[&["a b c"], &["d e f"]], BleuMode::Smoothed);
        let cached = plain.clone().with_cache(Arc::clone(&cache));
        let mut a = plain.incremental();
        let mut b = cached.incremental();
        a.add_nbest(0, Some(&words("a b x"))).expect("add");
        b.add_nbest(0, Some(&words("a b x"))).expect("add");
        a.add_nbest(3, Some(&words("d e f"))).expect("add");
        b.add_nbest(3, Some(&words("d e f"))).expect("add");
        b.replace_nbest(0, 0, Some(&words("a b x"))).expect("replace");
        assert_eq!(a.score(), b.score());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn sentence_level_helper_matches_state() {
        let refs = vec![words("the cat sat on the mat")];
        let candidate = words("the cat sat on a mat");
        let direct = sentence_smoothed_bleu(&candidate, &refs, 4).expect("score");
        let metric = BleuMetric::new(vec![refs], BleuConfig::default()).expect("metric");
        let mut state = metric.incremental();
        state.add(Some(&candidate)).expect("add");
        assert!((direct - state.score()).abs() < 1e-12);
        assert!(sentence_smoothed_bleu(&candidate, &[], 4).is_err());
    }

    #[test]
    fn report_renders_percentages() {
        let metric = metric(&[&["a b c d"], &["e f g h"]], BleuMode::Aggregate);
        let mut state = metric.incremental();
        state.add(Some(&words("a b c d"))).expect("add");
        let report = state.report();
        assert_eq!(report.metric, "BLEU");
        assert_eq!(report.counts[0], (4.0, 4.0));
        assert!(report.to_string().starts_with("BLEU = 100.000"));
    }
}
