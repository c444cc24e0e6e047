//! The incremental evaluation-metric contract and the closed set of metric variants.
//!
//! A metric *definition* ([`EvaluationMetric`], [`Metric`]) owns the immutable reference data
//! for a test set and hands out metric *states* ([`IncrementalMetric`], [`MetricState`]). A state
//! is scoped to one hypothesis-scoring session: segments are appended with `add`, revised with
//! `replace`, and the running score is read with `score`. States fork cheaply with `clone`,
//! sharing reference data and deep-copying only their running totals.

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::bleu::{BleuIncrementalMetric, BleuMetric, BleuRecombinationFilter};
use crate::combination::{
    CombinationIncrementalMetric, CombinationMetric, CombinationRecombinationFilter,
};
use crate::error::{MetricError, Result};
use crate::nist::{NistIncrementalMetric, NistMetric, NistRecombinationFilter};
use crate::sequence::{Sequence, Token};
use crate::stats::NgramPrecisionReport;

/// Candidate translations per segment, as produced by an n-best decoder.
pub type NBestLists<T> = [Vec<Sequence<T>>];

/// Stateful, hypothesis-scoped score that can be extended and revised segment by segment.
pub trait IncrementalMetric<T: Token>: fmt::Debug + Send + Sync {
    /// Appends the hypothesis for segment `size()`. `None` marks a segment without output.
    fn add(&mut self, segment: Option<&Sequence<T>>) -> Result<()>;

    /// Like [`IncrementalMetric::add`], identifying the hypothesis by its n-best position so
    /// that per-segment work can be memoized.
    fn add_nbest(&mut self, nbest_id: usize, segment: Option<&Sequence<T>>) -> Result<()> {
        let _ = nbest_id;
        self.add(segment)
    }

    /// Substitutes the hypothesis at `index`, padding with `None` when `index >= size()`.
    fn replace(&mut self, index: usize, segment: Option<&Sequence<T>>) -> Result<()>;

    /// Like [`IncrementalMetric::replace`], identifying the hypothesis by its n-best position.
    fn replace_nbest(
        &mut self,
        index: usize,
        nbest_id: usize,
        segment: Option<&Sequence<T>>,
    ) -> Result<()> {
        let _ = nbest_id;
        self.replace(index, segment)
    }

    /// Current score. Always finite.
    fn score(&self) -> f64;

    /// Best score attainable.
    fn max_score(&self) -> f64;

    /// Number of segments added so far, including `None` segments.
    fn size(&self) -> usize;

    /// Creation order of this state among states of the same metric definition.
    fn instance_id(&self) -> u64;

    /// Clones the state behind a box.
    fn box_clone(&self) -> Box<dyn IncrementalMetric<T>>;
}

impl<T: Token> Clone for Box<dyn IncrementalMetric<T>> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Metric definition bound to a reference corpus.
pub trait EvaluationMetric<T: Token>: fmt::Debug + Send + Sync {
    /// Creates an empty incremental state.
    fn incremental_state(&self) -> MetricState<T>;

    /// Creates an empty incremental state that may use `nbest` to estimate the contribution of
    /// segments not yet added. Metrics without such an estimate ignore the lists.
    fn incremental_state_with_nbest(&self, nbest: &NBestLists<T>) -> MetricState<T> {
        let _ = nbest;
        self.incremental_state()
    }

    /// Best score attainable.
    fn max_score(&self) -> f64;

    /// Number of segments the metric holds references for.
    fn segment_count(&self) -> usize;

    /// Scores a whole corpus at once: a fresh state, one `add` per hypothesis, one `score`.
    fn score_corpus(&self, hypotheses: &[Sequence<T>]) -> Result<f64> {
        if hypotheses.is_empty() {
            return Err(MetricError::EmptyInput(
                "corpus scoring requires at least one hypothesis".into(),
            ));
        }
        let mut state = self.incremental_state();
        for hypothesis in hypotheses {
            state.add(Some(hypothesis))?;
        }
        Ok(state.score())
    }
}

/// Decides whether two search states will yield the same future score and may be merged.
pub trait RecombinationFilter<M: ?Sized> {
    /// True when every running total of `a` equals the corresponding total of `b`.
    fn combinable(&self, a: &M, b: &M) -> bool;

    /// Deterministic hash of the running totals; combinable states hash equal.
    fn recombination_hash(&self, state: &M) -> u64;
}

/// Introspection shared by metrics built on clipped n-gram precision.
pub trait NgramPrecisionMetric {
    /// Precision per order (`0` when an order has no possible matches).
    fn ngram_precisions(&self) -> Vec<f64>;

    /// `(matches, possible matches)` per order, from the running totals.
    fn ngram_precision_counts(&self) -> Vec<(f64, f64)>;

    /// Multiplicative brevity penalty.
    fn brevity_penalty(&self) -> f64;

    /// Total candidate length.
    fn candidate_length(&self) -> usize;

    /// Total effective reference length.
    fn effective_reference_length(&self) -> f64;

    /// Summary of the current state.
    fn report(&self) -> NgramPrecisionReport;
}

/// Allocates creation-order identifiers for the states of one metric definition.
#[derive(Debug, Default)]
pub(crate) struct InstanceCounter(AtomicU64);

impl InstanceCounter {
    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, AtomicOrdering::Relaxed)
    }
}

/// Orders two states by score, then by creation order.
pub fn compare_by_score<T, A, B>(a: &A, b: &B) -> Ordering
where
    T: Token,
    A: IncrementalMetric<T> + ?Sized,
    B: IncrementalMetric<T> + ?Sized,
{
    a.score()
        .total_cmp(&b.score())
        .then_with(|| a.instance_id().cmp(&b.instance_id()))
}

/// Replaces NaN and infinities with zero.
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Deterministic hash over a state's running totals.
pub(crate) fn hash_totals<F>(feed: F) -> u64
where
    F: FnOnce(&mut FxHasher),
{
    let mut hasher = FxHasher::default();
    feed(&mut hasher);
    hasher.finish()
}

/// Fixed-point resolution of float running totals: `2^-60`.
const FIXED_SCALE: f64 = (1u64 << 60) as f64;

/// Converts a per-segment float contribution into fixed point.
///
/// Totals kept as sums of these integers are exact and independent of the order in which
/// segments were added, replaced, or retracted. Non-finite input maps to 0.
pub(crate) fn to_fixed(value: f64) -> i128 {
    if value.is_finite() {
        (value * FIXED_SCALE).round() as i128
    } else {
        0
    }
}

/// Converts a fixed-point total back to a float.
pub(crate) fn from_fixed(value: i128) -> f64 {
    value as f64 / FIXED_SCALE
}

/// Metric definitions known to the crate, plus an opaque variant for external metrics such as
/// edit-distance families.
#[derive(Debug, Clone)]
pub enum Metric<T: Token> {
    /// Clipped n-gram precision with brevity penalty.
    Bleu(BleuMetric<T>),
    /// Informativeness-weighted n-gram precision.
    Nist(NistMetric<T>),
    /// Weighted combination of other metrics.
    Combination(CombinationMetric<T>),
    /// Metric implemented outside this crate.
    External(Arc<dyn EvaluationMetric<T>>),
}

impl<T: Token> EvaluationMetric<T> for Metric<T> {
    fn incremental_state(&self) -> MetricState<T> {
        match self {
            Self::Bleu(metric) => metric.incremental_state(),
            Self::Nist(metric) => metric.incremental_state(),
            Self::Combination(metric) => metric.incremental_state(),
            Self::External(metric) => metric.incremental_state(),
        }
    }

    fn incremental_state_with_nbest(&self, nbest: &NBestLists<T>) -> MetricState<T> {
        match self {
            Self::Bleu(metric) => metric.incremental_state_with_nbest(nbest),
            Self::Nist(metric) => metric.incremental_state_with_nbest(nbest),
            Self::Combination(metric) => metric.incremental_state_with_nbest(nbest),
            Self::External(metric) => metric.incremental_state_with_nbest(nbest),
        }
    }

    fn max_score(&self) -> f64 {
        match self {
            Self::Bleu(metric) => metric.max_score(),
            Self::Nist(metric) => metric.max_score(),
            Self::Combination(metric) => metric.max_score(),
            Self::External(metric) => metric.max_score(),
        }
    }

    fn segment_count(&self) -> usize {
        match self {
            Self::Bleu(metric) => metric.segment_count(),
            Self::Nist(metric) => metric.segment_count(),
            Self::Combination(metric) => metric.segment_count(),
            Self::External(metric) => metric.segment_count(),
        }
    }
}

impl<T: Token> From<BleuMetric<T>> for Metric<T> {
    fn from(metric: BleuMetric<T>) -> Self {
        Self::Bleu(metric)
    }
}

impl<T: Token> From<NistMetric<T>> for Metric<T> {
    fn from(metric: NistMetric<T>) -> Self {
        Self::Nist(metric)
    }
}

impl<T: Token> From<CombinationMetric<T>> for Metric<T> {
    fn from(metric: CombinationMetric<T>) -> Self {
        Self::Combination(metric)
    }
}

/// Incremental state of any [`Metric`].
#[derive(Debug, Clone)]
pub enum MetricState<T: Token> {
    /// BLEU state.
    Bleu(BleuIncrementalMetric<T>),
    /// NIST state.
    Nist(NistIncrementalMetric<T>),
    /// Combination state.
    Combination(CombinationIncrementalMetric<T>),
    /// State of an external metric.
    External(Box<dyn IncrementalMetric<T>>),
}

macro_rules! dispatch {
    ($self:expr, $state:ident => $body:expr) => {
        match $self {
            MetricState::Bleu($state) => $body,
            MetricState::Nist($state) => $body,
            MetricState::Combination($state) => $body,
            MetricState::External($state) => $body,
        }
    };
}

impl<T: Token> MetricState<T> {
    /// Ranks two states by expected final score.
    ///
    /// Two aggregate-mode BLEU states compare by their highest order with a nonzero precision,
    /// then by the partial log score over the orders below it. Every other pairing compares by
    /// score. Ties fall back to creation order.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bleu(a), Self::Bleu(b)) => a.compare(b),
            _ => compare_by_score::<T, _, _>(self, other),
        }
    }

    /// Short name of the variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bleu(_) => "bleu",
            Self::Nist(_) => "nist",
            Self::Combination(_) => "combination",
            Self::External(_) => "external",
        }
    }
}

impl<T: Token> IncrementalMetric<T> for MetricState<T> {
    fn add(&mut self, segment: Option<&Sequence<T>>) -> Result<()> {
        dispatch!(self, state => state.add(segment))
    }

    fn add_nbest(&mut self, nbest_id: usize, segment: Option<&Sequence<T>>) -> Result<()> {
        dispatch!(self, state => state.add_nbest(nbest_id, segment))
    }

    fn replace(&mut self, index: usize, segment: Option<&Sequence<T>>) -> Result<()> {
        dispatch!(self, state => state.replace(index, segment))
    }

    fn replace_nbest(
        &mut self,
        index: usize,
        nbest_id: usize,
        segment: Option<&Sequence<T>>,
    ) -> Result<()> {
        dispatch!(self, state => state.replace_nbest(index, nbest_id, segment))
    }

    fn score(&self) -> f64 {
        dispatch!(self, state => state.score())
    }

    fn max_score(&self) -> f64 {
        dispatch!(self, state => state.max_score())
    }

    fn size(&self) -> usize {
        dispatch!(self, state => state.size())
    }

    fn instance_id(&self) -> u64 {
        dispatch!(self, state => state.instance_id())
    }

    fn box_clone(&self) -> Box<dyn IncrementalMetric<T>> {
        Box::new(self.clone())
    }
}

impl<T: Token> From<BleuIncrementalMetric<T>> for MetricState<T> {
    fn from(state: BleuIncrementalMetric<T>) -> Self {
        Self::Bleu(state)
    }
}

impl<T: Token> From<NistIncrementalMetric<T>> for MetricState<T> {
    fn from(state: NistIncrementalMetric<T>) -> Self {
        Self::Nist(state)
    }
}

impl<T: Token> From<CombinationIncrementalMetric<T>> for MetricState<T> {
    fn from(state: CombinationIncrementalMetric<T>) -> Self {
        Self::Combination(state)
    }
}

/// Recombination filter over any [`MetricState`].
///
/// States of different variants are never combinable, and external states are never
/// combinable because their totals are opaque.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricStateRecombinationFilter;

impl<T: Token> RecombinationFilter<MetricState<T>> for MetricStateRecombinationFilter {
    fn combinable(&self, a: &MetricState<T>, b: &MetricState<T>) -> bool {
        match (a, b) {
            (MetricState::Bleu(a), MetricState::Bleu(b)) => {
                BleuRecombinationFilter.combinable(a, b)
            }
            (MetricState::Nist(a), MetricState::Nist(b)) => {
                NistRecombinationFilter.combinable(a, b)
            }
            (MetricState::Combination(a), MetricState::Combination(b)) => {
                CombinationRecombinationFilter.combinable(a, b)
            }
            _ => false,
        }
    }

    fn recombination_hash(&self, state: &MetricState<T>) -> u64 {
        match state {
            MetricState::Bleu(state) => BleuRecombinationFilter.recombination_hash(state),
            MetricState::Nist(state) => NistRecombinationFilter.recombination_hash(state),
            MetricState::Combination(state) => {
                CombinationRecombinationFilter.recombination_hash(state)
            }
            MetricState::External(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts segments and scores the fraction of non-empty ones.
    #[derive(Debug, Clone)]
    struct CoverageMetric {
        segments: Vec<bool>,
        available: usize,
        id: u64,
    }

    impl IncrementalMetric<String> for CoverageMetric {
        fn add(&mut self, segment: Option<&Sequence<String>>) -> Result<()> {
            if self.segments.len() >= self.available {
                return Err(MetricError::too_many_candidates(
                    self.segments.len(),
                    self.available,
                ));
            }
            self.segments.push(segment.is_some());
            Ok(())
        }

        fn replace(&mut self, index: usize, segment: Option<&Sequence<String>>) -> Result<()> {
            while self.segments.len() <= index {
                self.add(None)?;
            }
            self.segments[index] = segment.is_some();
            Ok(())
        }

        fn score(&self) -> f64 {
            let covered = self.segments.iter().filter(|&&c| c).count();
            finite_or_zero(covered as f64 / self.segments.len() as f64)
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

        fn box_clone(&self) -> Box<dyn IncrementalMetric<String>> {
            Box::new(self.clone())
        }
    }

    fn external(id: u64) -> MetricState<String> {
        MetricState::External(Box::new(CoverageMetric {
            segments: Vec::new(),
            available: 2,
            id,
        }))
    }

    #[test]
    fn external_state_dispatches_and_clones_independently() {
        let mut state = external(0);
        let seq: Sequence<String> = vec!["x".to_owned()].into();
        state.add(Some(&seq)).expect("first add");
        let snapshot = state.clone();
        state.add(None).expect("second add");
        assert_eq!(snapshot.size(), 1);
        assert_eq!(state.size(), 2);
        assert!((state.score() - 0.5).abs() < f64::EPSILON);
        assert!(state.add(None).is_err());
        assert_eq!(state.kind(), "external");
    }

    #[test]
    fn external_states_are_never_combinable() {
        let a = external(0);
        let b = external(1);
        assert!(!MetricStateRecombinationFilter.combinable(&a, &b));
        assert_eq!(MetricStateRecombinationFilter.recombination_hash(&a), 0);
    }

    #[test]
    fn score_ties_break_by_creation_order() {
        let a = external(3);
        let b = external(7);
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(b.compare(&a), Ordering::Greater);
    }

    #[test]
    fn instance_counter_is_monotonic() {
        let counter = InstanceCounter::default();
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn fixed_point_sums_ignore_order() {
        let values = [0.1, 0.7, 1.0 / 3.0, 2.5e-3];
        let forward: i128 = values.iter().map(|&v| to_fixed(v)).sum();
        let backward: i128 = values.iter().rev().map(|&v| to_fixed(v)).sum();
        assert_eq!(forward, backward);
        let retracted = forward - to_fixed(0.7) + to_fixed(0.7);
        assert_eq!(retracted, forward);
        assert_eq!(from_fixed(to_fixed(0.75)), 0.75);
        assert_eq!(to_fixed(f64::NAN), 0);
    }

    #[test]
    fn finite_or_zero_masks_non_finite() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
        assert_eq!(finite_or_zero(0.25), 0.25);
    }
}
