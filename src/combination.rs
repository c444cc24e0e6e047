//! Weighted combinations of other metrics, folded linearly or geometrically.

use std::cmp::Ordering;
use std::hash::Hash;
use std::sync::Arc;

use log::info;

use crate::config::{CombinationConfig, CombinationMode};
use crate::error::{MetricError, Result};
use crate::metric::{
    compare_by_score, finite_or_zero, hash_totals, EvaluationMetric, IncrementalMetric,
    InstanceCounter, Metric, MetricState, MetricStateRecombinationFilter, NBestLists,
    RecombinationFilter,
};
use crate::sequence::{Sequence, Token};

#[derive(Debug)]
struct CombinationData<T: Token> {
    metrics: Vec<Metric<T>>,
    config: CombinationConfig,
    segment_count: usize,
    ids: InstanceCounter,
}

/// Fixed-weight combination of child metrics defined over the same segments.
#[derive(Debug, Clone)]
pub struct CombinationMetric<T: Token> {
    data: Arc<CombinationData<T>>,
}

impl<T: Token> CombinationMetric<T> {
    /// Combines `metrics` with one weight per child.
    pub fn new(metrics: Vec<Metric<T>>, config: CombinationConfig) -> Result<Self> {
        config.validate(metrics.len())?;
        let segment_count = metrics[0].segment_count();
        if let Some((idx, other)) = metrics
            .iter()
            .enumerate()
            .find(|(_, metric)| metric.segment_count() != segment_count)
        {
            return Err(MetricError::InvalidConfig(format!(
                "metric {idx} covers {} segments but metric 0 covers {segment_count}",
                other.segment_count()
            )));
        }
        info!(
            "{:?} combination of {} metrics over {} segments, weights {:?}",
            config.mode,
            metrics.len(),
            segment_count,
            config.weights
        );
        Ok(Self {
            data: Arc::new(CombinationData {
                metrics,
                config,
                segment_count,
                ids: InstanceCounter::default(),
            }),
        })
    }

    /// Linear combination shorthand.
    pub fn linear(metrics: Vec<Metric<T>>, weights: Vec<f64>) -> Result<Self> {
        Self::new(metrics, CombinationConfig::linear(weights))
    }

    /// Geometric combination shorthand.
    pub fn geometric(metrics: Vec<Metric<T>>, weights: Vec<f64>) -> Result<Self> {
        Self::new(metrics, CombinationConfig::geometric(weights))
    }

    /// Child metrics in declaration order.
    #[must_use]
    pub fn metrics(&self) -> &[Metric<T>] {
        &self.data.metrics
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CombinationConfig {
        &self.data.config
    }

    /// Creates an empty incremental state with one child state per metric.
    #[must_use]
    pub fn incremental(&self) -> CombinationIncrementalMetric<T> {
        let children = self
            .data
            .metrics
            .iter()
            .map(EvaluationMetric::incremental_state)
            .collect();
        CombinationIncrementalMetric::new(self, children)
    }

    /// Creates an empty incremental state, handing `nbest` to every child.
    #[must_use]
    pub fn incremental_with_nbest(&self, nbest: &NBestLists<T>) -> CombinationIncrementalMetric<T> {
        let children = self
            .data
            .metrics
            .iter()
            .map(|metric| metric.incremental_state_with_nbest(nbest))
            .collect();
        CombinationIncrementalMetric::new(self, children)
    }

    /// Returns the recombination filter for combination states.
    #[must_use]
    pub fn recombination_filter(&self) -> CombinationRecombinationFilter {
        CombinationRecombinationFilter
    }
}

impl<T: Token> EvaluationMetric<T> for CombinationMetric<T> {
    fn incremental_state(&self) -> MetricState<T> {
        MetricState::Combination(self.incremental())
    }

    fn incremental_state_with_nbest(&self, nbest: &NBestLists<T>) -> MetricState<T> {
        MetricState::Combination(self.incremental_with_nbest(nbest))
    }

    fn max_score(&self) -> f64 {
        let maxima: Vec<f64> = self.data.metrics.iter().map(|m| m.max_score()).collect();
        combine(&self.data.config, &maxima)
    }

    fn segment_count(&self) -> usize {
        self.data.segment_count
    }
}

/// Folds child scores with the configured weights.
fn combine(config: &CombinationConfig, scores: &[f64]) -> f64 {
    let weighted = config.weights.iter().zip(scores);
    match config.mode {
        CombinationMode::Linear => weighted.map(|(w, s)| w * s).sum(),
        CombinationMode::Geometric => {
            // Scores below -1 would leave the log's domain.
            let log_sum: f64 = weighted.map(|(w, s)| w * (s.max(-1.0) + 1.0).ln()).sum();
            finite_or_zero(log_sum.exp())
        }
    }
}

/// Child states kept in lock-step.
#[derive(Debug)]
pub struct CombinationIncrementalMetric<T: Token> {
    data: Arc<CombinationData<T>>,
    id: u64,
    children: Vec<MetricState<T>>,
}

impl<T: Token> Clone for CombinationIncrementalMetric<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            id: self.data.ids.next(),
            children: self.children.clone(),
        }
    }
}

impl<T: Token> CombinationIncrementalMetric<T> {
    fn new(metric: &CombinationMetric<T>, children: Vec<MetricState<T>>) -> Self {
        Self {
            data: Arc::clone(&metric.data),
            id: metric.data.ids.next(),
            children,
        }
    }

    /// Child states in declaration order.
    #[must_use]
    pub fn children(&self) -> &[MetricState<T>] {
        &self.children
    }

    /// Current score of every child.
    #[must_use]
    pub fn child_scores(&self) -> Vec<f64> {
        self.children.iter().map(IncrementalMetric::score).collect()
    }

    /// Ranks two states by score, then by creation order.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        compare_by_score::<T, _, _>(self, other)
    }

    /// Applies `op` to every child in order.
    ///
    /// A failure in the first child leaves every child untouched and is returned as is. A
    /// failure after that leaves the children out of step, which is `Inconsistent`.
    fn forward<F>(&mut self, mut op: F) -> Result<()>
    where
        F: FnMut(&mut MetricState<T>) -> Result<()>,
    {
        for (idx, child) in self.children.iter_mut().enumerate() {
            if let Err(err) = op(child) {
                if idx == 0 {
                    return Err(err);
                }
                return Err(MetricError::Inconsistent(format!(
                    "child metric {idx} failed after earlier children were updated: {err}"
                )));
            }
        }
        self.check_sizes()
    }

    fn check_sizes(&self) -> Result<()> {
        let Some((first, rest)) = self.children.split_first() else {
            return Ok(());
        };
        let expected = first.size();
        match rest.iter().position(|child| child.size() != expected) {
            Some(idx) => Err(MetricError::Inconsistent(format!(
                "child metric {} has size {} but child metric 0 has size {expected}",
                idx + 1,
                rest[idx].size()
            ))),
            None => Ok(()),
        }
    }

    fn check_bounds(&self, index: usize) -> Result<()> {
        if index >= self.data.segment_count {
            return Err(MetricError::too_many_candidates(
                index,
                self.data.segment_count,
            ));
        }
        Ok(())
    }
}

impl<T: Token> IncrementalMetric<T> for CombinationIncrementalMetric<T> {
    fn add(&mut self, segment: Option<&Sequence<T>>) -> Result<()> {
        self.check_bounds(self.size())?;
        self.forward(|child| child.add(segment))
    }

    fn add_nbest(&mut self, nbest_id: usize, segment: Option<&Sequence<T>>) -> Result<()> {
        self.check_bounds(self.size())?;
        self.forward(|child| child.add_nbest(nbest_id, segment))
    }

    fn replace(&mut self, index: usize, segment: Option<&Sequence<T>>) -> Result<()> {
        self.check_bounds(index)?;
        self.forward(|child| child.replace(index, segment))
    }

    fn replace_nbest(
        &mut self,
        index: usize,
        nbest_id: usize,
        segment: Option<&Sequence<T>>,
    ) -> Result<()> {
        self.check_bounds(index)?;
        self.forward(|child| child.replace_nbest(index, nbest_id, segment))
    }

    fn score(&self) -> f64 {
        combine(&self.data.config, &self.child_scores())
    }

    fn max_score(&self) -> f64 {
        let maxima: Vec<f64> = self.children.iter().map(IncrementalMetric::max_score).collect();
        combine(&self.data.config, &maxima)
    }

    fn size(&self) -> usize {
        debug_assert!(
            self.check_sizes().is_ok(),
            "combination children out of step"
        );
        self.children.first().map_or(0, IncrementalMetric::size)
    }

    fn instance_id(&self) -> u64 {
        self.id
    }

    fn box_clone(&self) -> Box<dyn IncrementalMetric<T>> {
        Box::new(self.clone())
    }
}

/// Merges combination states whose children are pairwise combinable.
#[derive(Debug, Default, Clone, Copy)]
pub struct CombinationRecombinationFilter;

impl<T: Token> RecombinationFilter<CombinationIncrementalMetric<T>>
    for CombinationRecombinationFilter
{
    fn combinable(
        &self,
        a: &CombinationIncrementalMetric<T>,
        b: &CombinationIncrementalMetric<T>,
    ) -> bool {
        a.children.len() == b.children.len()
            && a.children
                .iter()
                .zip(&b.children)
                .all(|(x, y)| MetricStateRecombinationFilter.combinable(x, y))
    }

    fn recombination_hash(&self, state: &CombinationIncrementalMetric<T>) -> u64 {
        hash_totals(|hasher| {
            for child in &state.children {
                MetricStateRecombinationFilter
                    .recombination_hash(child)
                    .hash(hasher);
            }
        })
    }
}
