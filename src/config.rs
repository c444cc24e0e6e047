//! Configuration builders controlling metric construction.

use crate::error::{MetricError, Result};
use serde::{Deserialize, Serialize};

/// Default BLEU n-gram order.
pub const DEFAULT_BLEU_ORDER: usize = 4;
/// Default NIST n-gram order.
pub const DEFAULT_NIST_ORDER: usize = 10;

/// How BLEU aggregates segment statistics into a score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BleuMode {
    /// Smoothed when the corpus has exactly one segment, aggregate otherwise.
    #[default]
    Auto,
    /// Corpus-level ratio of summed clipped matches to summed possible matches.
    Aggregate,
    /// Arithmetic mean of per-segment add-one smoothed scores (BLEU+1).
    Smoothed,
}

impl BleuMode {
    /// Resolves [`BleuMode::Auto`] against the number of segments.
    #[must_use]
    pub fn is_smoothed(self, segment_count: usize) -> bool {
        match self {
            Self::Auto => segment_count == 1,
            Self::Aggregate => false,
            Self::Smoothed => true,
        }
    }
}

/// Configuration for BLEU.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BleuConfig {
    /// Largest n-gram order scored.
    pub order: usize,
    /// Multiplier applied to the chosen reference length before it enters the brevity penalty.
    pub length_bias: f64,
    /// Multiplier applied to the aggregate score and to the maximum score.
    pub score_multiplier: f64,
    /// Aggregation mode.
    pub mode: BleuMode,
}

impl BleuConfig {
    /// Returns a builder initialised with [`BleuConfig::default`].
    #[must_use]
    pub fn builder() -> BleuBuilder {
        BleuBuilder::default()
    }

    /// Validates the invariants required for scoring.
    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(MetricError::InvalidConfig(
                "order must be greater than zero".into(),
            ));
        }
        if !self.length_bias.is_finite() || self.length_bias < 0.0 {
            return Err(MetricError::InvalidConfig(format!(
                "length_bias ({}) must be finite and non-negative",
                self.length_bias
            )));
        }
        if !self.score_multiplier.is_finite() {
            return Err(MetricError::InvalidConfig(format!(
                "score_multiplier ({}) must be finite",
                self.score_multiplier
            )));
        }
        Ok(())
    }
}

impl Default for BleuConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_BLEU_ORDER,
            length_bias: 1.0,
            score_multiplier: 1.0,
            mode: BleuMode::Auto,
        }
    }
}

/// Builder for [`BleuConfig`].
#[derive(Debug, Default, Clone)]
pub struct BleuBuilder {
    cfg: BleuConfig,
}

impl BleuBuilder {
    /// Creates a builder with [`BleuConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest n-gram order.
    #[must_use]
    pub fn order(mut self, value: usize) -> Self {
        self.cfg.order = value;
        self
    }

    /// Sets the reference length bias.
    #[must_use]
    pub fn length_bias(mut self, value: f64) -> Self {
        self.cfg.length_bias = value;
        self
    }

    /// Sets the score multiplier.
    #[must_use]
    pub fn score_multiplier(mut self, value: f64) -> Self {
        self.cfg.score_multiplier = value;
        self
    }

    /// Selects the aggregation mode.
    #[must_use]
    pub fn mode(mut self, mode: BleuMode) -> Self {
        self.cfg.mode = mode;
        self
    }

    /// Shorthand forcing [`BleuMode::Smoothed`] when `enabled`, [`BleuMode::Auto`] otherwise.
    #[must_use]
    pub fn smoothed(mut self, enabled: bool) -> Self {
        self.cfg.mode = if enabled {
            BleuMode::Smoothed
        } else {
            BleuMode::Auto
        };
        self
    }

    /// Finalises the builder, returning a validated [`BleuConfig`].
    pub fn build(self) -> Result<BleuConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration for NIST.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NistConfig {
    /// Largest n-gram order scored.
    pub order: usize,
}

impl NistConfig {
    /// Returns a builder initialised with [`NistConfig::default`].
    #[must_use]
    pub fn builder() -> NistBuilder {
        NistBuilder::default()
    }

    /// Validates the invariants required for scoring.
    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(MetricError::InvalidConfig(
                "order must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for NistConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_NIST_ORDER,
        }
    }
}

/// Builder for [`NistConfig`].
#[derive(Debug, Default, Clone)]
pub struct NistBuilder {
    cfg: NistConfig,
}

impl NistBuilder {
    /// Creates a builder with [`NistConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest n-gram order.
    #[must_use]
    pub fn order(mut self, value: usize) -> Self {
        self.cfg.order = value;
        self
    }

    /// Finalises the builder, returning a validated [`NistConfig`].
    pub fn build(self) -> Result<NistConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// How a combination folds its children's scores together.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CombinationMode {
    /// Weighted sum of child scores.
    #[default]
    Linear,
    /// Weighted geometric combination of child scores shifted into `[0, ∞)`.
    Geometric,
}

/// Configuration for a combination of sub-metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CombinationConfig {
    /// One weight per child metric, in declaration order.
    pub weights: Vec<f64>,
    /// Combination mode.
    pub mode: CombinationMode,
}

impl CombinationConfig {
    /// Linear combination with `weights`.
    #[must_use]
    pub fn linear<I: IntoIterator<Item = f64>>(weights: I) -> Self {
        Self {
            weights: weights.into_iter().collect(),
            mode: CombinationMode::Linear,
        }
    }

    /// Geometric combination with `weights`.
    #[must_use]
    pub fn geometric<I: IntoIterator<Item = f64>>(weights: I) -> Self {
        Self {
            weights: weights.into_iter().collect(),
            mode: CombinationMode::Geometric,
        }
    }

    /// Validates the weights against the number of children.
    pub fn validate(&self, child_count: usize) -> Result<()> {
        if child_count == 0 {
            return Err(MetricError::InvalidConfig(
                "combination requires at least one child metric".into(),
            ));
        }
        if self.weights.len() != child_count {
            return Err(MetricError::InvalidConfig(format!(
                "weight count ({}) does not match metric count ({child_count})",
                self.weights.len()
            )));
        }
        if let Some(bad) = self.weights.iter().find(|w| !w.is_finite()) {
            return Err(MetricError::InvalidConfig(format!(
                "weights must be finite, found {bad}"
            )));
        }
        Ok(())
    }
}
