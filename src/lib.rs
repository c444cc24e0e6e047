//! Incremental machine translation evaluation metrics.
//!
//! The crate scores candidate translations against reference translations with BLEU, NIST,
//! and weighted combinations of metrics, in a form suited to search and tuning loops: a
//! metric *state* accepts one segment at a time, revises earlier segments in place, reports
//! its running score after every step, and forks cheaply so that partial hypotheses can be
//! explored independently. Recombination filters tell a search when two states are certain
//! to finish with the same score.
//!
//! ```
//! use mteval::{
//!     BleuConfig, BleuMetric, CombinationMetric, EvaluationMetric, IncrementalMetric,
//!     NistConfig, NistMetric, Sequence,
//! };
//!
//! # fn main() -> mteval::Result<()> {
//! let words = |text: &str| text.split_whitespace().map(str::to_owned).collect::<Sequence<_>>();
//! let references = vec![
//!     vec![words("the cat sat on the mat"), words("there is a cat on the mat")],
//!     vec![words("it is raining today")],
//! ];
//! let bleu = BleuMetric::new(references.clone(), BleuConfig::default())?;
//! let nist = NistMetric::new(references, NistConfig::builder().order(4).build()?)?;
//! let combo = CombinationMetric::linear(vec![bleu.into(), nist.into()], vec![1.0, 0.1])?;
//!
//! let mut state = combo.incremental_state();
//! state.add(Some(&words("the cat sat on a mat")))?;
//! let mut fork = state.clone();
//! state.add(Some(&words("it is raining today")))?;
//! fork.add(None)?;
//! assert!(state.score() > fork.score());
//! # Ok(())
//! # }
//! ```
//!
//! Both BLEU aggregation modes are available: the corpus-level ratio of summed counts, and
//! the average of per-segment add-one smoothed scores. [`BleuMode::Auto`] picks the smoothed
//! mode for single-segment corpora.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::cast_precision_loss
)]

pub mod bleu;
pub mod cache;
pub mod combination;
pub mod config;
pub mod error;
pub mod metric;
pub mod ngram;
pub mod nist;
pub mod references;
pub mod sequence;
pub mod stats;

pub use bleu::{
    sentence_smoothed_bleu, BleuIncrementalMetric, BleuMetric, BleuRecombinationFilter,
    SegmentStats,
};
pub use cache::SegmentStatsCache;
pub use combination::{
    CombinationIncrementalMetric, CombinationMetric, CombinationRecombinationFilter,
};
pub use config::{
    BleuBuilder, BleuConfig, BleuMode, CombinationConfig, CombinationMode, NistBuilder,
    NistConfig,
};
pub use error::{MetricError, Result};
pub use metric::{
    EvaluationMetric, IncrementalMetric, Metric, MetricState, MetricStateRecombinationFilter,
    NBestLists, NgramPrecisionMetric, RecombinationFilter,
};
pub use nist::{NistIncrementalMetric, NistMetric, NistRecombinationFilter};
pub use references::{ReferenceCorpus, ReferenceSet};
pub use sequence::{Sequence, Token};
pub use stats::NgramPrecisionReport;
