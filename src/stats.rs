//! Serializable summaries of n-gram precision metric states.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Snapshot of an n-gram precision metric: score, per-order precisions, and length totals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NgramPrecisionReport {
    /// Metric name, e.g. `BLEU` or `NIST`.
    pub metric: String,
    /// Current score.
    pub score: f64,
    /// Precision per order.
    pub precisions: Vec<f64>,
    /// `(matches, possible matches)` per order.
    pub counts: Vec<(f64, f64)>,
    /// Multiplicative brevity penalty.
    pub brevity_penalty: f64,
    /// Total candidate length.
    pub candidate_length: usize,
    /// Total effective reference length.
    pub effective_reference_length: f64,
    /// Renders score and precisions as percentages.
    pub percent: bool,
}

impl NgramPrecisionReport {
    /// Candidate to reference length ratio, `0` when no reference length has accumulated.
    #[must_use]
    pub fn length_ratio(&self) -> f64 {
        if self.effective_reference_length > 0.0 {
            self.candidate_length as f64 / self.effective_reference_length
        } else {
            0.0
        }
    }

    /// Serialises the report to JSON.
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}

impl fmt::Display for NgramPrecisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = if self.percent { 100.0 } else { 1.0 };
        write!(f, "{} = {:.3}, ", self.metric, scale * self.score)?;
        for (idx, precision) in self.precisions.iter().enumerate() {
            if idx > 0 {
                f.write_str("/")?;
            }
            write!(f, "{:.3}", scale * precision)?;
        }
        writeln!(
            f,
            " (BP={:.3}, ratio={:.3} {}/{})",
            self.brevity_penalty,
            self.length_ratio(),
            self.candidate_length,
            self.effective_reference_length
        )?;
        writeln!(f, "Precision details:")?;
        for (idx, (matches, possible)) in self.counts.iter().enumerate() {
            writeln!(f, "\t{}:{}/{}", idx + 1, matches, possible)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample() -> NgramPrecisionReport {
        NgramPrecisionReport {
            metric: "BLEU".into(),
            score: 0.5,
            precisions: vec![0.75, 0.5],
            counts: vec![(3.0, 4.0), (1.0, 2.0)],
            brevity_penalty: 1.0,
            candidate_length: 4,
            effective_reference_length: 4.0,
            percent: true,
        }
    }

    #[test]
    fn display_matches_classic_layout() {
        let text = sample().to_string();
        assert!(text.starts_with("BLEU = 50.000, 75.000/50.000 (BP=1.000, ratio=1.000 4/4)"));
        assert!(text.contains("\t2:1/2"));
    }

    #[test]
    fn json_is_well_formed() {
        let json = sample().to_json(true).expect("serialization should work");
        let value: Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["metric"], "BLEU");
        assert_eq!(value["candidate_length"], 4);
    }

    #[test]
    fn ratio_is_zero_without_references() {
        let mut report = sample();
        report.effective_reference_length = 0.0;
        assert_eq!(report.length_ratio(), 0.0);
    }
}
