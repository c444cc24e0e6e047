//! N-gram extraction, reference aggregation, and clipping.
//!
//! These are the counting primitives every n-gram metric is built from: a candidate's
//! n-gram multiset is clipped against the per-segment reference ceiling, and the surviving
//! counts are summed per order into match counts.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::sequence::{Sequence, Token};

pub(crate) mod future;

/// Multiset of n-grams (orders `1..=N`) keyed by the n-gram itself.
pub type NgramCounts<T> = FxHashMap<Sequence<T>, usize>;

/// Informativeness weight per n-gram, as used by NIST.
pub type NgramInfo<T> = FxHashMap<Sequence<T>, f64>;

/// Counts every n-gram of order `1..=max_order` in `sequence`.
#[must_use]
pub fn count_ngrams<T: Token>(sequence: &Sequence<T>, max_order: usize) -> NgramCounts<T> {
    let mut counts = NgramCounts::default();
    let len = sequence.len();
    for start in 0..len {
        let end_max = len.min(start + max_order);
        for end in start + 1..=end_max {
            *counts.entry(sequence.subsequence(start..end)).or_insert(0) += 1;
        }
    }
    counts
}

/// Number of n-grams of order `order_index + 1` in a sequence of `length` tokens.
#[must_use]
pub fn possible_match_count(order_index: usize, length: usize) -> usize {
    length.saturating_sub(order_index)
}

/// Per-n-gram maximum count over `references`, the clipping ceiling for one segment.
#[must_use]
pub fn max_ngram_counts<T: Token>(references: &[Sequence<T>], max_order: usize) -> NgramCounts<T> {
    let mut max_counts = NgramCounts::default();
    for reference in references {
        for (ngram, count) in count_ngrams(reference, max_order) {
            let slot = max_counts.entry(ngram).or_insert(0);
            if *slot < count {
                *slot = count;
            }
        }
    }
    max_counts
}

/// Builds the clipping ceiling and the reference lengths (in input order) for one segment.
#[must_use]
pub fn aggregate<T: Token>(
    references: &[Sequence<T>],
    max_order: usize,
) -> (NgramCounts<T>, Vec<usize>) {
    let ceiling = max_ngram_counts(references, max_order);
    let lengths = references.iter().map(Sequence::len).collect();
    (ceiling, lengths)
}

/// Pointwise minimum of `candidate` and `ceiling`. N-grams absent from the ceiling are dropped.
#[must_use]
pub fn clip<T: Token>(candidate: &NgramCounts<T>, ceiling: &NgramCounts<T>) -> NgramCounts<T> {
    candidate
        .iter()
        .filter_map(|(ngram, &count)| {
            let cap = ceiling.get(ngram).copied().unwrap_or(0);
            let clipped = count.min(cap);
            (clipped > 0).then(|| (ngram.clone(), clipped))
        })
        .collect()
}

/// Reference length closest to `candidate_length`; ties go to the earliest reference.
///
/// Returns 0 for an empty slice.
#[must_use]
pub fn best_match_length(ref_lengths: &[usize], candidate_length: usize) -> usize {
    let Some((&first, rest)) = ref_lengths.split_first() else {
        return 0;
    };
    let mut best = first;
    for &len in rest {
        if candidate_length.abs_diff(len) < candidate_length.abs_diff(best) {
            best = len;
        }
    }
    best
}

/// Sums clipped counts per order: `result[k]` holds the matches of order `k + 1`.
#[must_use]
pub fn local_match_counts<T: Token>(clipped: &NgramCounts<T>, order: usize) -> Vec<usize> {
    let mut counts = vec![0usize; order];
    for (ngram, &count) in clipped {
        if count > 0 && ngram.len() <= order {
            counts[ngram.len() - 1] += count;
        }
    }
    counts
}

/// Counts n-grams over a whole reference corpus, returning the summed multiset and the
/// total number of reference tokens.
#[must_use]
pub fn count_corpus_ngrams<T: Token>(
    references: &[&Sequence<T>],
    max_order: usize,
) -> (NgramCounts<T>, usize) {
    references
        .par_iter()
        .map(|reference| (count_ngrams(reference, max_order), reference.len()))
        .reduce(
            || (NgramCounts::default(), 0),
            |(mut acc, acc_len), (local, local_len)| {
                for (ngram, count) in local {
                    *acc.entry(ngram).or_insert(0) += count;
                }
                (acc, acc_len + local_len)
            },
        )
}

/// Informativeness of each n-gram: `-log2(count(w1..wn) / count(w1..wn-1))`.
///
/// Unigrams use `total_words` as their denominator.
#[must_use]
pub fn ngram_info<T: Token>(ngram_counts: &NgramCounts<T>, total_words: usize) -> NgramInfo<T> {
    let mut info = NgramInfo::default();
    info.reserve(ngram_counts.len());
    for (ngram, &count) in ngram_counts {
        let denom = if ngram.len() > 1 {
            let prefix = ngram.subsequence(0..ngram.len() - 1);
            match ngram_counts.get(&prefix) {
                Some(&prefix_count) => prefix_count as f64,
                None => continue,
            }
        } else {
            total_words as f64
        };
        info.insert(ngram.clone(), -(count as f64 / denom).log2());
    }
    info
}
