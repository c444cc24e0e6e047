use std::fmt::Debug;
use std::ops::AddAssign;

use log::debug;
use rayon::prelude::*;

use crate::metric::NBestLists;
use crate::ngram::{clip, count_ngrams, possible_match_count, NgramCounts};
use crate::references::ReferenceCorpus;
use crate::sequence::Token;

/// Optimistic per-order counts for segments that have not been added yet.
///
/// For every segment the best clipped match count over its n-best candidates is kept per
/// order, together with the possible-match counts of its shortest candidate. Suffix sums make
/// "everything from segment `j` on" a constant-time lookup.
#[derive(Debug, Clone)]
pub(crate) struct FutureCounts<M> {
    /// `suffix_matches[j][k]`: summed best matches of order `k + 1` over segments `j..`.
    suffix_matches: Vec<Vec<M>>,
    /// `suffix_possible[j][k]`: summed possible matches of order `k + 1` over segments `j..`.
    suffix_possible: Vec<Vec<usize>>,
}

impl<M> FutureCounts<M>
where
    M: Copy + Default + PartialOrd + AddAssign + Debug + Send + Sync,
{
    /// Estimates per-segment best counts from `nbest`. `local_counts` turns clipped n-gram
    /// counts into per-order match counts (plain or weighted).
    pub(crate) fn estimate<T, F>(
        nbest: &NBestLists<T>,
        references: &ReferenceCorpus<T>,
        local_counts: F,
    ) -> Self
    where
        T: Token,
        F: Fn(&NgramCounts<T>) -> Vec<M> + Sync,
    {
        let order = references.order();
        let segments = references.segment_count();
        let per_segment: Vec<(Vec<M>, Vec<usize>)> = (0..segments)
            .into_par_iter()
            .map(|segment| {
                let mut best = vec![M::default(); order];
                let mut possible = vec![0usize; order];
                let Some(candidates) = nbest.get(segment) else {
                    return (best, possible);
                };
                let ceiling = references[segment].ceiling();
                let mut shortest: Option<usize> = None;
                for candidate in candidates {
                    let len = candidate.len();
                    if shortest.map_or(true, |current| len < current) {
                        shortest = Some(len);
                        for (k, slot) in possible.iter_mut().enumerate() {
                            *slot = possible_match_count(k, len);
                        }
                    }
                    let clipped = clip(&count_ngrams(candidate, order), ceiling);
                    for (slot, count) in best.iter_mut().zip(local_counts(&clipped)) {
                        if *slot < count {
                            *slot = count;
                        }
                    }
                }
                (best, possible)
            })
            .collect();

        for (segment, (best, possible)) in per_segment.iter().enumerate() {
            debug!("future counts {segment}: matches {best:?} possible {possible:?}");
        }

        let mut suffix_matches = vec![vec![M::default(); order]; segments + 1];
        let mut suffix_possible = vec![vec![0usize; order]; segments + 1];
        for segment in (0..segments).rev() {
            let (best, possible) = &per_segment[segment];
            for k in 0..order {
                let mut matches = suffix_matches[segment + 1][k];
                matches += best[k];
                suffix_matches[segment][k] = matches;
                suffix_possible[segment][k] = suffix_possible[segment + 1][k] + possible[k];
            }
        }

        Self {
            suffix_matches,
            suffix_possible,
        }
    }

    /// Summed `(matches, possible matches)` of order `order_index + 1` over segments `from..`.
    pub(crate) fn remaining(&self, from: usize, order_index: usize) -> (M, usize) {
        let row = from.min(self.suffix_matches.len() - 1);
        (
            self.suffix_matches[row][order_index],
            self.suffix_possible[row][order_index],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ngram::local_match_counts;
    use crate::sequence::Sequence;

    fn words(text: &str) -> Sequence<String> {
        text.split_whitespace().map(str::to_owned).collect()
    }

    #[test]
    fn keeps_best_matches_and_shortest_possible_counts() {
        let references =
            ReferenceCorpus::new(vec![vec![words("a b c")], vec![words("x y")]], 2)
                .expect("valid corpus");
        let nbest = vec![
            vec![words("a b c d"), words("a z")],
            vec![words("x y")],
        ];
        let future = FutureCounts::estimate(&nbest, &references, |clipped| {
            local_match_counts(clipped, 2)
        });
        // segment 0: best unigram matches 3 ("a b c d"), shortest candidate "a z".
        // segment 1: exact match.
        assert_eq!(future.remaining(1, 0), (2, 2));
        assert_eq!(future.remaining(0, 0), (5, 4));
        assert_eq!(future.remaining(0, 1), (3, 2));
        assert_eq!(future.remaining(2, 0), (0, 0));
        assert_eq!(future.remaining(9, 1), (0, 0));
    }

    #[test]
    fn missing_lists_contribute_nothing() {
        let references =
            ReferenceCorpus::new(vec![vec![words("a")], vec![words("b")]], 1).expect("corpus");
        let nbest = vec![vec![words("a")]];
        let future =
            FutureCounts::estimate(&nbest, &references, |clipped| local_match_counts(clipped, 1));
        assert_eq!(future.remaining(0, 0), (1, 1));
        assert_eq!(future.remaining(1, 0), (0, 0));
    }
}
