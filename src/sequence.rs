//! Immutable token sequences shared between hypotheses, references, and n-gram keys.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

/// Atomic unit scored by the metrics. Only identity (equality and hashing) matters.
pub trait Token: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<T> Token for T where T: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Ordered, immutable list of tokens.
///
/// Sub-sequences share the backing storage of their parent, so cutting n-grams out of a
/// sentence never copies tokens. Equality and hashing compare contents only: an n-gram taken
/// from a hypothesis equals the same n-gram taken from a reference.
#[derive(Clone)]
pub struct Sequence<T> {
    tokens: Arc<[T]>,
    start: usize,
    end: usize,
}

impl<T: Token> Sequence<T> {
    /// Builds a sequence that owns `tokens`.
    #[must_use]
    pub fn new(tokens: Vec<T>) -> Self {
        let end = tokens.len();
        Self {
            tokens: Arc::from(tokens),
            start: 0,
            end,
        }
    }

    /// Returns the number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true when the sequence holds no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the token at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Borrows the tokens as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.tokens[self.start..self.end]
    }

    /// Returns the half-open sub-sequence `range`, sharing storage with `self`.
    ///
    /// Panics when the range is out of bounds, like slice indexing.
    #[must_use]
    pub fn subsequence(&self, range: Range<usize>) -> Self {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "subsequence {range:?} out of bounds for length {}",
            self.len()
        );
        Self {
            tokens: Arc::clone(&self.tokens),
            start: self.start + range.start,
            end: self.start + range.end,
        }
    }

    /// Returns true when `prefix` matches the leading tokens of `self`.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.as_slice().starts_with(prefix.as_slice())
    }

    /// Iterates over the tokens in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T: Token> PartialEq for Sequence<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Token> Eq for Sequence<T> {}

impl<T: Token> Hash for Sequence<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl<T: Token> fmt::Debug for Sequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl<T: Token + fmt::Display> fmt::Display for Sequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, token) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{token}")?;
        }
        Ok(())
    }
}

impl<T: Token> From<Vec<T>> for Sequence<T> {
    fn from(tokens: Vec<T>) -> Self {
        Self::new(tokens)
    }
}

impl<T: Token> FromIterator<T> for Sequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a, T: Token> IntoIterator for &'a Sequence<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
