//! Query emission strategies.
//!
//! The [`QueryBuilder`](crate::builder::QueryBuilder) decides *what* a node
//! means (which backend field, which match mode); a [`QueryEmitter`] decides
//! how that is written down for a particular backend.

mod elastic;
mod filter;

pub use elastic::ElasticEmitter;
pub use filter::FilterEmitter;

use karp_index::{RangeBounds, Scalar};

/// Builds backend query fragments.
pub trait QueryEmitter {
    type Fragment: Clone + std::fmt::Debug + PartialEq;

    /// Matches every entry.
    fn match_all(&self) -> Self::Fragment;

    fn and(&self, lhs: Self::Fragment, rhs: Self::Fragment) -> Self::Fragment;

    fn or(&self, lhs: Self::Fragment, rhs: Self::Fragment) -> Self::Fragment;

    fn not(&self, inner: Self::Fragment) -> Self::Fragment;

    /// Analyzed match that requires every term of `query` to occur in `field`.
    fn match_all_terms(&self, field: &str, query: &str) -> Self::Fragment;

    /// Exact equality on an unanalyzed field.
    fn term(&self, field: &str, value: Scalar) -> Self::Fragment;

    fn regexp(&self, field: &str, pattern: &str) -> Self::Fragment;

    /// Regular expression applied to every text field.
    fn regexp_all_fields(&self, pattern: &str) -> Self::Fragment;

    /// Edit-distance tolerant match across all fields.
    fn fuzzy(&self, query: &str) -> Self::Fragment;

    fn exists(&self, field: &str) -> Self::Fragment;

    fn range(&self, field: &str, bounds: RangeBounds) -> Self::Fragment;
}
