/// Errors reported by [`TokenBucket`](crate::rate_limit::TokenBucket).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketError {
    /// A single request asked for more tokens than the bucket can ever hold
    /// while overflow is prohibited.
    #[error("prohibit overflow: requested {requested} tokens exceeds capacity {capacity}")]
    Overflow { requested: i64, capacity: i64 },

    #[error("{name} is not > 0 (got {value})")]
    InvalidParameter { name: &'static str, value: String },
}
