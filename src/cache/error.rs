use thiserror::Error;

/// Failures raised by a key/value store or while encoding cache entries.
///
/// None of these ever reach a caller of the request pipeline: the response
/// cache logs them and degrades to a miss or a skipped write.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("value under `{key}` is not a counter")]
    NotACounter { key: String },
    #[error("cache entry could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
