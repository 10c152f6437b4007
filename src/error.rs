//! Error taxonomy for catalog crawling and search.

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the catalog session, classifier, cache, and search iterator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network failure, timeout, or non-success HTTP status.
    ///
    /// `retryable` marks the transient class (timeouts, connection errors,
    /// 5xx and 429); the client has already exhausted its retries when this
    /// reaches a caller.
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String, retryable: bool },

    /// A fetched page matched none of the known shapes, or not the one the
    /// calling operation needed.
    #[error("unrecognized page shape at {url}: expected {expected}, observed {observed}")]
    UnrecognizedPageShape { url: String, expected: String, observed: String },

    /// The on-disk topology cache is missing, unreadable, or from another format version.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Building the group/category graph failed; the previous graph is untouched.
    #[error("failed to fetch catalog topology: {0}")]
    TopologyFetch(#[source] Box<Error>),

    /// No category is registered under this path.
    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// A filtered search was attempted before the category's parameters were discovered.
    #[error("parameters not initialized for category {category} (state: {state})")]
    ParametersNotInitialized { category: String, state: String },

    /// The filter map names a parameter the category does not have.
    #[error("unknown filter key {key:?} for category {category}")]
    UnknownFilterKey { category: String, key: String },

    /// The filter value cannot be encoded under its parameter spec.
    #[error("invalid value {value:?} for filter {key:?}: {reason}")]
    InvalidFilterValue { key: String, value: String, reason: String },

    /// A search stopped part-way through; products already yielded stay valid.
    #[error("search interrupted on page {page} after {yielded} products: {source}")]
    SearchInterrupted {
        page: u32,
        yielded: usize,
        #[source]
        source: Box<Error>,
    },

    /// The session's cancellation token fired while a request was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// Local filesystem failure outside the cache-read path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error is, or was caused by, cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::SearchInterrupted { source, .. } | Error::TopologyFetch(source) => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    /// Returns true for transport failures worth retrying at the fetch boundary.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { retryable: true, .. })
    }

    pub(crate) fn transport(url: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Error::Transport { url: url.into(), message: message.into(), retryable }
    }

    pub(crate) fn invalid_value(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidFilterValue { key: key.into(), value: value.into(), reason: reason.into() }
    }
}
