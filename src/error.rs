use reqwest::StatusCode;

/// Errors originating from the request itself, before any bytes are received.
///
/// These are terminal: the retry engine never re-attempts a malformed source
/// or a cancelled request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    #[error("invalid source URL `{url}`: {reason}")]
    InvalidSource { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request was cancelled")]
    Cancelled,

    #[error("in-flight request terminated without a result")]
    TaskLost,
}

/// Transport or server failures observed while talking to the origin.
///
/// This is the only retry-eligible error class.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResponseError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned status code {0}")]
    Status(StatusCode),

    #[error("response body interrupted: {0}")]
    Interrupted(String),
}

impl From<reqwest::Error> for ResponseError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ResponseError::Status(status),
            None => ResponseError::Transport(err.to_string()),
        }
    }
}

/// Persistent-tier failures. Absorbed at the cache engine boundary and
/// downgraded to a miss; surfaced only when a caller operates on the cache
/// directly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(String),

    #[error("no cache entry for key")]
    Missing,

    #[error("corrupt cache metadata: {0}")]
    Metadata(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

/// Payload could not be decoded into an image. Terminal: identical bytes
/// would fail identically, so a retry is never attempted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("unsupported or corrupt image payload: {0}")]
    Malformed(String),
}

/// Top-level error for the retrieval pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrieveError {
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("response error: {0}")]
    Response(#[from] ResponseError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl RetrieveError {
    /// Whether a retry policy is allowed to re-attempt after this failure.
    /// Only transport/server failures qualify.
    pub fn is_retry_eligible(&self) -> bool {
        matches!(self, RetrieveError::Response(_))
    }

    /// Whether this failure was caused by cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetrieveError::Request(RequestError::Cancelled))
    }
}
