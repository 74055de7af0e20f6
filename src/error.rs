//! Application-wide error types.
//!
//! Library modules use the specific variants below via `thiserror`;
//! `main` uses `anyhow` for convenient propagation at the binary
//! boundary.
//!
//! Note that most of the engine's "failures" are not errors at all:
//! out-of-range indices and positional operations issued while shuffle
//! is active are routine UI races and are silently ignored. The
//! variants here cover genuine faults in the backends and the
//! persistence layer.

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Playback backend fault (local pipeline or command channel)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Audio decode/probe error
    #[error("Decode error: {0}")]
    Decode(String),

    /// Remote renderer transport error
    #[error("Remote renderer error: {0}")]
    Remote(#[from] reqwest::Error),

    /// History/queue persistence error
    #[error("History store error: {0}")]
    History(#[from] rusqlite::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unsupported or unreadable media
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::History(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::backend("pipeline stalled");
        assert!(err.to_string().contains("pipeline stalled"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::decode("corrupt frame").context("while loading track");
        let msg = err.to_string();
        assert!(msg.contains("while loading track"));
        assert!(msg.contains("corrupt frame"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::config("missing remote URL"));
        let with_ctx = result.with_context("loading config");
        assert!(with_ctx.unwrap_err().to_string().contains("loading config"));
    }
}
