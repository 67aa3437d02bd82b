use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use tracing_error::SpanTrace;

/// Categorizes store errors by their semantic meaning, independent of
/// the content store or catalog implementation that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The requested digest or image name does not exist.
    ///
    /// **Caller action:** Report the object as unknown.
    NotFound,

    /// The store refused access to the requested object.
    PermissionDenied,

    /// The operation failed due to I/O errors (disk, socket, etc.).
    ///
    /// **Retryable:** Maybe - depends on whether the I/O issue is transient.
    Io,

    /// The backing store is temporarily unavailable.
    ///
    /// **Retryable:** Yes, by an outer layer. Nothing in this workspace retries.
    Unavailable,

    /// The request was invalid (bad digest, bad name filter, etc.).
    InvalidRequest,

    /// Stored metadata could not be decoded.
    Serialization,

    /// An unexpected or uncategorized error occurred.
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::NotFound => write!(f, "not found"),
            StoreErrorKind::PermissionDenied => write!(f, "permission denied"),
            StoreErrorKind::Io => write!(f, "I/O error"),
            StoreErrorKind::Unavailable => write!(f, "store unavailable"),
            StoreErrorKind::InvalidRequest => write!(f, "invalid request"),
            StoreErrorKind::Serialization => write!(f, "serialization error"),
            StoreErrorKind::Other => write!(f, "other error"),
        }
    }
}

impl From<std::io::ErrorKind> for StoreErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::NotFound => StoreErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StoreErrorKind::PermissionDenied,
            _ => StoreErrorKind::Io,
        }
    }
}

#[derive(Debug)]
struct ErrorTrace {
    /// Captured backtrace, controlled by `RUST_BACKTRACE`.
    backtrace: Backtrace,

    /// Span context at the point where the error was created.
    span_trace: SpanTrace,
}

impl ErrorTrace {
    #[track_caller]
    fn capture() -> Self {
        ErrorTrace {
            backtrace: Backtrace::capture(),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// Error returned by a [`ContentStore`](crate::ContentStore) or an
/// [`ImageCatalog`](crate::ImageCatalog).
///
/// Carries the semantic [`StoreErrorKind`], the engine that produced it,
/// the digest or image name involved (when known), and the underlying error.
///
/// # Example
///
/// ```rust
/// use content_store::{StoreError, StoreErrorKind};
///
/// let error = StoreError::builder(
///     "memory",
///     StoreErrorKind::NotFound,
///     std::io::Error::new(std::io::ErrorKind::NotFound, "no such blob"),
/// )
/// .name("docker.io/library/alpine:3.20")
/// .build();
///
/// assert!(error.is_not_found());
/// ```
#[derive(Debug)]
pub struct StoreError {
    kind: StoreErrorKind,
    engine: &'static str,
    digest: Option<String>,
    name: Option<String>,
    context: Option<String>,
    source: Box<dyn StdError + Send + Sync + 'static>,
    traces: Box<ErrorTrace>,
}

impl StdError for StoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl StoreError {
    /// Create a new store error with the minimum required information.
    pub fn new<E>(engine: &'static str, kind: StoreErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            engine,
            digest: None,
            name: None,
            context: None,
            source: error.into(),
            traces: Box::new(ErrorTrace::capture()),
        }
    }

    /// Create a builder for a store error with digest, name or context attached.
    pub fn builder<E>(engine: &'static str, kind: StoreErrorKind, error: E) -> StoreErrorBuilder
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        StoreErrorBuilder {
            kind,
            engine,
            source: error.into(),
            digest: None,
            name: None,
            context: None,
        }
    }

    /// Convert an I/O error, classifying it by its [`std::io::ErrorKind`].
    pub fn io(engine: &'static str, error: std::io::Error) -> Self {
        StoreError::new(engine, error.kind().into(), error)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    /// Whether the digest or name was absent from the store.
    pub fn is_not_found(&self) -> bool {
        self.kind == StoreErrorKind::NotFound
    }

    /// Returns the engine name.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Returns the digest involved, if available.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Returns the image name involved, if available.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns additional context, if available.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns a reference to the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.traces.backtrace
    }

    /// Returns a reference to the captured span trace.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.traces.span_trace
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store error [{}] from {}", self.kind, self.engine)?;

        if let Some(digest) = &self.digest {
            write!(f, " (digest: {})", digest)?;
        }

        if let Some(name) = &self.name {
            write!(f, " (name: {})", name)?;
        }

        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }

        write!(f, ": {}", self.source)
    }
}

/// Builder for [`StoreError`] with optional context fields.
#[derive(Debug)]
pub struct StoreErrorBuilder {
    kind: StoreErrorKind,
    engine: &'static str,
    source: Box<dyn StdError + Send + Sync + 'static>,
    digest: Option<String>,
    name: Option<String>,
    context: Option<String>,
}

impl StoreErrorBuilder {
    /// Set the digest.
    pub fn digest(mut self, digest: impl fmt::Display) -> Self {
        self.digest = Some(digest.to_string());
        self
    }

    /// Set the image name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set additional context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the `StoreError`.
    pub fn build(self) -> StoreError {
        StoreError {
            kind: self.kind,
            engine: self.engine,
            digest: self.digest,
            name: self.name,
            context: self.context,
            source: self.source,
            traces: Box::new(ErrorTrace::capture()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(StoreError: Send, Sync);

    #[test]
    fn display_includes_context() {
        let error = StoreError::builder(
            "memory",
            StoreErrorKind::NotFound,
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        )
        .digest("sha256:abc")
        .context("info")
        .build();

        assert_eq!(
            error.to_string(),
            "Store error [not found] from memory (digest: sha256:abc) (info): missing"
        );
        assert_eq!(error.digest(), Some("sha256:abc"));
        assert!(error.is_not_found());
    }

    #[test]
    fn io_errors_are_classified() {
        let missing = StoreError::io(
            "local",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(missing.kind(), StoreErrorKind::NotFound);

        let broken = StoreError::io(
            "local",
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"),
        );
        assert_eq!(broken.kind(), StoreErrorKind::Io);
        assert_eq!(broken.engine(), "local");
    }
}
