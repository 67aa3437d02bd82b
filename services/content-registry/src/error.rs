//! Error types for the registry

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use content_store::{Digest, DigestError, StoreError, StoreErrorKind};

use crate::reference::ReferenceError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error types for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Blob not found in the content store
    #[error("blob unknown to registry: {0}")]
    BlobNotFound(Digest),

    /// Manifest (by digest or by tag) not found
    #[error("manifest unknown to registry: {0}")]
    ManifestNotFound(String),

    /// A manifest without a usable declared media type
    #[error("malformed manifest {digest}: {reason}")]
    MalformedManifest {
        /// Digest of the offending blob
        digest: Digest,
        /// Why the manifest was rejected
        reason: String,
    },

    /// Invalid repository name, tag, or reference
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] ReferenceError),

    /// Invalid digest format
    #[error("invalid digest: {0}")]
    InvalidDigest(#[from] DigestError),

    /// Failure of the content store or catalog itself
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Translate a store error from a blob lookup.
    pub(crate) fn blob(digest: &Digest, err: StoreError) -> Self {
        if err.is_not_found() {
            RegistryError::BlobNotFound(digest.clone())
        } else {
            RegistryError::Store(err)
        }
    }

    /// Translate a store error from a manifest lookup, by digest or by name.
    pub(crate) fn manifest(reference: impl std::fmt::Display, err: StoreError) -> Self {
        if err.is_not_found() {
            RegistryError::ManifestNotFound(reference.to_string())
        } else {
            RegistryError::Store(err)
        }
    }

    /// Whether this error means the requested object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::BlobNotFound(_) | RegistryError::ManifestNotFound(_)
        )
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::BlobNotFound(_)
            | RegistryError::ManifestNotFound(_)
            | RegistryError::MalformedManifest { .. } => StatusCode::NOT_FOUND,
            RegistryError::InvalidReference(_) | RegistryError::InvalidDigest(_) => {
                StatusCode::BAD_REQUEST
            }
            RegistryError::Store(err) if err.kind() == StoreErrorKind::Unavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            RegistryError::Store(_) | RegistryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for OCI error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::BlobNotFound(_) => "BLOB_UNKNOWN",
            RegistryError::ManifestNotFound(_) | RegistryError::MalformedManifest { .. } => {
                "MANIFEST_UNKNOWN"
            }
            RegistryError::InvalidReference(_) => "NAME_INVALID",
            RegistryError::InvalidDigest(_) => "DIGEST_INVALID",
            RegistryError::Store(_) | RegistryError::Io(_) => "UNKNOWN",
        }
    }
}

/// OCI error response format
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if let RegistryError::Store(err) = &self {
            tracing::error!(
                error = %self,
                engine = err.engine(),
                span_trace = %err.span_trace(),
                backtrace = %err.backtrace(),
                "registry request failed"
            );
        } else if status.is_server_error() {
            tracing::error!(error = %self, "registry request failed");
        } else {
            tracing::debug!(error = %self, "registry request rejected");
        }

        let body = ErrorResponse {
            errors: vec![ErrorDetail { code, message }],
        };

        (status, axum::Json(body)).into_response()
    }
}
