use std::{error::Error, fmt};

use crate::synthesis::SynthesisError;

#[derive(Debug)]
pub enum ObjectStorageError {
    NotFound(String),
    S3Error(Box<dyn Error + Send + Sync + 'static>),
}

impl std::error::Error for ObjectStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use ObjectStorageError::*;
        match self {
            S3Error(e) => Some(e.as_ref() as &dyn Error),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectStorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ObjectStorageError::*;
        match self {
            NotFound(key) => write!(f, "NotFound: {}", key),
            S3Error(e) => write!(f, "S3Error: {}", e),
        }
    }
}

/// Coarse classification callers use to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    RateLimited,
    UpstreamFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("book {0} not found")]
    BookNotFound(String),

    #[error("highlight {0} not found")]
    HighlightNotFound(String),

    #[error("object {0} not found in storage")]
    ObjectNotFound(String),

    #[error("highlight {0} has no text to use as a prompt")]
    MissingPrompt(String),

    #[error("highlight {0} has no image")]
    ImageNotFound(String),

    #[error("image generation limit reached for {owner_id}, retry in {retry_after_secs}s")]
    RateLimited {
        owner_id: String,
        retry_after_secs: u64,
    },

    #[error("object storage failed: {}", crate::unpack_error(.0))]
    Storage(ObjectStorageError),

    #[error("document store failed: {0:#}")]
    Database(#[from] anyhow::Error),

    #[error("image synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        use LifecycleError::*;
        match self {
            BookNotFound(_) | HighlightNotFound(_) | ObjectNotFound(_) => ErrorKind::NotFound,
            MissingPrompt(_) | ImageNotFound(_) => ErrorKind::PreconditionFailed,
            RateLimited { .. } => ErrorKind::RateLimited,
            Storage(_) | Database(_) | Synthesis(_) => ErrorKind::UpstreamFailure,
        }
    }
}

impl From<ObjectStorageError> for LifecycleError {
    fn from(error: ObjectStorageError) -> Self {
        match error {
            ObjectStorageError::NotFound(key) => LifecycleError::ObjectNotFound(key),
            other => LifecycleError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_object_maps_to_not_found() {
        let err: LifecycleError = ObjectStorageError::NotFound("u1/b1/images/h1.png".into()).into();
        assert!(matches!(err, LifecycleError::ObjectNotFound(ref k) if k == "u1/b1/images/h1.png"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(LifecycleError::ImageNotFound("h1".into()).kind(), ErrorKind::PreconditionFailed);
        assert_eq!(LifecycleError::MissingPrompt("h1".into()).kind(), ErrorKind::PreconditionFailed);
        assert_eq!(LifecycleError::BookNotFound("b1".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            LifecycleError::Database(anyhow::anyhow!("disk full")).kind(),
            ErrorKind::UpstreamFailure
        );
    }

    #[test]
    fn test_storage_error_display_includes_source() {
        let inner = std::io::Error::other("connection reset");
        let err: LifecycleError = ObjectStorageError::S3Error(Box::new(inner)).into();
        assert_eq!(
            err.to_string(),
            "object storage failed: S3Error: connection reset: connection reset"
        );
    }
}
