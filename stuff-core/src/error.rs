//! Error types shared by every store and component in the crate

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("asset not found")]
    AssetNotFound,

    #[error("file not found")]
    FileNotFound,

    #[error("tag not found")]
    TagNotFound,

    #[error("asset is missing a tag")]
    AssetMissingTag,

    #[error("invalid tag")]
    InvalidTag,

    #[error("unknown tag algorithm: {0}")]
    UnknownTagAlgorithm(String),

    /// A sub-step of asset deletion failed; the whole delete was rolled back.
    #[error("error deleting asset: {step}: {source}")]
    DeleteAsset {
        step: DeleteStep,
        #[source]
        source: Box<Error>,
    },

    #[error("path {} is not inside {}", path.display(), root.display())]
    PathOutsideRoot { path: PathBuf, root: PathBuf },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("{original} (rollback failed: {rollback})")]
    Rollback {
        #[source]
        original: Box<Error>,
        rollback: rusqlite::Error,
    },

    #[error("{original} (cleanup failed: {cleanup})")]
    Cleanup {
        #[source]
        original: Box<Error>,
        cleanup: Box<Error>,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// The step of an asset deletion that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStep {
    MarkTagUnused,
    DeleteFiles,
    DeleteAsset,
}

impl std::fmt::Display for DeleteStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteStep::MarkTagUnused => write!(f, "marking tag unused"),
            DeleteStep::DeleteFiles => write!(f, "deleting files"),
            DeleteStep::DeleteAsset => write!(f, "deleting asset row"),
        }
    }
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::AssetNotFound | Error::FileNotFound | Error::TagNotFound => true,
            Error::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub(crate) fn delete_asset(step: DeleteStep) -> impl FnOnce(Error) -> Error {
        move |source| Error::DeleteAsset {
            step,
            source: Box::new(source),
        }
    }

    /// Combine a failure with the outcome of the cleanup that followed it.
    pub fn join(original: Error, cleanup: Result<()>) -> Error {
        match cleanup {
            Ok(()) => original,
            Err(cleanup) => Error::Cleanup {
                original: Box::new(original),
                cleanup: Box::new(cleanup),
            },
        }
    }

    /// Walk `Context` wrappers down to the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Map "no rows" into a domain not-found error at the store boundary.
pub(crate) trait OptionalRow<T> {
    fn or_not_found(self, not_found: Error) -> Result<T>;
}

impl<T> OptionalRow<T> for rusqlite::Result<T> {
    fn or_not_found(self, not_found: Error) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(not_found),
            Err(e) => Err(e.into()),
        }
    }
}
