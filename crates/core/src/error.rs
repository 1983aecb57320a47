//! Error types for docbase
//!
//! Every failure raised below the resource boundary is an [`Error`]. Each variant
//! maps to exactly one [`ErrorKind`], which is what the boundary inspects when it
//! decides how to report the failure. Underlying causes are kept as `#[source]`
//! chains so the originating message survives propagation.
//!
//! Absence of a document or collection is NOT an error. It is threaded through
//! the call chain as `Option::None` (or `false`) so that "legitimately missing"
//! stays distinguishable from "operation failed".

use thiserror::Error;

/// Result type alias for docbase operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error used as the source of a wrapped failure
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Explicit tag describing the originating cause of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Pool or lock acquisition cannot proceed
    ResourceExhausted,
    /// Transaction begin, commit or abort failed
    TransactionFailure,
    /// The engine refused to grant a lock
    LockFailure,
    /// I/O or engine error during store, delete or read
    StorageFailure,
    /// Structurally invalid request content (e.g. a malformed patch document)
    Validation,
    /// Content that is not well-formed XML
    Malformed,
    /// A well-formed patch directive that cannot be applied to its target
    ModificationFailure,
    /// A collection path or document name that is not acceptable
    InvalidInput,
    /// The principal lacks permission for the operation
    PermissionDenied,
    /// None of the acceptable output kinds can be produced
    UnsupportedRepresentation,
    /// Service start-up could not establish its preconditions
    InitializationFailure,
}

impl ErrorKind {
    /// True for kinds caused by the caller's input rather than by the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::Validation
                | ErrorKind::Malformed
                | ErrorKind::ModificationFailure
                | ErrorKind::InvalidInput
        )
    }
}

/// Error type for the docbase core
#[derive(Debug, Error)]
pub enum Error {
    /// Pool or lock acquisition cannot proceed
    #[error("resource exhausted: {reason}")]
    ResourceExhausted {
        /// What could not be acquired
        reason: String,
    },

    /// Transaction begin, commit or abort failed
    #[error("transaction {txn_id} failed: {reason}")]
    TransactionFailure {
        /// Transaction identifier (0 when the transaction never began)
        txn_id: u64,
        /// Description of the failing step
        reason: String,
        /// Error that triggered the failure, if any
        #[source]
        source: Option<Box<Error>>,
    },

    /// The engine refused to grant a lock
    #[error("lock failure on {target}: {reason}")]
    LockFailure {
        /// Lock target description (collection path or document path)
        target: String,
        /// Why the lock was not granted
        reason: String,
    },

    /// I/O or engine error during store, delete or read
    #[error("storage failure: {reason}")]
    StorageFailure {
        /// Description of the failing operation
        reason: String,
        /// Underlying cause, if any
        #[source]
        source: Option<BoxedCause>,
    },

    /// Structurally invalid request content
    #[error("validation error: {reason}")]
    Validation {
        /// What was invalid
        reason: String,
    },

    /// Content that is not well-formed XML
    #[error("malformed content: {source}")]
    Malformed {
        /// Parser error
        #[source]
        source: BoxedCause,
    },

    /// A patch directive that cannot be applied to its target
    #[error("modification failed: {reason}")]
    ModificationFailure {
        /// Why the directive failed
        reason: String,
    },

    /// A collection path or document name that is not acceptable
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What was wrong with the input
        reason: String,
    },

    /// The principal lacks permission for the operation
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Which permission was missing
        reason: String,
    },

    /// None of the acceptable output kinds can be produced
    #[error("no suitable serialization for acceptable media types {acceptable:?}")]
    UnsupportedRepresentation {
        /// The media types the caller accepts
        acceptable: Vec<String>,
    },

    /// Service start-up could not establish its preconditions
    #[error("initialization failure: {reason}")]
    InitializationFailure {
        /// What failed
        reason: String,
        /// Underlying cause, if any
        #[source]
        source: Option<Box<Error>>,
    },
}

impl Error {
    /// The explicit cause tag of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Error::TransactionFailure { .. } => ErrorKind::TransactionFailure,
            Error::LockFailure { .. } => ErrorKind::LockFailure,
            Error::StorageFailure { .. } => ErrorKind::StorageFailure,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Malformed { .. } => ErrorKind::Malformed,
            Error::ModificationFailure { .. } => ErrorKind::ModificationFailure,
            Error::InvalidInput { .. } => ErrorKind::InvalidInput,
            Error::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Error::UnsupportedRepresentation { .. } => ErrorKind::UnsupportedRepresentation,
            Error::InitializationFailure { .. } => ErrorKind::InitializationFailure,
        }
    }

    /// Create a resource-exhausted error
    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        Error::ResourceExhausted {
            reason: reason.into(),
        }
    }

    /// Create a transaction failure without an underlying cause
    pub fn transaction(txn_id: u64, reason: impl Into<String>) -> Self {
        Error::TransactionFailure {
            txn_id,
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a transaction failure caused by another error
    pub fn transaction_caused_by(txn_id: u64, reason: impl Into<String>, cause: Error) -> Self {
        Error::TransactionFailure {
            txn_id,
            reason: reason.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Create a lock failure
    pub fn lock(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::LockFailure {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage failure without an underlying cause
    pub fn storage(reason: impl Into<String>) -> Self {
        Error::StorageFailure {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a storage failure wrapping an underlying cause
    pub fn storage_caused_by(
        reason: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::StorageFailure {
            reason: reason.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Create a validation error
    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation {
            reason: reason.into(),
        }
    }

    /// Create a modification failure
    pub fn modification(reason: impl Into<String>) -> Self {
        Error::ModificationFailure {
            reason: reason.into(),
        }
    }

    /// Create an invalid-input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create a permission-denied error
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Error::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Create an initialization failure
    pub fn initialization(reason: impl Into<String>) -> Self {
        Error::InitializationFailure {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create an initialization failure caused by another error
    pub fn initialization_caused_by(reason: impl Into<String>, cause: Error) -> Self {
        Error::InitializationFailure {
            reason: reason.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Walk the source chain and return the kind of the innermost docbase error
    ///
    /// A transaction that failed to abort after its operation failed reports
    /// `TransactionFailure`, but the boundary may want to know what started it.
    pub fn root_kind(&self) -> ErrorKind {
        let mut current = self;
        loop {
            let next = match current {
                Error::TransactionFailure {
                    source: Some(inner),
                    ..
                }
                | Error::InitializationFailure {
                    source: Some(inner),
                    ..
                } => inner.as_ref(),
                _ => return current.kind(),
            };
            current = next;
        }
    }
}

impl From<crate::xml::XmlError> for Error {
    fn from(e: crate::xml::XmlError) -> Self {
        match e {
            crate::xml::XmlError::Structure(reason) => Error::ModificationFailure { reason },
            other => Error::Malformed {
                source: Box::new(other),
            },
        }
    }
}
