//! Error types for the FGA operator
//!
//! Errors are structured with fields that map onto the failure taxonomy the
//! controllers expose through status and events: transient engine errors,
//! missing adopted prerequisites, spec validation problems, per-deployment
//! resolution errors, and orchestrator failures.

use thiserror::Error;

use crate::crd::ParseVersionError;

/// Main error type for FGA operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Permission engine RPC failure
    #[error("permission service error [{operation}]: {message}")]
    Service {
        /// The engine operation that failed (e.g. "createStore")
        operation: String,
        /// Description of what failed, verbatim from the engine where possible
        message: String,
    },

    /// An adopted store or model id does not exist at the engine
    #[error("{message}")]
    MissingPrerequisite {
        /// Description naming the missing id
        message: String,
    },

    /// Request spec validation error
    #[error("validation error for {request}: {message}")]
    Validation {
        /// Name of the request with an invalid spec
        request: String,
        /// Description of what's invalid
        message: String,
    },

    /// A deployment could not be resolved to a model instance
    #[error("{message}")]
    Resolution {
        /// Description of the resolution failure
        message: String,
    },

    /// A status write failed while handling another error; both causes
    /// must surface
    #[error("failed to update status: {message} with prior error {prior}")]
    StatusUpdate {
        /// The status-write failure
        message: String,
        /// The error being reported when the status write failed
        prior: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "reconciler")
        context: String,
    },
}

impl From<ParseVersionError> for Error {
    fn from(err: ParseVersionError) -> Self {
        Self::Resolution {
            message: err.to_string(),
        }
    }
}

impl Error {
    /// Create a permission-service error for the given engine operation
    pub fn service(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Service {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a missing-prerequisite error (adopted id not found)
    pub fn missing_prerequisite(msg: impl Into<String>) -> Self {
        Self::MissingPrerequisite {
            message: msg.into(),
        }
    }

    /// Create a validation error for a named request
    pub fn validation_for(request: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            request: request.into(),
            message: msg.into(),
        }
    }

    /// Create a deployment-resolution error
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution {
            message: msg.into(),
        }
    }

    /// Create a status-update error wrapping the error it pre-empted
    pub fn status_update(msg: impl Into<String>, prior: &Error) -> Self {
        Self::StatusUpdate {
            message: msg.into(),
            prior: prior.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether a retry without a spec change can succeed.
    ///
    /// Validation and missing-prerequisite errors require the user to fix
    /// the spec. Kubernetes 4xx responses are config problems; everything
    /// else is assumed transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
                )
            }
            Error::Service { .. } => true,
            Error::MissingPrerequisite { .. } => false,
            Error::Validation { .. } => false,
            Error::Resolution { .. } => false,
            Error::StatusUpdate { .. } => true,
            Error::Internal { .. } => true,
        }
    }
}
