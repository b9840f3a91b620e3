//! Error taxonomy for the credential validator.
//!
//! Request-facing failures (`ValidationError`) collapse to a single
//! unauthorized response at the HTTP boundary; the variants exist so the
//! cause can be logged and counted without leaking it to the caller.

use thiserror::Error;

/// Failure to decode a bearer token from its text form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenParseError {
    /// The text is not valid unpadded base-32.
    #[error("token is not valid base32: {0}")]
    Encoding(String),

    /// Decoded length does not match the fixed token size.
    #[error("token size invalid")]
    Size,
}

/// Failure to obtain randomness for key generation.
///
/// Fatal to the operation that needed the key; never retried.
#[derive(Error, Debug)]
#[error("system randomness unavailable: {0}")]
pub struct KeyGenError(pub String);

/// Glob pattern compilation failure.
///
/// Surfaces at credential creation/update time, never on the validation
/// hot path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern syntax is malformed.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors reported by the storage collaborator.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// No credential exists for the requested public identifier.
    #[error("credential not found")]
    NotFound,

    /// Transient backend failure. The cache does not retry internally;
    /// the current request fails closed and the next one tries again.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Request-facing validation failures.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Token text failed to decode.
    #[error("malformed token: {0}")]
    MalformedToken(#[from] TokenParseError),

    /// No credential matches the token's public identifier.
    #[error("unknown credential")]
    UnknownCredential,

    /// Host, path, or secret mismatch.
    #[error("access denied")]
    AccessDenied,

    /// The credential could not be resolved due to a backend failure.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl ValidationError {
    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "malformed_token",
            Self::UnknownCredential => "unknown_credential",
            Self::AccessDenied => "access_denied",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl From<StorageError> for ValidationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::UnknownCredential,
            StorageError::Unavailable(reason) => Self::StorageUnavailable(reason),
        }
    }
}

/// Failures while provisioning a credential.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Key generation failed.
    #[error(transparent)]
    KeyGen(#[from] KeyGenError),

    /// Host or path pattern rejected at configuration time.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// Backend failure while persisting.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Invalid or missing configuration at startup.
#[derive(Error, Debug)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);
