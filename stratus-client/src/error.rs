//! Error types for Stratus datastore operations

use thiserror::Error;

/// Errors surfaced by datastore, session and graph operations.
///
/// Validation errors (`MissingPrimaryKey`, `UnknownEntityType`,
/// `IncompatibleEntityType`) are fatal and never retried. Authentication
/// errors are retried at most once via an automatic token refresh.
/// `ObjectNotFound` maps a 404 and is an expected outcome for existence
/// probes. Rate-limit and service-unavailable responses are only retried
/// when the caller registers a retry block on the request options.
#[derive(Debug, Error)]
pub enum Error {
    /// An object was submitted for persistence without a primary key value.
    #[error("object in schema '{schema}' has no value for its primary key field")]
    MissingPrimaryKey { schema: String },

    /// The entity type declares no primary key override and has no
    /// `<schema>_id` attribute to fall back on.
    #[error("entity type '{entity}' declares no usable primary key field")]
    IncompatibleEntityType { entity: String },

    /// No descriptor registered for the requested entity type.
    #[error("unknown entity type '{entity}'")]
    UnknownEntityType { entity: String },

    /// The named relationship is not declared on the entity type.
    #[error("entity type '{entity}' declares no relationship '{relationship}'")]
    UnknownRelationship { entity: String, relationship: String },

    /// A request option or query value is out of range.
    #[error("invalid request option: {reason}")]
    InvalidOption { reason: String },

    /// The supplied username/password or provider token was rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account holds a temporary password; the caller must re-authenticate
    /// through the password-reset login before a normal login succeeds.
    #[error("temporary password reset required")]
    TemporaryPasswordResetRequired,

    /// A request was rejected as unauthorized even after a token refresh.
    #[error("authentication failed after token refresh")]
    AuthenticationFailed,

    /// A session operation was attempted with no stored refresh token.
    #[error("no active session")]
    NoActiveSession,

    /// The datastore has no object with the given id in the schema.
    #[error("object '{object_id}' not found in schema '{schema}'")]
    ObjectNotFound { schema: String, object_id: String },

    /// The datastore rejected the request due to rate limiting.
    #[error("rate limited while accessing schema '{schema}'")]
    RateLimited { schema: String },

    /// The remote endpoint reported itself unavailable (503).
    #[error("service unavailable: {endpoint}")]
    ServiceUnavailable { endpoint: String },

    /// Any other non-success response from the datastore.
    #[error("datastore returned status {status} for '{context}': {body}")]
    Api {
        status: u16,
        context: String,
        body: String,
    },

    /// Connection, TLS or timeout failure below the API layer.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A payload could not be serialized or a response could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for the authentication family of errors.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Error::InvalidCredentials
                | Error::TemporaryPasswordResetRequired
                | Error::AuthenticationFailed
                | Error::NoActiveSession
        )
    }

    /// True when the error maps a 404 for an existence probe.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ObjectNotFound { .. })
    }

    /// True for fatal validation errors that must never be retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingPrimaryKey { .. }
                | Error::IncompatibleEntityType { .. }
                | Error::UnknownEntityType { .. }
                | Error::UnknownRelationship { .. }
                | Error::InvalidOption { .. }
        )
    }
}
