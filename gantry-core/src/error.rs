// Error types for the Gantry pipeline

use crate::HttpStatus;
use thiserror::Error;

/// Errors raised by the pipeline and its collaborators.
///
/// The taxonomy matters more than the variants themselves:
///
/// - configuration errors (`UnknownMiddleware`, `InvalidRoutePattern`,
///   `NotOptimized`, `HandlerResolution`) are raised at `optimize()` time
///   and abort startup
/// - request-scoped errors are caught by the exception router and turned
///   into a response
/// - ambient-access and double-continuation errors are structured
///   programmer-usage errors with stable `E_*` codes
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (fatal at optimize time)
    #[error("Unknown middleware reference: {0}")]
    UnknownMiddleware(String),

    #[error("Invalid route pattern `{pattern}`: {reason}")]
    InvalidRoutePattern { pattern: String, reason: String },

    #[error("Server not optimized: {0}")]
    NotOptimized(String),

    #[error("Exception handler resolution failed: {0}")]
    HandlerResolution(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    // Ambient-context-access errors
    #[error("HTTP context is not available because ambient propagation is disabled")]
    InvalidAlsAccess,

    #[error("HTTP context accessed outside of an active request scope")]
    InvalidAlsScope,

    // Double-continuation error
    #[error("Middleware `{0}` called next() more than once")]
    NextCalledTwice(String),

    // Request-scoped errors
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("Request Timeout: {0}")]
    RequestTimeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadRequest(_) => HttpStatus::BadRequest.code(),
            Error::Unauthorized(_) => HttpStatus::Unauthorized.code(),
            Error::Forbidden(_) => HttpStatus::Forbidden.code(),
            Error::NotFound(_) => HttpStatus::NotFound.code(),
            Error::PayloadTooLarge(_) => HttpStatus::PayloadTooLarge.code(),
            Error::TooManyRequests(_) => HttpStatus::TooManyRequests.code(),
            Error::RequestTimeout(_) => HttpStatus::RequestTimeout.code(),
            Error::Deserialization(_) => HttpStatus::BadRequest.code(),
            _ => HttpStatus::InternalServerError.code(),
        }
    }

    /// Get the HttpStatus enum for this error
    pub fn http_status(&self) -> HttpStatus {
        HttpStatus::from_code(self.status_code()).unwrap_or(HttpStatus::InternalServerError)
    }

    /// Stable machine-readable code for structured errors, where one exists
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::InvalidAlsAccess => Some("E_INVALID_ALS_ACCESS"),
            Error::InvalidAlsScope => Some("E_INVALID_ALS_SCOPE"),
            Error::NextCalledTwice(_) => Some("E_NEXT_CALLED_TWICE"),
            Error::UnknownMiddleware(_) => Some("E_UNKNOWN_MIDDLEWARE"),
            Error::InvalidRoutePattern { .. } => Some("E_INVALID_ROUTE_PATTERN"),
            Error::NotOptimized(_) => Some("E_NOT_OPTIMIZED"),
            _ => None,
        }
    }

    /// Check whether this error should abort startup rather than be
    /// converted into a response
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownMiddleware(_)
                | Error::InvalidRoutePattern { .. }
                | Error::NotOptimized(_)
                | Error::HandlerResolution(_)
        )
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.http_status().is_server_error()
    }
}
