//! Error taxonomy for the proxy core
//!
//! Four caller-visible classes: validation (user-correctable), not-found,
//! authorization, and transport. Storage wraps the underlying database error
//! and counts as the store-side transport class.

use thiserror::Error;

/// Errors surfaced by the proxy core
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ProxyError {
    /// True when the error should be shown to the user for correction
    /// rather than treated as an internal failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ProxyError::Validation(_) | ProxyError::NotFound(_) | ProxyError::Authorization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
