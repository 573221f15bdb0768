use thiserror::Error;

use crate::{
    application::repos::RepoError, domain::error::DomainError, infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// True when the caller, not the system, is at fault. An HTTP layer maps
    /// these to 4xx responses.
    pub fn is_client_error(&self) -> bool {
        match self {
            AppError::Domain(DomainError::Validation { .. })
            | AppError::NotFound { .. }
            | AppError::Forbidden(_)
            | AppError::Validation(_) => true,
            AppError::Repo(
                RepoError::NotFound | RepoError::Duplicate { .. } | RepoError::InvalidInput { .. },
            ) => true,
            AppError::Repo(_)
            | AppError::Infra(_)
            | AppError::Unexpected(_) => false,
        }
    }

    /// True for validation failures, whichever layer raised them.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(AppError::forbidden("not yours").is_client_error());
        assert!(AppError::from(DomainError::validation("content", "empty")).is_client_error());
        assert!(AppError::from(RepoError::NotFound).is_client_error());
        assert!(!AppError::from(RepoError::Timeout).is_client_error());
        assert!(!AppError::unexpected("boom").is_client_error());
    }

    #[test]
    fn validation_from_any_layer() {
        assert!(AppError::from(DomainError::validation("email", "bad")).is_validation());
        assert!(AppError::validation("session expired").is_validation());
        assert!(!AppError::not_found("post").is_validation());
    }
}
