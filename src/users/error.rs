use thiserror::Error;
use uuid::Uuid;

use crate::cache::CacheError;
use crate::mail::MailError;

/// Errors raised by a [`UserRepository`](super::repo::UserRepository) adapter.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("user with {0} already exists")]
    Duplicate(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors returned by [`UserService`](super::services::UserService).
#[derive(Debug, Error)]
pub enum UserError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("user {0} not found")]
    NotFound(Uuid),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("verification code expired or never issued")]
    VerificationExpired,

    #[error("verification code mismatch")]
    InvalidVerification,

    #[error("password hashing error: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

pub type UserResult<T> = Result<T, UserError>;
