//! Domain error catalog and the HTTP boundary mapping.
//!
//! Every error leaving a handler is turned into a [`DomainError`]: a stable
//! numeric `code` plus a human readable `message`. The status code is derived
//! from `code` alone, see [`DomainError::status`].

use std::borrow::Cow;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::users::error::UserError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error, ToSchema)]
#[error("{message}")]
pub struct DomainError {
    #[schema(example = 401001)]
    pub code: u32,
    #[schema(value_type = String, example = "invalid username or password")]
    pub message: Cow<'static, str>,
}

impl DomainError {
    pub const INVALID_PARAM: Self = Self::fixed(400_001, "invalid parameter");
    pub const USER_NOT_FOUND: Self = Self::fixed(404_001, "user not found");
    pub const INVALID_CREDENTIALS: Self = Self::fixed(401_001, "invalid username or password");
    pub const VERIFICATION_EXPIRED: Self =
        Self::fixed(401_002, "verification code expired or invalid");
    pub const INVALID_VERIFICATION: Self = Self::fixed(401_003, "verification code incorrect");
    pub const INTERNAL_ERROR: Self = Self::fixed(500_001, "internal server error");

    /// Code used for errors that carry no domain classification.
    pub const UNCLASSIFIED_CODE: u32 = 500_000;

    const fn fixed(code: u32, message: &'static str) -> Self {
        Self {
            code,
            message: Cow::Borrowed(message),
        }
    }

    pub fn new(code: u32, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Same code, with `detail` appended to the message.
    pub fn with_message(&self, detail: impl std::fmt::Display) -> Self {
        Self::new(self.code, format!("{}: {}", self.message, detail))
    }

    /// Wraps an arbitrary error under [`Self::UNCLASSIFIED_CODE`], keeping its message.
    pub fn unclassified(err: &dyn std::error::Error) -> Self {
        Self::new(Self::UNCLASSIFIED_CODE, err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self.code {
            400_001 => StatusCode::BAD_REQUEST,
            404_001 => StatusCode::NOT_FOUND,
            401_001 | 401_002 | 401_003 => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UserError> for DomainError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::InvalidParam(detail) => Self::INVALID_PARAM.with_message(detail),
            UserError::NotFound(_) => Self::USER_NOT_FOUND,
            UserError::InvalidCredentials => Self::INVALID_CREDENTIALS,
            UserError::VerificationExpired => Self::VERIFICATION_EXPIRED,
            UserError::InvalidVerification => Self::INVALID_VERIFICATION,
            UserError::PasswordHash(_) => Self::INTERNAL_ERROR,
            other @ (UserError::Repository(_) | UserError::Cache(_) | UserError::Mail(_)) => {
                Self::unclassified(&other)
            }
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        if matches!(
            self,
            UserError::PasswordHash(_)
                | UserError::Repository(_)
                | UserError::Cache(_)
                | UserError::Mail(_)
        ) {
            error!(error = %self, "request failed");
        }
        DomainError::from(self).into_response()
    }
}
