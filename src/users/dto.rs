use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::extractors::Validate;
use super::repo_types::User;

pub(crate) const MIN_PASSWORD_LEN: usize = 6;
pub(crate) const CODE_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &mut String) {
    *email = email.trim().to_lowercase();
}

fn require_email(email: &str) -> Result<(), String> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid email address", email))
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

/// Request body for user registration.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Validate for RegisterRequest {
    fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
        normalize_email(&mut self.email);
    }

    fn validate(&self) -> Result<(), String> {
        require_non_blank("username", &self.username)?;
        require_email(&self.email)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            ));
        }
        Ok(())
    }
}

/// Request body for password login.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
    }

    fn validate(&self) -> Result<(), String> {
        require_non_blank("username", &self.username)?;
        require_non_blank("password", &self.password)
    }
}

/// Request body for issuing an email verification code.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SendCodeRequest {
    pub email: String,
}

impl Validate for SendCodeRequest {
    fn normalize(&mut self) {
        normalize_email(&mut self.email);
    }

    fn validate(&self) -> Result<(), String> {
        require_email(&self.email)
    }
}

/// Request body for logging in with an emailed code.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginEmailRequest {
    pub email: String,
    pub code: String,
}

impl Validate for LoginEmailRequest {
    fn normalize(&mut self) {
        normalize_email(&mut self.email);
        self.code = self.code.trim().to_string();
    }

    fn validate(&self) -> Result<(), String> {
        require_email(&self.email)?;
        if self.code.chars().count() != CODE_LEN {
            return Err(format!("code must be exactly {} characters", CODE_LEN));
        }
        Ok(())
    }
}

/// Returned by both login endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[schema(value_type = String, example = "login success")]
    pub message: &'static str,
    pub user: User,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(value_type = String)]
    pub message: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(value_type = String, example = "up")]
    pub status: &'static str,
}
