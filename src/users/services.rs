use std::{sync::Arc, time::Duration};

use rand::Rng;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::{UserError, UserResult};
use super::password::{hash_password, verify_dummy, verify_password};
use super::repo::UserRepository;
use super::repo_types::{NewUser, User};
use crate::cache::{CodeCache, Take};
use crate::mail::Mailer;

/// How long an emailed code stays valid.
pub const CODE_TTL: Duration = Duration::from_secs(5 * 60);

const CODE_KEY_PREFIX: &str = "email_code:";

fn code_key(email: &str) -> String {
    format!("{}{}", CODE_KEY_PREFIX, email)
}

/// Six digits, uniform over `000000..=999999`.
fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Local part of `email`, used as the username of auto-provisioned accounts.
fn default_username(email: &str) -> UserResult<&str> {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => Ok(local),
        _ => Err(UserError::InvalidParam(format!(
            "cannot derive a username from '{}'",
            email
        ))),
    }
}

#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    cache: Arc<dyn CodeCache>,
    mailer: Arc<dyn Mailer>,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        cache: Arc<dyn CodeCache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            repo,
            cache,
            mailer,
        }
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, email: &str, password: &str) -> UserResult<User> {
        let password_hash = hash_password(password)?;
        let user = self
            .repo
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Every failure is reported as [`UserError::InvalidCredentials`].
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> UserResult<User> {
        let user = match self.repo.find_by_username(username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                debug!("login for unknown username");
                verify_dummy(password);
                return Err(UserError::InvalidCredentials);
            }
            Err(e) => {
                warn!(error = %e, "user lookup failed during login");
                verify_dummy(password);
                return Err(UserError::InvalidCredentials);
            }
        };

        if !user.has_password() {
            debug!(user_id = %user.id, "password login on passwordless account");
            verify_dummy(password);
            return Err(UserError::InvalidCredentials);
        }

        match verify_password(password, &user.password_hash) {
            Ok(true) => {
                info!(user_id = %user.id, "user logged in");
                Ok(user)
            }
            Ok(false) => {
                debug!(user_id = %user.id, "password mismatch");
                Err(UserError::InvalidCredentials)
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "stored password hash unreadable");
                Err(UserError::InvalidCredentials)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: Uuid) -> UserResult<User> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(UserError::NotFound(id))
    }

    /// Issues a fresh code, replacing any pending one, and mails it.
    ///
    /// If the cache write fails nothing is sent. If sending fails the code
    /// stays valid until it expires.
    #[instrument(skip(self))]
    pub async fn send_email_verification_code(&self, email: &str) -> UserResult<()> {
        let code = generate_code();
        self.cache.set(&code_key(email), &code, CODE_TTL).await?;
        self.mailer.send_code(email, &code).await?;
        info!("verification code issued");
        Ok(())
    }

    /// Consumes a pending code and returns the matching user, creating one on
    /// first login.
    #[instrument(skip(self, code))]
    pub async fn login_by_email_code(&self, email: &str, code: &str) -> UserResult<User> {
        // checked before the code is consumed
        let username = default_username(email)?;

        match self.cache.take_if_eq(&code_key(email), code).await {
            Ok(Take::Consumed) => {}
            Ok(Take::Mismatch) => return Err(UserError::InvalidVerification),
            Ok(Take::Missing) => return Err(UserError::VerificationExpired),
            Err(e) => {
                warn!(error = %e, "verification code lookup failed");
                return Err(UserError::VerificationExpired);
            }
        }

        if let Some(user) = self.repo.find_by_email(email).await? {
            info!(user_id = %user.id, "user logged in by email code");
            return Ok(user);
        }

        let user = self
            .repo
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: String::new(),
            })
            .await?;

        info!(user_id = %user.id, "user auto-registered by email code");
        Ok(user)
    }
}
