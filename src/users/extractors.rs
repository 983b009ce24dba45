use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use super::error::UserError;

/// Request bodies that clean up and check their own fields.
pub trait Validate {
    fn normalize(&mut self) {}

    fn validate(&self) -> Result<(), String>;
}

/// JSON body that has been normalized and validated.
///
/// Malformed JSON and validation failures are both rejected as
/// [`UserError::InvalidParam`].
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = UserError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(mut body) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| UserError::InvalidParam(rejection.body_text()))?;

        body.normalize();
        body.validate().map_err(UserError::InvalidParam)?;
        Ok(Self(body))
    }
}
