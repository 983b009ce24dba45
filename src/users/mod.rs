use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod error;
pub(crate) mod extractors;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

/// User routes. The send-code and login-email endpoints are only mounted
/// when `email_login` is set.
pub fn router(email_login: bool) -> Router<AppState> {
    let router = Router::new().merge(handlers::user_routes());
    if email_login {
        router.merge(handlers::email_login_routes())
    } else {
        router
    }
}
