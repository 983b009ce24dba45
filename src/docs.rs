//! OpenAPI document and Swagger UI, optionally behind HTTP basic auth.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;
use crate::users::handlers::UsersApi;

pub const SWAGGER_PATH: &str = "/swagger";
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

const REALM: &str = r#"Basic realm="Authorization Required""#;

/// Swagger UI plus the raw document. With `auth` set, both require
/// `Authorization: Basic` with exactly that user and password.
pub fn routes(auth: Option<&(String, String)>) -> Router<AppState> {
    let docs: Router<AppState> = SwaggerUi::new(SWAGGER_PATH)
        .url(OPENAPI_PATH, UsersApi::openapi())
        .into();

    match auth {
        Some((user, password)) => docs.layer(middleware::from_fn_with_state(
            Arc::<str>::from(basic_credentials(user, password)),
            require_basic_auth,
        )),
        None => docs,
    }
}

/// The `Authorization` header value a client sends for `user:password`.
fn basic_credentials(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

async fn require_basic_auth(
    State(expected): State<Arc<str>>,
    req: Request,
    next: Next,
) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value.as_bytes() == expected.as_bytes());

    if authorized {
        return next.run(req).await;
    }

    debug!(uri = %req.uri(), "swagger request without valid credentials");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM))],
    )
        .into_response()
}
