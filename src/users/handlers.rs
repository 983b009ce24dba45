use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::DomainError;
use crate::state::AppState;

use super::{
    dto::{
        LoginEmailRequest, LoginRequest, LoginResponse, MessageResponse, RegisterRequest,
        SendCodeRequest,
    },
    error::{UserError, UserResult},
    extractors::ValidJson,
    repo_types::User,
    services::UserService,
};

const LOGIN_SUCCESS: &str = "login success";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "GoERP API",
        version = "1.0",
        description = "User registration and login, by password or emailed code."
    ),
    paths(register, login, send_code, login_email, get_user),
    components(schemas(
        User,
        RegisterRequest,
        LoginRequest,
        SendCodeRequest,
        LoginEmailRequest,
        LoginResponse,
        MessageResponse,
        DomainError
    )),
    tags((name = "users", description = "User accounts"))
)]
pub struct UsersApi;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/:id", get(get_user))
}

pub fn email_login_routes() -> Router<AppState> {
    Router::new()
        .route("/users/send-code", post(send_code))
        .route("/users/login-email", post(login_email))
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/users/register",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid parameter", body = DomainError),
        (status = 500, description = "Duplicate user or backend failure", body = DomainError)
    )
)]
#[instrument(skip(users, payload), fields(username = %payload.username))]
pub async fn register(
    State(users): State<UserService>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> UserResult<(StatusCode, Json<User>)> {
    let user = users
        .register(&payload.username, &payload.email, &payload.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login by username and password
#[utoipa::path(
    post,
    path = "/users/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Invalid parameter", body = DomainError),
        (status = 401, description = "Invalid username or password", body = DomainError)
    )
)]
#[instrument(skip(users, payload), fields(username = %payload.username))]
pub async fn login(
    State(users): State<UserService>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> UserResult<Json<LoginResponse>> {
    let user = users.login(&payload.username, &payload.password).await?;
    Ok(Json(LoginResponse {
        message: LOGIN_SUCCESS,
        user,
    }))
}

/// Send a verification code to an email address
#[utoipa::path(
    post,
    path = "/users/send-code",
    tag = "users",
    request_body = SendCodeRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Invalid parameter", body = DomainError),
        (status = 500, description = "Cache or mail failure", body = DomainError)
    )
)]
#[instrument(skip(users, payload), fields(email = %payload.email))]
pub async fn send_code(
    State(users): State<UserService>,
    ValidJson(payload): ValidJson<SendCodeRequest>,
) -> UserResult<Json<MessageResponse>> {
    users.send_email_verification_code(&payload.email).await?;
    Ok(Json(MessageResponse {
        message: "verification code sent",
    }))
}

/// Login by email verification code, registering the address on first use
#[utoipa::path(
    post,
    path = "/users/login-email",
    tag = "users",
    request_body = LoginEmailRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Invalid parameter", body = DomainError),
        (status = 401, description = "Code expired or incorrect", body = DomainError)
    )
)]
#[instrument(skip(users, payload), fields(email = %payload.email))]
pub async fn login_email(
    State(users): State<UserService>,
    ValidJson(payload): ValidJson<LoginEmailRequest>,
) -> UserResult<Json<LoginResponse>> {
    let user = users
        .login_by_email_code(&payload.email, &payload.code)
        .await?;
    Ok(Json(LoginResponse {
        message: LOGIN_SUCCESS,
        user,
    }))
}

/// Get a user by id
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(
        ("id" = String, Path, description = "User id (UUID)")
    ),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 400, description = "Id is not a UUID", body = DomainError),
        (status = 404, description = "User not found", body = DomainError)
    )
)]
#[instrument(skip(users))]
pub async fn get_user(
    State(users): State<UserService>,
    Path(id): Path<String>,
) -> UserResult<Json<User>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| UserError::InvalidParam(format!("'{}' is not a valid user id", id)))?;
    Ok(Json(users.get_user(id).await?))
}
