use std::net::SocketAddr;

use axum::{
    http::{HeaderName, Request, Response},
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::docs;
use crate::state::AppState;
use crate::users::{self, dto::HealthResponse};

pub const TRACE_ID_HEADER: &str = "x-trace-id";

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "up" })
}

pub fn build_app(state: AppState) -> Router {
    let trace_header = HeaderName::from_static(TRACE_ID_HEADER);

    Router::new()
        .route("/health", get(health))
        .merge(users::router(state.config.email_login))
        .merge(docs::routes(state.config.swagger_auth.as_ref()))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(trace_header.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &Request<_>| {
                            let method = req.method().clone();
                            let uri = req.uri().clone();
                            let trace_id = req
                                .headers()
                                .get(TRACE_ID_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default();
                            tracing::info_span!(
                                "http_request",
                                %method,
                                uri = %uri,
                                trace_id = %trace_id,
                                status = tracing::field::Empty,
                            )
                        })
                        .on_response(
                            |res: &Response<_>,
                             _latency: std::time::Duration,
                             span: &tracing::Span| {
                                let status = res.status();
                                span.record("status", tracing::field::display(status));
                                if status.is_server_error() {
                                    tracing::error!(%status, "response");
                                } else {
                                    tracing::info!(%status, "response");
                                }
                            },
                        ),
                )
                .layer(PropagateRequestIdLayer::new(trace_header)),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(email_login = config.email_login, "listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::cache::InMemoryCache;
    use crate::mail::InMemoryMailer;
    use crate::users::repo::InMemoryUserRepository;

    struct TestApp {
        router: Router,
        mailer: InMemoryMailer,
    }

    fn test_app(email_login: bool) -> TestApp {
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.email_login = email_login;
        test_app_with(config)
    }

    fn test_app_with(config: AppConfig) -> TestApp {
        let mailer = InMemoryMailer::new();
        let state = AppState::from_parts(
            Arc::new(config),
            Arc::new(InMemoryUserRepository::new()),
            Arc::new(InMemoryCache::new()),
            Arc::new(mailer.clone()),
        );
        TestApp {
            router: build_app(state),
            mailer,
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn register_alice(app: &TestApp) -> Value {
        let (status, body) = send(
            app,
            post_json(
                "/users/register",
                json!({"username": "alice", "email": "Alice@Example.com", "password": "secret1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn health_reports_up() {
        let app = test_app(true);
        let (status, body) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "up"}));
    }

    #[tokio::test]
    async fn register_returns_created_user_without_hash() {
        let app = test_app(true);
        let body = register_alice(&app).await;

        assert_eq!(body["username"], "alice");
        assert_eq!(body["email"], "alice@example.com");
        assert!(body["id"].is_string());
        assert!(body["created_at"].is_string());
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn duplicate_register_is_unclassified_server_error() {
        let app = test_app(true);
        register_alice(&app).await;

        let (status, body) = send(
            &app,
            post_json(
                "/users/register",
                json!({"username": "alice", "email": "other@example.com", "password": "secret1"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], 500_000);
        assert_eq!(body["message"], "user with username already exists");
    }

    #[tokio::test]
    async fn login_with_password() {
        let app = test_app(true);
        let registered = register_alice(&app).await;

        let (status, body) = send(
            &app,
            post_json("/users/login", json!({"username": "alice", "password": "secret1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "login success");
        assert_eq!(body["user"]["id"], registered["id"]);
        assert!(body["user"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn bad_password_is_unauthorized() {
        let app = test_app(true);
        register_alice(&app).await;

        let (status, body) = send(
            &app,
            post_json("/users/login", json!({"username": "alice", "password": "wrong!"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401_001);
        assert_eq!(body["message"], "invalid username or password");
    }

    #[tokio::test]
    async fn validation_failures_are_invalid_param() {
        let app = test_app(true);

        let (status, body) = send(
            &app,
            post_json(
                "/users/register",
                json!({"username": "bob", "email": "bob@example.com", "password": "123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400_001);
        assert!(body["message"].as_str().unwrap().starts_with("invalid parameter"));

        let malformed = Request::builder()
            .method(Method::POST)
            .uri("/users/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400_001);

        let (status, body) = send(
            &app,
            post_json("/users/login-email", json!({"email": "a@b.com", "code": "123"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400_001);
    }

    #[tokio::test]
    async fn get_user_by_id() {
        let app = test_app(true);
        let registered = register_alice(&app).await;
        let id = registered["id"].as_str().unwrap();

        let (status, body) = send(&app, get_req(&format!("/users/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");

        let (status, body) = send(&app, get_req("/users/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400_001);

        let (status, body) = send(&app, get_req(&format!("/users/{}", uuid::Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"code": 404_001, "message": "user not found"}));
    }

    #[tokio::test]
    async fn email_code_login_flow() {
        let app = test_app(true);

        let (status, body) = send(
            &app,
            post_json("/users/send-code", json!({"email": " New@X.com "})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "verification code sent");

        let code = app.mailer.last_code_for("new@x.com").expect("code mailed");
        let (status, body) = send(
            &app,
            post_json("/users/login-email", json!({"email": "new@x.com", "code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "login success");
        assert_eq!(body["user"]["username"], "new");

        let (status, body) = send(
            &app,
            post_json("/users/login-email", json!({"email": "new@x.com", "code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401_002);
    }

    #[tokio::test]
    async fn trace_id_is_echoed_or_generated() {
        let app = test_app(true);

        let req = Request::builder()
            .uri("/health")
            .header(TRACE_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        let res = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.headers()[TRACE_ID_HEADER], "abc-123");

        let res = app.router.clone().oneshot(get_req("/health")).await.unwrap();
        let generated = res.headers()[TRACE_ID_HEADER].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(generated).is_ok());
    }

    #[tokio::test]
    async fn email_routes_absent_when_disabled() {
        let app = test_app(false);

        // only `GET /users/:id` matches these paths
        let (status, _) = send(
            &app,
            post_json("/users/send-code", json!({"email": "a@b.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(app.mailer.sent().is_empty());

        let (status, _) = send(
            &app,
            post_json("/users/login-email", json!({"email": "a@b.com", "code": "123456"})),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        register_alice(&app).await;
    }

    fn swagger_guarded_app() -> TestApp {
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.swagger_auth = Some(("admin".into(), "s3cret".into()));
        test_app_with(config)
    }

    fn get_with_auth(uri: &str, authorization: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, authorization)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn openapi_document_is_open_without_swagger_auth() {
        let app = test_app(true);
        let (status, body) = send(&app, get_req(docs::OPENAPI_PATH)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["info"]["title"], "GoERP API");
        assert!(body["paths"]["/users/login-email"].is_object());
        assert!(body["components"]["schemas"]["DomainError"].is_object());
    }

    #[tokio::test]
    async fn swagger_requires_basic_auth_when_configured() {
        let app = swagger_guarded_app();

        for uri in [docs::OPENAPI_PATH, "/swagger/index.html"] {
            let res = app.router.clone().oneshot(get_req(uri)).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", uri);
            assert!(res.headers()[header::WWW_AUTHENTICATE]
                .to_str()
                .unwrap()
                .starts_with("Basic"));
        }

        // admin:wrong
        let res = app
            .router
            .clone()
            .oneshot(get_with_auth(docs::OPENAPI_PATH, "Basic YWRtaW46d3Jvbmc="))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        // admin:s3cret
        let (status, body) = send(
            &app,
            get_with_auth(docs::OPENAPI_PATH, "Basic YWRtaW46czNjcmV0"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/users/register"].is_object());

        // the API itself stays open
        let (status, _) = send(&app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
