use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, categories, comments, posts, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(categories::router())
        .merge(posts::router())
        .merge(comments::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::repo_types::Role;
    use crate::state::Fakes;

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::get(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res: Response = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn otp_for(fakes: &Fakes, email: &str) -> String {
        fakes
            .users
            .all()
            .into_iter()
            .find(|u| u.email == email)
            .and_then(|u| u.otp)
            .expect("otp stored")
    }

    async fn signed_up(app: &Router) -> String {
        let (status, body) = send(
            app,
            json_request(
                Method::POST,
                "/auth/signup",
                None,
                json!({
                    "email": "reader@example.com",
                    "username": "reader",
                    "firstName": "Rea",
                    "lastName": "Der",
                    "password": "first-password"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        let res = app.oneshot(get_request("/health", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn account_lifecycle_invalidates_old_sessions() {
        let (state, fakes) = AppState::fake();
        let app = build_app(state);
        let signup_token = signed_up(&app).await;

        // unverified accounts cannot sign in
        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/signin",
                None,
                json!({"email": "reader@example.com", "password": "first-password"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let code = otp_for(&fakes, "reader@example.com");
        let wrong = if code == "000000" { "111111" } else { "000000" };
        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/verify-email",
                None,
                json!({"email": "reader@example.com", "otp": wrong}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid or expired code");

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/verify-email",
                None,
                json!({"email": "reader@example.com", "otp": code}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["isVerified"], true);

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/auth/signin",
                None,
                json!({"email": "reader@example.com", "password": "first-password"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["data"]["token"].as_str().unwrap().to_string();

        let (status, _) = send(&app, get_request("/auth/check-auth", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &app,
            json_request(
                Method::PUT,
                "/auth/change-password",
                Some(&token),
                json!({"currentPassword": "first-password", "newPassword": "second-password"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let fresh = body["data"]["token"].as_str().unwrap().to_string();

        for stale in [&signup_token, &token] {
            let (status, body) = send(&app, get_request("/auth/check-auth", Some(stale))).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(
                body["message"],
                "Session is no longer valid, please sign in again"
            );
        }

        let (status, body) = send(&app, get_request("/auth/check-auth", Some(&fresh))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "reader@example.com");
    }

    #[tokio::test]
    async fn missing_or_garbage_token_is_unauthenticated() {
        let (state, _) = AppState::fake();
        let app = build_app(state);

        let (status, body) = send(&app, get_request("/auth/check-auth", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Authentication required");

        let (status, _) = send(&app, get_request("/auth/check-auth", Some("not-a-jwt"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_json_uses_error_envelope() {
        let (state, _) = AppState::fake();
        let app = build_app(state);

        let req = Request::post("/auth/signup")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn only_admins_create_categories() {
        let (state, fakes) = AppState::fake();
        let app = build_app(state);
        let token = signed_up(&app).await;

        let (status, body) = send(
            &app,
            json_request(Method::POST, "/categories", Some(&token), json!({"name": "Rust"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        // Admin passes the gate but still has to name the category
        let id = fakes.users.all()[0].id;
        fakes.users.set_role(id, Role::Admin);
        let (status, _) = send(
            &app,
            json_request(Method::POST, "/categories", Some(&token), json!({"name": "  "})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn content_writes_require_a_session() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        let post_id = uuid::Uuid::new_v4();

        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                &format!("/posts/{}/comments", post_id),
                None,
                json!({"content": "hi"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::delete(format!("/posts/{}", post_id))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn post_form_is_validated_before_upload() {
        let (state, fakes) = AppState::fake();
        let app = build_app(state);
        let token = signed_up(&app).await;

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\nbody text\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
            b = boundary
        );
        let req = Request::post("/posts")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
        assert!(fakes.storage.keys().is_empty());
    }

    #[tokio::test]
    async fn blank_comment_is_rejected() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        let token = signed_up(&app).await;

        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                &format!("/posts/{}/comments", uuid::Uuid::new_v4()),
                Some(&token),
                json!({"content": "   "}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn extractor_rejections_use_error_envelope() {
        let (state, _) = AppState::fake();
        let app = build_app(state);
        let token = signed_up(&app).await;

        for uri in [
            "/posts/not-a-uuid",
            "/posts?category=zzz",
            "/posts?limit=many",
            "/posts/not-a-uuid/comments",
        ] {
            let res = app.clone().oneshot(get_request(uri, None)).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
            assert_eq!(
                res.headers()[header::CONTENT_TYPE],
                "application/json",
                "{uri}"
            );
            let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["success"], false, "{uri}");
            assert!(body["message"].is_string(), "{uri}");
        }

        // A JSON body where multipart is expected
        let (status, body) = send(
            &app,
            json_request(Method::POST, "/posts", Some(&token), json!({"title": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);

        let req = Request::delete("/comments/42")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], false);
    }
}
