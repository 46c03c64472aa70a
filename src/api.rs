use serde::{Deserialize, Serialize};

/// Body of `POST /auth`
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub code: Option<String>,
}

/// Response of `POST /auth` and `DELETE /auth`
#[derive(Debug, Deserialize, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of `GET /auth`
#[derive(Debug, Deserialize, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
}

pub const UNAUTHORIZED_MESSAGE: &str = "Authentication required. Please sign in again.";

// Session endpoints
#[cfg(feature = "http-server")]
pub mod auth;

#[cfg(feature = "http-server")]
pub mod server {
    use super::*;
    use axum::{
        body::Bytes,
        extract::{rejection::BytesRejection, DefaultBodyLimit, State},
        http::{
            header::{AUTHORIZATION, CONTENT_TYPE},
            HeaderMap, HeaderValue, Method, StatusCode,
        },
        routing::{get, post},
        Json, Router,
    };
    use axum_extra::extract::cookie::CookieJar;
    use std::sync::Arc;
    use tower_http::cors::{AllowOrigin, CorsLayer};

    use super::auth::create_auth_router;
    use crate::handlers::session::{SessionGate, SESSION_COOKIE};
    use crate::handlers::AnalyzeHandler;
    use crate::models::{AnalyzeResponse, ErrorCode};

    /// Base64 of a 4 MiB image plus JSON overhead fits comfortably; anything
    /// larger than this is cut off before it reaches the size validator.
    pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

    const BODY_TOO_LARGE_MESSAGE: &str = "Image size exceeds maximum allowed size of 4MB";

    pub struct AppState {
        pub analyze_handler: Arc<AnalyzeHandler>,
        pub sessions: Arc<SessionGate>,
        pub secure_cookies: bool,
        /// Browser origins allowed to call the API with the session cookie
        pub allowed_origins: Vec<HeaderValue>,
    }

    pub fn create_router(state: Arc<AppState>) -> Router {
        let api = Router::new()
            .route("/analyze", post(analyze_handler))
            .merge(create_auth_router());

        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_check))
            .merge(api.clone())
            .nest("/api", api)
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(cors_layer(&state.allowed_origins))
            .with_state(state)
    }

    fn cors_layer(origins: &[HeaderValue]) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins.iter().cloned()))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
            .allow_credentials(true)
    }

    /// First presented token that verifies: the cookie, then a bearer header
    pub(crate) fn verified_session(
        sessions: &SessionGate,
        headers: &HeaderMap,
        jar: &CookieJar,
    ) -> Option<String> {
        let cookie = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string());

        cookie
            .into_iter()
            .chain(bearer)
            .find(|token| sessions.verify(token))
    }

    async fn analyze_handler(
        State(state): State<Arc<AppState>>,
        headers: HeaderMap,
        jar: CookieJar,
        body: Result<Bytes, BytesRejection>,
    ) -> (StatusCode, Json<AnalyzeResponse>) {
        if verified_session(&state.sessions, &headers, &jar).is_none() {
            log::warn!("🔐 Analyze request without a valid session");
            return respond(AnalyzeResponse::failure(
                ErrorCode::Unauthorized,
                UNAUTHORIZED_MESSAGE,
            ));
        }

        let body = match body {
            Ok(body) => body,
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                log::warn!("🚫 Analyze body over {} bytes rejected", MAX_BODY_BYTES);
                return respond(AnalyzeResponse::failure(
                    ErrorCode::ImageTooLarge,
                    BODY_TOO_LARGE_MESSAGE,
                ));
            }
            Err(rejection) => {
                log::warn!("🚫 Failed to read analyze body: {}", rejection.body_text());
                return respond(AnalyzeResponse::failure(
                    ErrorCode::InvalidRequest,
                    "Invalid request format",
                ));
            }
        };

        let body = match String::from_utf8(body.to_vec()) {
            Ok(body) => body,
            Err(e) => {
                log::warn!("🚫 Analyze body is not UTF-8: {}", e);
                return respond(AnalyzeResponse::failure(
                    ErrorCode::InvalidRequest,
                    "Invalid request format",
                ));
            }
        };

        log::debug!("📨 Analyze request body: {} bytes", body.len());
        respond(state.analyze_handler.handle(body).await)
    }

    fn respond(response: AnalyzeResponse) -> (StatusCode, Json<AnalyzeResponse>) {
        let status =
            StatusCode::from_u16(response.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(response))
    }

    async fn root_handler() -> &'static str {
        "Calorie Lens API - POST /analyze with a meal photo, POST /auth to sign in"
    }

    async fn health_check() -> &'static str {
        "OK"
    }

    #[cfg(test)]
    pub(crate) mod tests {
        use super::*;
        use crate::handlers::analyze::tests::{png_10x10, Stub, StubAI, MEAL_JSON};
        use crate::services::gateway::ModelGateway;
        use axum::body::{to_bytes, Body};
        use axum::http::{header, Request};
        use axum::response::Response;
        use serde_json::json;
        use std::time::Duration;
        use tower::ServiceExt;

        pub(crate) const TEST_ORIGIN: &str = "http://localhost:3000";

        pub(crate) fn test_state(stub: Stub) -> Arc<AppState> {
            test_state_with(StubAI::new(stub))
        }

        pub(crate) fn test_state_with(ai: Arc<StubAI>) -> Arc<AppState> {
            let gateway = ModelGateway::with_timeout(ai, Duration::from_millis(50));
            Arc::new(AppState {
                analyze_handler: Arc::new(AnalyzeHandler::new(gateway)),
                sessions: Arc::new(SessionGate::new("imfat".to_string(), b"secret".to_vec())),
                secure_cookies: false,
                allowed_origins: vec![HeaderValue::from_static(TEST_ORIGIN)],
            })
        }

        pub(crate) async fn json_body(response: Response) -> serde_json::Value {
            let bytes = to_bytes(response.into_body(), MAX_BODY_BYTES)
                .await
                .expect("read body");
            serde_json::from_slice(&bytes).expect("parse json")
        }

        fn analyze_request(uri: &str, token: Option<&str>, body: String) -> Request<Body> {
            let mut builder = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json");
            if let Some(token) = token {
                builder = builder.header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token));
            }
            builder.body(Body::from(body)).expect("build request")
        }

        async fn post_analyze(state: &Arc<AppState>, body: String) -> (StatusCode, serde_json::Value) {
            let token = state.sessions.issue("imfat").unwrap();
            let response = create_router(state.clone())
                .oneshot(analyze_request("/analyze", Some(&token), body))
                .await
                .expect("router call");
            let status = response.status();
            (status, json_body(response).await)
        }

        fn image_body(image: &str, mime: &str) -> String {
            json!({ "image": image, "mimeType": mime }).to_string()
        }

        #[tokio::test]
        async fn health_returns_ok() {
            let response = create_router(test_state(Stub::Reply(MEAL_JSON)))
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn analyze_requires_session() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let response = create_router(state)
                .oneshot(analyze_request("/analyze", None, image_body(&png_10x10(), "image/png")))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let json = json_body(response).await;
            assert_eq!(json["success"], false);
            assert_eq!(json["code"], "UNAUTHORIZED");
        }

        #[tokio::test]
        async fn analyze_rejects_forged_session() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let response = create_router(state)
                .oneshot(analyze_request(
                    "/analyze",
                    Some("abc.9999999999.deadbeef"),
                    image_body(&png_10x10(), "image/png"),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        #[tokio::test]
        async fn analyze_accepts_bearer_token() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let token = state.sessions.issue("imfat").unwrap();
            let request = Request::builder()
                .method("POST")
                .uri("/api/analyze")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from(image_body(&png_10x10(), "image/png")))
                .unwrap();

            let response = create_router(state).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn bearer_is_checked_when_cookie_is_stale() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let stale = state.sessions.issue("imfat").unwrap();
            state.sessions.revoke(&stale);
            let token = state.sessions.issue("imfat").unwrap();

            let request = Request::builder()
                .method("POST")
                .uri("/analyze")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, stale))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::from(image_body(&png_10x10(), "image/png")))
                .unwrap();

            let response = create_router(state).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        #[tokio::test]
        async fn oversized_body_gets_envelope() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let seventeen_mib = "A".repeat(17 * 1024 * 1024);
            let (status, json) = post_analyze(&state, image_body(&seventeen_mib, "image/jpeg")).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["success"], false);
            assert_eq!(json["code"], "IMAGE_TOO_LARGE");
            assert!(json["error"].as_str().unwrap().contains("4MB"));
        }

        #[tokio::test]
        async fn cors_allows_configured_origin_with_credentials() {
            let request = |origin: &str| {
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, origin)
                    .body(Body::empty())
                    .unwrap()
            };

            let response = create_router(test_state(Stub::Reply(MEAL_JSON)))
                .oneshot(request(TEST_ORIGIN))
                .await
                .unwrap();
            let headers = response.headers();
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], TEST_ORIGIN);
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

            let response = create_router(test_state(Stub::Reply(MEAL_JSON)))
                .oneshot(request("https://elsewhere.example"))
                .await
                .unwrap();
            assert!(response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none());
        }

        #[tokio::test]
        async fn empty_image_is_bad_request() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let (status, json) = post_analyze(&state, image_body("", "image/png")).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["code"], "INVALID_REQUEST");
            assert_eq!(json["success"], false);
        }

        #[tokio::test]
        async fn malformed_body_is_bad_request() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let (status, json) = post_analyze(&state, "{not json".to_string()).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["code"], "INVALID_REQUEST");
        }

        #[tokio::test]
        async fn valid_png_returns_analysis() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let (status, json) = post_analyze(&state, image_body(&png_10x10(), "image/png")).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["success"], true);
            let confidence = json["data"]["confidence"].as_str().unwrap();
            assert!(["low", "medium", "high"].contains(&confidence));
            assert_eq!(json["data"]["macros"]["sugar"], 12.0);
        }

        #[tokio::test]
        async fn hanging_model_is_gateway_timeout() {
            let state = test_state(Stub::Hang);
            let (status, json) = post_analyze(&state, image_body(&png_10x10(), "image/png")).await;

            assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
            assert_eq!(json["code"], "TIMEOUT");
        }

        #[tokio::test]
        async fn prose_wrapped_reply_is_recovered() {
            let state = test_state(Stub::Reply(
                "Sure! {\"totalCalories\":300,\"macros\":{\"protein\":5,\"carbohydrates\":60,\"fat\":4,\"fiber\":2,\"sugar\":30},\"foodItems\":[{\"name\":\"Smoothie\",\"estimatedPortion\":\"1 glass\",\"calories\":300}],\"confidence\":\"high\",\"notes\":null}",
            ));
            let (status, json) = post_analyze(&state, image_body(&png_10x10(), "image/png")).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["data"]["totalCalories"], 300.0);
        }

        #[tokio::test]
        async fn garbage_reply_is_parse_error() {
            let state = test_state(Stub::Reply("not json at all"));
            let (status, json) = post_analyze(&state, image_body(&png_10x10(), "image/png")).await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(json["code"], "PARSE_ERROR");
        }

        #[tokio::test]
        async fn provider_failure_is_ai_error() {
            let state = test_state(Stub::Fail);
            let (status, json) = post_analyze(&state, image_body(&png_10x10(), "image/png")).await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(json["code"], "AI_ERROR");
        }

        #[tokio::test]
        async fn five_megabyte_image_is_too_large() {
            let state = test_state(Stub::Reply(MEAL_JSON));
            let five_mib = "A".repeat(5 * 1024 * 1024 / 3 * 4 + 4);
            let (status, json) = post_analyze(&state, image_body(&five_mib, "image/jpeg")).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["code"], "IMAGE_TOO_LARGE");
            assert!(json["error"].as_str().unwrap().contains("5.00MB"));
        }
    }
}
