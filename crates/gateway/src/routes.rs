//! Router assembly
//!
//! Three route classes:
//! - public: no session
//! - authenticated: session required, trial expiry swept, no gate
//! - gated: session required and a valid trial or subscription

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::handlers::{account, assist, auth, billing, documents, health, pages, texts, webhook};
use crate::middleware::{metrics, rate_limit, session, subscription};
use crate::AppState;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' https://js.stripe.com https://accounts.google.com; \
    frame-src https://js.stripe.com https://accounts.google.com; \
    img-src 'self' data:; style-src 'self' 'unsafe-inline'; \
    object-src 'none'; base-uri 'self'; frame-ancestors 'none'";

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let auth_limit = from_fn_with_state(state.clone(), rate_limit::limit_auth_attempts);
    let require_session = from_fn_with_state(state.clone(), session::require_session);
    let upload_limit = state.config.documents.max_upload_bytes + documents::MULTIPART_OVERHEAD;

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/pricing", get(pages::pricing))
        .route(
            "/auth/login",
            post(auth::login)
                .layer(auth_limit.clone())
                .get(auth::login_page),
        )
        .route("/auth/register", post(auth::register).layer(auth_limit.clone()))
        .route("/auth/google-login", post(auth::google_login).layer(auth_limit))
        .route("/auth/logout", get(auth::logout).post(auth::logout))
        .route("/webhook", post(webhook::handle_webhook))
        .nest_service("/static", ServeDir::new("static"));

    let authenticated = Router::new()
        .route("/billing", get(pages::billing))
        .route("/success", get(pages::success))
        .route("/api/subscription/status", get(billing::subscription_status))
        .route("/api/subscription/cancel", post(billing::cancel_subscription))
        .route("/api/subscription/reactivate", post(billing::reactivate_subscription))
        .route("/api/create-checkout-session", post(billing::create_checkout_session))
        .route(
            "/api/create-billing-portal-session",
            post(billing::create_billing_portal_session),
        )
        .route(
            "/api/account",
            get(account::get_account).delete(account::delete_account),
        )
        .route_layer(require_session.clone());

    // Later route_layer calls wrap earlier ones: the session runs before the gate
    let gated = Router::new()
        .route("/dashboard", get(pages::dashboard))
        .route(
            "/api/ai-assist",
            post(assist::ai_assist)
                .layer(from_fn_with_state(state.clone(), rate_limit::limit_suggestions)),
        )
        .route(
            "/api/upload",
            post(documents::upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/documents", get(documents::list_documents))
        .route("/api/documents/{id}", delete(documents::delete_document))
        .route("/api/texts", get(texts::list_texts).post(texts::create_text))
        .route(
            "/api/texts/{id}",
            get(texts::get_text)
                .put(texts::update_text)
                .delete(texts::delete_text),
        )
        .route_layer(from_fn(subscription::require_subscription))
        .route_layer(require_session);

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(gated)
        .layer(from_fn(metrics::track_requests))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout(),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::rate_limit::create_rate_limiter;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use chrono::{Duration, Utc};
    use sea_orm::{
        ActiveModelTrait, ConnectOptions, Database, EntityTrait, IntoActiveModel, PaginatorTrait,
        Set,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;
    use writify_common::{
        auth::JwtManager,
        billing::{CheckoutRequest, PaymentEventProcessor, PaymentProvider, PlanPrices, WebhookVerifier},
        config::AppConfig,
        context::{DocumentContextBuilder, GenerationParams, MockGenerationClient, SuggestionPipeline},
        db::{models::PaymentEventEntity, schema::create_schema, DbPool, Repository},
        documents::{DocumentStorage, LocalStore},
        errors::Result,
    };

    const WEBHOOK_SECRET: &str = "whsec_test";
    const PASSWORD: &str = "Str0ngEnough";

    struct FakeProvider;

    #[async_trait]
    impl PaymentProvider for FakeProvider {
        async fn create_customer(&self, _email: &str, _name: &str, account_id: Uuid) -> Result<String> {
            Ok(format!("cus_{}", account_id.simple()))
        }

        async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<String> {
            Ok(format!(
                "https://checkout.test/{}/{}",
                request.plan.as_str(),
                request.price_id
            ))
        }

        async fn create_portal_session(&self, customer: &str, _return_url: &str) -> Result<String> {
            Ok(format!("https://portal.test/{}", customer))
        }

        async fn set_cancel_at_period_end(&self, _subscription_id: &str, _cancel: bool) -> Result<()> {
            Ok(())
        }

        async fn delete_customer(&self, _customer: &str) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        state: AppState,
        db: DbPool,
        _uploads: tempfile::TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            Self::with_config(AppConfig::default()).await
        }

        async fn with_config(mut config: AppConfig) -> Self {
            config.auth.jwt_secret = Some("test-secret".to_string());
            config.billing.webhook_secret = Some(WEBHOOK_SECRET.to_string());

            let mut opts = ConnectOptions::new("sqlite::memory:");
            opts.max_connections(1);
            let conn = Database::connect(opts).await.unwrap();
            create_schema(&conn).await.unwrap();
            let db = DbPool::from_connection(conn);

            let uploads = tempfile::tempdir().unwrap();
            let suggestions = SuggestionPipeline::new(
                Arc::new(MockGenerationClient::new()),
                GenerationParams::from(&config.generation),
                config.context.prompt_max_chars,
            );

            let state = AppState {
                repo: Repository::new(db.clone()),
                processor: PaymentEventProcessor::new(
                    db.conn().clone(),
                    PlanPrices::from(&config.billing),
                ),
                webhook_verifier: Some(Arc::new(WebhookVerifier::new(WEBHOOK_SECRET, 300))),
                provider: Arc::new(FakeProvider),
                suggestions,
                context_builder: DocumentContextBuilder::default(),
                storage: DocumentStorage::new(LocalStore::new(uploads.path()), None),
                jwt: Arc::new(JwtManager::from_config(&config.auth).unwrap()),
                federated: None,
                cache: None,
                limiter: create_rate_limiter(100, 100),
                config: Arc::new(config),
            };

            Self {
                state,
                db,
                _uploads: uploads,
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            create_router(self.state.clone())
                .oneshot(request)
                .await
                .unwrap()
        }

        async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> Response {
            let mut builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json");
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            self.send(builder.body(Body::from(body.to_string())).unwrap())
                .await
        }

        async fn get(&self, uri: &str, token: Option<&str>) -> Response {
            let mut builder = Request::builder().uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            self.send(builder.body(Body::empty()).unwrap()).await
        }

        /// Register an account and return its session token and id
        async fn register(&self, email: &str) -> (String, Uuid) {
            let response = self
                .json(
                    "POST",
                    "/auth/register",
                    None,
                    json!({
                        "email": email,
                        "first_name": "Ada",
                        "last_name": "Writer",
                        "password": PASSWORD
                    }),
                )
                .await;
            assert_eq!(response.status(), StatusCode::CREATED);
            let body = body_json(response).await;
            let id = body["account"]["id"].as_str().unwrap().parse().unwrap();
            (body["token"].as_str().unwrap().to_string(), id)
        }

        async fn expire_trial(&self, account_id: Uuid) {
            let account = self.state.repo.find_account(account_id).await.unwrap().unwrap();
            let mut active = account.into_active_model();
            active.trial_ends_at = Set(Some((Utc::now() - Duration::days(1)).into()));
            active.update(self.db.conn()).await.unwrap();
        }

        async fn webhook(&self, payload: &str, signature: &str) -> Response {
            self.send(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("stripe-signature", signature)
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart(filename: &str, content: &[u8]) -> (String, Vec<u8>) {
        let boundary = "writifyboundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        (format!("multipart/form-data; boundary={}", boundary), body)
    }

    #[tokio::test]
    async fn test_health_carries_security_headers() {
        let h = Harness::new().await;
        let response = h.get("/health", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
        assert!(headers.contains_key("content-security-policy"));
        assert!(headers.contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_caller_request_id_is_echoed() {
        let h = Harness::new().await;
        let request = Request::builder()
            .uri("/health")
            .header("x-request-id", "req-abc-123")
            .body(Body::empty())
            .unwrap();
        let response = h.send(request).await;

        assert_eq!(response.headers()["x-request-id"], "req-abc-123");
    }

    #[tokio::test]
    async fn test_ready_reports_database() {
        let h = Harness::new().await;
        let response = h.get("/ready", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["checks"]["database"]["status"], "up");
        assert_eq!(body["checks"]["redis"]["status"], "disabled");
    }

    #[tokio::test]
    async fn test_register_starts_trial_and_sets_cookie() {
        let h = Harness::new().await;
        let response = h
            .json(
                "POST",
                "/auth/register",
                None,
                json!({
                    "email": " Ada@Example.com ",
                    "first_name": "Ada",
                    "last_name": "Writer",
                    "password": PASSWORD
                }),
            )
            .await;

        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("writify_session="));
        assert!(cookie.contains("HttpOnly"));

        let body = body_json(response).await;
        assert_eq!(body["account"]["email"], "ada@example.com");
        assert_eq!(body["account"]["entitlement"]["subscription_status"], "trial");
        assert_eq!(body["account"]["entitlement"]["has_valid_access"], true);
        assert!(body["account"].get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_weak_passwords() {
        let h = Harness::new().await;
        h.register("ada@example.com").await;

        let duplicate = h
            .json(
                "POST",
                "/auth/register",
                None,
                json!({"email": "ADA@example.com", "first_name": "A", "last_name": "W", "password": PASSWORD}),
            )
            .await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        let weak = h
            .json(
                "POST",
                "/auth/register",
                None,
                json!({"email": "bob@example.com", "first_name": "B", "last_name": "W", "password": "password"}),
            )
            .await;
        assert_eq!(weak.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(weak).await["error"]["details"]["field"], "password");
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let h = Harness::new().await;
        h.register("ada@example.com").await;

        let wrong_password = h
            .json("POST", "/auth/login", None, json!({"email": "ada@example.com", "password": "Wrong1234"}))
            .await;
        let unknown_email = h
            .json("POST", "/auth/login", None, json!({"email": "nobody@example.com", "password": PASSWORD}))
            .await;
        assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(wrong_password).await["error"]["message"],
            body_json(unknown_email).await["error"]["message"]
        );

        let ok = h
            .json("POST", "/auth/login", None, json!({"email": "ada@example.com", "password": PASSWORD}))
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(body_json(ok).await["token"].is_string());
    }

    #[tokio::test]
    async fn test_google_login_disabled_without_client_id() {
        let h = Harness::new().await;
        let response = h
            .json("POST", "/auth/google-login", None, json!({"credential": "a.b.c"}))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_session_api_vs_page() {
        let h = Harness::new().await;

        let api = h.get("/api/texts", None).await;
        assert_eq!(api.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(api).await["error"]["code"], "UNAUTHORIZED");

        let page = h.get("/dashboard", None).await;
        assert_eq!(page.status(), StatusCode::SEE_OTHER);
        assert_eq!(page.headers()[header::LOCATION], "/auth/login");

        let garbage = h.get("/api/subscription/status", Some("not-a-jwt")).await;
        assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_cookie_is_accepted() {
        let h = Harness::new().await;
        let (token, _) = h.register("ada@example.com").await;

        let response = h
            .send(
                Request::builder()
                    .uri("/billing")
                    .header(header::COOKIE, format!("writify_session={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["page"], "billing");
    }

    #[tokio::test]
    async fn test_expired_trial_is_swept_and_gated() {
        let h = Harness::new().await;
        let (token, id) = h.register("ada@example.com").await;
        h.expire_trial(id).await;

        let api = h
            .json("POST", "/api/ai-assist", Some(&token), json!({"title": "Essay"}))
            .await;
        assert_eq!(api.status(), StatusCode::FORBIDDEN);
        let body = body_json(api).await;
        assert_eq!(body["error"]["code"], "SUBSCRIPTION_REQUIRED");
        assert_eq!(body["error"]["details"]["subscription_status"], "trial_expired");
        assert_eq!(body["error"]["details"]["trial_expired"], true);
        assert_eq!(body["error"]["details"]["redirect_url"], "/pricing");

        let stored = h.state.repo.find_account(id).await.unwrap().unwrap();
        assert_eq!(stored.subscription_status, "trial_expired");

        let page = h.get("/dashboard", Some(&token)).await;
        assert_eq!(page.status(), StatusCode::SEE_OTHER);
        assert_eq!(page.headers()[header::LOCATION], "/pricing?notice=trial_expired");

        // Billing pages stay reachable so the account can pay
        let status = h.get("/api/subscription/status", Some(&token)).await;
        assert_eq!(status.status(), StatusCode::OK);
        assert_eq!(body_json(status).await["has_valid_access"], false);
    }

    #[tokio::test]
    async fn test_pricing_notice() {
        let h = Harness::new().await;
        let body = body_json(h.get("/pricing?notice=trial_expired", None).await).await;
        assert_eq!(body["notice"]["code"], "trial_expired");
        assert_eq!(body["plans"].as_array().unwrap().len(), 2);

        let body = body_json(h.get("/pricing?notice=bogus", None).await).await;
        assert!(body["notice"].is_null());
    }

    #[tokio::test]
    async fn test_ai_assist_returns_typed_suggestions() {
        let h = Harness::new().await;
        let (token, _) = h.register("ada@example.com").await;

        let missing_title = h
            .json("POST", "/api/ai-assist", Some(&token), json!({"title": "  ", "current_text": "x"}))
            .await;
        assert_eq!(missing_title.status(), StatusCode::BAD_REQUEST);

        let response = h
            .json(
                "POST",
                "/api/ai-assist",
                Some(&token),
                json!({"title": "On gardens", "current_text": "Gardens teach patience."}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let suggestions = body["suggestions"].as_array().unwrap();
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0]["type"], "continuation");
        assert_eq!(suggestions[1]["type"], "improvement");
        assert_eq!(suggestions[2]["type"], "structure");
    }

    #[tokio::test]
    async fn test_text_crud() {
        let h = Harness::new().await;
        let (token, _) = h.register("ada@example.com").await;

        let created = h
            .json("POST", "/api/texts", Some(&token), json!({"title": " Draft ", "content": "Hello"}))
            .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let text = body_json(created).await;
        assert_eq!(text["title"], "Draft");
        let id = text["id"].as_str().unwrap().to_string();

        let updated = h
            .json(
                "PUT",
                &format!("/api/texts/{}", id),
                Some(&token),
                json!({"title": "Final", "content": "Hello world"}),
            )
            .await;
        assert_eq!(updated.status(), StatusCode::OK);
        assert_eq!(body_json(updated).await["content"], "Hello world");

        let list = body_json(h.get("/api/texts", Some(&token)).await).await;
        assert_eq!(list["texts"].as_array().unwrap().len(), 1);

        let deleted = h
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/texts/{}", id))
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let gone = h.get(&format!("/api/texts/{}", id), Some(&token)).await;
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_text_title_validation() {
        let h = Harness::new().await;
        let (token, _) = h.register("ada@example.com").await;

        let empty = h
            .json("POST", "/api/texts", Some(&token), json!({"title": ""}))
            .await;
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let long = h
            .json("POST", "/api/texts", Some(&token), json!({"title": "x".repeat(201)}))
            .await;
        assert_eq!(long.status(), StatusCode::BAD_REQUEST);

        let foreign_document = h
            .json(
                "POST",
                "/api/texts",
                Some(&token),
                json!({"title": "Draft", "document_ids": [Uuid::new_v4()]}),
            )
            .await;
        assert_eq!(foreign_document.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let mut config = AppConfig::default();
        config.documents.max_upload_bytes = 1024;
        let h = Harness::with_config(config).await;
        let (token, _) = h.register("ada@example.com").await;

        let upload = |filename: &str, content: Vec<u8>| {
            let (content_type, body) = multipart(filename, &content);
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap()
        };

        let txt = h.send(upload("notes.txt", b"hello".to_vec())).await;
        assert_eq!(txt.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(txt).await["error"]["code"], "UNSUPPORTED_FILE_TYPE");

        let too_big = h.send(upload("big.pdf", vec![b'a'; 4096])).await;
        assert_eq!(too_big.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let unreadable = h.send(upload("broken.pdf", b"not really a pdf".to_vec())).await;
        assert_eq!(unreadable.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(unreadable).await["error"]["message"],
            "Validation failed: Could not extract text from file"
        );

        let list = body_json(h.get("/api/documents", Some(&token)).await).await;
        assert!(list["documents"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_session() {
        let h = Harness::new().await;
        let (token, id) = h.register("ada@example.com").await;

        let invalid = h
            .json("POST", "/api/create-checkout-session", Some(&token), json!({"plan_type": "lifetime"}))
            .await;
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let response = h
            .json("POST", "/api/create-checkout-session", Some(&token), json!({"plan_type": "annual"}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["checkout_url"],
            "https://checkout.test/annual/price_annual_192"
        );

        let account = h.state.repo.find_account(id).await.unwrap().unwrap();
        assert_eq!(account.customer_ref, Some(format!("cus_{}", id.simple())));

        let portal = h
            .json("POST", "/api/create-billing-portal-session", Some(&token), json!({}))
            .await;
        assert_eq!(portal.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cancel_without_subscription_is_not_found() {
        let h = Harness::new().await;
        let (token, _) = h.register("ada@example.com").await;

        let response = h
            .json("POST", "/api/subscription/cancel", Some(&token), json!({}))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_webhook_rejects_forged_signature() {
        let h = Harness::new().await;
        let payload = r#"{"id":"evt_forged","type":"invoice.payment_failed","data":{"object":{"id":"in_1"}}}"#;

        let response = h.webhook(payload, "t=1,v1=deadbeef").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let rows = PaymentEventEntity::find().count(h.db.conn()).await.unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn test_webhook_checkout_activates_once() {
        let h = Harness::new().await;
        let (token, id) = h.register("ada@example.com").await;
        h.expire_trial(id).await;

        let payload = json!({
            "id": "evt_checkout_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_1",
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": {"user_id": id.to_string(), "plan_type": "monthly"}
            }}
        })
        .to_string();
        let signature = WebhookVerifier::new(WEBHOOK_SECRET, 300)
            .signature_header(payload.as_bytes(), Utc::now().timestamp())
            .unwrap();

        let first = h.webhook(&payload, &signature).await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(body_json(first).await["status"], "applied");

        let second = h.webhook(&payload, &signature).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_json(second).await["status"], "already_processed");

        let dashboard = h.get("/dashboard", Some(&token)).await;
        assert_eq!(dashboard.status(), StatusCode::OK);
        let body = body_json(dashboard).await;
        assert_eq!(body["account"]["entitlement"]["subscription_status"], "active");
        assert_eq!(body["account"]["entitlement"]["subscription_plan"], "monthly");

        let cancel = h
            .json("POST", "/api/subscription/cancel", Some(&token), json!({}))
            .await;
        assert_eq!(cancel.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_account_clears_cookie() {
        let h = Harness::new().await;
        let (token, id) = h.register("ada@example.com").await;

        let response = h
            .send(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/account")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));

        assert!(h.state.repo.find_account(id).await.unwrap().is_none());
        let after = h.get("/api/account", Some(&token)).await;
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    }
}
