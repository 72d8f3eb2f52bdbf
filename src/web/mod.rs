use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

use crate::{auth::oauth::GoogleOAuth, config::AppConfig, models::UserStore, resolver::Resolver};

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use handlers::{
    current_user, google_auth, google_auth_callback, login, reset_password,
    resolve_product_image, signup,
};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub users: UserStore,
    pub oauth: Option<GoogleOAuth>,
    pub config: AppConfig,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // API routes
        .nest("/api/v1", api_routes(state.clone()))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(
                            tower_http::trace::DefaultOnResponse::new().level(Level::INFO),
                        ),
                )
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .layer(from_fn(middleware::request_logging))
        .with_state(state)
}

fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(current_user))
        .route_layer(from_fn_with_state(state, middleware::require_auth));

    Router::new()
        // Image resolution
        .route("/product-image", post(resolve_product_image))
        // Auth
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/google", get(google_auth))
        .route("/auth/google/callback", get(google_auth_callback))
        .merge(protected)
}

// Health check endpoint
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "vitrine"
    }))
}

pub async fn serve(config: AppConfig, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await?;

    tracing::info!(
        "Server starting on {}:{}",
        config.server.host,
        config.server.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DatabaseConfig, OAuthConfig, ResolverConfig, SecurityConfig, ServerConfig,
    };
    use crate::render::{RenderBackend, RenderError, RenderedPage};
    use crate::rules::RuleRegistry;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sqlx::SqlitePool;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedBackend {
        html: String,
    }

    struct FixedPage {
        html: String,
    }

    #[async_trait]
    impl RenderBackend for FixedBackend {
        async fn open(&self, _url: &str) -> Result<Box<dyn RenderedPage>, RenderError> {
            Ok(Box::new(FixedPage {
                html: self.html.clone(),
            }))
        }
    }

    #[async_trait]
    impl RenderedPage for FixedPage {
        async fn wait_for_selector(
            &self,
            selector: &str,
            _timeout: Duration,
        ) -> Result<(), RenderError> {
            Err(RenderError::WaitTimeout {
                selector: selector.to_string(),
            })
        }

        async fn content(&self) -> Result<String, RenderError> {
            Ok(self.html.clone())
        }

        async fn close(&mut self) -> Result<(), RenderError> {
            Ok(())
        }
    }

    fn get_test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                base_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 2,
                min_connections: 1,
                acquire_timeout: 10,
            },
            security: SecurityConfig {
                secret_key: "test-secret-key-32-characters-min".to_string(),
                jwt_expiry: 3600,
            },
            resolver: ResolverConfig {
                max_concurrent_sessions: 2,
                navigation_timeout: 10,
                selector_timeout_ms: 100,
                resolution_timeout: 30,
                user_agent: "VitrineTest/1.0".to_string(),
                chrome_path: None,
            },
            oauth: OAuthConfig {
                google_client_id: None,
                google_client_secret: None,
                redirect_uri: "http://localhost:3000/api/v1/auth/google/callback".to_string(),
                post_login_redirect: "http://localhost:3001/".to_string(),
            },
        }
    }

    async fn create_test_app_state(html: &str) -> AppState {
        let config = get_test_config();

        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let users = UserStore::new(pool);
        users.init_schema().await.unwrap();

        let backend = Arc::new(FixedBackend {
            html: html.to_string(),
        });
        let resolver = Arc::new(Resolver::new(
            RuleRegistry::builtin(),
            backend,
            config.resolver.clone(),
        ));

        AppState {
            resolver,
            users,
            oauth: None,
            config,
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = create_test_app_state("<html></html>").await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_google_auth_unavailable_without_credentials() {
        let state = create_test_app_state("<html></html>").await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/auth/google")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_google_callback_issues_token_and_creates_user() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at-123" })),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "g-1",
                "email": "ada@example.com",
                "name": "Ada",
            })))
            .mount(&server)
            .await;

        let mut state = create_test_app_state("<html></html>").await;
        state.config.oauth.google_client_id = Some("client-id".to_string());
        state.config.oauth.google_client_secret = Some("client-secret".to_string());
        state.oauth = Some(
            GoogleOAuth::new(&state.config.oauth)
                .unwrap()
                .with_endpoints(
                    &format!("{}/token", server.uri()),
                    &format!("{}/userinfo", server.uri()),
                ),
        );

        let users = state.users.clone();
        let secret = state.config.security.secret_key.clone();
        let post_login = state.config.oauth.post_login_redirect.clone();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/auth/google/callback?code=xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let location = response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        let prefix = format!("{}?token=", post_login);
        assert!(location.starts_with(&prefix), "location: {location}");

        let token = &location[prefix.len()..];
        let claims = crate::auth::verify_token(token, &secret).unwrap();
        assert_eq!(claims.email, "ada@example.com");

        let user = users.find_by_email("ada@example.com").await.unwrap();
        assert!(user.is_some());
        assert_eq!(user.unwrap().name, "Ada");
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let state = create_test_app_state("<html></html>").await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
