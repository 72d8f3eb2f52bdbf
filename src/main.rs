use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use vitrine::auth::oauth::GoogleOAuth;
use vitrine::config::AppConfig;
use vitrine::models::UserStore;
use vitrine::render::ChromeBackend;
use vitrine::resolver::Resolver;
use vitrine::rules::RuleRegistry;
use vitrine::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vitrine=debug".parse()?),
        )
        .init();

    info!("Starting Vitrine...");

    let config = AppConfig::from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.acquire_timeout,
        ))
        .connect(&config.database.url)
        .await?;

    let users = UserStore::new(pool);
    users.init_schema().await?;

    let backend = Arc::new(ChromeBackend::new(&config.resolver)?);
    let resolver = Arc::new(Resolver::new(
        RuleRegistry::builtin(),
        backend,
        config.resolver.clone(),
    ));

    let oauth = GoogleOAuth::new(&config.oauth);
    if oauth.is_none() {
        info!("Google OAuth credentials not set, sign-in with Google disabled");
    }

    let state = AppState {
        resolver,
        users,
        oauth,
        config: config.clone(),
    };

    web::serve(config, state).await
}
