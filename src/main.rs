use campushire::{auth, chat, AppResult, AppState};
use axum::{debug_handler, extract::State, routing::get, Router};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("campushire=debug,info")),
        )
        .init();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(8)));

    let cors_layer = match dotenv::var("CORS_ORIGIN") {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin.parse()?))
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => CorsLayer::permissive(),
    };

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(dotenv::var("DATABASE_URL")?.as_str())
        .await?;
    chat::history::init_db(&db_pool).await?;

    let history_limit = match dotenv::var("CHAT_HISTORY_LIMIT") {
        Ok(raw) => raw.parse()?,
        Err(_) => chat::DEFAULT_HISTORY_LIMIT,
    };

    let app_state = AppState {
        db_pool: db_pool.clone(),
        chat: chat::Chat::new(db_pool, history_limit),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .merge(auth::router())
        .nest("/chat", chat::router())
        .with_state(app_state)
        .layer(session_layer)
        .layer(cors_layer);

    let bind_addr = dotenv::var("BIND_ADDR").unwrap_or("0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on {bind_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[debug_handler]
async fn healthz(State(db_pool): State<SqlitePool>) -> AppResult<&'static str> {
    sqlx::query("SELECT 1").execute(&db_pool).await?;
    Ok("ok")
}
