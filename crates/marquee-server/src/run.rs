use crate::config::ServerConfig;
use crate::error::Result;
use axum::extract::{DefaultBodyLimit, State};
use axum::{response::IntoResponse, routing::get, Json, Router};
use futures::FutureExt;
use marquee_app::error::{method_not_allowed, not_found, MAX_BODY_SIZE};
use marquee_app::state::{AppConfig, AppState};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub async fn run(args: ServerConfig) -> Result<()> {
    let state = build_state(&args).await?;
    run_with_state(args, state).await
}

pub async fn run_with_state(args: ServerConfig, state: AppState) -> Result<()> {
    let shutdown = tokio::signal::ctrl_c().map(|_| ());
    run_graceful_with_state(args, state, shutdown).await
}

pub async fn run_graceful_with_state<S>(
    args: ServerConfig,
    state: AppState,
    shutdown_signal: S,
) -> Result<()>
where
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let app = main_router(state);

    let ip: std::net::IpAddr = args.listen_address.parse()?;
    let addr = std::net::SocketAddr::from((ip, args.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "Starting {} server on {}",
        args.env.as_str(),
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server stopped");
    Ok(())
}

pub fn main_router(state: AppState) -> Router<()> {
    Router::new()
        .route(
            "/v1/healthcheck",
            get(healthcheck).fallback(method_not_allowed),
        )
        .nest("/v1/movies", marquee_app::rest_api::movie::router())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config().environment,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

pub async fn build_state(config: &ServerConfig) -> Result<AppState> {
    let data_dir = config.data_dir();
    if !data_dir.is_dir() {
        tokio::fs::create_dir_all(&data_dir).await?;
        info!("Created data directory {}", data_dir.display());
    }

    let app_config: AppConfig = config.into();
    let pool =
        marquee_dal::new_pool_with_config(&config.database_url(), &config.pool_config()).await?;
    marquee_dal::migrate(&pool).await?;
    debug!("Database migrations applied");
    info!("database connection pool established");

    Ok(AppState::new(app_config, pool))
}
