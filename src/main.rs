use axum::{
    routing::post,
    Router,
};

use http::{header, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyward::config::Config;
use keyward::handlers;
use keyward::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    keyward::db::init_schema(&state.db).await?;

    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse().unwrap(),
            "http://127.0.0.1:3000".parse().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            "x-user-id".parse().unwrap(),
        ])
        .max_age(Duration::from_secs(86400));

    let license_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(20)
            .burst_size(50)
            .use_headers()
            .finish()
            .unwrap(),
    );

    let license_routes = Router::new()
        .route("/api/drm/licenses", post(handlers::licenses::issue_license))
        .layer(tower_governor::GovernorLayer::new(
            license_governor_conf.clone(),
        ))
        .with_state(state.clone());

    let drm_routes = Router::new()
        .route("/api/drm/heartbeat", post(handlers::sessions::heartbeat))
        .route(
            "/api/drm/objects/{object_id}/protect",
            post(handlers::admin::protect_object),
        )
        .route(
            "/api/drm/objects/{object_id}/revoke",
            post(handlers::admin::revoke_object),
        )
        .route(
            "/api/drm/objects/{object_id}/rotate",
            post(handlers::admin::rotate_object),
        )
        .with_state(state.clone());

    let app = Router::new()
        .merge(license_routes)
        .merge(drm_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(cors);

    let addr = state.config.bind_addr;
    tracing::info!("🚀 DRM service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
