use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use theatre_api::{
    config::Config, controllers, database::Database, services::notifications::Notifier, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Theatre API");

    // Connect to the database
    let db = Database::new(&config.database.url, config.database.pool_size).await?;
    info!("Database connected");

    // Run migrations
    db.run_migrations().await?;

    let notifier = Notifier::from_config(&config.notification);

    // Create the shared application state
    let app_state = Arc::new(AppState {
        db,
        config: config.clone(),
        notifier,
    });

    // Create the main router
    let app = Router::new()
        .route("/", get(|| async { "Theatre API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        // Mount the routes from the controllers module
        .nest("/api", controllers::routes())
        // Pass the application state to the router
        .with_state(app_state)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::new(config.app.host.parse()?, config.app.port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
