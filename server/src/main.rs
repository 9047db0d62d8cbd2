use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use court_booking_server::config::Config;
use court_booking_server::repository::postgres::ConnectionPool;
use court_booking_server::repository::Repositories;
use court_booking_server::routes::{create_routes, RouterOptions};
use court_booking_server::services::clock::SystemClock;
use court_booking_server::services::notifier::LogNotifier;
use court_booking_server::services::payment_gateway::HttpPaymentGateway;
use court_booking_server::state::AppState;

fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logger();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let gateway =
        HttpPaymentGateway::new(config.payment.clone()).expect("Failed to build payment client");
    let state = AppState::new(
        Repositories::postgres(ConnectionPool::new(pool)),
        Arc::new(gateway),
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
        config.access_grace_minutes,
    );
    let options = RouterOptions {
        allowed_origins: config.allowed_origins.clone(),
        include_hsts: config.production,
    };
    let app = create_routes(state, &options);

    tracing::info!("Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
