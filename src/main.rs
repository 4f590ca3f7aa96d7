use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use theracare_api::{config::Config, db, routes, services::email::EmailService, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let email = EmailService::new(&config).map(Arc::new);
    if email.is_some() {
        info!("SMTP email service configured");
    } else {
        info!("SMTP not configured — cancellation emails disabled");
    }

    let state = AppState {
        db: pool,
        config: config.clone(),
        email,
    };

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        // Slot generation & listing
        .route(
            "/therapists/{id}/slots/generate",
            post(routes::slots::generate_slots),
        )
        .route("/therapists/{id}/slots/day", post(routes::slots::regenerate_day))
        .route(
            "/therapists/{id}/slots/activate",
            post(routes::slots::activate_slots),
        )
        .route("/therapists/{id}/slots", get(routes::slots::list_slots))
        .route(
            "/therapists/{id}/slots/available",
            get(routes::slots::list_available_slots),
        )
        // Bookings
        .route("/bookings", post(routes::bookings::book_slot))
        .route("/bookings/{id}/complete", post(routes::bookings::mark_completed))
        // Leave ledger
        .route("/therapists/{id}/leaves", post(routes::leaves::request_leave))
        .route(
            "/therapists/{id}/leaves/balances",
            get(routes::leaves::get_balances),
        )
        .route("/leaves/{id}/process", post(routes::leaves::process_leave))
        // In-app notifications
        .route(
            "/users/{id}/notifications",
            get(routes::notifications::list_notifications),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("theracare API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
