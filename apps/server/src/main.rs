use std::sync::Arc;

use session_server::{
    auth::JwtVerifier,
    bookings::{BookingStore, MemoryBookingStore, PgBookingStore},
    config::Config,
    observability::init_tracing,
    routes,
    state::AppState,
    time_window::SystemClock,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from_env()?;

    let clock = SystemClock::with_offset_minutes(config.schedule_utc_offset_minutes)
        .ok_or("invalid SCHEDULE_UTC_OFFSET_MINUTES")?;

    let store: Arc<dyn BookingStore> = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let store = PgBookingStore::new(pool);
            store.migrate().await?;
            tracing::info!(component = "bootstrap", "using postgres booking store");
            Arc::new(store)
        }
        None => {
            tracing::warn!(
                component = "bootstrap",
                "DATABASE_URL not set, bookings are kept in memory"
            );
            Arc::new(MemoryBookingStore::new())
        }
    };

    let state = AppState::new(
        store,
        Arc::new(JwtVerifier::new(config.jwt_secret.as_bytes())),
        Arc::new(clock),
    );

    let app = routes::router(state).layer(routes::cors_layer(&config.cors_origins));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!(component = "bootstrap", addr = %listener.local_addr()?, "session server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
