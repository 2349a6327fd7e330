use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::{
    AppointmentBookingService, AppointmentStore, InMemoryAppointmentStore, StoreLedger,
    SupabaseAppointmentStore,
};
use doctor_cell::services::{
    InMemoryScheduleStore, ScheduleService, ScheduleStore, SupabaseScheduleStore,
};
use shared_config::{AppConfig, StoreBackend};
use shared_database::SupabaseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling API server");

    let config = Arc::new(AppConfig::from_env());
    let (schedule_store, appointment_store) = build_stores(&config);

    // One ledger and one lock registry shared by both cells.
    let schedules = Arc::new(ScheduleService::new(
        schedule_store,
        Arc::new(StoreLedger::new(appointment_store.clone())),
        &config,
    ));
    let bookings = Arc::new(AppointmentBookingService::new(
        appointment_store,
        schedules.clone(),
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), schedules, bookings)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn build_stores(config: &AppConfig) -> (Arc<dyn ScheduleStore>, Arc<dyn AppointmentStore>) {
    match config.store_backend {
        StoreBackend::Supabase => {
            info!("Using Supabase store at {}", config.supabase_url);
            let client = Arc::new(SupabaseClient::new(config));
            (
                Arc::new(SupabaseScheduleStore::with_client(client.clone())),
                Arc::new(SupabaseAppointmentStore::with_client(client)),
            )
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            (
                Arc::new(InMemoryScheduleStore::new()),
                Arc::new(InMemoryAppointmentStore::new()),
            )
        }
    }
}
