use chrono::Duration as ChronoDuration;
use farebox_api::{app, state::AuthConfig, AppState};
use farebox_core::{
    BookingRepository, CashPaymentAdapter, OrderRepository, ScheduleRepository,
};
use farebox_inventory::{MemorySeatLedger, SeatLedger};
use farebox_order::{BookingEngine, ReconciliationService};
use farebox_store::{
    DbClient, MemoryBookingRepository, MemoryOrderRepository, MemoryScheduleRepository,
    PgBookingRepository, PgOrderRepository, PgScheduleRepository, PgSeatLedger,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Backend = (
    Arc<dyn SeatLedger>,
    Arc<dyn ScheduleRepository>,
    Arc<dyn BookingRepository>,
    Arc<dyn OrderRepository>,
);

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farebox_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = farebox_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Farebox API on port {}", config.server.port);

    let (ledger, schedules, bookings, orders): Backend = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url).await.expect("Failed to connect to Postgres");
            db.migrate().await.expect("Failed to run migrations");
            (
                Arc::new(PgSeatLedger::new(db.pool.clone())),
                Arc::new(PgScheduleRepository::new(db.pool.clone())),
                Arc::new(PgBookingRepository::new(db.pool.clone())),
                Arc::new(PgOrderRepository::new(db.pool.clone())),
            )
        }
        None => {
            tracing::info!("no database configured, running on the in-memory store");
            (
                Arc::new(MemorySeatLedger::new()),
                Arc::new(MemoryScheduleRepository::new()),
                Arc::new(MemoryBookingRepository::new()),
                Arc::new(MemoryOrderRepository::new()),
            )
        }
    };

    let hold_ttl = ChronoDuration::seconds(config.business_rules.seat_hold_seconds as i64);
    let stale_after = ChronoDuration::seconds(config.business_rules.stale_order_seconds as i64);

    let engine = Arc::new(BookingEngine::new(
        ledger.clone(),
        hold_ttl,
        schedules.clone(),
        bookings.clone(),
        orders.clone(),
        Arc::new(CashPaymentAdapter),
    ));
    let recon = Arc::new(ReconciliationService::new(
        ledger,
        schedules,
        bookings,
        orders,
        stale_after,
    ));

    tokio::spawn(farebox_api::worker::start_reconciliation_worker(
        recon.clone(),
        Duration::from_secs(config.business_rules.sweep_interval_seconds),
    ));

    let app_state = AppState {
        engine,
        recon,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        rules: config.business_rules.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
