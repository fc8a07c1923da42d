use std::sync::Arc;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use conversation_cell::services::extraction::RegexExtractor;
use conversation_cell::services::workflow::AppointmentWorkflow;
use notification_cell::{JsonlExportSink, LoggingNotificationSender};
use patient_cell::InMemoryPatientStore;
use scheduling_cell::ScheduleStore;
use shared_config::AppConfig;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting scheduling assistant API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Wire up the workflow engine and its collaborators
    let patient_store = Arc::new(InMemoryPatientStore::load_from_file(
        &config.patient_store_path,
    ));
    let schedule_store = Arc::new(ScheduleStore::load_from_file(&config.schedule_store_path));
    let workflow = Arc::new(AppointmentWorkflow::new(
        patient_store,
        schedule_store,
        Arc::new(RegexExtractor::new()),
        Arc::new(LoggingNotificationSender),
        Arc::new(JsonlExportSink::new(&config.admin_export_path)),
        &config,
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(workflow)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    info!("Listening on {}", config.bind_address);
    let listener = TcpListener::bind(&config.bind_address)
        .await
        .expect("bind address");
    axum::serve(listener, app).await.expect("server run");
}
