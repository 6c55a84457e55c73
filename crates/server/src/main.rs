// aidalert-server main.rs
// HTTP API for the AidAlert incident workflow

use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};

use aidalert_server::{api_router, AppState, Database};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aidalert_server=info".into()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Get port from CLI args or environment
    let port: u16 = args
        .iter()
        .position(|a| a == "--port" || a == "-p")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .or_else(|| {
            std::env::var("AIDALERT_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(3000);

    // Get data directory from CLI args or environment
    let data_dir: Option<PathBuf> = args
        .iter()
        .position(|a| a == "--data-dir" || a == "-d")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .or_else(|| std::env::var("AIDALERT_DATA_DIR").ok().map(PathBuf::from));

    let data_dir = data_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aidalert")
    });
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");

    let db_path = data_dir.join("aidalert.db");
    tracing::info!("Database: {:?}", db_path);
    tracing::info!("Port: {}", port);

    let db = Arc::new(Database::open(&db_path).expect("Failed to open database"));
    let state = Arc::new(AppState::new(db));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api_router(state).layer(cors);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("AidAlert workflow server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");
    tracing::info!("Shutting down...");
}
