use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_banking_assistant::{api::start_server, store::seed_demo_data, Assistant, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let port = settings.port;
    let seed = settings.seed_demo_data;

    info!("🚀 {} - API Server", settings.app_name);
    info!("📍 Port: {}", port);

    let assistant = Arc::new(Assistant::from_settings(settings)?);

    if seed {
        seed_demo_data(assistant.store.as_ref()).await?;
        info!("✅ Demo data ready");
    }

    info!("📡 Starting API server...");
    start_server(assistant, port).await?;

    Ok(())
}
