use tracing::{error, info};
use wealth_advisor::{
    api::{start_server, ApiState},
    config::AppConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("⚠️  {}", e);
            eprintln!("📌 Set GEMINI_API_KEY in the environment or a .env file");
            std::process::exit(1);
        }
    };

    info!("🚀 Wealth Advisor - API Server");
    info!("📍 Port: {}", config.port);

    let state = ApiState::from_config(&config)?;

    info!("📡 Starting API server...");

    start_server(state, config.port).await?;

    Ok(())
}
