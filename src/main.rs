use rgen_images::logger::{self, LogLevel, LoggerConfig};
use rgen_images::{server, Config, ImageService};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_loaded = dotenv::dotenv().is_ok();
    let config = Config::from_env();

    let logger_config = if config.json_logs {
        LoggerConfig::production()
    } else {
        LoggerConfig::development().with_level(LogLevel::Info)
    };
    logger::init_with_config(logger_config)?;

    if env_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    logger::log_startup_info(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        config.port.unwrap_or(8080),
    );
    logger::log_config_info(&config);

    let service = match ImageService::from_config(&config) {
        Ok(service) => {
            log::info!("✅ Image service initialized");
            Arc::new(service)
        }
        Err(e) => {
            log::error!("❌ Failed to initialize image service: {}", e);
            return Err(e.into());
        }
    };

    server::run(config, service).await?;
    log::info!("👋 Front door stopped");
    Ok(())
}
