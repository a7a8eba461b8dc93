use dotenvy::dotenv;
use loadgate::communication::telegram::TelegramService;
use loadgate::configuration::{Config, Context};
use loadgate::core::ServiceManager;
use loadgate::database::Database;
use loadgate::AppError;
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenv().ok();
    let config_file = env::var("LOADGATE_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let config = Config::new(&config_file).map_err(|e| AppError::ConfigError(e.to_string()))?;

    let log_level = Level::from_str(&config.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(log_level.to_string()))
        .init();
    tracing::info!("Starting loadgate");

    let database = Database::open(Path::new(&config.database.path))
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;
    let context = Context { config, database };

    let mut service_manager = ServiceManager::new(context);
    service_manager.spawn::<TelegramService>();

    service_manager
        .wait()
        .await
        .map_err(|_| AppError::ServiceError)
}
