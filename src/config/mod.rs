use serde::Deserialize;
use std::env;

// Top-level configuration container, populated from the environment once at
// startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Settings for the mail relay that receives reservation confirmations.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub relay_url: String,
    pub sender: String,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "theatre_api=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            notification: NotificationConfig {
                relay_url: env::var("NOTIFICATION_RELAY_URL")
                    .unwrap_or_else(|_| "http://localhost:8025/api/send".to_string()),
                sender: env::var("NOTIFICATION_SENDER")
                    .unwrap_or_else(|_| "noreply@theatre.example.com".to_string()),
                timeout_seconds: env::var("NOTIFICATION_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("NOTIFICATION_TIMEOUT_SECONDS must be a valid number"),
            },
        }
    }
}
