use std::env;

use log::error;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub database_url: String,
    pub amqp_url: String,
    /// Unacked messages each consumer may hold.
    pub prefetch_count: u16,
    /// Seconds between suspension sweeps.
    pub suspension_check_interval: u64,
    pub max_db_connections: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/mse_store.db".to_string(),
            amqp_url: "amqp://localhost:5672".to_string(),
            prefetch_count: 16,
            suspension_check_interval: 3600,
            max_db_connections: 5,
        }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let default = WorkerConfig::default();
        let database_url = env::var("MSE_DATABASE_URL").unwrap_or_else(|_| {
            error!("🪛️ MSE_DATABASE_URL is not set. Using the default, which is only useful for testing.");
            default.database_url.clone()
        });
        let amqp_url = env::var("MSE_AMQP_URL").unwrap_or_else(|_| {
            error!("🪛️ MSE_AMQP_URL is not set. Falling back to {}", default.amqp_url);
            default.amqp_url.clone()
        });
        let prefetch_count = env::var("MSE_PREFETCH_COUNT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid prefetch count ({e}). Using {}.", default.prefetch_count);
                    default.prefetch_count
                })
            })
            .unwrap_or(default.prefetch_count);
        let suspension_check_interval = env::var("MSE_SUSPENSION_CHECK_INTERVAL_SECS")
            .map(|s| {
                s.parse::<u64>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid sweep interval ({e}). Using {}s.",
                        default.suspension_check_interval
                    );
                    default.suspension_check_interval
                })
            })
            .unwrap_or(default.suspension_check_interval);
        let max_db_connections = env::var("MSE_DB_MAX_CONNECTIONS")
            .map(|s| {
                s.parse::<u32>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid connection count ({e}). Using {}.", default.max_db_connections);
                    default.max_db_connections
                })
            })
            .unwrap_or(default.max_db_connections);
        Self { database_url, amqp_url, prefetch_count, suspension_check_interval, max_db_connections }
    }
}
