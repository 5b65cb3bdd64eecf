use std::sync::Arc;

use dotenvy::dotenv;
use escrow_engine::{
    settlement::{NOTIFICATION_SERVICE, ORDER_STATUS_SERVICE, WALLET_SERVICE},
    OrderFlowApi,
    SqliteDatabase,
};
use log::{error, info};
use settlement_worker::{
    amqp::{self, AmqpProducer},
    config::WorkerConfig,
    consumer::{self, Dispatcher},
    consumers::{notification_dispatcher, order_status_dispatcher, wallet_dispatcher},
    errors::WorkerError,
    sinks::{LogNotifier, NullCache},
    suspension_worker,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = WorkerConfig::from_env_or_default();

    info!("🚀️ Starting settlement worker");
    match run(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    }
}

async fn run(config: WorkerConfig) -> Result<(), WorkerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_db_connections)
        .await
        .map_err(|e| WorkerError::Config(format!("Could not open {}. {e}", config.database_url)))?;
    let conn = amqp::connect(&config.amqp_url).await?;

    let topology_channel = conn.create_channel().await?;
    for service in [WALLET_SERVICE, ORDER_STATUS_SERVICE, NOTIFICATION_SERVICE] {
        amqp::declare_topology(&topology_channel, service).await?;
    }

    let producer = AmqpProducer::new(&conn).await?;

    spawn_consumer(&conn, WALLET_SERVICE, wallet_dispatcher(db.clone()), config.prefetch_count).await?;
    spawn_consumer(
        &conn,
        ORDER_STATUS_SERVICE,
        order_status_dispatcher(db.clone(), NullCache, LogNotifier),
        config.prefetch_count,
    )
    .await?;
    spawn_consumer(&conn, NOTIFICATION_SERVICE, notification_dispatcher(LogNotifier), config.prefetch_count).await?;

    suspension_worker::spawn(OrderFlowApi::new(db, producer), config.suspension_check_interval);

    tokio::signal::ctrl_c().await.map_err(|e| WorkerError::Config(format!("Could not install signal handler. {e}")))?;
    info!("🛑️ Shutting down settlement worker");
    Ok(())
}

async fn spawn_consumer(
    conn: &lapin::Connection,
    service: &'static str,
    dispatcher: Dispatcher,
    prefetch: u16,
) -> Result<(), WorkerError> {
    let channel = conn.create_channel().await?;
    let dispatcher = Arc::new(dispatcher);
    tokio::spawn(async move {
        if let Err(e) = consumer::run(channel, service, dispatcher, prefetch).await {
            error!("🛑️ The {service} consumer died: {e}");
        }
    });
    Ok(())
}
