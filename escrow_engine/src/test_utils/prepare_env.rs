use log::info;
use rand::{distributions::Alphanumeric, Rng};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

/// A fresh database URL under the system temp directory, so parallel tests
/// never share a store.
pub fn random_db_url() -> String {
    let nonce: String = rand::thread_rng().sample_iter(&Alphanumeric).take(8).map(char::from).collect();
    let path = std::env::temp_dir().join(format!("mse_test_{}.db", nonce.to_lowercase()));
    format!("sqlite://{}", path.display())
}

/// Drops, recreates and migrates the database at `url`.
pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        Sqlite::drop_database(url).await.expect("could not drop the old test database");
    }
    Sqlite::create_database(url).await.expect("could not create the test database");
    let pool = SqlitePool::connect(url).await.expect("could not connect to the test database");
    sqlx::migrate!("./src/sqlite/migrations").run(&pool).await.expect("migrations failed");
    pool.close().await;
    info!("🛠️ Test database ready at {url}");
}
