use sqlbridge_core::{DbConfig, Dialect, SqlDb};
use std::time::Duration;

fn memory_config() -> DbConfig {
    // One connection, or every pool checkout would see its own empty
    // in-memory database.
    DbConfig {
        url: "sqlite::memory:".to_string(),
        driver: "sqlite".to_string(),
        dialect: Dialect::sqlite(),
        max_connections: 1,
        connect_delay: Duration::ZERO,
        connect_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn full_suite_in_memory() {
    sqlbridge_tests::init_logs();
    let db = sqlbridge_sqlite::connect(&memory_config()).await.unwrap();
    sqlbridge_tests::full_suite(&db, "it_").await;
    db.close().await;
}

#[tokio::test]
async fn ping_and_close() {
    let db = sqlbridge_sqlite::connect(&memory_config()).await.unwrap();
    db.ping().await.unwrap();
    db.close().await;
}
