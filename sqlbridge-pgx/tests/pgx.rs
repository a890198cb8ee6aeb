use sqlbridge_core::{DbConfig, Dialect, SqlDb};
use sqlbridge_pgx::PgEnv;
use std::time::Duration;

// Needs a running server described by the PG* environment, e.g.
// PGX_TEST=1 PGPASSWORD=secret cargo test -p sqlbridge-pgx
#[tokio::test]
async fn full_suite_against_server() {
    sqlbridge_tests::init_logs();
    if std::env::var("PGX_TEST").is_err() {
        eprintln!("PGX_TEST unset; skipping");
        return;
    }
    let config = DbConfig {
        url: String::new(),
        driver: "pgx".to_string(),
        dialect: Dialect::pgx(),
        max_connections: 4,
        connect_delay: Duration::ZERO,
        connect_timeout: Duration::from_secs(30),
    };
    let db = sqlbridge_pgx::connect(&PgEnv::from_env(), &config)
        .await
        .unwrap();
    sqlbridge_tests::full_suite(&db, "it_pgx_").await;
    db.close().await;
}
