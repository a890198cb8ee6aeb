use sqlbridge_core::{canonical_driver, DbConfig, Error, Result, SqlDb};

/// Opens the database described by the `DB_*` environment, retrying
/// transient connection failures on the establisher's backoff schedule.
/// The driver comes from `DB_DRIVER` or the URL scheme and must be compiled
/// in through the matching cargo feature.
pub async fn open_env() -> Result<Box<dyn SqlDb>> {
    open_with(&DbConfig::from_env()).await
}

/// Like [`open_env`], for programs that cannot run without their database:
/// a permanent failure is logged and the process exits.
pub async fn open_env_or_die() -> Box<dyn SqlDb> {
    match open_env().await {
        Ok(db) => db,
        Err(error) => {
            log::error!("cannot connect to the database: {}", error);
            std::process::exit(1);
        }
    }
}

/// Opens the database described by an already-assembled configuration.
pub async fn open_with(config: &DbConfig) -> Result<Box<dyn SqlDb>> {
    match canonical_driver(config.driver.as_str()) {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let db = retry_open(config, {
                let config = config.clone();
                move || {
                    let config = config.clone();
                    Box::pin(async move { sqlbridge_sqlite::connect(&config).await })
                }
            })
            .await?;
            Ok(Box::new(db))
        }
        #[cfg(feature = "mysql")]
        "mysql" => {
            let db = retry_open(config, {
                let config = config.clone();
                move || {
                    let config = config.clone();
                    Box::pin(async move { sqlbridge_mysql::connect(&config).await })
                }
            })
            .await?;
            Ok(Box::new(db))
        }
        #[cfg(feature = "postgres")]
        "postgres" => {
            let db = retry_open(config, {
                let config = config.clone();
                move || {
                    let config = config.clone();
                    Box::pin(async move { sqlbridge_postgres::connect(&config).await })
                }
            })
            .await?;
            Ok(Box::new(db))
        }
        #[cfg(feature = "pgx")]
        "pgx" => {
            let db = retry_open(config, {
                let env = sqlbridge_pgx::PgEnv::from_env();
                let config = config.clone();
                move || {
                    let env = env.clone();
                    let config = config.clone();
                    Box::pin(async move { sqlbridge_pgx::connect(&env, &config).await })
                }
            })
            .await?;
            Ok(Box::new(db))
        }
        other => Err(Error::Unsupported(format!(
            "unknown or disabled driver {}; enable the matching cargo feature",
            other
        ))),
    }
}

#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres", feature = "pgx"))]
async fn retry_open<T, F>(config: &DbConfig, open: F) -> Result<T>
where
    F: FnMut() -> futures::future::BoxFuture<'static, Result<T>>,
{
    let backoff = sqlbridge_core::Backoff::with_timeout(config.connect_timeout);
    let delay = (!config.connect_delay.is_zero()).then_some(config.connect_delay);
    sqlbridge_core::connect_with_retry(&backoff, delay, open).await
}
