use crate::{Dialect, DialectIndex, Quoter};
use std::env;
use std::time::Duration;

/// Connection settings assembled from the environment. Command-line layers
/// sit above this; drivers read only the fields they understand.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub driver: String,
    pub dialect: Dialect,
    pub max_connections: u32,
    /// Slept once before the first connection attempt.
    pub connect_delay: Duration,
    /// Total budget for the retry loop; zero means retry forever.
    pub connect_timeout: Duration,
}

impl DbConfig {
    /// Reads `DB_URL`, `DB_DRIVER`, `DB_DIALECT`, `DB_QUOTE`,
    /// `DB_MAX_CONNECTIONS`, `DB_CONNECT_DELAY` and `DB_CONNECT_TIMEOUT`.
    /// Unset variables fall back to a local sqlite setup so tests and small
    /// tools run with no environment at all.
    pub fn from_env() -> DbConfig {
        let url = env_or("DB_URL", "sqlite::memory:");
        let driver = match env::var("DB_DRIVER").ok().filter(|v| !v.is_empty()) {
            Some(driver) => canonical_driver(&driver).to_string(),
            None => driver_of(&url).to_string(),
        };
        let dialect = env::var("DB_DIALECT")
            .ok()
            .and_then(|name| Dialect::pick(&name))
            .unwrap_or_else(|| default_dialect(&driver));
        let dialect = match env::var("DB_QUOTE").ok().as_deref().and_then(Quoter::parse) {
            Some(quoter) => dialect.with_quoter(quoter),
            None => dialect,
        };
        DbConfig {
            url,
            driver,
            dialect,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(8),
            connect_delay: env::var("DB_CONNECT_DELAY")
                .ok()
                .and_then(|v| parse_duration(&v))
                .unwrap_or(Duration::ZERO),
            connect_timeout: env::var("DB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|v| parse_duration(&v))
                .unwrap_or(Duration::from_secs(60)),
        }
    }
}

fn env_or(name: &str, fallback: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| fallback.to_string())
}

/// The driver a connection URL's scheme implies, for when `DB_DRIVER` is
/// unset. `pgx` has no scheme of its own; it must be selected explicitly.
fn driver_of(url: &str) -> &'static str {
    match url::Url::parse(url).ok().as_ref().map(url::Url::scheme) {
        Some("mysql") => "mysql",
        Some("postgres" | "postgresql") => "postgres",
        _ => "sqlite",
    }
}

/// Collapses driver name aliases: `sqlite3` means `sqlite` and `postgresql`
/// means `postgres`, matching what [`Dialect::pick`] accepts.
pub fn canonical_driver(name: &str) -> &str {
    match name {
        "sqlite3" => "sqlite",
        "postgresql" => "postgres",
        other => other,
    }
}

fn default_dialect(driver: &str) -> Dialect {
    match canonical_driver(driver) {
        "mysql" => Dialect::mysql(),
        "postgres" => Dialect::postgres(),
        "pgx" => Dialect::pgx(),
        _ => Dialect::sqlite(),
    }
}

/// Accepts `500ms`, `5s`, `2m` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Some(ms) = value.strip_suffix("ms") {
        return ms.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(m) = value.strip_suffix('m') {
        return m.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    let seconds = value.strip_suffix('s').unwrap_or(value);
    seconds.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("quick"), None);
    }

    #[test]
    fn scheme_implies_driver() {
        assert_eq!(driver_of("mysql://u:p@localhost/db"), "mysql");
        assert_eq!(driver_of("postgres://localhost/db"), "postgres");
        assert_eq!(driver_of("postgresql://localhost/db"), "postgres");
        assert_eq!(driver_of("sqlite::memory:"), "sqlite");
        assert_eq!(driver_of("plain.db"), "sqlite");
    }

    #[test]
    fn driver_implies_dialect() {
        assert_eq!(default_dialect("mysql").index(), DialectIndex::Mysql);
        assert_eq!(default_dialect("pgx").index(), DialectIndex::Pgx);
        assert_eq!(default_dialect("anything").index(), DialectIndex::Sqlite);
    }

    #[test]
    fn driver_aliases_collapse() {
        assert_eq!(canonical_driver("sqlite3"), "sqlite");
        assert_eq!(canonical_driver("postgresql"), "postgres");
        assert_eq!(canonical_driver("mysql"), "mysql");
        assert_eq!(default_dialect("sqlite3").index(), DialectIndex::Sqlite);
        assert_eq!(default_dialect("postgresql").index(), DialectIndex::Postgres);
    }
}
