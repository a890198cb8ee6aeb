use deadpool_postgres::SslMode;
use std::env;

/// Endpoint settings read from the conventional `PG*` variables, the same
/// ones psql honors. Every field has a localhost default so a stock
/// PostgreSQL install needs no environment at all.
#[derive(Debug, Clone)]
pub struct PgEnv {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub sslmode: String,
}

impl Default for PgEnv {
    fn default() -> Self {
        PgEnv {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            sslmode: "disable".to_string(),
        }
    }
}

impl PgEnv {
    /// Reads `PGHOST`, `PGPORT`, `PGDATABASE`, `PGUSER`, `PGPASSWORD` and
    /// `PGSSLMODE`, falling back to the defaults for anything unset.
    pub fn from_env() -> PgEnv {
        let defaults = PgEnv::default();
        PgEnv {
            host: env_or("PGHOST", defaults.host),
            port: env::var("PGPORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            dbname: env_or("PGDATABASE", defaults.dbname),
            user: env_or("PGUSER", defaults.user),
            password: env_or("PGPASSWORD", defaults.password),
            sslmode: env_or("PGSSLMODE", defaults.sslmode),
        }
    }

    pub(crate) fn ssl_mode(&self) -> SslMode {
        match self.sslmode.as_str() {
            "disable" => SslMode::Disable,
            "require" => SslMode::Require,
            _ => SslMode::Prefer,
        }
    }
}

fn env_or(name: &str, fallback: String) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_localhost() {
        let defaults = PgEnv::default();
        assert_eq!(defaults.host, "localhost");
        assert_eq!(defaults.port, 5432);
        assert_eq!(defaults.dbname, "postgres");
        assert_eq!(defaults.user, "postgres");
        assert_eq!(defaults.password, "");
        assert_eq!(defaults.sslmode, "disable");
    }

    #[test]
    fn ssl_modes() {
        let mut env = PgEnv::default();
        assert!(matches!(env.ssl_mode(), SslMode::Disable));
        env.sslmode = "require".to_string();
        assert!(matches!(env.ssl_mode(), SslMode::Require));
        env.sslmode = "allow".to_string();
        assert!(matches!(env.ssl_mode(), SslMode::Prefer));
    }
}
