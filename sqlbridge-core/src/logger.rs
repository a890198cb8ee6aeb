use crate::SqlValue;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-handle query logging switch shared between a database and every
/// connection and transaction derived from it.
///
/// Query logging is off by default and toggled at runtime; errors are always
/// logged regardless of the switch.
#[derive(Debug, Default)]
pub struct Logger {
    enabled: AtomicBool,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn log_query(&self, sql: &str, args: &[SqlValue]) {
        if self.enabled() {
            if args.is_empty() {
                log::info!("query: {}", sql);
            } else {
                log::info!("query: {} args: {:?}", sql, args);
            }
        }
    }

    pub fn log_error(&self, sql: &str, error: &dyn std::fmt::Display) {
        log::error!("query failed: {}\nsql: {}", error, sql);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let logger = Logger::new();
        assert!(!logger.enabled());
        logger.enable(true);
        assert!(logger.enabled());
        logger.enable(false);
        assert!(!logger.enabled());
    }
}
