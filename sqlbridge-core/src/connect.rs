use crate::{Error, Result};
use futures::future::BoxFuture;
use std::time::{Duration, Instant};

/// Exponential backoff schedule with full jitter. `max_elapsed` of `None`
/// retries forever, the right default for services that cannot start without
/// their database.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed: Option<Duration>,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            initial: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: None,
        }
    }
}

impl Backoff {
    /// A schedule that gives up after `timeout`; zero means unbounded.
    pub fn with_timeout(timeout: Duration) -> Self {
        Backoff {
            max_elapsed: if timeout.is_zero() { None } else { Some(timeout) },
            ..Backoff::default()
        }
    }

    /// The next sleep, jittered to somewhere between half and the whole of
    /// the current interval, then grows the interval.
    fn next_delay(&self, interval: &mut Duration) -> Duration {
        let current = *interval;
        let grown = current.mul_f64(self.multiplier);
        *interval = grown.min(self.max_interval);
        let jitter = 0.5 + rand::random::<f64>() * 0.5;
        current.mul_f64(jitter)
    }
}

/// Calls `open` until it succeeds or fails permanently. Transient failures
/// (see [`Error::is_transient`]) are logged and retried on the backoff
/// schedule; any other error ends the loop. An optional `initial_delay` is
/// slept before the first attempt, for databases known to come up slowly.
pub async fn connect_with_retry<T, F>(
    backoff: &Backoff,
    initial_delay: Option<Duration>,
    mut open: F,
) -> Result<T>
where
    F: FnMut() -> BoxFuture<'static, Result<T>>,
{
    if let Some(delay) = initial_delay {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    let started = Instant::now();
    let mut interval = backoff.initial;
    loop {
        match open().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() => {
                let delay = backoff.next_delay(&mut interval);
                if let Some(max_elapsed) = backoff.max_elapsed {
                    if started.elapsed() + delay > max_elapsed {
                        return Err(error);
                    }
                }
                // Sub-millisecond noise only clutters the log line.
                let shown = Duration::from_millis(delay.as_millis() as u64);
                log::warn!("cannot connect yet ({}), retrying in {:?}", error, shown);
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Like [`connect_with_retry`], for programs that are useless without their
/// database: a permanent failure is logged and the process exits.
pub async fn connect_or_die<T, F>(
    backoff: &Backoff,
    initial_delay: Option<Duration>,
    open: F,
) -> T
where
    F: FnMut() -> BoxFuture<'static, Result<T>>,
{
    match connect_with_retry(backoff, initial_delay, open).await {
        Ok(value) => value,
        Err(error) => {
            log::error!("cannot connect to the database: {}", error);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn delay_grows_and_caps() {
        let backoff = Backoff {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_millis(300),
            max_elapsed: None,
        };
        let mut interval = backoff.initial;
        for _ in 0..8 {
            let delay = backoff.next_delay(&mut interval);
            assert!(delay <= Duration::from_millis(300));
            assert!(delay >= Duration::from_millis(50));
        }
        assert_eq!(interval, Duration::from_millis(300));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        assert!(Backoff::with_timeout(Duration::ZERO).max_elapsed.is_none());
        assert_eq!(
            Backoff::with_timeout(Duration::from_secs(5)).max_elapsed,
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let backoff = Backoff {
            initial: Duration::from_millis(1),
            multiplier: 1.0,
            max_interval: Duration::from_millis(1),
            max_elapsed: None,
        };
        let counter = attempts.clone();
        let value = connect_with_retry(&backoff, None, move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::connect("not up yet", true))
                } else {
                    Ok(42)
                }
            }
            .boxed()
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_ends_the_loop() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let err = connect_with_retry(&Backoff::default(), None, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::connect("bad credentials", false)) }.boxed()
        })
        .await
        .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_is_respected() {
        let backoff = Backoff {
            initial: Duration::from_millis(20),
            multiplier: 1.0,
            max_interval: Duration::from_millis(20),
            max_elapsed: Some(Duration::from_millis(1)),
        };
        let err = connect_with_retry(&backoff, None, || {
            async { Err::<(), _>(Error::connect("not up yet", true)) }.boxed()
        })
        .await
        .unwrap_err();
        assert!(err.is_transient());
    }
}
