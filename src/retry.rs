/// Retry-with-backoff executor
///
/// Wraps any fallible async operation. Retryability is decided by a predicate
/// (default: [`BotError::is_transient`]); the delay before attempt `n + 1` is
/// `min(max_ms, base_ms * 2^(n-1))`. Non-retryable errors are returned intact,
/// exhaustion is reported as [`BotError::RetryExhausted`].
use crate::config::QuotesConfig;
use crate::errors::{BotError, BotResult};
use crate::logger::{self, LogTag};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub type RetryPredicate = Arc<dyn Fn(&BotError) -> bool + Send + Sync>;
pub type RetryHook = Arc<dyn Fn(&BotError, u32) + Send + Sync>;
pub type DelayFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
pub struct RetryOptions {
    pub attempts: u32,
    pub base_ms: u64,
    pub max_ms: u64,
    /// Name used in retry log lines
    pub label: String,
    pub is_retryable: Option<RetryPredicate>,
    pub on_retry: Option<RetryHook>,
    /// Replaces `tokio::time::sleep` (tests, custom pacing)
    pub delay_fn: Option<DelayFn>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_ms: 200,
            max_ms: 2_000,
            label: "operation".to_string(),
            is_retryable: None,
            on_retry: None,
            delay_fn: None,
        }
    }
}

impl RetryOptions {
    /// Retry settings for quote-service requests
    pub fn from_quotes_config(config: &QuotesConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            base_ms: config.retry_base_ms,
            max_ms: config.retry_max_ms,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&BotError) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Some(Arc::new(predicate));
        self
    }

    pub fn with_on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&BotError, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn with_delay_fn<F>(mut self, delay: F) -> Self
    where
        F: Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.delay_fn = Some(Arc::new(delay));
        self
    }

    fn retryable(&self, err: &BotError) -> bool {
        match &self.is_retryable {
            Some(predicate) => predicate(err),
            None => err.is_transient(),
        }
    }
}

/// Delay before the attempt following failed attempt `attempt` (1-based)
pub fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let delay = base_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(delay.min(max_ms))
}

/// Run `operation` until it succeeds, fails non-retryably, or attempts run out
pub async fn with_retry<T, F, Fut>(mut operation: F, options: &RetryOptions) -> BotResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BotResult<T>>,
{
    let attempts = options.attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !options.retryable(&err) {
            return Err(err);
        }

        if attempt >= attempts {
            logger::error(
                LogTag::Retry,
                &format!("{} failed after {} attempts: {}", options.label, attempt, err),
            );
            return Err(BotError::RetryExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = backoff_delay(options.base_ms, options.max_ms, attempt);
        logger::warning(
            LogTag::Retry,
            &format!(
                "{} attempt {}/{} failed: {} (retrying in {}ms)",
                options.label,
                attempt,
                attempts,
                err,
                delay.as_millis()
            ),
        );

        if let Some(hook) = &options.on_retry {
            hook(&err, attempt);
        }

        match &options.delay_fn {
            Some(delay_fn) => delay_fn(delay).await,
            None => tokio::time::sleep(delay).await,
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{NetworkError, NetworkFaultKind};
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> BotError {
        NetworkError::new(NetworkFaultKind::ConnectionReset, "http://quote", "reset").into()
    }

    fn instant_options(delays: Arc<Mutex<Vec<Duration>>>) -> RetryOptions {
        RetryOptions::default().with_delay_fn(move |d| {
            delays.lock().push(d);
            async {}.boxed()
        })
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(200, 2_000, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(200, 2_000, 2), Duration::from_millis(400));
        assert_eq!(backoff_delay(200, 2_000, 4), Duration::from_millis(1_600));
        assert_eq!(backoff_delay(200, 2_000, 5), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(200, 2_000, 60), Duration::from_millis(2_000));
    }

    #[tokio::test]
    async fn test_succeeds_after_two_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(AtomicU32::new(0));
        let delays = Arc::new(Mutex::new(Vec::new()));

        let retries_hook = retries.clone();
        let options = instant_options(delays.clone())
            .with_label("v3 quote")
            .with_on_retry(move |_, _| {
                retries_hook.fetch_add(1, Ordering::SeqCst);
            });

        logger::capture::start();

        let calls_op = calls.clone();
        let result = with_retry(
            || {
                let n = calls_op.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok("quoted")
                    }
                }
            },
            &options,
        )
        .await;

        assert_eq!(result.unwrap(), "quoted");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let warnings: Vec<String> = logger::capture::take()
            .into_iter()
            .filter(|line| line.contains("[WARNING]") && line.contains("[RETRY]"))
            .collect();
        assert_eq!(warnings.len(), 2, "{:?}", warnings);
        assert!(warnings[0].contains("v3 quote attempt 1/3 failed"));
        assert!(warnings[1].contains("v3 quote attempt 2/3 failed"));
        assert_eq!(retries.load(Ordering::SeqCst), 2);
        assert_eq!(
            *delays.lock(),
            vec![Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let options = instant_options(Arc::new(Mutex::new(Vec::new()))).with_attempts(5);

        let calls_op = calls.clone();
        let result: BotResult<()> = with_retry(
            || {
                calls_op.fetch_add(1, Ordering::SeqCst);
                async { Err(BotError::validation("amount", "must be positive")) }
            },
            &options,
        )
        .await;

        assert!(matches!(result, Err(BotError::Validation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let options = instant_options(Arc::new(Mutex::new(Vec::new())));

        let calls_op = calls.clone();
        let result: BotResult<()> = with_retry(
            || {
                calls_op.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            },
            &options,
        )
        .await;

        match result {
            Err(BotError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, BotError::Network(_)));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let options = instant_options(Arc::new(Mutex::new(Vec::new())))
            .with_predicate(|err| matches!(err, BotError::Parse(_)));

        let calls_op = calls.clone();
        let result: BotResult<()> = with_retry(
            || {
                calls_op.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            },
            &options,
        )
        .await;

        assert!(matches!(result, Err(BotError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
