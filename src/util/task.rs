//! Repeating timer tasks with synchronous cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Shared cancellation flag. Cancelling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A callback fired every `period` on the tokio runtime until cancelled,
/// or until the callback returns false.
///
/// Dropping the task cancels it.
#[derive(Debug)]
pub struct RepeatingTask {
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawn the task; the first firing happens one period from now.
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(period: Duration, token: CancelToken, mut callback: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if task_token.is_cancelled() || !callback() {
                    break;
                }
            }
        });

        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn fires_until_cancelled() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let task = RepeatingTask::spawn(Duration::from_millis(5), CancelToken::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(40)).await;
        task.cancel();
        task.cancel();
        assert!(task.is_cancelled());

        let after_cancel = fired.load(Ordering::SeqCst);
        assert!(after_cancel >= 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn stops_when_callback_declines() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let _task = RepeatingTask::spawn(Duration::from_millis(5), CancelToken::new(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_cancels_the_shared_token() {
        let token = CancelToken::new();
        let task = RepeatingTask::spawn(Duration::from_millis(5), token.clone(), || true);
        drop(task);
        assert!(token.is_cancelled());
    }
}
