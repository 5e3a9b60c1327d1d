use std::{future::Future, time::Duration};

use tokio::{sync::oneshot, task::JoinHandle};

/// A single-shot timer armed with `arm`.
///
/// Cancellation is best-effort: once the deadline passed and `on_fire` started, it runs to
/// completion regardless of `cancel`. Dropping the handle leaves the timer armed.
#[derive(Debug)]
pub struct TimeoutHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
    join: JoinHandle<bool>,
}

pub fn arm<F>(duration: Duration, on_fire: F) -> TimeoutHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {
                on_fire.await;
                true
            }
            Ok(()) = cancel_rx => false,
        }
    });

    TimeoutHandle {
        cancel_tx: Some(cancel_tx),
        join,
    }
}

impl TimeoutHandle {
    /// Idempotent; a no-op once the timer fired.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Resolves to `true` if the timer fired, `false` if it was cancelled first.
    pub async fn wait(self) -> bool {
        self.join.await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Future<Output = ()> + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        (fired, async move {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_duration() {
        let (fired, on_fire) = counter();
        let handle = arm(Duration::from_secs(60), on_fire);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        assert!(handle.wait().await);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_deadline_suppresses_callback() {
        let (fired, on_fire) = counter();
        let mut handle = arm(Duration::from_secs(60), on_fire);

        tokio::time::sleep(Duration::from_secs(30)).await;
        handle.cancel();
        handle.cancel();

        assert!(!handle.wait().await);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_firing_is_a_no_op() {
        let (fired, on_fire) = counter();
        let mut handle = arm(Duration::from_secs(1), on_fire);

        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.cancel();

        assert!(handle.wait().await);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_still_fires() {
        let (fired, on_fire) = counter();
        drop(arm(Duration::from_secs(5), on_fire));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
