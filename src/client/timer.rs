// Scoped timers: each one is a tokio task that dies with its guard.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};

/// Owns a spawned task and aborts it when dropped.
#[derive(Debug)]
pub struct TimerGuard {
    handle: AbortHandle,
}

impl TimerGuard {
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(fut).abort_handle(),
        }
    }

    /// Deliver a clone of `event` every `period`, starting one period from now.
    /// Stops on its own once the receiver is gone.
    pub fn every<E>(period: Duration, tx: UnboundedSender<E>, event: E) -> Self
    where
        E: Clone + Send + 'static,
    {
        Self::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if tx.send(event.clone()).is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
