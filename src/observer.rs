//! # Change Observer
//! Trailing-edge debounce between raw feed mutations and the controller.
//!
//! Every event (re)arms the timer; the consumer runs once the window passes
//! without further events. Events arriving while the consumer runs arm the
//! next window, so no pending invocation is lost.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drive `on_quiet` from `rx` until the channel closes. A window still
    /// pending at close is dropped, the same as a cancelled timer.
    /// Returns how many times `on_quiet` ran.
    pub async fn run<T, F, Fut>(&self, mut rx: mpsc::Receiver<T>, mut on_quiet: F) -> usize
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut deadline: Option<Instant> = None;
        let mut fired = 0usize;

        loop {
            match deadline {
                None => match rx.recv().await {
                    Some(_) => deadline = Some(Instant::now() + self.window),
                    None => break,
                },
                Some(at) => {
                    tokio::select! {
                        ev = rx.recv() => match ev {
                            Some(_) => deadline = Some(Instant::now() + self.window),
                            None => break,
                        },
                        _ = time::sleep_until(at) => {
                            deadline = None;
                            fired += 1;
                            tracing::trace!(target: "observer", fired, "quiet period, running controller");
                            on_quiet().await;
                        }
                    }
                }
            }
        }

        tracing::debug!(target: "observer", fired, "mutation stream closed");
        fired
    }
}
