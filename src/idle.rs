//! Idle monitor
//!
//! One rearmable deadline per session. The deadline lives in a watch
//! channel; the waiter task sleeps until it and fires only if no reset
//! arrived in the meantime, so a reset can never be overtaken by a
//! stale expiry.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Default inactivity limit
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Inactivity deadline for one session
///
/// Dropping the monitor (or calling [`IdleMonitor::stop`]) cancels the
/// waiter without firing.
#[derive(Debug)]
pub struct IdleMonitor {
    deadline: watch::Sender<Instant>,
    timeout: Duration,
    task: JoinHandle<()>,
}

impl IdleMonitor {
    /// Arm the deadline at `now + timeout`
    ///
    /// `on_expire` runs at most once, when the deadline passes without
    /// a reset.
    pub fn spawn<F>(timeout: Duration, on_expire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (deadline, rx) = watch::channel(Instant::now() + timeout);
        let task = tokio::spawn(wait_for_expiry(rx, on_expire));
        Self {
            deadline,
            timeout,
            task,
        }
    }

    /// Push the deadline out to `now + timeout`
    pub fn reset(&self) {
        self.deadline.send_replace(Instant::now() + self.timeout);
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for IdleMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn wait_for_expiry<F>(mut deadline: watch::Receiver<Instant>, on_expire: F)
where
    F: Future<Output = ()>,
{
    loop {
        let armed = *deadline.borrow_and_update();
        tokio::select! {
            _ = time::sleep_until(armed) => {
                // A reset that landed while the sleep was completing wins
                match deadline.has_changed() {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(_) => return,
                }
            }
            changed = deadline.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }

    on_expire.await;
}
