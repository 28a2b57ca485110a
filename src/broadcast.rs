//! Fan-out delivery
//!
//! Best-effort, non-blocking delivery of lines into session mailboxes.
//! A full or closed mailbox drops the line for that recipient only.

use std::sync::Arc;

use tracing::trace;

use crate::registry::Registry;
use crate::session::Session;

/// Outcome of one fan-out
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Mailboxes that accepted the line
    pub delivered: usize,
    /// Mailboxes that were full or closed
    pub dropped: usize,
}

/// Delivers lines to registered sessions
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Enqueue `line` for every session except `exclude`
    ///
    /// `None` (or an empty handle) excludes nobody. Never waits on a
    /// recipient.
    pub async fn broadcast(&self, exclude: Option<&str>, line: &str) -> Delivery {
        let exclude = exclude.filter(|handle| !handle.is_empty());
        let mut delivery = Delivery::default();

        self.registry
            .for_each(|session| {
                if Some(session.handle()) == exclude {
                    return;
                }
                offer(session, line, &mut delivery);
            })
            .await;

        delivery
    }

    /// Enqueue `line` for a single session
    ///
    /// Same drop-on-full policy as [`Broadcaster::broadcast`]. Returns
    /// `None` if `target` is not registered.
    pub async fn send_to(&self, target: &str, line: &str) -> Option<Delivery> {
        let session = self.registry.lookup(target).await?;
        let mut delivery = Delivery::default();
        offer(&session, line, &mut delivery);
        Some(delivery)
    }
}

fn offer(session: &Session, line: &str, delivery: &mut Delivery) {
    match session.try_deliver(line) {
        Ok(()) => delivery.delivered += 1,
        Err(e) => {
            trace!(handle = %session.handle, error = %e, "line dropped");
            delivery.dropped += 1;
        }
    }
}
