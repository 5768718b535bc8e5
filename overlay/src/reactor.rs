//! Background reactors
//!
//! The event reactor is a plain thread blocked on the host's event stream.
//! The timeout reactor is an async loop on its own current-thread runtime so
//! a changed deadline can cancel a pending sleep.

use std::sync::Arc;

use crate::engine::Shared;
use crate::platform::{EventSource, SurfaceEvent};

/// Repaint damaged rows until shutdown or until the host goes away
///
/// Damage is accumulated until the host says no more is pending
/// (`count == 0`), then the union is repainted under the lock once.
pub(crate) fn run_event_reactor(shared: Arc<Shared>, events: Arc<dyn EventSource>) {
    tracing::debug!("Event reactor started");
    let mut pending: Option<(u32, u32)> = None;

    loop {
        // Blocks without the lock held
        let event = events.wait();
        if shared.is_shutting_down() {
            break;
        }

        match event {
            SurfaceEvent::Damaged { y, height, count } => {
                if height > 0 {
                    let end = y.saturating_add(height);
                    pending = Some(match pending {
                        Some((start, stop)) => (start.min(y), stop.max(end)),
                        None => (y, end),
                    });
                }
                if count == 0
                    && let Some((start, stop)) = pending.take()
                    && let Err(e) = shared.repaint(start, stop - start)
                {
                    tracing::warn!(error = %e, "Repaint failed");
                }
            }
            SurfaceEvent::Closed => {
                tracing::warn!("Host connection closed, event reactor exiting");
                break;
            }
            SurfaceEvent::Other => {}
        }
    }
    tracing::debug!("Event reactor stopped");
}

/// Hide the display whenever its deadline passes
///
/// Sleeps until the current deadline, or indefinitely when there is none,
/// and re-reads the deadline whenever it is signalled to have changed.
pub(crate) async fn run_timeout_reactor(shared: Arc<Shared>) {
    tracing::debug!("Timeout reactor started");
    loop {
        let deadline = {
            let state = shared.lock();
            if state.shutting_down {
                break;
            }
            state.deadline
        };

        match deadline {
            None => shared.timeout_changed.notified().await,
            Some(deadline) => {
                tokio::select! {
                    _ = shared.timeout_changed.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
        }

        // Waking is not proof of expiry; hide_if_expired checks the clock
        shared.hide_if_expired();
    }
    tracing::debug!("Timeout reactor stopped");
}
