//! Wall-clock duration timer for an active recording.
//!
//! Counts whole seconds of active (unpaused) recording time into a shared
//! counter and publishes one duration frame per second. The owning session
//! stops the timer on pause and spawns a fresh one on resume, so the
//! counter only ever advances while capture is live; a partial second cut
//! off by a pause is not carried over.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::event::{EngineEvent, EventSender};

/// Cadence of duration frames.
pub const DURATION_TICK: Duration = Duration::from_secs(1);

/// Called at most once, when elapsed time reaches the configured cap.
pub type CapHook = Box<dyn FnOnce() + Send>;

/// Periodic task that advances the elapsed-seconds counter.
///
/// Holds only cheap clones of session state, never the session's lifecycle
/// lock, so the session can await [`stop`](Self::stop) while holding that
/// lock. Once `stop` returns, no further duration frame is emitted and the
/// counter no longer moves.
pub struct DurationTimer {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DurationTimer {
    /// Start ticking from the counter's current value. When `cap_secs` is
    /// reached the final duration frame is still emitted, then `on_cap`
    /// fires and the timer task ends on its own.
    pub fn spawn(
        elapsed: Arc<AtomicU64>,
        cap_secs: Option<u64>,
        events: EventSender,
        on_cap: CapHook,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        // Anchored here, not at the task's first poll: the first tick lands
        // one full second after spawn, and ticks that come due while the
        // task is unpolled replay in order instead of slipping.
        let mut ticker = time::interval_at(Instant::now() + DURATION_TICK, DURATION_TICK);
        let task = tokio::spawn(async move {
            let mut on_cap = Some(on_cap);
            loop {
                tokio::select! {
                    // Due ticks drain before shutdown is honored.
                    biased;
                    _ = ticker.tick() => {
                        let secs = elapsed.fetch_add(1, Ordering::SeqCst) + 1;
                        let open = events.emit_tick(EngineEvent::Duration(secs));
                        if let Some(cap) = cap_secs {
                            if secs >= cap {
                                debug!("Recording reached {}s cap", cap);
                                if let Some(hook) = on_cap.take() {
                                    hook();
                                }
                                break;
                            }
                        }
                        if !open {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        Self {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Stop ticking and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
