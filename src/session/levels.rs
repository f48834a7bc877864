//! Input level metering: a rolling window of recent levels plus the
//! sampler task that fills it while a recording is live.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::event::{EngineEvent, EventSender};

/// How often the sampler reads the input meter.
pub const LEVEL_TICK: Duration = Duration::from_millis(100);

/// Default number of levels kept in the rolling window.
pub const DEFAULT_LEVEL_WINDOW: usize = 50;

/// Fixed-capacity window of recent input levels, oldest first.
///
/// Values are normalized to `0.0..=1.0`; out-of-range samples are clamped
/// on the way in so a misbehaving meter cannot distort the waveform view.
#[derive(Debug, Clone)]
pub struct LevelWindow {
    capacity: usize,
    levels: VecDeque<f32>,
}

impl LevelWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            levels: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append a level, evicting the oldest once the window is full.
    pub fn push(&mut self, level: f32) {
        if self.levels.len() == self.capacity {
            self.levels.pop_front();
        }
        self.levels.push_back(level.clamp(0.0, 1.0));
    }

    /// Copy of the window contents, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        self.levels.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Periodic task that samples a recorder's meter into a shared window and
/// publishes the updated snapshot as a level frame.
///
/// The sampler owns nothing but cheap clones, so the session can stop it
/// while holding its own lifecycle lock. After [`stop`](Self::stop) returns
/// no further frame is emitted.
pub struct LevelSampler {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LevelSampler {
    pub fn spawn(
        meter: watch::Receiver<f32>,
        window: Arc<Mutex<LevelWindow>>,
        events: EventSender,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        // Anchored at spawn, first sample one full tick in; samples that
        // come due while the task is unpolled replay instead of slipping.
        let mut ticker = time::interval_at(Instant::now() + LEVEL_TICK, LEVEL_TICK);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Due samples drain before shutdown is honored.
                    biased;
                    _ = ticker.tick() => {
                        let level = *meter.borrow();
                        let snapshot = {
                            let mut window = window.lock().await;
                            window.push(level);
                            window.snapshot()
                        };
                        if !events.emit_tick(EngineEvent::Levels(snapshot)) {
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

    /// Stop sampling and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest_at_capacity() {
        let mut window = LevelWindow::new(3);
        for level in [0.1, 0.2, 0.3, 0.4, 0.5] {
            window.push(level);
        }
        assert_eq!(window.snapshot(), vec![0.3, 0.4, 0.5]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn window_clamps_out_of_range_levels() {
        let mut window = LevelWindow::new(4);
        window.push(1.7);
        window.push(-0.3);
        assert_eq!(window.snapshot(), vec![1.0, 0.0]);
    }

    #[test]
    fn cleared_window_reads_empty() {
        let mut window = LevelWindow::new(2);
        window.push(0.5);
        window.clear();
        assert!(window.is_empty());
        assert!(window.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sampler_emits_one_frame_per_tick() {
        let (meter_tx, meter_rx) = watch::channel(0.5f32);
        let window = Arc::new(Mutex::new(LevelWindow::new(DEFAULT_LEVEL_WINDOW)));
        let (events, mut rx) = EventSender::channel(64);

        let sampler = LevelSampler::spawn(meter_rx, window.clone(), events);
        time::sleep(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        sampler.stop().await;

        let mut frames = 0;
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::Levels(levels) = event {
                frames += 1;
                assert!(levels.iter().all(|l| (*l - 0.5).abs() < f32::EPSILON));
            }
        }
        assert_eq!(frames, 10, "one frame per 100ms over 1s");
        assert_eq!(window.lock().await.len(), 10);
        drop(meter_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_sampler_emits_nothing_further() {
        let (_meter_tx, meter_rx) = watch::channel(0.0f32);
        let window = Arc::new(Mutex::new(LevelWindow::new(8)));
        let (events, mut rx) = EventSender::channel(64);

        let sampler = LevelSampler::spawn(meter_rx, window, events);
        time::sleep(Duration::from_millis(300)).await;
        tokio::task::yield_now().await;
        sampler.stop().await;
        while rx.try_recv().is_ok() {}

        time::sleep(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err(), "no frames after stop");
    }
}
