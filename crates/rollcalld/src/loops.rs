//! Periodic detection loops with owned cancellation tokens.
//!
//! A loop is a spawned task driven by a fixed-period interval. The
//! [`LoopGuard`] returned at spawn time is the only way to stop it;
//! cancelling wakes the task, which clears the overlay and exits. No
//! timer survives its guard.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::Engine;

/// The two operating modes, mutually exclusive at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    /// High-frequency overlay pass: boxes and landmarks, no recognition.
    Landmark,
    /// Lower-frequency full-recognition pass feeding the coordinator.
    Auto,
}

/// Owned cancellation token for one running loop.
pub struct LoopGuard {
    mode: LoopMode,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl LoopGuard {
    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    /// Signal the loop to stop and hand back its join handle so callers
    /// can wait for the exit path (overlay clearing) to finish.
    pub fn cancel(self) -> JoinHandle<()> {
        let _ = self.cancel_tx.send(true);
        self.handle
    }
}

/// Spawn the detection loop for `mode`. Preconditions are the engine's
/// responsibility; this only owns timing and cancellation.
pub fn spawn_detection_loop(engine: Engine, mode: LoopMode) -> LoopGuard {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let period = match mode {
        LoopMode::Landmark => engine.config().landmark_period,
        LoopMode::Auto => engine.config().auto_period,
    };
    let handle = tokio::spawn(run_loop(engine, mode, period, cancel_rx));
    LoopGuard {
        mode,
        cancel_tx,
        handle,
    }
}

async fn run_loop(
    engine: Engine,
    mode: LoopMode,
    period: std::time::Duration,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    // A cycle that overruns its period must not cause a burst of
    // catch-up ticks; observations are independent per cycle.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(?mode, ?period, "detection loop started");
    loop {
        tokio::select! {
            _ = cancelled.changed() => break,
            _ = interval.tick() => {
                engine.run_cycle(mode, &cancelled).await;
                if *cancelled.borrow() {
                    break;
                }
            }
        }
    }
    engine.clear_overlay();
    tracing::info!(?mode, "detection loop stopped");
}
