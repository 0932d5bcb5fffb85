//! The repeating frame tick.
//!
//! A tokio task ticks the shared scene at a fixed rate until it is stopped
//! or the scene is disposed. [`FrameLoop::stop`] cancels and aborts the task
//! synchronously, so no frame starts after it returns.

use super::{AvatarSceneController, SceneState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Highest tick rate the loop will run at.
pub const MAX_FRAME_RATE: u32 = 1000;

/// Handle to a running frame loop.
pub struct FrameLoop {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FrameLoop {
    /// Start ticking `scene` at `frame_rate` frames per second, clamped to
    /// `1..=MAX_FRAME_RATE`.
    ///
    /// Must be called from within a tokio runtime. Frame time is measured
    /// in seconds from this call.
    pub fn start(scene: Arc<Mutex<AvatarSceneController>>, frame_rate: u32) -> Self {
        let cancel = CancellationToken::new();
        let frame_rate = frame_rate.clamp(1, MAX_FRAME_RATE);
        let period = Duration::from_secs_f64(1.0 / f64::from(frame_rate));
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(fps = frame_rate, "frame loop started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("frame loop cancelled");
                        break;
                    }
                    _ = tick.tick() => {
                        let Ok(mut guard) = scene.lock() else {
                            warn!("scene lock poisoned, stopping frame loop");
                            break;
                        };
                        if guard.state() == SceneState::Disposed {
                            debug!("scene disposed, stopping frame loop");
                            break;
                        }
                        guard.frame(started.elapsed().as_secs_f64());
                    }
                }
            }
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Stop ticking. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            info!("frame loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wait for the loop to end on its own, e.g. after the scene is
    /// disposed.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "frame loop task failed");
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::VisageConfig;
    use crate::scene::HeadlessBackend;
    use crate::signals::AvatarSignals;

    fn shared_scene() -> (
        Arc<Mutex<AvatarSceneController>>,
        Arc<Mutex<crate::scene::HeadlessStats>>,
    ) {
        let backend = HeadlessBackend::new();
        let stats = backend.stats();
        let mut scene =
            AvatarSceneController::with_seed(&VisageConfig::default(), AvatarSignals::new(), 9);
        scene.initialize(Box::new(backend), 320, 240).unwrap();
        (Arc::new(Mutex::new(scene)), stats)
    }

    #[tokio::test]
    async fn ticks_until_stopped() {
        let (scene, stats) = shared_scene();
        let mut frames = FrameLoop::start(Arc::clone(&scene), 60);
        assert!(frames.is_running());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let rendered = stats.lock().unwrap().frames;
        assert!(rendered >= 3, "only {rendered} frames");

        frames.stop();
        frames.stop();
        assert!(!frames.is_running());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_stop = stats.lock().unwrap().frames;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(stats.lock().unwrap().frames, after_stop);
    }

    #[tokio::test]
    async fn extreme_frame_rates_are_clamped() {
        for fps in [0, u32::MAX] {
            let (scene, stats) = shared_scene();
            let mut frames = FrameLoop::start(Arc::clone(&scene), fps);
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(frames.is_running(), "loop died at {fps} fps");
            assert!(stats.lock().unwrap().frames >= 1);
            frames.stop();
        }
    }

    #[tokio::test]
    async fn dispose_ends_the_loop() {
        let (scene, _) = shared_scene();
        let frames = FrameLoop::start(Arc::clone(&scene), 30);
        tokio::time::sleep(Duration::from_millis(100)).await;

        scene.lock().unwrap().dispose();
        tokio::time::timeout(Duration::from_secs(1), frames.join())
            .await
            .expect("frame loop did not end after dispose");
    }
}
