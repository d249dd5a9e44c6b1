//! Session lifecycle: pending → active → completed, and the teardown
//! paths that stop detection and release the camera.

use std::sync::Arc;

use rollcall_api::AttendanceBackend;
use rollcall_core::types::SessionStatus;

use crate::cache::SessionCache;
use crate::capture::FrameSource;
use crate::engine::EngineError;
use crate::loops::{LoopGuard, LoopMode};
use crate::overlay::OverlaySink;

/// Owns the session status and the single active detection loop.
pub struct SessionController {
    backend: Arc<dyn AttendanceBackend>,
    cache: Arc<SessionCache>,
    active_loop: tokio::sync::Mutex<Option<LoopGuard>>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn AttendanceBackend>, cache: Arc<SessionCache>) -> Self {
        Self {
            backend,
            cache,
            active_loop: tokio::sync::Mutex::new(None),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.cache.session_status().unwrap_or(SessionStatus::Pending)
    }

    /// Mark the session active on first teacher interaction. A completed
    /// session cannot be reopened.
    pub async fn open(&self, session_id: &str) -> Result<(), EngineError> {
        match self.status() {
            SessionStatus::Active => Ok(()),
            SessionStatus::Completed => Err(EngineError::SessionCompleted),
            SessionStatus::Pending => {
                self.backend
                    .set_session_status(session_id, SessionStatus::Active)
                    .await?;
                self.cache.set_session_status(SessionStatus::Active);
                tracing::info!(session = session_id, "session opened");
                Ok(())
            }
        }
    }

    /// Stop whichever loop is running, then install the new one. The
    /// two modes are never live at the same time.
    pub async fn swap_loop(&self, make: impl FnOnce() -> LoopGuard) {
        let mut slot = self.active_loop.lock().await;
        if let Some(previous) = slot.take() {
            let _ = previous.cancel().await;
        }
        *slot = Some(make());
    }

    /// Cancel the active loop (if any) and wait for it to exit, which
    /// clears the overlay on the way out.
    pub async fn stop_loop(&self) {
        let previous = self.active_loop.lock().await.take();
        if let Some(guard) = previous {
            let _ = guard.cancel().await;
        }
    }

    pub async fn active_mode(&self) -> Option<LoopMode> {
        self.active_loop.lock().await.as_ref().map(|g| g.mode())
    }

    /// End the session: stop detection, release the camera, clear the
    /// overlay, then persist the status. Irreversible from the client.
    pub async fn complete(
        &self,
        session_id: &str,
        camera: &Arc<dyn FrameSource>,
        overlay: &Arc<dyn OverlaySink>,
    ) -> Result<(), EngineError> {
        let current = self.status();
        if !current.can_transition_to(SessionStatus::Completed) {
            return Err(EngineError::SessionCompleted);
        }
        self.stop_loop().await;
        camera.shutdown();
        overlay.clear();
        self.backend
            .set_session_status(session_id, SessionStatus::Completed)
            .await?;
        self.cache.set_session_status(SessionStatus::Completed);
        tracing::info!(session = session_id, "session completed");
        Ok(())
    }

    /// Navigation-away path: same local cleanup as completing, without
    /// the server-side status write. Idempotent.
    pub async fn teardown(&self, camera: &Arc<dyn FrameSource>, overlay: &Arc<dyn OverlaySink>) {
        self.stop_loop().await;
        camera.shutdown();
        overlay.clear();
    }
}
