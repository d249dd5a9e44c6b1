//! Overlay drawing boundary.

use rollcall_core::types::DetectionObservation;

/// Rendering surface for detection boxes and landmark meshes. Drawing
/// itself belongs to the embedding UI; the engine only guarantees that
/// every stop path clears whatever was drawn.
pub trait OverlaySink: Send + Sync {
    fn draw(&self, observations: &[DetectionObservation]);
    fn clear(&self);
}

/// Headless sink that reports detections through tracing.
pub struct LogOverlay;

impl OverlaySink for LogOverlay {
    fn draw(&self, observations: &[DetectionObservation]) {
        tracing::debug!(faces = observations.len(), "overlay draw");
    }

    fn clear(&self) {
        tracing::debug!("overlay cleared");
    }
}
