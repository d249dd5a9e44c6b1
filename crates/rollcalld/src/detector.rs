//! Face detector boundary and model registry.
//!
//! The neural detector/encoder is an external collaborator: the engine
//! depends only on the observation shape it returns, never on its
//! internals.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rollcall_core::types::{BoundingBox, DetectionObservation, FaceDescriptor, Landmarks};

use crate::capture::{encode_snapshot, Frame};

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("face models failed to load: {0}")]
    LoadFailed(String),
    #[error("detection failed: {0}")]
    Inference(String),
    #[error("snapshot for detection could not be encoded: {0}")]
    Encode(String),
}

/// What the detector should extract per face.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DetectOptions {
    pub landmarks: bool,
    pub descriptors: bool,
}

impl DetectOptions {
    /// High-frequency overlay pass: boxes and landmarks, no embedding.
    pub fn landmarks_only() -> Self {
        Self {
            landmarks: true,
            descriptors: false,
        }
    }

    /// Full recognition pass: boxes, landmarks, and descriptors.
    pub fn full() -> Self {
        Self {
            landmarks: true,
            descriptors: true,
        }
    }
}

/// Capability boundary for the external face detector/encoder.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Load (or confirm) the underlying models. Called once through the
    /// [`ModelRegistry`], never directly.
    async fn load_models(&self) -> Result<(), DetectError>;

    /// Detect faces in one frame.
    async fn detect(
        &self,
        frame: &Frame,
        options: DetectOptions,
    ) -> Result<Vec<DetectionObservation>, DetectError>;
}

/// Model lifecycle, tracked explicitly rather than by inspecting the
/// detector's internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

/// Process-wide registry around the detector's load lifecycle.
pub struct ModelRegistry {
    state: Mutex<ModelState>,
    load_lock: tokio::sync::Mutex<()>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ModelState::Unloaded),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ModelState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Loaded
    }

    /// Load the models once. Concurrent callers serialize; later callers
    /// observe the first load's outcome. A failed load may be retried.
    pub async fn load(&self, detector: &dyn FaceDetector) -> Result<(), DetectError> {
        let _guard = self.load_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        self.set_state(ModelState::Loading);
        match detector.load_models().await {
            Ok(()) => {
                self.set_state(ModelState::Loaded);
                tracing::info!("face models loaded");
                Ok(())
            }
            Err(e) => {
                self.set_state(ModelState::Failed);
                tracing::error!(error = %e, "face model load failed");
                Err(e)
            }
        }
    }

    fn set_state(&self, next: ModelState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Detection request sent to the sidecar.
#[derive(Debug, Serialize)]
struct DetectRequest {
    #[serde(rename = "imageBase64")]
    image_base64: String,
    #[serde(flatten)]
    options: DetectOptions,
}

/// One detected face as the sidecar reports it. Descriptors arrive as
/// raw float arrays; invalid lengths are dropped with a warning rather
/// than failing the batch.
#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(rename = "box")]
    bbox: BoundingBox,
    #[serde(default)]
    landmarks: Option<Landmarks>,
    #[serde(default)]
    descriptor: Option<Vec<f32>>,
}

/// HTTP client for a face detection/embedding sidecar service.
pub struct RemoteDetector {
    http: reqwest::Client,
    base_url: String,
    snapshot_quality: u8,
}

impl RemoteDetector {
    pub fn new(base_url: impl Into<String>, snapshot_quality: u8) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            snapshot_quality,
        }
    }
}

#[async_trait]
impl FaceDetector for RemoteDetector {
    async fn load_models(&self) -> Result<(), DetectError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(|e| DetectError::LoadFailed(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(DetectError::LoadFailed(format!(
                "detector sidecar answered {}",
                response.status()
            )))
        }
    }

    async fn detect(
        &self,
        frame: &Frame,
        options: DetectOptions,
    ) -> Result<Vec<DetectionObservation>, DetectError> {
        let image_base64 =
            encode_snapshot(frame, self.snapshot_quality).map_err(|e| DetectError::Encode(e.to_string()))?;
        let request = DetectRequest {
            image_base64,
            options,
        };

        let detections: Vec<WireDetection> = self
            .http
            .post(format!("{}/detect", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| DetectError::Inference(e.to_string()))?
            .json()
            .await
            .map_err(|e| DetectError::Inference(format!("unexpected detector response: {e}")))?;

        Ok(detections
            .into_iter()
            .enumerate()
            .map(|(index, wire)| {
                let descriptor = wire.descriptor.and_then(|values| {
                    let len = values.len();
                    let parsed = FaceDescriptor::new(values);
                    if parsed.is_none() {
                        tracing::warn!(index, len, "dropping descriptor with invalid length");
                    }
                    parsed
                });
                DetectionObservation {
                    index,
                    bbox: wire.bbox,
                    landmarks: wire.landmarks,
                    descriptor,
                }
            })
            .collect())
    }
}
