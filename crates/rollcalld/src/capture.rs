//! Frame source boundary and snapshot encoding.
//!
//! The camera itself is an external collaborator: the engine owns
//! exactly one [`FrameSource`] per session and must shut it down fully
//! on completion or teardown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera stream is not ready")]
    NotReady,
    #[error("frame capture failed: {0}")]
    Capture(String),
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
}

/// A captured RGB8 camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Interleaved RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Capability boundary for the live video stream.
pub trait FrameSource: Send + Sync {
    /// Whether the stream is open and producing frames.
    fn is_ready(&self) -> bool;

    /// Grab the current frame.
    fn capture_frame(&self) -> Result<Frame, CaptureError>;

    /// Stop all tracks. Idempotent; no frame may be captured afterwards.
    fn shutdown(&self);
}

/// JPEG-encode a frame and wrap it in base64 for the `imageBase64`
/// submission field.
pub fn encode_snapshot(frame: &Frame, quality: u8) -> Result<String, CaptureError> {
    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .encode(
            &frame.data,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(BASE64.encode(&jpeg))
}

/// Frame feed backed by a directory of still images, cycled in name
/// order. Used for headless daemon runs and diagnostics; a live webcam
/// source implements the same trait in the embedding deployment.
pub struct DirectoryFrameSource {
    paths: Vec<PathBuf>,
    cursor: AtomicUsize,
    stopped: AtomicBool,
}

impl DirectoryFrameSource {
    pub fn open(dir: &std::path::Path) -> Result<Self, CaptureError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| CaptureError::Capture(format!("{}: {e}", dir.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("jpg") | Some("jpeg") | Some("png")
                )
            })
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(CaptureError::Capture(format!(
                "no frames found in {}",
                dir.display()
            )));
        }
        Ok(Self {
            paths,
            cursor: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        })
    }
}

impl FrameSource for DirectoryFrameSource {
    fn is_ready(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    fn capture_frame(&self) -> Result<Frame, CaptureError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(CaptureError::NotReady);
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % self.paths.len();
        let path = &self.paths[idx];
        let img = image::open(path)
            .map_err(|e| CaptureError::Capture(format!("{}: {e}", path.display())))?
            .into_rgb8();
        Ok(Frame {
            width: img.width(),
            height: img.height(),
            data: img.into_raw(),
        })
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
