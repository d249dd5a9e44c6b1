//! Shared fakes for engine, submitter, and loop tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use rollcall_api::{ApiError, AttendanceBackend, ManualAttendance, VerifyAttendance};
use rollcall_core::types::{
    AbsenceRequest, AbsenceRequestStatus, AttendanceLogEntry, AttendanceSession, BoundingBox,
    DetectionObservation, FaceDescriptor, RosterMember, SessionStatus, DESCRIPTOR_LEN,
};

use crate::capture::{CaptureError, Frame, FrameSource};
use crate::detector::{DetectError, DetectOptions, FaceDetector};
use crate::overlay::OverlaySink;

/// Descriptor at Euclidean distance `d` from the all-zero descriptor.
pub fn descriptor_at(d: f32) -> FaceDescriptor {
    let mut values = vec![0.0; DESCRIPTOR_LEN];
    values[0] = d;
    FaceDescriptor::new(values).unwrap()
}

pub fn roster_member(id: &str, descriptors: Vec<FaceDescriptor>) -> RosterMember {
    RosterMember {
        id: id.into(),
        name: format!("Student {id}"),
        descriptors,
    }
}

pub fn valid_box() -> BoundingBox {
    BoundingBox {
        x: 10.0,
        y: 10.0,
        width: 80.0,
        height: 100.0,
    }
}

pub fn observation(index: usize, bbox: BoundingBox, descriptor: Option<FaceDescriptor>) -> DetectionObservation {
    DetectionObservation {
        index,
        bbox,
        landmarks: None,
        descriptor,
    }
}

pub fn test_session(status: SessionStatus) -> AttendanceSession {
    AttendanceSession {
        id: "sess-1".into(),
        class_id: "class-1".into(),
        status,
        scheduled_at: "2026-03-02T08:00:00".parse().unwrap(),
        room: Some("B204".into()),
        notes: None,
    }
}

/// In-memory backend that records every call.
pub struct FakeBackend {
    pub session: Mutex<AttendanceSession>,
    pub roster: Mutex<Vec<RosterMember>>,
    pub logs: Mutex<Vec<AttendanceLogEntry>>,
    pub requests: Mutex<Vec<AbsenceRequest>>,
    pub verify_calls: Mutex<Vec<VerifyAttendance>>,
    pub post_calls: Mutex<Vec<ManualAttendance>>,
    pub review_calls: Mutex<Vec<(String, AbsenceRequestStatus)>>,
    pub status_calls: Mutex<Vec<SessionStatus>>,
    log_fetches: AtomicUsize,
    fail_verify: AtomicBool,
    fail_post: AtomicBool,
}

impl FakeBackend {
    pub fn with_session(status: SessionStatus) -> Arc<Self> {
        Arc::new(Self {
            session: Mutex::new(test_session(status)),
            roster: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            verify_calls: Mutex::new(Vec::new()),
            post_calls: Mutex::new(Vec::new()),
            review_calls: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
            log_fetches: AtomicUsize::new(0),
            fail_verify: AtomicBool::new(false),
            fail_post: AtomicBool::new(false),
        })
    }

    pub fn fail_verify(&self) {
        self.fail_verify.store(true, Ordering::SeqCst);
    }

    pub fn fail_post(&self) {
        self.fail_post.store(true, Ordering::SeqCst);
    }

    pub fn log_fetch_count(&self) -> usize {
        self.log_fetches.load(Ordering::SeqCst)
    }

    pub fn submission_count(&self) -> usize {
        self.verify_calls.lock().unwrap().len() + self.post_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AttendanceBackend for FakeBackend {
    async fn session(&self, _session_id: &str) -> Result<AttendanceSession, ApiError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn set_session_status(
        &self,
        _session_id: &str,
        status: SessionStatus,
    ) -> Result<(), ApiError> {
        self.status_calls.lock().unwrap().push(status);
        self.session.lock().unwrap().status = status;
        Ok(())
    }

    async fn attendance_logs(
        &self,
        _session_id: &str,
    ) -> Result<Vec<AttendanceLogEntry>, ApiError> {
        self.log_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.logs.lock().unwrap().clone())
    }

    async fn post_attendance(
        &self,
        _session_id: &str,
        entry: &ManualAttendance,
    ) -> Result<(), ApiError> {
        if self.fail_post.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected("attendance write refused".into()));
        }
        self.post_calls.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn verify_attendance(&self, payload: &VerifyAttendance) -> Result<(), ApiError> {
        if self.fail_verify.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected("verification refused".into()));
        }
        self.verify_calls.lock().unwrap().push(payload.clone());
        Ok(())
    }

    async fn class_roster(&self, _class_id: &str) -> Result<Vec<RosterMember>, ApiError> {
        Ok(self.roster.lock().unwrap().clone())
    }

    async fn absence_requests(&self, _session_id: &str) -> Result<Vec<AbsenceRequest>, ApiError> {
        Ok(self.requests.lock().unwrap().clone())
    }

    async fn review_absence_request(
        &self,
        request_id: &str,
        status: AbsenceRequestStatus,
    ) -> Result<(), ApiError> {
        self.review_calls
            .lock()
            .unwrap()
            .push((request_id.to_string(), status));
        Ok(())
    }
}

/// Detector that replays a scripted list of observations per call.
pub struct FakeDetector {
    observations: Mutex<Vec<DetectionObservation>>,
    pub detect_calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeDetector {
    pub fn returning(observations: Vec<DetectionObservation>) -> Arc<Self> {
        Arc::new(Self {
            observations: Mutex::new(observations),
            detect_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    pub fn fail_detection(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn set_observations(&self, observations: Vec<DetectionObservation>) {
        *self.observations.lock().unwrap() = observations;
    }
}

#[async_trait]
impl FaceDetector for FakeDetector {
    async fn load_models(&self) -> Result<(), DetectError> {
        Ok(())
    }

    async fn detect(
        &self,
        _frame: &Frame,
        _options: DetectOptions,
    ) -> Result<Vec<DetectionObservation>, DetectError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DetectError::Inference("scripted failure".into()));
        }
        Ok(self.observations.lock().unwrap().clone())
    }
}

/// Always-ready camera producing a tiny solid frame.
pub struct FakeCamera {
    ready: AtomicBool,
    pub shutdowns: AtomicUsize,
}

impl FakeCamera {
    pub fn ready() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn not_ready() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(false),
            shutdowns: AtomicUsize::new(0),
        })
    }
}

impl FrameSource for FakeCamera {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn capture_frame(&self) -> Result<Frame, CaptureError> {
        if !self.is_ready() {
            return Err(CaptureError::NotReady);
        }
        Ok(Frame {
            data: vec![128u8; 16 * 16 * 3],
            width: 16,
            height: 16,
        })
    }

    fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Overlay sink counting draw/clear calls.
#[derive(Default)]
pub struct RecordingOverlay {
    pub draws: AtomicUsize,
    pub clears: AtomicUsize,
}

impl RecordingOverlay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl OverlaySink for RecordingOverlay {
    fn draw(&self, _observations: &[DetectionObservation]) {
        self.draws.fetch_add(1, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}
