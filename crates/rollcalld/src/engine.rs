//! Attendance engine: wires the capture, detection, matching, and
//! submission pieces together behind a clone-safe handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;

use rollcall_api::{ApiError, AttendanceBackend};
use rollcall_core::{
    derive_absent_list,
    types::{AbsenceRequestStatus, AttendanceStatus, SessionStatus},
    AbsentEntry,
};

use crate::cache::SessionCache;
use crate::capture::{encode_snapshot, CaptureError, FrameSource};
use crate::config::Config;
use crate::coordinator::{CaptureOutcome, Coordinator};
use crate::detector::{DetectError, DetectOptions, FaceDetector, ModelRegistry};
use crate::loops::{spawn_detection_loop, LoopMode};
use crate::overlay::OverlaySink;
use crate::session::SessionController;
use crate::submitter::{Submission, Submitter};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera stream is not ready")]
    CameraNotReady,
    #[error("face models are not loaded")]
    ModelsNotReady,
    #[error("class roster has no students with enrolled face data")]
    EmptyRoster,
    #[error("session is already completed")]
    SessionCompleted,
    #[error("no absence request with id {0}")]
    UnknownAbsenceRequest(String),
    #[error("absence request {0} has already been reviewed")]
    RequestAlreadyReviewed(String),
    #[error("another {0} action is already in progress")]
    Busy(&'static str),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Detect(#[from] DetectError),
}

/// One logical action class may have at most one mutating call in
/// flight; a second identical call fails fast without a network call.
struct InFlight {
    name: &'static str,
    busy: AtomicBool,
}

impl InFlight {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: AtomicBool::new(false),
        }
    }

    fn try_begin(&self) -> Result<InFlightToken<'_>, EngineError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(InFlightToken(&self.busy))
        } else {
            Err(EngineError::Busy(self.name))
        }
    }
}

/// Resets the flag on every exit path, success or failure.
struct InFlightToken<'a>(&'a AtomicBool);

impl Drop for InFlightToken<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct EngineInner {
    config: Config,
    backend: Arc<dyn AttendanceBackend>,
    detector: Arc<dyn FaceDetector>,
    registry: ModelRegistry,
    camera: Arc<dyn FrameSource>,
    overlay: Arc<dyn OverlaySink>,
    cache: Arc<SessionCache>,
    coordinator: Coordinator,
    submitter: Submitter,
    session: SessionController,
    session_id: String,
    capture_flight: InFlight,
    entry_flight: InFlight,
    review_flight: InFlight,
    status_flight: InFlight,
}

/// Clone-safe handle to the attendance engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Fetch session, roster, logs, and absence requests, load the face
    /// models, and build the engine. Fails fast if any resource is
    /// unavailable, like the daemon startup path.
    pub async fn connect(
        config: Config,
        backend: Arc<dyn AttendanceBackend>,
        detector: Arc<dyn FaceDetector>,
        camera: Arc<dyn FrameSource>,
        overlay: Arc<dyn OverlaySink>,
        session_id: &str,
    ) -> Result<Engine, EngineError> {
        let cache = Arc::new(SessionCache::new());

        let session = backend.session(session_id).await?;
        let class_id = session.class_id.clone();
        tracing::info!(
            session = session_id,
            class = %class_id,
            status = ?session.status,
            "session loaded"
        );
        cache.set_session(session);

        let roster = backend.class_roster(&class_id).await?;
        tracing::info!(
            students = roster.len(),
            enrolled = roster.iter().filter(|m| m.has_face_data()).count(),
            "roster loaded"
        );
        cache.set_roster(roster);

        cache.set_logs(backend.attendance_logs(session_id).await?);
        cache.set_requests(backend.absence_requests(session_id).await?);

        let registry = ModelRegistry::new();
        registry.load(detector.as_ref()).await?;

        let submitter = Submitter::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            config.refresh_cooldown,
        );
        let coordinator = Coordinator::new(
            config.recognition_threshold,
            config.confidence_threshold,
            config.cooldown_window,
        );
        let session_ctl = SessionController::new(Arc::clone(&backend), Arc::clone(&cache));

        Ok(Engine {
            inner: Arc::new(EngineInner {
                config,
                backend,
                detector,
                registry,
                camera,
                overlay,
                cache,
                coordinator,
                submitter,
                session: session_ctl,
                session_id: session_id.to_string(),
                capture_flight: InFlight::new("capture"),
                entry_flight: InFlight::new("manual entry"),
                review_flight: InFlight::new("absence review"),
                status_flight: InFlight::new("session status"),
            }),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.session.status()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn clear_overlay(&self) {
        self.inner.overlay.clear();
    }

    /// Mark the session active on first teacher interaction.
    pub async fn open_session(&self) -> Result<(), EngineError> {
        let _token = self.inner.status_flight.try_begin()?;
        self.inner.session.open(&self.inner.session_id).await
    }

    /// Preconditions shared by every start-loop/capture action.
    fn ensure_capture_ready(&self, needs_roster: bool) -> Result<(), EngineError> {
        if self.status() == SessionStatus::Completed {
            return Err(EngineError::SessionCompleted);
        }
        if !self.inner.camera.is_ready() {
            return Err(EngineError::CameraNotReady);
        }
        if !self.inner.registry.is_ready() {
            return Err(EngineError::ModelsNotReady);
        }
        if needs_roster
            && !self
                .inner
                .cache
                .roster()
                .iter()
                .any(|member| member.has_face_data())
        {
            return Err(EngineError::EmptyRoster);
        }
        Ok(())
    }

    /// Start the landmark-overlay loop, stopping any other loop first.
    pub async fn start_landmark_mode(&self) -> Result<(), EngineError> {
        self.ensure_capture_ready(false)?;
        let engine = self.clone();
        self.inner
            .session
            .swap_loop(move || spawn_detection_loop(engine, LoopMode::Landmark))
            .await;
        Ok(())
    }

    /// Start the auto-recognition loop, stopping any other loop first.
    pub async fn start_auto_mode(&self) -> Result<(), EngineError> {
        self.ensure_capture_ready(true)?;
        let engine = self.clone();
        self.inner
            .session
            .swap_loop(move || spawn_detection_loop(engine, LoopMode::Auto))
            .await;
        Ok(())
    }

    /// Stop whichever loop is running; the loop clears the overlay on exit.
    pub async fn stop_loops(&self) {
        self.inner.session.stop_loop().await;
    }

    pub async fn active_mode(&self) -> Option<LoopMode> {
        self.inner.session.active_mode().await
    }

    /// One synchronous detection+recognition pass, independent of the
    /// periodic loop, routed through the same coordinator policy.
    pub async fn manual_capture(&self) -> Result<CaptureOutcome, EngineError> {
        let _token = self.inner.capture_flight.try_begin()?;
        self.ensure_capture_ready(true)?;

        let frame = self.inner.camera.capture_frame()?;
        let observations = self
            .inner
            .detector
            .detect(&frame, DetectOptions::full())
            .await?;
        let snapshot = encode_snapshot(&frame, self.inner.config.snapshot_quality)?;
        let roster = self.inner.cache.roster();

        let outcome = self
            .inner
            .coordinator
            .process_single(
                &self.inner.submitter,
                &self.inner.session_id,
                &roster,
                &observations,
                &snapshot,
            )
            .await?;
        Ok(outcome)
    }

    /// Teacher-chosen status with an optional note; no descriptor or
    /// snapshot involved.
    pub async fn manual_entry(
        &self,
        student_id: &str,
        status: AttendanceStatus,
        note: Option<String>,
    ) -> Result<(), EngineError> {
        let _token = self.inner.entry_flight.try_begin()?;
        self.inner
            .submitter
            .submit(
                &self.inner.session_id,
                Submission::ManualEntry {
                    student_id: student_id.to_string(),
                    status,
                    note,
                },
            )
            .await?;
        Ok(())
    }

    /// Quick-approve a pending leave request: approve it and write the
    /// linked excused-present record, then refresh both lists.
    pub async fn approve_absence(&self, request_id: &str) -> Result<(), EngineError> {
        let _token = self.inner.review_flight.try_begin()?;
        let request = self.find_request(request_id)?;
        self.inner
            .submitter
            .submit(
                &self.inner.session_id,
                Submission::AbsenceApproval {
                    student_id: request.student_id,
                    request_id: request_id.to_string(),
                },
            )
            .await?;
        self.refresh_requests().await?;
        Ok(())
    }

    /// Quick-reject a pending leave request: status update only, no
    /// attendance side effect.
    pub async fn reject_absence(&self, request_id: &str) -> Result<(), EngineError> {
        let _token = self.inner.review_flight.try_begin()?;
        let _request = self.find_request(request_id)?;
        self.inner
            .backend
            .review_absence_request(request_id, AbsenceRequestStatus::Rejected)
            .await?;
        self.refresh_requests().await?;
        self.inner.submitter.request_refresh(&self.inner.session_id);
        Ok(())
    }

    fn find_request(&self, request_id: &str) -> Result<rollcall_core::AbsenceRequest, EngineError> {
        let request = self
            .inner
            .cache
            .requests()
            .into_iter()
            .find(|r| r.id == request_id)
            .ok_or_else(|| EngineError::UnknownAbsenceRequest(request_id.to_string()))?;
        if request.status != AbsenceRequestStatus::Pending {
            return Err(EngineError::RequestAlreadyReviewed(request_id.to_string()));
        }
        Ok(request)
    }

    async fn refresh_requests(&self) -> Result<(), EngineError> {
        let requests = self
            .inner
            .backend
            .absence_requests(&self.inner.session_id)
            .await?;
        self.inner.cache.set_requests(requests);
        Ok(())
    }

    /// Roster members with no accounting entry for the session day,
    /// with their per-status absence actions.
    pub fn absent_list(&self) -> Vec<AbsentEntry> {
        let date = self
            .inner
            .cache
            .session()
            .map(|s| s.scheduled_at.date())
            .unwrap_or_else(|| Utc::now().date_naive());
        derive_absent_list(
            &self.inner.cache.roster(),
            &self.inner.cache.logs(),
            &self.inner.cache.requests(),
            date,
        )
    }

    /// Cooldown-gated manual refresh of the cached log and session info.
    pub fn refresh(&self) {
        self.inner.submitter.request_refresh(&self.inner.session_id);
    }

    /// End the session. No detection may start afterwards.
    pub async fn complete_session(&self) -> Result<(), EngineError> {
        let _token = self.inner.status_flight.try_begin()?;
        self.inner
            .session
            .complete(&self.inner.session_id, &self.inner.camera, &self.inner.overlay)
            .await
    }

    /// Local cleanup without the server-side status change.
    pub async fn teardown(&self) {
        self.inner
            .session
            .teardown(&self.inner.camera, &self.inner.overlay)
            .await;
    }

    /// One detection cycle, invoked by the periodic loop. Failures are
    /// contained here; the loop survives and retries next tick.
    pub(crate) async fn run_cycle(&self, mode: LoopMode, cancelled: &watch::Receiver<bool>) {
        // Defensive: a tick racing a completion must not detect.
        if self.status() == SessionStatus::Completed {
            return;
        }

        let frame = match self.inner.camera.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed; clearing overlay");
                self.inner.overlay.clear();
                return;
            }
        };

        let options = match mode {
            LoopMode::Landmark => DetectOptions::landmarks_only(),
            LoopMode::Auto => DetectOptions::full(),
        };
        let observations = match self.inner.detector.detect(&frame, options).await {
            Ok(observations) => observations,
            Err(e) => {
                tracing::warn!(error = %e, "detection cycle failed; clearing overlay");
                self.inner.overlay.clear();
                return;
            }
        };

        // The detection resolved after an await: discard the result if
        // the loop was cancelled in the meantime.
        if *cancelled.borrow() {
            return;
        }

        self.inner.overlay.draw(&observations);

        if mode == LoopMode::Auto && !observations.is_empty() {
            let snapshot = match encode_snapshot(&frame, self.inner.config.snapshot_quality) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::warn!(error = %e, "snapshot encoding failed; skipping cycle");
                    return;
                }
            };
            let roster = self.inner.cache.roster();
            self.inner
                .coordinator
                .process_batch(
                    &self.inner.submitter,
                    &self.inner.session_id,
                    &roster,
                    &observations,
                    &snapshot,
                )
                .await;
        }
    }
}
