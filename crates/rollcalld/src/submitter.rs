//! Attendance submission and log-cache refresh.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rollcall_api::{ApiError, AttendanceBackend, ManualAttendance, VerifyAttendance};
use rollcall_core::types::{AbsenceRequestStatus, AttendanceStatus, FaceDescriptor};

use crate::cache::SessionCache;

/// One attendance write, by origin.
#[derive(Debug)]
pub enum Submission {
    /// Recognition-based present record from the auto loop or a manual capture.
    AutoMatch {
        student_id: String,
        descriptor: FaceDescriptor,
        confidence: f32,
        image_base64: String,
    },
    /// Teacher-chosen status with an optional free-text note.
    ManualEntry {
        student_id: String,
        status: AttendanceStatus,
        note: Option<String>,
    },
    /// Approval of a leave request plus the linked excused-present record.
    AbsenceApproval {
        student_id: String,
        request_id: String,
    },
}

struct RefreshState {
    last: Option<Instant>,
    deferred: bool,
}

struct SubmitterInner {
    backend: Arc<dyn AttendanceBackend>,
    cache: Arc<SessionCache>,
    refresh_cooldown: Duration,
    refresh: Mutex<RefreshState>,
}

impl SubmitterInner {
    async fn refresh_now(&self, session_id: &str) -> Result<(), ApiError> {
        let logs = self.backend.attendance_logs(session_id).await?;
        let session = self.backend.session(session_id).await?;
        self.cache.set_logs(logs);
        self.cache.set_session(session);
        Ok(())
    }
}

/// Serializes accepted matches and manual actions into backend writes,
/// then refreshes the cached log subject to a global refresh cooldown.
/// Clone-safe handle; clones share the refresh state.
#[derive(Clone)]
pub struct Submitter {
    inner: Arc<SubmitterInner>,
}

impl Submitter {
    pub fn new(
        backend: Arc<dyn AttendanceBackend>,
        cache: Arc<SessionCache>,
        refresh_cooldown: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SubmitterInner {
                backend,
                cache,
                refresh_cooldown,
                refresh: Mutex::new(RefreshState {
                    last: None,
                    deferred: false,
                }),
            }),
        }
    }

    /// Persist one submission. On success a cache refresh is requested;
    /// on failure the cached state is left untouched.
    pub async fn submit(&self, session_id: &str, submission: Submission) -> Result<(), ApiError> {
        match submission {
            Submission::AutoMatch {
                student_id,
                descriptor,
                confidence,
                image_base64,
            } => {
                self.inner
                    .backend
                    .verify_attendance(&VerifyAttendance {
                        session_id: session_id.to_string(),
                        student_id: student_id.clone(),
                        face_descriptor: descriptor,
                        confidence,
                        image_base64,
                    })
                    .await?;
                tracing::info!(student = %student_id, confidence, "recognition attendance submitted");
            }
            Submission::ManualEntry {
                student_id,
                status,
                note,
            } => {
                self.inner
                    .backend
                    .post_attendance(
                        session_id,
                        &ManualAttendance {
                            student_id: student_id.clone(),
                            status,
                            note,
                            absence_request_id: None,
                            recognized: Some(false),
                            image_base64: None,
                            confidence: None,
                        },
                    )
                    .await?;
                tracing::info!(student = %student_id, ?status, "manual attendance submitted");
            }
            Submission::AbsenceApproval {
                student_id,
                request_id,
            } => {
                self.inner
                    .backend
                    .review_absence_request(&request_id, AbsenceRequestStatus::Approved)
                    .await?;
                // The approval and the linked attendance write are not
                // transactional: if the write below fails, the approval
                // stands and the error is surfaced to the caller.
                if let Err(e) = self
                    .inner
                    .backend
                    .post_attendance(
                        session_id,
                        &ManualAttendance {
                            student_id: student_id.clone(),
                            status: AttendanceStatus::Present,
                            note: Some("excused absence (approved request)".into()),
                            absence_request_id: Some(request_id.clone()),
                            recognized: Some(false),
                            image_base64: None,
                            confidence: None,
                        },
                    )
                    .await
                {
                    tracing::error!(
                        student = %student_id,
                        request = %request_id,
                        error = %e,
                        "absence request approved but attendance write failed"
                    );
                    return Err(e);
                }
                tracing::info!(student = %student_id, request = %request_id, "absence approved and logged");
            }
        }

        self.request_refresh(session_id);
        Ok(())
    }

    /// Refresh the cached log and session info, debounced: inside the
    /// cooldown the refresh is deferred to fire once at the boundary,
    /// never dropped.
    pub fn request_refresh(&self, session_id: &str) {
        let now = Instant::now();
        let delay = {
            let mut state = self.lock_refresh();
            match state.last {
                Some(last) if now.duration_since(last) < self.inner.refresh_cooldown => {
                    if state.deferred {
                        // A refresh is already queued for the boundary.
                        return;
                    }
                    state.deferred = true;
                    Some(self.inner.refresh_cooldown - now.duration_since(last))
                }
                _ => {
                    state.last = Some(now);
                    None
                }
            }
        };

        let inner = Arc::clone(&self.inner);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
                let mut state = inner.refresh.lock().unwrap_or_else(|e| e.into_inner());
                state.deferred = false;
                state.last = Some(Instant::now());
            }
            if let Err(e) = inner.refresh_now(&session_id).await {
                tracing::warn!(error = %e, "cache refresh failed");
            }
        });
    }

    fn lock_refresh(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.inner.refresh.lock().unwrap_or_else(|e| e.into_inner())
    }
}
