use async_trait::async_trait;
use serde::Serialize;

use rollcall_core::types::{
    AbsenceRequest, AbsenceRequestStatus, AttendanceLogEntry, AttendanceSession, AttendanceStatus,
    FaceDescriptor, RosterMember, SessionStatus,
};

use crate::ApiError;

/// Manual or absence-approval attendance write.
#[derive(Debug, Clone, Serialize)]
pub struct ManualAttendance {
    pub student_id: String,
    pub status: AttendanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absence_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recognized: Option<bool>,
    #[serde(rename = "imageBase64", skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Recognition-based attendance write.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAttendance {
    pub session_id: String,
    pub student_id: String,
    pub face_descriptor: FaceDescriptor,
    pub confidence: f32,
    pub image_base64: String,
}

/// Operations the attendance engine needs from the backend.
///
/// [`crate::ApiClient`] is the production implementation; tests
/// substitute an in-memory fake.
#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    async fn session(&self, session_id: &str) -> Result<AttendanceSession, ApiError>;

    async fn set_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), ApiError>;

    async fn attendance_logs(&self, session_id: &str) -> Result<Vec<AttendanceLogEntry>, ApiError>;

    async fn post_attendance(
        &self,
        session_id: &str,
        entry: &ManualAttendance,
    ) -> Result<(), ApiError>;

    async fn verify_attendance(&self, payload: &VerifyAttendance) -> Result<(), ApiError>;

    /// Roster with enrolled face descriptors for the session's class.
    async fn class_roster(&self, class_id: &str) -> Result<Vec<RosterMember>, ApiError>;

    async fn absence_requests(&self, session_id: &str) -> Result<Vec<AbsenceRequest>, ApiError>;

    async fn review_absence_request(
        &self,
        request_id: &str,
        status: AbsenceRequestStatus,
    ) -> Result<(), ApiError>;
}
