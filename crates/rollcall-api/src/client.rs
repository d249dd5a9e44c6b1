use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use rollcall_core::types::{
    AbsenceRequest, AbsenceRequestStatus, AttendanceLogEntry, AttendanceSession, FaceDescriptor,
    RosterMember, SessionStatus,
};

use crate::backend::{AttendanceBackend, ManualAttendance, VerifyAttendance};
use crate::envelope::ApiResponse;
use crate::ApiError;

/// HTTP client for the attendance backend. Bearer-token auth on every
/// request.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    /// `base_url` includes the `/api` prefix, no trailing slash.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response: ApiResponse<T> = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?
            .json()
            .await?;
        response.into_result(path)
    }

    async fn put_json(&self, path: &str, body: &serde_json::Value) -> Result<(), ApiError> {
        let response: ApiResponse<serde_json::Value> = self
            .http
            .put(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        response.into_ack()
    }

    async fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let response: ApiResponse<serde_json::Value> = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        response.into_ack()
    }
}

/// Roster member as the backend sends it: enrolled descriptors arrive
/// as raw float arrays and may include invalid lengths, which are
/// filtered out here rather than failing the whole roster.
#[derive(Debug, Deserialize)]
struct WireRosterMember {
    id: String,
    name: String,
    #[serde(default, alias = "face_descriptors")]
    descriptors: Vec<Vec<f32>>,
}

fn into_roster_member(wire: WireRosterMember) -> RosterMember {
    let total = wire.descriptors.len();
    let descriptors: Vec<FaceDescriptor> = wire
        .descriptors
        .into_iter()
        .filter_map(FaceDescriptor::new)
        .collect();
    if descriptors.len() < total {
        tracing::warn!(
            student = %wire.id,
            dropped = total - descriptors.len(),
            "discarding enrolled descriptors with invalid length"
        );
    }
    RosterMember {
        id: wire.id,
        name: wire.name,
        descriptors,
    }
}

#[async_trait]
impl AttendanceBackend for ApiClient {
    async fn session(&self, session_id: &str) -> Result<AttendanceSession, ApiError> {
        self.get(&format!("/attendance/sessions/{session_id}")).await
    }

    async fn set_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<(), ApiError> {
        self.put_json(
            &format!("/attendance/sessions/{session_id}/status"),
            &json!({ "status": status }),
        )
        .await
    }

    async fn attendance_logs(&self, session_id: &str) -> Result<Vec<AttendanceLogEntry>, ApiError> {
        self.get(&format!("/attendance/logs/{session_id}")).await
    }

    async fn post_attendance(
        &self,
        session_id: &str,
        entry: &ManualAttendance,
    ) -> Result<(), ApiError> {
        self.post_json(&format!("/attendance/logs/{session_id}"), entry)
            .await
    }

    async fn verify_attendance(&self, payload: &VerifyAttendance) -> Result<(), ApiError> {
        self.post_json("/face-recognition/verify-attendance", payload)
            .await
    }

    async fn class_roster(&self, class_id: &str) -> Result<Vec<RosterMember>, ApiError> {
        let wire: Vec<WireRosterMember> = self
            .get(&format!("/face-recognition/class-features/{class_id}"))
            .await?;
        Ok(wire.into_iter().map(into_roster_member).collect())
    }

    async fn absence_requests(&self, session_id: &str) -> Result<Vec<AbsenceRequest>, ApiError> {
        self.get(&format!("/absence-requests/session/{session_id}"))
            .await
    }

    async fn review_absence_request(
        &self,
        request_id: &str,
        status: AbsenceRequestStatus,
    ) -> Result<(), ApiError> {
        self.put_json(
            &format!("/absence-requests/{request_id}/review"),
            &json!({ "status": status }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::types::DESCRIPTOR_LEN;

    #[test]
    fn test_roster_decode_filters_invalid_descriptors() {
        let wire = WireRosterMember {
            id: "s1".into(),
            name: "Student".into(),
            descriptors: vec![vec![0.0; DESCRIPTOR_LEN], vec![0.0; 64]],
        };
        let member = into_roster_member(wire);
        assert_eq!(member.descriptors.len(), 1);
    }

    #[test]
    fn test_roster_wire_shape() {
        let raw = format!(
            r#"{{"id": "s1", "name": "A", "face_descriptors": [{}]}}"#,
            serde_json::to_string(&vec![0.25f32; DESCRIPTOR_LEN]).unwrap()
        );
        let wire: WireRosterMember = serde_json::from_str(&raw).unwrap();
        let member = into_roster_member(wire);
        assert!(member.has_face_data());
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = ApiClient::new("http://localhost:8080/api/", "token");
        assert_eq!(client.base_url, "http://localhost:8080/api");
    }
}
