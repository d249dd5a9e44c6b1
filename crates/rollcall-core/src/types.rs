use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enrolled and observed face embeddings are always 128-dimensional.
pub const DESCRIPTOR_LEN: usize = 128;

/// Fixed-length face embedding vector.
///
/// A descriptor is only constructible with exactly [`DESCRIPTOR_LEN`]
/// elements; anything else is not a valid descriptor and must be
/// filtered out upstream, never matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FaceDescriptor {
    values: Vec<f32>,
}

impl<'de> Deserialize<'de> for FaceDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = Vec::<f32>::deserialize(deserializer)?;
        let len = values.len();
        FaceDescriptor::new(values).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "face descriptor must have {DESCRIPTOR_LEN} elements, got {len}"
            ))
        })
    }
}

impl FaceDescriptor {
    /// Wrap raw embedding values. Returns `None` unless the vector has
    /// exactly [`DESCRIPTOR_LEN`] elements.
    pub fn new(values: Vec<f32>) -> Option<Self> {
        if values.len() == DESCRIPTOR_LEN {
            Some(Self { values })
        } else {
            None
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Compute Euclidean distance to another descriptor.
    pub fn euclidean_distance(&self, other: &FaceDescriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One student on the class roster with their enrolled descriptors.
///
/// Descriptors are produced by a separate enrollment flow and are
/// read-only for the duration of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterMember {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub descriptors: Vec<FaceDescriptor>,
}

impl RosterMember {
    /// Whether this member has at least one enrolled descriptor.
    pub fn has_face_data(&self) -> bool {
        !self.descriptors.is_empty()
    }
}

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// A box is valid when every coordinate is finite and it has
    /// positive area. Invalid boxes must never reach the matcher.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
pub type Landmarks = [(f32, f32); 5];

/// One detected face within a single detection cycle.
///
/// Observations live for exactly one cycle: drawn and/or matched, then
/// discarded before the next cycle.
#[derive(Debug, Clone)]
pub struct DetectionObservation {
    /// Frame-relative index of this face within the detection batch.
    pub index: usize,
    pub bbox: BoundingBox,
    pub landmarks: Option<Landmarks>,
    pub descriptor: Option<FaceDescriptor>,
}

/// Result of matching one observed descriptor against the roster.
#[derive(Debug, Clone)]
pub struct DescriptorMatch {
    pub member_id: String,
    pub member_name: String,
    /// Euclidean distance of the best (member, descriptor) pair.
    pub distance: f32,
    /// `1 − distance`, clamped to [0, 1].
    pub confidence: f32,
}

/// Attendance status as persisted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Excused,
}

/// One persisted attendance record. The authoritative copy lives
/// server-side; clients hold a read-mostly cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceLogEntry {
    pub id: String,
    pub student_id: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub absence_request_id: Option<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl AttendanceLogEntry {
    /// Whether this entry counts the student as accounted-for on `date`
    /// (present, late, or excused on that calendar day).
    pub fn accounts_for(&self, student_id: &str, date: NaiveDate) -> bool {
        self.student_id == student_id
            && self.timestamp.date_naive() == date
            && self.status != AttendanceStatus::Absent
    }
}

/// Session lifecycle state. Transitions are monotonic from the client:
/// pending → active → completed, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
}

impl SessionStatus {
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Pending, SessionStatus::Active)
                | (SessionStatus::Pending, SessionStatus::Completed)
                | (SessionStatus::Active, SessionStatus::Completed)
        )
    }
}

/// One scheduled attendance session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub id: String,
    pub class_id: String,
    pub status: SessionStatus,
    pub scheduled_at: NaiveDateTime,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Review state of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbsenceRequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// A leave request filed by a student, created elsewhere and consumed
/// here to drive per-absent-student actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbsenceRequest {
    pub id: String,
    pub student_id: String,
    pub status: AbsenceRequestStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
}
