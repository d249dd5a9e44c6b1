//! rollcall-core: attendance matching engine.
//!
//! Pure domain logic for the face-recognition attendance flow:
//! descriptor matching under a distance threshold, per-student
//! submission cooldown, and absence reconciliation.

pub mod cooldown;
pub mod matcher;
pub mod reconcile;
pub mod types;

pub use cooldown::Cooldown;
pub use matcher::{EuclideanMatcher, Matcher, RECOGNITION_THRESHOLD};
pub use reconcile::{derive_absent_list, AbsentAction, AbsentEntry};
pub use types::{
    AbsenceRequest, AbsenceRequestStatus, AttendanceLogEntry, AttendanceSession, AttendanceStatus,
    BoundingBox, DescriptorMatch, DetectionObservation, FaceDescriptor, Landmarks, RosterMember,
    SessionStatus, DESCRIPTOR_LEN,
};
