//! Absence reconciliation: cross-reference the roster against today's
//! attendance log and outstanding leave requests.

use chrono::NaiveDate;

use crate::types::{AbsenceRequest, AbsenceRequestStatus, AttendanceLogEntry, RosterMember};

/// Action the UI should offer for one still-absent student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentAction {
    /// No leave request on file: manual attendance entry only.
    ManualOnly,
    /// A pending request: offer quick-approve / quick-reject.
    ReviewRequest,
    /// Request already reviewed: informational, manual override still allowed.
    InfoOnly,
}

/// One roster member with no accounting entry for the day.
#[derive(Debug, Clone)]
pub struct AbsentEntry {
    pub member_id: String,
    pub member_name: String,
    pub request: Option<AbsenceRequest>,
    pub action: AbsentAction,
}

/// Derive the absent list for `date` from the three source collections.
///
/// A member is absent when no log entry on that calendar day marks them
/// present, late, or excused. Pure function; called whenever any input
/// changes.
pub fn derive_absent_list(
    roster: &[RosterMember],
    logs: &[AttendanceLogEntry],
    requests: &[AbsenceRequest],
    date: NaiveDate,
) -> Vec<AbsentEntry> {
    roster
        .iter()
        .filter(|member| !logs.iter().any(|entry| entry.accounts_for(&member.id, date)))
        .map(|member| {
            let request = requests
                .iter()
                .find(|r| r.student_id == member.id)
                .cloned();
            let action = match request.as_ref().map(|r| r.status) {
                None => AbsentAction::ManualOnly,
                Some(AbsenceRequestStatus::Pending) => AbsentAction::ReviewRequest,
                Some(AbsenceRequestStatus::Approved) | Some(AbsenceRequestStatus::Rejected) => {
                    AbsentAction::InfoOnly
                }
            };
            AbsentEntry {
                member_id: member.id.clone(),
                member_name: member.name.clone(),
                request,
                action,
            }
        })
        .collect()
}
