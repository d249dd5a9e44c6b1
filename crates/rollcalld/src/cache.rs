//! Read-mostly client cache of server-side state.
//!
//! The authoritative copies live on the backend; the cache is replaced
//! wholesale after each successful fetch, never partially mutated.

use std::sync::Mutex;

use rollcall_core::types::{
    AbsenceRequest, AttendanceLogEntry, AttendanceSession, RosterMember, SessionStatus,
};

#[derive(Default)]
struct CacheInner {
    session: Option<AttendanceSession>,
    roster: Vec<RosterMember>,
    logs: Vec<AttendanceLogEntry>,
    requests: Vec<AbsenceRequest>,
}

/// Single-owner cache shared between the engine, loops, and submitter.
#[derive(Default)]
pub struct SessionCache {
    inner: Mutex<CacheInner>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<AttendanceSession> {
        self.lock().session.clone()
    }

    pub fn session_status(&self) -> Option<SessionStatus> {
        self.lock().session.as_ref().map(|s| s.status)
    }

    pub fn set_session(&self, session: AttendanceSession) {
        self.lock().session = Some(session);
    }

    pub fn set_session_status(&self, status: SessionStatus) {
        if let Some(session) = self.lock().session.as_mut() {
            session.status = status;
        }
    }

    pub fn roster(&self) -> Vec<RosterMember> {
        self.lock().roster.clone()
    }

    pub fn set_roster(&self, roster: Vec<RosterMember>) {
        self.lock().roster = roster;
    }

    pub fn logs(&self) -> Vec<AttendanceLogEntry> {
        self.lock().logs.clone()
    }

    pub fn set_logs(&self, logs: Vec<AttendanceLogEntry>) {
        self.lock().logs = logs;
    }

    pub fn requests(&self) -> Vec<AbsenceRequest> {
        self.lock().requests.clone()
    }

    pub fn set_requests(&self, requests: Vec<AbsenceRequest>) {
        self.lock().requests = requests;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
