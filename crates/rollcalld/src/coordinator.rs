//! Recognition coordination: validation, matching, confidence policy,
//! and the per-student submission cooldown.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rollcall_api::ApiError;
use rollcall_core::{
    types::{DescriptorMatch, DetectionObservation, RosterMember},
    Cooldown, EuclideanMatcher, Matcher,
};

use crate::submitter::{Submission, Submitter};

/// Result of a manual single-shot capture.
#[derive(Debug)]
pub enum CaptureOutcome {
    Submitted {
        student_id: String,
        student_name: String,
        confidence: f32,
    },
    /// Faces were seen but none matched a roster member with enough confidence.
    NoMatch,
    /// The detector returned no faces at all.
    NoFace,
}

/// Applies the accept/reject policy to detection batches and forwards
/// accepted candidates to the submitter.
pub struct Coordinator {
    matcher: EuclideanMatcher,
    cooldown: Mutex<Cooldown<String>>,
    recognition_threshold: f32,
    confidence_threshold: f32,
}

impl Coordinator {
    pub fn new(
        recognition_threshold: f32,
        confidence_threshold: f32,
        cooldown_window: Duration,
    ) -> Self {
        Self {
            matcher: EuclideanMatcher,
            cooldown: Mutex::new(Cooldown::new(cooldown_window)),
            recognition_threshold,
            confidence_threshold,
        }
    }

    /// Validate one observation and match it against the roster.
    fn screen(
        &self,
        observation: &DetectionObservation,
        roster: &[RosterMember],
    ) -> Option<DescriptorMatch> {
        if !observation.bbox.is_valid() {
            tracing::warn!(
                index = observation.index,
                bbox = ?observation.bbox,
                "dropping observation with invalid bounding box"
            );
            return None;
        }
        let descriptor = observation.descriptor.as_ref()?;
        let matched = self
            .matcher
            .nearest(descriptor, roster, self.recognition_threshold)?;
        if matched.confidence < self.confidence_threshold {
            tracing::debug!(
                student = %matched.member_id,
                confidence = matched.confidence,
                "match below confidence threshold, skipped"
            );
            return None;
        }
        Some(matched)
    }

    /// Process one auto-mode detection batch. Returns how many
    /// submissions were made.
    pub async fn process_batch(
        &self,
        submitter: &Submitter,
        session_id: &str,
        roster: &[RosterMember],
        observations: &[DetectionObservation],
        snapshot: &str,
    ) -> usize {
        let mut submitted = 0;
        for observation in observations {
            let Some(matched) = self.screen(observation, roster) else {
                continue;
            };
            let Some(descriptor) = observation.descriptor.clone() else {
                continue;
            };

            // Recently-submitted students are skipped, not errored.
            let acquired = self
                .lock_cooldown()
                .try_acquire(matched.member_id.clone(), Instant::now());
            if !acquired {
                tracing::debug!(student = %matched.member_id, "inside cooldown window, skipped");
                continue;
            }

            let result = submitter
                .submit(
                    session_id,
                    Submission::AutoMatch {
                        student_id: matched.member_id.clone(),
                        descriptor,
                        confidence: matched.confidence,
                        image_base64: snapshot.to_string(),
                    },
                )
                .await;

            match result {
                Ok(()) => submitted += 1,
                Err(e) => {
                    // Free the slot so a later cycle can retry.
                    self.lock_cooldown().release(&matched.member_id);
                    tracing::warn!(
                        student = %matched.member_id,
                        error = %e,
                        "auto-match submission failed"
                    );
                }
            }
        }
        submitted
    }

    /// Process one explicit single-shot capture: same validation and
    /// confidence policy, no cooldown gating.
    pub async fn process_single(
        &self,
        submitter: &Submitter,
        session_id: &str,
        roster: &[RosterMember],
        observations: &[DetectionObservation],
        snapshot: &str,
    ) -> Result<CaptureOutcome, ApiError> {
        if observations.is_empty() {
            return Ok(CaptureOutcome::NoFace);
        }

        let best = observations
            .iter()
            .filter_map(|obs| self.screen(obs, roster).map(|m| (obs, m)))
            .max_by(|(_, a), (_, b)| a.confidence.total_cmp(&b.confidence));

        let Some((observation, matched)) = best else {
            return Ok(CaptureOutcome::NoMatch);
        };
        let Some(descriptor) = observation.descriptor.clone() else {
            return Ok(CaptureOutcome::NoMatch);
        };

        submitter
            .submit(
                session_id,
                Submission::AutoMatch {
                    student_id: matched.member_id.clone(),
                    descriptor,
                    confidence: matched.confidence,
                    image_base64: snapshot.to_string(),
                },
            )
            .await?;

        Ok(CaptureOutcome::Submitted {
            student_id: matched.member_id,
            student_name: matched.member_name,
            confidence: matched.confidence,
        })
    }

    fn lock_cooldown(&self) -> std::sync::MutexGuard<'_, Cooldown<String>> {
        self.cooldown.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::SessionCache;
    use crate::testutil::{descriptor_at, observation, roster_member, valid_box, FakeBackend};
    use rollcall_core::types::{BoundingBox, SessionStatus};

    const REC: f32 = 0.4;
    const CONF: f32 = 0.7;
    const WINDOW: Duration = Duration::from_secs(10);

    fn fixture() -> (Coordinator, Arc<FakeBackend>, Submitter) {
        let backend = FakeBackend::with_session(SessionStatus::Active);
        let submitter = Submitter::new(
            Arc::clone(&backend) as _,
            Arc::new(SessionCache::new()),
            Duration::from_secs(3),
        );
        (Coordinator::new(REC, CONF, WINDOW), backend, submitter)
    }

    #[tokio::test]
    async fn test_close_match_is_submitted_with_confidence() {
        let (coordinator, backend, submitter) = fixture();
        let roster = vec![roster_member("s1", vec![descriptor_at(0.0)])];
        let observations = vec![observation(0, valid_box(), Some(descriptor_at(0.1)))];

        let submitted = coordinator
            .process_batch(&submitter, "sess-1", &roster, &observations, "IMG")
            .await;

        assert_eq!(submitted, 1);
        let calls = backend.verify_calls.lock().unwrap();
        assert_eq!(calls[0].student_id, "s1");
        assert!((calls[0].confidence - 0.9).abs() < 1e-5);
        assert_eq!(calls[0].image_base64, "IMG");
    }

    #[tokio::test]
    async fn test_distant_observation_is_not_submitted() {
        let (coordinator, backend, submitter) = fixture();
        let roster = vec![roster_member("s1", vec![descriptor_at(0.0)])];
        let observations = vec![observation(0, valid_box(), Some(descriptor_at(0.6)))];

        let submitted = coordinator
            .process_batch(&submitter, "sess-1", &roster, &observations, "IMG")
            .await;

        assert_eq!(submitted, 0);
        assert_eq!(backend.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_boxes_never_reach_matcher_or_submitter() {
        let (coordinator, backend, submitter) = fixture();
        let roster = vec![roster_member("s1", vec![descriptor_at(0.0)])];
        let observations = vec![
            observation(
                0,
                BoundingBox { x: 0.0, y: 0.0, width: 0.0, height: 10.0 },
                Some(descriptor_at(0.0)),
            ),
            observation(
                1,
                BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: -5.0 },
                Some(descriptor_at(0.0)),
            ),
            observation(
                2,
                BoundingBox { x: f32::NAN, y: 0.0, width: 10.0, height: 10.0 },
                Some(descriptor_at(0.0)),
            ),
        ];

        let submitted = coordinator
            .process_batch(&submitter, "sess-1", &roster, &observations, "IMG")
            .await;

        assert_eq!(submitted, 0);
        assert_eq!(backend.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_cooldown_makes_repeat_recognitions_idempotent() {
        let (coordinator, backend, submitter) = fixture();
        let roster = vec![roster_member("s1", vec![descriptor_at(0.0)])];
        let observations = vec![observation(0, valid_box(), Some(descriptor_at(0.1)))];

        // Two consecutive cycles inside the window: one submission.
        coordinator
            .process_batch(&submitter, "sess-1", &roster, &observations, "IMG")
            .await;
        coordinator
            .process_batch(&submitter, "sess-1", &roster, &observations, "IMG")
            .await;
        assert_eq!(backend.verify_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_submission_releases_cooldown_slot() {
        let (coordinator, backend, submitter) = fixture();
        backend.fail_verify();
        let roster = vec![roster_member("s1", vec![descriptor_at(0.0)])];
        let observations = vec![observation(0, valid_box(), Some(descriptor_at(0.1)))];

        coordinator
            .process_batch(&submitter, "sess-1", &roster, &observations, "IMG")
            .await;

        // Slot was released; the student is acquirable again right away.
        assert!(coordinator
            .lock_cooldown()
            .try_acquire("s1".to_string(), Instant::now()));
    }

    #[tokio::test]
    async fn test_observation_without_descriptor_is_skipped() {
        let (coordinator, backend, submitter) = fixture();
        let roster = vec![roster_member("s1", vec![descriptor_at(0.0)])];
        let observations = vec![observation(0, valid_box(), None)];

        let submitted = coordinator
            .process_batch(&submitter, "sess-1", &roster, &observations, "IMG")
            .await;

        assert_eq!(submitted, 0);
        assert_eq!(backend.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_capture_reports_no_face_and_no_match() {
        let (coordinator, _backend, submitter) = fixture();
        let roster = vec![roster_member("s1", vec![descriptor_at(0.0)])];

        let outcome = coordinator
            .process_single(&submitter, "sess-1", &roster, &[], "IMG")
            .await
            .unwrap();
        assert!(matches!(outcome, CaptureOutcome::NoFace));

        let distant = vec![observation(0, valid_box(), Some(descriptor_at(0.6)))];
        let outcome = coordinator
            .process_single(&submitter, "sess-1", &roster, &distant, "IMG")
            .await
            .unwrap();
        assert!(matches!(outcome, CaptureOutcome::NoMatch));
    }

    #[tokio::test]
    async fn test_manual_capture_skips_cooldown_gating() {
        let (coordinator, backend, submitter) = fixture();
        let roster = vec![roster_member("s1", vec![descriptor_at(0.0)])];
        let observations = vec![observation(0, valid_box(), Some(descriptor_at(0.1)))];

        // Auto cycle holds the cooldown slot for s1.
        coordinator
            .process_batch(&submitter, "sess-1", &roster, &observations, "IMG")
            .await;
        // Explicit single capture still goes through.
        let outcome = coordinator
            .process_single(&submitter, "sess-1", &roster, &observations, "IMG")
            .await
            .unwrap();
        assert!(matches!(outcome, CaptureOutcome::Submitted { .. }));
        assert_eq!(backend.verify_calls.lock().unwrap().len(), 2);
    }
}
