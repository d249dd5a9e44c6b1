//! Nearest-descriptor matching under a Euclidean distance threshold.

use crate::types::{DescriptorMatch, FaceDescriptor, RosterMember};

/// Default distance below which an observation counts as a match.
pub const RECOGNITION_THRESHOLD: f32 = 0.4;

/// Strategy for matching an observed descriptor against the roster.
pub trait Matcher {
    /// Return the roster member whose enrolled descriptor is nearest to
    /// `observed`, or `None` when nothing clears the threshold.
    fn nearest(
        &self,
        observed: &FaceDescriptor,
        roster: &[RosterMember],
        threshold: f32,
    ) -> Option<DescriptorMatch>;
}

/// Euclidean nearest-descriptor matcher.
///
/// Scans every (member, descriptor) pair and tracks the global minimum
/// distance; the owning member matches only when that minimum is
/// strictly below the threshold. Members without enrolled descriptors
/// never match.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn nearest(
        &self,
        observed: &FaceDescriptor,
        roster: &[RosterMember],
        threshold: f32,
    ) -> Option<DescriptorMatch> {
        let mut best_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, member) in roster.iter().enumerate() {
            for enrolled in &member.descriptors {
                let distance = observed.euclidean_distance(enrolled);
                if distance < best_distance {
                    best_distance = distance;
                    best_idx = Some(i);
                }
            }
        }

        match best_idx {
            Some(idx) if best_distance < threshold => {
                let member = &roster[idx];
                Some(DescriptorMatch {
                    member_id: member.id.clone(),
                    member_name: member.name.clone(),
                    distance: best_distance,
                    confidence: (1.0 - best_distance).clamp(0.0, 1.0),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DESCRIPTOR_LEN;

    /// Descriptor at Euclidean distance `d` from the all-zero descriptor.
    fn descriptor_at(d: f32) -> FaceDescriptor {
        let mut values = vec![0.0; DESCRIPTOR_LEN];
        values[0] = d;
        FaceDescriptor::new(values).unwrap()
    }

    fn member(id: &str, descriptors: Vec<FaceDescriptor>) -> RosterMember {
        RosterMember {
            id: id.into(),
            name: format!("Student {id}"),
            descriptors,
        }
    }

    #[test]
    fn test_nearest_picks_global_minimum() {
        let observed = descriptor_at(0.0);
        let roster = vec![
            member("far", vec![descriptor_at(0.3)]),
            member("near", vec![descriptor_at(0.35), descriptor_at(0.1)]),
        ];
        let result = EuclideanMatcher
            .nearest(&observed, &roster, RECOGNITION_THRESHOLD)
            .unwrap();
        assert_eq!(result.member_id, "near");
        assert!((result.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_distance_at_threshold_is_no_match() {
        let observed = descriptor_at(0.0);
        let roster = vec![member("s1", vec![descriptor_at(RECOGNITION_THRESHOLD)])];
        // Strictly-less-than: exactly at the threshold does not match.
        assert!(EuclideanMatcher
            .nearest(&observed, &roster, RECOGNITION_THRESHOLD)
            .is_none());
    }

    #[test]
    fn test_distance_above_threshold_never_matches() {
        let observed = descriptor_at(0.0);
        let roster: Vec<RosterMember> = (0..20)
            .map(|i| member(&format!("s{i}"), vec![descriptor_at(0.6)]))
            .collect();
        assert!(EuclideanMatcher
            .nearest(&observed, &roster, RECOGNITION_THRESHOLD)
            .is_none());
    }

    #[test]
    fn test_confidence_is_one_minus_distance() {
        let observed = descriptor_at(0.0);
        let roster = vec![member("s1", vec![descriptor_at(0.1)])];
        let result = EuclideanMatcher
            .nearest(&observed, &roster, RECOGNITION_THRESHOLD)
            .unwrap();
        assert!((result.confidence - 0.9).abs() < 1e-5);
        assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
    }

    #[test]
    fn test_confidence_clamped_for_large_distances() {
        let observed = descriptor_at(0.0);
        let roster = vec![member("s1", vec![descriptor_at(1.5)])];
        // Threshold widened so the match goes through; 1 − 1.5 clamps to 0.
        let result = EuclideanMatcher.nearest(&observed, &roster, 2.0).unwrap();
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_empty_roster_is_no_match() {
        let observed = descriptor_at(0.0);
        assert!(EuclideanMatcher
            .nearest(&observed, &[], RECOGNITION_THRESHOLD)
            .is_none());
    }

    #[test]
    fn test_member_without_descriptors_is_skipped() {
        let observed = descriptor_at(0.0);
        let roster = vec![
            member("empty", vec![]),
            member("enrolled", vec![descriptor_at(0.2)]),
        ];
        let result = EuclideanMatcher
            .nearest(&observed, &roster, RECOGNITION_THRESHOLD)
            .unwrap();
        assert_eq!(result.member_id, "enrolled");
    }

    #[test]
    fn test_roster_of_empty_members_is_no_match() {
        let observed = descriptor_at(0.0);
        let roster = vec![member("a", vec![]), member("b", vec![])];
        assert!(EuclideanMatcher
            .nearest(&observed, &roster, RECOGNITION_THRESHOLD)
            .is_none());
    }

    #[test]
    fn test_closer_candidate_preferred() {
        let observed = descriptor_at(0.0);
        let roster = vec![
            member("d2", vec![descriptor_at(0.3)]),
            member("d1", vec![descriptor_at(0.2)]),
        ];
        let result = EuclideanMatcher
            .nearest(&observed, &roster, RECOGNITION_THRESHOLD)
            .unwrap();
        assert_eq!(result.member_id, "d1");
    }
}
