use super::skeleton::pose;
use crate::types::LandmarkSet;

/// Pose slots hidden from the overlay: the head points are covered by the face
/// mesh and the hand extremities by the hand sets.
pub const HIDDEN_POSE_LANDMARKS: &[usize] = &[
    pose::NOSE,
    pose::LEFT_EYE_INNER,
    pose::LEFT_EYE,
    pose::LEFT_EYE_OUTER,
    pose::RIGHT_EYE_INNER,
    pose::RIGHT_EYE,
    pose::RIGHT_EYE_OUTER,
    pose::LEFT_EAR,
    pose::RIGHT_EAR,
    pose::LEFT_MOUTH,
    pose::RIGHT_MOUTH,
    pose::LEFT_WRIST,
    pose::RIGHT_WRIST,
    pose::LEFT_PINKY,
    pose::RIGHT_PINKY,
    pose::LEFT_INDEX,
    pose::RIGHT_INDEX,
    pose::LEFT_THUMB,
    pose::RIGHT_THUMB,
];

pub fn remove_landmarks(landmarks: &mut LandmarkSet, indices: &[usize]) {
    for &index in indices {
        landmarks.remove(index);
    }
}

pub fn filter_pose(pose: Option<&mut LandmarkSet>) {
    if let Some(pose) = pose {
        remove_landmarks(pose, HIDDEN_POSE_LANDMARKS);
    }
}
