use std::collections::{ BTreeMap, BTreeSet };
use std::sync::Arc;

use serde::{ Deserialize, Serialize };
use thiserror::Error;

use crate::engine::utils::math::{ quat_from_yaw, quat_normalize, quat_yaw, Quat, QUAT_IDENTITY };

/// Position and orientation of a movable prop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: [f32; 3],
    /// `[x, y, z, w]`
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: QUAT_IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(translation: [f32; 3], rotation: Quat) -> Self {
        Self {
            translation,
            rotation: quat_normalize(rotation),
        }
    }

    /// Pose on the table plane: `(x, y)` plus a heading about +Z.
    pub fn planar(x: f32, y: f32, theta: f32) -> Self {
        Self {
            translation: [x, y, 0.0],
            rotation: quat_from_yaw(theta),
        }
    }

    pub fn yaw(&self) -> f32 {
        quat_yaw(self.rotation)
    }
}

/// One recorded instant of a trajectory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub time_from_start: f64,
    pub joints: BTreeMap<String, f64>,
    pub objects: BTreeMap<String, Pose>,
}

impl SceneSnapshot {
    pub fn new(time_from_start: f64) -> Self {
        Self {
            time_from_start,
            ..Self::default()
        }
    }

    pub fn with_joint(mut self, name: impl Into<String>, value: f64) -> Self {
        self.joints.insert(name.into(), value);
        self
    }

    pub fn with_object(mut self, name: impl Into<String>, pose: Pose) -> Self {
        self.objects.insert(name.into(), pose);
        self
    }

    pub fn joint(&self, name: &str) -> Option<f64> {
        self.joints.get(name).copied()
    }

    pub fn object(&self, name: &str) -> Option<&Pose> {
        self.objects.get(name)
    }

    fn joint_names(&self) -> BTreeSet<&str> {
        self.joints.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SequenceError {
    #[error("snapshot {index} has joints {found:?}, expected {expected:?}")]
    InconsistentJoints {
        index: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("snapshot {index} goes back in time ({time} < {previous})")]
    TimeWentBackwards {
        index: usize,
        previous: f64,
        time: f64,
    },
    #[error("snapshot {index} has a non-finite time")]
    NonFiniteTime {
        index: usize,
    },
    #[error("point {index} has {found} positions for {expected} joint names")]
    ArityMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// Validated, immutable list of snapshots.
///
/// Every snapshot carries the same joint names and time never decreases.
/// Cloning is cheap; the snapshots are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    snapshots: Arc<[SceneSnapshot]>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            snapshots: Arc::from(Vec::new()),
        }
    }
}

impl Sequence {
    pub fn new(snapshots: Vec<SceneSnapshot>) -> Result<Self, SequenceError> {
        if let Some(first) = snapshots.first() {
            let expected = first.joint_names();
            let mut previous = f64::NEG_INFINITY;

            for (index, snapshot) in snapshots.iter().enumerate() {
                let found = snapshot.joint_names();
                if found != expected {
                    return Err(SequenceError::InconsistentJoints {
                        index,
                        expected: expected.iter().map(|s| s.to_string()).collect(),
                        found: found.iter().map(|s| s.to_string()).collect(),
                    });
                }

                let time = snapshot.time_from_start;
                if !time.is_finite() {
                    return Err(SequenceError::NonFiniteTime { index });
                }
                if time < previous {
                    return Err(SequenceError::TimeWentBackwards { index, previous, time });
                }
                previous = time;
            }
        }

        Ok(Self {
            snapshots: Arc::from(snapshots),
        })
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SceneSnapshot> {
        self.snapshots.get(index)
    }

    pub fn first(&self) -> Option<&SceneSnapshot> {
        self.snapshots.first()
    }

    pub fn last(&self) -> Option<&SceneSnapshot> {
        self.snapshots.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SceneSnapshot> {
        self.snapshots.iter()
    }

    /// Joint names shared by every snapshot.
    pub fn joint_names(&self) -> Vec<&str> {
        self.first()
            .map(|s| s.joints.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Recorded duration in seconds.
    pub fn duration(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => last.time_from_start - first.time_from_start,
            _ => 0.0,
        }
    }

    /// Shared handle to the snapshots, as handed to the player.
    pub fn snapshots(&self) -> Arc<[SceneSnapshot]> {
        Arc::clone(&self.snapshots)
    }
}

impl From<Sequence> for Arc<[SceneSnapshot]> {
    fn from(sequence: Sequence) -> Self {
        sequence.snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(t: f64, j1: f64) -> SceneSnapshot {
        SceneSnapshot::new(t).with_joint("j1", j1)
    }

    #[test]
    fn accepts_consistent_monotonic_snapshots() {
        let sequence = Sequence::new(vec![snapshot(0.0, 0.0), snapshot(1.0, 1.0), snapshot(1.0, 2.0)])
            .unwrap();
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.joint_names(), vec!["j1"]);
        assert_eq!(sequence.duration(), 1.0);
    }

    #[test]
    fn empty_sequence_is_valid() {
        let sequence = Sequence::new(Vec::new()).unwrap();
        assert!(sequence.is_empty());
        assert_eq!(sequence.duration(), 0.0);
        assert!(sequence.joint_names().is_empty());
    }

    #[test]
    fn rejects_changing_joint_names() {
        let err = Sequence::new(vec![
            snapshot(0.0, 0.0),
            SceneSnapshot::new(1.0).with_joint("j2", 0.0),
        ]).unwrap_err();
        assert!(matches!(err, SequenceError::InconsistentJoints { index: 1, .. }));
    }

    #[test]
    fn rejects_time_going_backwards() {
        let err = Sequence::new(vec![snapshot(1.0, 0.0), snapshot(0.5, 0.0)]).unwrap_err();
        assert_eq!(err, SequenceError::TimeWentBackwards { index: 1, previous: 1.0, time: 0.5 });
    }

    #[test]
    fn planar_pose_keeps_heading() {
        let pose = Pose::planar(0.2, -0.1, 1.2);
        assert!((pose.yaw() - 1.2).abs() < 1e-5);
        assert_eq!(pose.translation, [0.2, -0.1, 0.0]);
    }
}
