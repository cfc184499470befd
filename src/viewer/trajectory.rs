use std::path::{ Path, PathBuf };

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::engine::components::{ SceneSnapshot, Sequence, SequenceError };

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid trajectory JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

#[derive(Debug, Deserialize)]
struct TrajectoryPoint {
    time_from_start: f64,
    positions: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct JointTrajectory {
    joint_names: Vec<String>,
    points: Vec<TrajectoryPoint>,
}

/// Parses a `{ joint_names, points: [{ time_from_start, positions }] }`
/// document. The n-th position of every point drives the n-th joint name.
pub fn parse_joint_trajectory(json: &str) -> Result<Sequence, TrajectoryError> {
    let trajectory: JointTrajectory = serde_json::from_str(json)?;
    let expected = trajectory.joint_names.len();

    let snapshots = trajectory.points
        .into_iter()
        .enumerate()
        .map(|(index, point)| {
            if point.positions.len() != expected {
                return Err(SequenceError::ArityMismatch {
                    index,
                    expected,
                    found: point.positions.len(),
                });
            }
            let joints = trajectory.joint_names.iter().cloned().zip(point.positions).collect();
            Ok(SceneSnapshot {
                time_from_start: point.time_from_start,
                joints,
                ..SceneSnapshot::default()
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Sequence::new(snapshots)?)
}

pub async fn read_trajectory_file(path: impl AsRef<Path>) -> Result<Sequence, TrajectoryError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path).await.map_err(|source| TrajectoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let sequence = parse_joint_trajectory(&json)?;
    debug!(path = %path.display(), points = sequence.len(), "trajectory read");
    Ok(sequence)
}
