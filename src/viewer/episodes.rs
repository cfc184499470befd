//! Recorded episodes and the statistics file that indexes them.
//!
//! An episode file looks like
//!
//! ```json
//! { "episodeId": 3,
//!   "goal": { "position": { "x": 0.4, "y": 0.1 }, "rotation": { "theta": 1.2 } },
//!   "points": [ { "timeFromStart": 0.0,
//!                 "leftArm": { "joint0": 0.1, "joint1": 0.2 },
//!                 "cylinder": { "position": { "x": 0.3, "y": 0.0 }, "rotation": { "theta": 0.0 } } } ] }
//! ```
//!
//! Joint groups are flattened to `<group>.<joint>` names; groups carrying a
//! `position` and a `rotation` become object poses.

use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{ Deserialize, Deserializer, Serialize };
use serde_json::{ Map, Value };
use thiserror::Error;
use tracing::{ info, instrument };
use url::Url;

use crate::engine::components::{ Pose, SceneSnapshot, Sequence, SequenceError };
use crate::engine::loaders::{ FetchError, Fetcher, ParseError };
use crate::engine::utils::absolute_url;
use crate::engine::utils::math::quat_from_yaw;

const TIME_KEY: &str = "timeFromStart";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EpisodeId {
    Number(u64),
    Name(String),
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpisodeId::Number(n) => write!(f, "{n}"),
            EpisodeId::Name(name) => f.write_str(name),
        }
    }
}

impl From<u64> for EpisodeId {
    fn from(n: u64) -> Self {
        EpisodeId::Number(n)
    }
}

impl From<&str> for EpisodeId {
    fn from(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| EpisodeId::Name(name.to_string()))
    }
}

impl FromStr for EpisodeId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<u64>() {
            Ok(n) => EpisodeId::Number(n),
            Err(_) => EpisodeId::Name(s.to_string()),
        })
    }
}

#[derive(Debug, Error)]
pub enum EpisodeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("{url}: point {index}: {message}")]
    Snapshot {
        url: Url,
        index: usize,
        message: String,
    },
    #[error("{url}: {source}")]
    Sequence {
        url: Url,
        #[source]
        source: SequenceError,
    },
    #[error("cannot build episode URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRotation {
    Quaternion {
        w: f32,
        x: f32,
        y: f32,
        z: f32,
    },
    Planar {
        theta: f32,
    },
}

#[derive(Debug, Deserialize)]
struct RawPose {
    position: RawPosition,
    rotation: RawRotation,
}

impl From<RawPose> for Pose {
    fn from(raw: RawPose) -> Self {
        let rotation = match raw.rotation {
            RawRotation::Quaternion { w, x, y, z } => [x, y, z, w],
            RawRotation::Planar { theta } => quat_from_yaw(theta),
        };
        Pose::new([raw.position.x, raw.position.y, raw.position.z], rotation)
    }
}

fn pose<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pose, D::Error> {
    RawPose::deserialize(deserializer).map(Pose::from)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEpisode {
    episode_id: EpisodeId,
    #[serde(deserialize_with = "pose")]
    goal: Pose,
    points: Vec<Map<String, Value>>,
}

/// A recorded run: the snapshots to play and the pose the object should reach.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub episode_id: EpisodeId,
    pub goal: Pose,
    pub points: Sequence,
}

impl Episode {
    pub fn from_json(url: &Url, data: &[u8]) -> Result<Self, EpisodeError> {
        let raw: RawEpisode = serde_json::from_slice(data).map_err(|source| ParseError::Json {
            url: url.clone(),
            source,
        })?;

        let snapshots = raw.points
            .iter()
            .enumerate()
            .map(|(index, point)| {
                snapshot_from_json(point).map_err(|message| EpisodeError::Snapshot {
                    url: url.clone(),
                    index,
                    message,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let points = Sequence::new(snapshots).map_err(|source| EpisodeError::Sequence {
            url: url.clone(),
            source,
        })?;

        Ok(Self {
            episode_id: raw.episode_id,
            goal: raw.goal,
            points,
        })
    }
}

fn snapshot_from_json(point: &Map<String, Value>) -> Result<SceneSnapshot, String> {
    let time = point
        .get(TIME_KEY)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("missing numeric {TIME_KEY}"))?;
    let mut snapshot = SceneSnapshot::new(time);

    for (group, value) in point {
        if group == TIME_KEY {
            continue;
        }
        match value {
            Value::Number(n) => {
                let position = n.as_f64().ok_or_else(|| format!("{group} is not a finite number"))?;
                snapshot.joints.insert(group.clone(), position);
            }
            Value::Object(fields) if fields.contains_key("position") && fields.contains_key("rotation") => {
                let raw: RawPose = serde_json::from_value(value.clone()).map_err(|e| format!("{group}: {e}"))?;
                snapshot.objects.insert(group.clone(), Pose::from(raw));
            }
            Value::Object(fields) => {
                for (joint, position) in fields {
                    let position = position
                        .as_f64()
                        .ok_or_else(|| format!("{group}.{joint} is not a number"))?;
                    snapshot.joints.insert(format!("{group}.{joint}"), position);
                }
            }
            _ => {
                return Err(format!("{group} is neither a joint group nor a pose"));
            }
        }
    }

    Ok(snapshot)
}

/// Distance between where an object ended up and its goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalError {
    pub position: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl GoalError {
    pub fn between(reached: &Pose, goal: &Pose) -> Self {
        let position = reached.translation
            .iter()
            .zip(goal.translation.iter())
            .map(|(a, b)| f64::from(a - b).powi(2))
            .sum::<f64>()
            .sqrt();

        let mut rotation = (reached.yaw() - goal.yaw()).abs() % (2.0 * PI);
        if rotation > PI {
            rotation = 2.0 * PI - rotation;
        }

        Self {
            position,
            rotation: f64::from(rotation),
        }
    }
}

/// One point of the episode scatter plot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeInfo {
    pub episode_id: EpisodeId,
    #[serde(deserialize_with = "pose")]
    pub goal: Pose,
    #[serde(deserialize_with = "pose")]
    pub initial_pose: Pose,
    #[serde(deserialize_with = "pose")]
    pub final_pose: Pose,
    #[serde(default)]
    pub error: Option<GoalError>,
}

impl EpisodeInfo {
    /// Summary of `episode` as seen through the pose of `object`.
    pub fn summarize(episode: &Episode, object: &str) -> Option<Self> {
        let initial_pose = *episode.points.first()?.object(object)?;
        let final_pose = *episode.points.last()?.object(object)?;
        Some(Self {
            episode_id: episode.episode_id.clone(),
            goal: episode.goal,
            initial_pose,
            final_pose,
            error: Some(GoalError::between(&final_pose, &episode.goal)),
        })
    }
}

pub type EpisodeStats = Vec<EpisodeInfo>;

/// Fetches episodes of one robot from `data/<robot>/` under a base URL.
#[derive(Debug, Clone)]
pub struct EpisodeSource<F> {
    fetcher: F,
    base_url: Url,
    robot: String,
}

impl<F: Fetcher> EpisodeSource<F> {
    pub fn new(fetcher: F, base_url: Url, robot: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url,
            robot: robot.into(),
        }
    }

    pub fn robot(&self) -> &str {
        &self.robot
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn episode_url(&self, id: &EpisodeId) -> Result<Url, url::ParseError> {
        absolute_url(&self.base_url, &format!("data/{}/episode_{id}.json", self.robot))
    }

    pub fn stats_url(&self) -> Result<Url, url::ParseError> {
        absolute_url(&self.base_url, &format!("data/{}/stats.json", self.robot))
    }

    #[instrument(skip_all, fields(robot = %self.robot, episode = %id))]
    pub async fn fetch_episode(&self, id: &EpisodeId) -> Result<Episode, EpisodeError> {
        let url = self.episode_url(id)?;
        let data = self.fetcher.fetch(&url).await?;
        let episode = Episode::from_json(&url, &data)?;
        info!(points = episode.points.len(), duration = episode.points.duration(), "episode loaded");
        Ok(episode)
    }

    #[instrument(skip_all, fields(robot = %self.robot))]
    pub async fn fetch_stats(&self) -> Result<EpisodeStats, EpisodeError> {
        let url = self.stats_url()?;
        let data = self.fetcher.fetch(&url).await?;
        let stats: EpisodeStats = serde_json::from_slice(&data).map_err(|source| ParseError::Json {
            url: url.clone(),
            source,
        })?;
        info!(episodes = stats.len(), "episode stats loaded");
        Ok(stats)
    }
}
