pub mod episodes;
pub mod session;
pub mod trajectory;

pub use episodes::{ Episode, EpisodeError, EpisodeId, EpisodeInfo, EpisodeSource, EpisodeStats, GoalError };
pub use session::PlaybackSession;
pub use trajectory::{ parse_joint_trajectory, read_trajectory_file, TrajectoryError };
