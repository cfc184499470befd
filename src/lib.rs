//! Robot model loading and recorded-trajectory playback.
//!
//! [`AssetLoader`] turns a robot description URL into a [`LoadedAsset`],
//! fetching every mesh it references. [`SequencePlayer`] steps through a
//! recorded sequence of [`SceneSnapshot`]s on a fixed tick and reports each
//! frame to a callback. [`PlaybackSession`] wires episode selection to the
//! player.

pub mod config;
pub mod engine;
pub mod viewer;

pub use config::{ ConfigError, ViewerConfig };
pub use engine::components::{ LoadedAsset, Pose, SceneSnapshot, Sequence };
pub use engine::loaders::{ AssetLoader, Fetcher, HttpFetcher, LoadError, MemoryFetcher };
pub use engine::managers::{ AssetsManager, QueryCache };
pub use engine::systems::{ PlayerError, PlayerState, SequencePlayer, TickInterval };
pub use viewer::{ EpisodeId, EpisodeSource, PlaybackSession };
