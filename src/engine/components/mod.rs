pub mod loaded_asset;
pub mod scene_snapshot;

// Re-export the main types for easy access
pub use loaded_asset::{
    AssetError,
    Description,
    GltfDescription,
    JointDescription,
    JointKind,
    JointLimit,
    LoadedAsset,
    Resource,
    ResourceKind,
    RobotDescription,
};
pub use scene_snapshot::{ Pose, SceneSnapshot, Sequence, SequenceError };
