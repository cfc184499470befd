use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;
use url::Url;
use uuid::Uuid;

use super::scene_snapshot::SceneSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    Revolute,
    Continuous,
    Prismatic,
    Fixed,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimit {
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JointDescription {
    pub name: String,
    pub kind: JointKind,
    pub limit: Option<JointLimit>,
    /// Joint this one follows, if any.
    pub mimic: Option<String>,
}

impl JointDescription {
    /// Whether a joint value can be set on this joint at all.
    pub fn is_driven(&self) -> bool {
        matches!(self.kind, JointKind::Revolute | JointKind::Continuous | JointKind::Prismatic)
    }

    fn clamp(&self, value: f64) -> f64 {
        match (self.kind, self.limit) {
            (JointKind::Revolute | JointKind::Prismatic, Some(limit)) if limit.lower < limit.upper => {
                value.clamp(limit.lower, limit.upper)
            }
            _ => value,
        }
    }
}

/// Kinematic description read from a URDF document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RobotDescription {
    pub name: String,
    pub joints: Vec<JointDescription>,
    /// Mesh filenames exactly as written in the document, de-duplicated.
    pub mesh_references: Vec<String>,
}

impl RobotDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn joint(&self, name: &str) -> Option<&JointDescription> {
        self.joints.iter().find(|j| j.name == name)
    }
}

/// Summary of a glTF scene document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GltfDescription {
    pub node_names: Vec<String>,
    pub mesh_count: usize,
    pub animation_count: usize,
    /// Declared `byteLength` of each external buffer, keyed by its URI.
    pub buffer_lengths: BTreeMap<String, usize>,
    /// External buffer and image URIs as written in the document.
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Description {
    Urdf(RobotDescription),
    Gltf(GltfDescription),
}

impl Description {
    pub fn references(&self) -> &[String] {
        match self {
            Description::Urdf(robot) => &robot.mesh_references,
            Description::Gltf(scene) => &scene.references,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Mesh,
    Buffer,
    Image,
}

/// A fetched sub-resource. The bytes are immutable and shared between copies.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub reference: String,
    pub url: Url,
    pub kind: ResourceKind,
    pub bytes: Bytes,
}

#[derive(Debug, Error, PartialEq)]
pub enum AssetError {
    #[error("unknown joint {0}")]
    UnknownJoint(String),
    #[error("joint {0} is not driven by joint values")]
    NotDriven(String),
    #[error("joint {name} got a non-finite value {value}")]
    NonFinite {
        name: String,
        value: f64,
    },
}

/// Fully resolved robot/object model.
///
/// The loader hands out one value per call. A value shared through the cache
/// must not be posed directly: every visual consumer takes its own copy with
/// [`LoadedAsset::instantiate`].
#[derive(Debug)]
pub struct LoadedAsset {
    instance_id: Uuid,
    source: Url,
    resource_base: Url,
    description: Description,
    resources: Vec<Resource>,
    joint_positions: BTreeMap<String, f64>,
}

impl LoadedAsset {
    pub fn new(source: Url, resource_base: Url, description: Description, resources: Vec<Resource>) -> Self {
        let joint_positions = match &description {
            Description::Urdf(robot) => robot.joints
                .iter()
                .filter(|j| j.is_driven())
                .map(|j| (j.name.clone(), 0.0))
                .collect(),
            Description::Gltf(_) => BTreeMap::new(),
        };

        Self {
            instance_id: Uuid::new_v4(),
            source,
            resource_base,
            description,
            resources,
            joint_positions,
        }
    }

    /// Independent copy with its own id and pose state.
    pub fn instantiate(&self) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            source: self.source.clone(),
            resource_base: self.resource_base.clone(),
            description: self.description.clone(),
            resources: self.resources.clone(),
            joint_positions: self.joint_positions.clone(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn source(&self) -> &Url {
        &self.source
    }

    pub fn resource_base(&self) -> &Url {
        &self.resource_base
    }

    pub fn description(&self) -> &Description {
        &self.description
    }

    pub fn robot(&self) -> Option<&RobotDescription> {
        match &self.description {
            Description::Urdf(robot) => Some(robot),
            Description::Gltf(_) => None,
        }
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resource(&self, url: &Url) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.url == url)
    }

    pub fn joint_value(&self, name: &str) -> Option<f64> {
        self.joint_positions.get(name).copied()
    }

    pub fn joint_positions(&self) -> &BTreeMap<String, f64> {
        &self.joint_positions
    }

    /// Sets a joint, clamped to its limits. Returns the value actually applied.
    pub fn set_joint_value(&mut self, name: &str, value: f64) -> Result<f64, AssetError> {
        let joint = self.robot()
            .and_then(|robot| robot.joint(name))
            .ok_or_else(|| AssetError::UnknownJoint(name.to_string()))?;

        if !joint.is_driven() {
            return Err(AssetError::NotDriven(name.to_string()));
        }
        if !value.is_finite() {
            return Err(AssetError::NonFinite { name: name.to_string(), value });
        }

        let applied = joint.clamp(value);
        let mimics: Vec<String> = self.robot()
            .map(|robot| robot.joints
                .iter()
                .filter(|j| j.mimic.as_deref() == Some(name))
                .map(|j| j.name.clone())
                .collect())
            .unwrap_or_default();

        self.joint_positions.insert(name.to_string(), applied);
        for follower in mimics {
            self.joint_positions.insert(follower, applied);
        }
        Ok(applied)
    }

    /// Applies every joint of `snapshot` this model knows about.
    ///
    /// Returns how many joints were set. Names the model does not have are
    /// skipped, since a snapshot usually drives several models at once.
    pub fn apply_snapshot(&mut self, snapshot: &SceneSnapshot) -> usize {
        self.apply_joints(snapshot.joints.iter().map(|(name, value)| (name.clone(), *value)))
    }

    /// Applies the joints recorded under one group of a snapshot.
    ///
    /// Episode snapshots name their joints `<group>.<joint>`, and one model
    /// instance is driven per group. `rename` maps the `<joint>` part to the
    /// model's joint name, e.g. `joint0` to `iiwa_joint0`.
    pub fn apply_group(
        &mut self,
        snapshot: &SceneSnapshot,
        group: &str,
        rename: impl Fn(&str) -> String
    ) -> usize {
        let joints = snapshot.joints.iter().filter_map(|(name, value)| {
            let joint = name.strip_prefix(group)?.strip_prefix('.')?;
            Some((rename(joint), *value))
        });
        self.apply_joints(joints)
    }

    fn apply_joints(&mut self, joints: impl Iterator<Item = (String, f64)>) -> usize {
        let mut applied = 0;
        for (name, value) in joints {
            match self.set_joint_value(&name, value) {
                Ok(_) => applied += 1,
                Err(err) => trace!(asset = %self.source, %err, "snapshot joint skipped"),
            }
        }
        applied
    }
}
