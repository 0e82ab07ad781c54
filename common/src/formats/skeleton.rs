//! Skeleton formats
//!
//! Two representations are stored in archives:
//!
//! - [`RawSkeleton`] (`armature-raw_skeleton`): the editable description, a
//!   forest of named joints each owning its children.
//! - [`Skeleton`] (`armature-skeleton`): the flattened runtime form, joints in
//!   depth-first order with parents always stored before their children.
//!
//! # Runtime layout (version 1)
//! ```text
//! joint_count u32
//! per joint:
//!   name        string
//!   parent      i32   (-1 for roots)
//!   rest pose   translation f32×3, rotation f32×4 (xyzw), scale f32×3
//! ```

use std::io::{Read, Write};

use crate::formats::archive::{Archivable, ArchiveError, IArchive, OArchive};
use crate::math::Transform;

/// Joint of a raw skeleton, owning its children
#[derive(Debug, Clone, PartialEq)]
pub struct RawJoint {
    pub name: String,
    /// Rest pose, relative to the parent joint
    pub transform: Transform,
    pub children: Vec<RawJoint>,
}

impl RawJoint {
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<RawJoint>) -> Self {
        self.children = children;
        self
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(RawJoint::count).sum::<usize>()
    }
}

/// Unbuilt skeleton description: a forest of joints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSkeleton {
    pub roots: Vec<RawJoint>,
}

impl RawSkeleton {
    /// Total number of joints in every root hierarchy
    pub fn num_joints(&self) -> usize {
        self.roots.iter().map(RawJoint::count).sum()
    }

    pub fn validate(&self) -> bool {
        self.num_joints() <= Skeleton::MAX_JOINTS
    }
}

/// Invalid runtime skeleton data
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkeletonError {
    #[error("Skeleton has {0} joints, maximum is {max}", max = Skeleton::MAX_JOINTS)]
    TooManyJoints(usize),

    #[error("Skeleton arrays disagree: {names} names, {parents} parents, {rest_poses} rest poses")]
    LengthMismatch {
        names: usize,
        parents: usize,
        rest_poses: usize,
    },

    #[error("Joint {joint} has parent {parent}, parents must precede their children")]
    InvalidParent { joint: usize, parent: u16 },
}

/// Runtime skeleton: flattened joints with parent indices
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    names: Vec<String>,
    parents: Vec<Option<u16>>,
    rest_poses: Vec<Transform>,
}

impl Skeleton {
    /// Maximum number of joints in a skeleton
    pub const MAX_JOINTS: usize = 1024;

    /// Assemble a skeleton from parallel joint arrays.
    ///
    /// Every parent index must be lower than its joint's index, which keeps the
    /// hierarchy acyclic and lets passes run root-to-leaf in index order.
    pub fn from_parts(
        names: Vec<String>,
        parents: Vec<Option<u16>>,
        rest_poses: Vec<Transform>,
    ) -> Result<Self, SkeletonError> {
        if names.len() != parents.len() || names.len() != rest_poses.len() {
            return Err(SkeletonError::LengthMismatch {
                names: names.len(),
                parents: parents.len(),
                rest_poses: rest_poses.len(),
            });
        }
        if names.len() > Self::MAX_JOINTS {
            return Err(SkeletonError::TooManyJoints(names.len()));
        }
        for (joint, parent) in parents.iter().enumerate() {
            if let Some(parent) = *parent {
                if parent as usize >= joint {
                    return Err(SkeletonError::InvalidParent { joint, parent });
                }
            }
        }

        Ok(Self {
            names,
            parents,
            rest_poses,
        })
    }

    pub fn num_joints(&self) -> usize {
        self.names.len()
    }

    pub fn joint_names(&self) -> &[String] {
        &self.names
    }

    pub fn joint_parents(&self) -> &[Option<u16>] {
        &self.parents
    }

    pub fn rest_poses(&self) -> &[Transform] {
        &self.rest_poses
    }

    /// Parent of `joint`, `None` for roots
    pub fn parent(&self, joint: usize) -> Option<usize> {
        self.parents.get(joint).copied().flatten().map(usize::from)
    }

    /// Index of the first joint named `name`
    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

// ============================================================================
// Archive support
// ============================================================================

fn save_raw_joint<W: Write>(joint: &RawJoint, archive: &mut OArchive<W>) -> Result<(), ArchiveError> {
    archive.write_str(&joint.name)?;
    archive.write_transform(&joint.transform)?;
    archive.write_len(joint.children.len())?;
    for child in &joint.children {
        save_raw_joint(child, archive)?;
    }
    Ok(())
}

fn load_raw_joint<R: Read>(
    archive: &mut IArchive<R>,
    remaining: &mut usize,
) -> Result<RawJoint, ArchiveError> {
    // Bounds recursion depth as well as the total joint count.
    if *remaining == 0 {
        return Err(ArchiveError::InvalidData(format!(
            "raw skeleton has more than {} joints",
            Skeleton::MAX_JOINTS
        )));
    }
    *remaining -= 1;

    let name = archive.read_string()?;
    let transform = archive.read_transform()?;
    let child_count = archive.read_len()?;
    let children = archive.read_seq(child_count, |archive| load_raw_joint(archive, remaining))?;

    Ok(RawJoint {
        name,
        transform,
        children,
    })
}

impl Archivable for RawSkeleton {
    const TAG: &'static str = "armature-raw_skeleton";
    const VERSION: u32 = 1;

    fn save<W: Write>(&self, archive: &mut OArchive<W>) -> Result<(), ArchiveError> {
        archive.write_len(self.roots.len())?;
        for root in &self.roots {
            save_raw_joint(root, archive)?;
        }
        Ok(())
    }

    fn load<R: Read>(archive: &mut IArchive<R>, _version: u32) -> Result<Self, ArchiveError> {
        let mut remaining = Skeleton::MAX_JOINTS;
        let root_count = archive.read_len()?;
        let roots = archive.read_seq(root_count, |archive| load_raw_joint(archive, &mut remaining))?;
        Ok(Self { roots })
    }
}

impl Archivable for Skeleton {
    const TAG: &'static str = "armature-skeleton";
    const VERSION: u32 = 1;

    fn save<W: Write>(&self, archive: &mut OArchive<W>) -> Result<(), ArchiveError> {
        archive.write_len(self.num_joints())?;
        for ((name, parent), rest_pose) in self.names.iter().zip(&self.parents).zip(&self.rest_poses) {
            archive.write_str(name)?;
            archive.write_i32(parent.map_or(-1, i32::from))?;
            archive.write_transform(rest_pose)?;
        }
        Ok(())
    }

    fn load<R: Read>(archive: &mut IArchive<R>, _version: u32) -> Result<Self, ArchiveError> {
        let joint_count = archive.read_len()?;
        if joint_count > Self::MAX_JOINTS {
            return Err(SkeletonError::TooManyJoints(joint_count).into());
        }

        let mut names = Vec::with_capacity(joint_count);
        let mut parents = Vec::with_capacity(joint_count);
        let mut rest_poses = Vec::with_capacity(joint_count);
        for _ in 0..joint_count {
            names.push(archive.read_string()?);
            let parent = archive.read_i32()?;
            parents.push(match parent {
                -1 => None,
                p => Some(u16::try_from(p).map_err(|_| {
                    ArchiveError::InvalidData(format!("invalid parent index {p}"))
                })?),
            });
            rest_poses.push(archive.read_transform()?);
        }

        Ok(Self::from_parts(names, parents, rest_poses)?)
    }
}

impl From<SkeletonError> for ArchiveError {
    fn from(err: SkeletonError) -> Self {
        ArchiveError::InvalidData(err.to_string())
    }
}
