//! Shared types and binary formats for the Armature animation toolchain
//!
//! This crate provides the data model shared between the offline builders
//! (`armature-export`) and anything that reads their output:
//!
//! - [`math`] - Joint transforms and rotation helpers
//! - [`formats`] - Skeletons, raw and compiled animations, and the
//!   endian-explicit tagged archive they are stored in

pub mod formats;
pub mod math;

pub use math::Transform;

// Re-export commonly used format items
pub use formats::{
    Animation, Archivable, ArchiveError, Channel, Endianness, Float3Key, IArchive, JointTrack,
    KeyCounts, Keyframe, OArchive, QuaternionKey, RawAnimation, RawAnimationError, RawJoint,
    RawSkeleton, RotationKey, ScaleKey, Skeleton, SkeletonError, TranslationKey,
};
