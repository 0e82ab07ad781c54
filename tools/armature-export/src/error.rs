//! Error types for the conversion pipeline
//!
//! Each stage reports its own error. [`ExportError`] wraps the stages of a
//! single animation export and never stops a batch. [`ConvertError`] covers
//! the failures that prevent any animation from being exported.

use std::io;
use std::path::PathBuf;

use armature_common::{ArchiveError, RawAnimationError, SkeletonError};

use crate::config::ConfigError;

/// Failure building a runtime skeleton from its raw description
#[derive(Debug, thiserror::Error)]
pub enum SkeletonBuildError {
    #[error("Skeleton has {count} joints, maximum is {max}")]
    TooManyJoints { count: usize, max: usize },

    #[error(transparent)]
    Skeleton(#[from] SkeletonError),
}

/// Failure reading the skeleton an animation is converted against
#[derive(Debug, thiserror::Error)]
pub enum SkeletonImportError {
    #[error("Failed to open skeleton file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read skeleton archive {path:?}")]
    Archive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },

    #[error("File {path:?} contains neither a raw nor a runtime skeleton")]
    UnknownTag { path: PathBuf },

    #[error("Failed to build skeleton from {path:?}")]
    Build {
        path: PathBuf,
        #[source]
        source: SkeletonBuildError,
    },
}

/// Failure extracting animations from a source asset
#[derive(Debug, thiserror::Error)]
pub enum AnimationImportError {
    #[error("Failed to load {path:?}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Animation '{animation}' has zero duration")]
    ZeroDuration { animation: String },

    #[error("Animation '{animation}' has unreadable channel data: {message}")]
    InvalidChannel { animation: String, message: String },

    #[error("No animation found in {path:?}")]
    NoAnimations { path: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum AdditiveBuildError {
    #[error("Invalid input animation: {0}")]
    InvalidAnimation(#[from] RawAnimationError),

    #[error("Reference pose has {found} transforms, animation has {expected} tracks")]
    ReferenceLength { expected: usize, found: usize },

    #[error("Track {track} scale reference {value} has a zero component")]
    ZeroScaleReference { track: usize, value: glam::Vec3 },
}

#[derive(Debug, thiserror::Error)]
pub enum OptimizationError {
    #[error("Invalid input animation: {0}")]
    InvalidAnimation(#[from] RawAnimationError),

    #[error("Animation has {tracks} tracks, skeleton has {joints} joints")]
    TrackCountMismatch { tracks: usize, joints: usize },

    #[error("Tolerance '{name}' must not be negative, got {value}")]
    NegativeTolerance { name: &'static str, value: f32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Invalid input animation: {0}")]
    InvalidAnimation(#[from] RawAnimationError),

    #[error("Animation has {tracks} tracks, skeleton has {joints} joints")]
    TrackCountMismatch { tracks: usize, joints: usize },

    #[error("Animation has {0} tracks, maximum is {max}", max = u16::MAX)]
    TooManyTracks(usize),
}

/// Failure opening or writing an output archive
#[derive(Debug, thiserror::Error)]
pub enum OutputIoError {
    #[error("Failed to open output file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write output file {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
}

/// Failure exporting a single animation
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to build additive animation")]
    Additive(#[from] AdditiveBuildError),

    #[error("Failed to optimize animation")]
    Optimization(#[from] OptimizationError),

    #[error("Failed to compile runtime animation")]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Output(#[from] OutputIoError),
}

/// Failure that prevents a conversion batch from running
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Invalid configuration")]
    Config(#[from] ConfigError),

    #[error("Input file {0:?} does not exist")]
    MissingInput(PathBuf),

    #[error("Failed to import skeleton")]
    Skeleton(#[from] SkeletonImportError),

    #[error("Failed to import animations")]
    Import(#[from] AnimationImportError),
}
