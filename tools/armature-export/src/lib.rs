//! armature-export library
//!
//! Offline animation conversion: imports skeletal animations, optionally turns
//! them into additive deltas, reduces their keyframes within error tolerances,
//! compiles them to the compact runtime form and writes them to archives.
//! The `armature-export` binary is a thin CLI over [`export::AnimationConverter`].

pub mod additive;
pub mod builder;
pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod optimizer;
pub mod skeleton;

pub use additive::AdditiveAnimationBuilder;
pub use builder::{AnimationBuilder, SkeletonBuilder};
pub use config::{AdditiveReference, AnimationConfig, ConversionConfig};
pub use error::{ConvertError, ExportError};
pub use export::{AnimationConverter, BatchReport, ConvertOptions, EndianMode, export_animation};
pub use import::{AnimationImporter, GltfImporter};
pub use optimizer::{AnimationOptimizer, OptimizationStats, OptimizationTolerances};
