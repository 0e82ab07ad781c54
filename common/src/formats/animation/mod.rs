//! Animation formats
//!
//! - [`RawAnimation`] (`armature-raw_animation`): editable per-joint keyframe
//!   tracks, one track per skeleton joint.
//! - [`Animation`] (`armature-animation`): the compiled runtime form, with
//!   quantized keys sorted in the order a forward sampler consumes them.
//!
//! # Raw layout (version 1)
//! ```text
//! name          string
//! duration      f32 (seconds)
//! track_count   u32
//! per track:
//!   translations  count u32, then (time f32, value f32×3)
//!   rotations     count u32, then (time f32, value f32×4 xyzw)
//!   scales        count u32, then (time f32, value f32×3)
//! ```
//!
//! # Runtime layout (version 1)
//! ```text
//! name          string
//! duration      f32
//! track_count   u32
//! translations  count u32, then (ratio f32, track u16, value f16×3)
//! rotations     count u32, then (ratio f32, track u16, value u32 smallest-three)
//! scales        count u32, then (ratio f32, track u16, value f16×3)
//! ```

mod raw;
mod runtime;


pub use raw::{
    Channel, JointTrack, KeyCounts, Keyframe, RawAnimation, RawAnimationError, RotationKey,
    ScaleKey, TranslationKey,
};
pub use runtime::{Animation, Float3Key, QuaternionKey};
