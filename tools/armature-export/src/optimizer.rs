//! Keyframe optimizer
//!
//! Removes keys that linear interpolation between their neighbours already
//! reproduces within tolerance. Each channel has its own tolerance; a second,
//! hierarchical tolerance bounds how far an error on a joint moves the end of
//! its longest descendant chain. Chain lengths follow the parent-to-child
//! composition `T + R * (S * t)`, so scaled joints lengthen their chains.

use glam::{Quat, Vec3};

use armature_common::math::{nlerp, quat_angle};
use armature_common::{
    JointTrack, KeyCounts, Keyframe, RawAnimation, RotationKey, ScaleKey, Skeleton, Transform,
    TranslationKey,
};

use crate::error::OptimizationError;

/// Error bounds used when removing keys
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationTolerances {
    /// Distance between two translations, in meters
    pub translation: f32,
    /// Angle between two rotations, in radians
    pub rotation: f32,
    /// Norm of the difference of two scales
    pub scale: f32,
    /// Maximum displacement, in meters, an error on a joint may cause at the
    /// end of its child hierarchy
    pub hierarchical: f32,
}

impl Default for OptimizationTolerances {
    fn default() -> Self {
        Self {
            translation: 1e-3,
            rotation: 0.1f32.to_radians(),
            scale: 1e-3,
            hierarchical: 1e-3,
        }
    }
}

/// Key counts before and after an optimization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    pub before: KeyCounts,
    pub after: KeyCounts,
}

impl OptimizationStats {
    pub fn translation_reduction(&self) -> f32 {
        reduction(self.before.translations, self.after.translations)
    }

    pub fn rotation_reduction(&self) -> f32 {
        reduction(self.before.rotations, self.after.rotations)
    }

    pub fn scale_reduction(&self) -> f32 {
        reduction(self.before.scales, self.after.scales)
    }
}

/// Percentage of keys removed
fn reduction(before: usize, after: usize) -> f32 {
    if before == 0 {
        0.0
    } else {
        100.0 * (1.0 - after as f32 / before as f32)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnimationOptimizer {
    pub tolerances: OptimizationTolerances,
}

impl AnimationOptimizer {
    pub fn new(tolerances: OptimizationTolerances) -> Self {
        Self { tolerances }
    }

    /// Build a reduced copy of `input`. Duration, name and track layout are
    /// preserved; no channel gains keys.
    pub fn optimize(
        &self,
        input: &RawAnimation,
        skeleton: &Skeleton,
    ) -> Result<(RawAnimation, OptimizationStats), OptimizationError> {
        let tolerances = self.tolerances;
        for (name, value) in [
            ("translation", tolerances.translation),
            ("rotation", tolerances.rotation),
            ("scale", tolerances.scale),
            ("hierarchical", tolerances.hierarchical),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(OptimizationError::NegativeTolerance { name, value });
            }
        }
        if input.num_tracks() != skeleton.num_joints() {
            return Err(OptimizationError::TrackCountMismatch {
                tracks: input.num_tracks(),
                joints: skeleton.num_joints(),
            });
        }
        input.check()?;

        let lengths = chain_lengths(input, skeleton);
        let tracks = input
            .tracks
            .iter()
            .zip(skeleton.rest_poses())
            .zip(&lengths)
            .map(|((track, rest), &length)| {
                // Rotation applies after the joint's own scale, scale before it
                let scaled = max_scale(track, rest) * length;
                JointTrack {
                    translations: reduce(&track.translations, tolerances.translation, length, tolerances.hierarchical),
                    rotations: reduce(&track.rotations, tolerances.rotation, scaled, tolerances.hierarchical),
                    scales: reduce(&track.scales, tolerances.scale, length, tolerances.hierarchical),
                }
            })
            .collect();

        let output = RawAnimation {
            name: input.name.clone(),
            duration: input.duration,
            tracks,
        };
        let stats = OptimizationStats {
            before: input.key_counts(),
            after: output.key_counts(),
        };
        Ok((output, stats))
    }
}

/// Largest scale component a joint takes in the animation, or in its rest
/// pose when its scale channel is empty
fn max_scale(track: &JointTrack, rest: &Transform) -> f32 {
    if track.scales.is_empty() {
        rest.scale.abs().max_element()
    } else {
        track
            .scales
            .iter()
            .map(|k| k.value.abs().max_element())
            .fold(0.0, f32::max)
    }
}

/// Length of the longest chain below each joint, in the joint's local space
/// before its own scale, accumulated leaf to root.
///
/// A link is as long as the largest translation the child takes in the
/// animation, or its rest translation when its translation channel is empty.
/// The child's own chain is stretched by the child's largest scale.
fn chain_lengths(input: &RawAnimation, skeleton: &Skeleton) -> Vec<f32> {
    let rest_poses = skeleton.rest_poses();
    let mut lengths = vec![0.0f32; skeleton.num_joints()];
    for joint in (0..skeleton.num_joints()).rev() {
        let Some(parent) = skeleton.parent(joint) else {
            continue;
        };
        let track = &input.tracks[joint];
        let link = if track.translations.is_empty() {
            rest_poses[joint].translation.length()
        } else {
            track
                .translations
                .iter()
                .map(|k| k.value.length())
                .fold(0.0, f32::max)
        };
        let reach = link + max_scale(track, &rest_poses[joint]) * lengths[joint];
        lengths[parent] = lengths[parent].max(reach);
    }
    lengths
}

/// Interpolation and error metric of a channel
trait Reducible: Keyframe {
    fn interpolate(a: Self::Value, b: Self::Value, alpha: f32) -> Self::Value;

    fn error(a: Self::Value, b: Self::Value) -> f32;

    /// Displacement at distance `length` from the joint caused by `error`
    fn displacement(error: f32, length: f32) -> f32;
}

impl Reducible for TranslationKey {
    fn interpolate(a: Vec3, b: Vec3, alpha: f32) -> Vec3 {
        a.lerp(b, alpha)
    }

    fn error(a: Vec3, b: Vec3) -> f32 {
        a.distance(b)
    }

    fn displacement(error: f32, _length: f32) -> f32 {
        error
    }
}

impl Reducible for RotationKey {
    fn interpolate(a: Quat, b: Quat, alpha: f32) -> Quat {
        nlerp(a, b, alpha)
    }

    fn error(a: Quat, b: Quat) -> f32 {
        quat_angle(a, b)
    }

    // Chord of the arc swept by the chain end
    fn displacement(error: f32, length: f32) -> f32 {
        2.0 * length * (error * 0.5).sin()
    }
}

impl Reducible for ScaleKey {
    fn interpolate(a: Vec3, b: Vec3, alpha: f32) -> Vec3 {
        a.lerp(b, alpha)
    }

    fn error(a: Vec3, b: Vec3) -> f32 {
        (a - b).length()
    }

    fn displacement(error: f32, length: f32) -> f32 {
        error * length
    }
}

fn reduce<K: Reducible>(keys: &[K], tolerance: f32, length: f32, hierarchical: f32) -> Vec<K> {
    if tolerance <= 0.0 {
        return keys.to_vec();
    }
    let mut kept = decimate(keys, tolerance);
    refine(keys, &mut kept, tolerance, length, hierarchical);
    keys.iter()
        .zip(&kept)
        .filter(|&(_, &kept)| kept)
        .map(|(key, _)| *key)
        .collect()
}

fn interpolate_at<K: Reducible>(left: &K, right: &K, time: f32) -> K::Value {
    let span = right.time() - left.time();
    let alpha = if span > 0.0 { (time - left.time()) / span } else { 0.0 };
    K::interpolate(left.value(), right.value(), alpha)
}

/// Greedy local pass. The first key is always kept; the last key is dropped
/// when the channel holds within tolerance after the last kept key.
fn decimate<K: Reducible>(keys: &[K], tolerance: f32) -> Vec<bool> {
    let mut kept = vec![true; keys.len()];
    if keys.len() < 2 {
        return kept;
    }

    let mut last = 0;
    for i in 1..keys.len() - 1 {
        let (left, right) = (&keys[last], &keys[i + 1]);
        let fits = keys[last + 1..=i]
            .iter()
            .all(|key| K::error(interpolate_at(left, right, key.time()), key.value()) <= tolerance);
        if fits {
            kept[i] = false;
        } else {
            last = i;
        }
    }

    let tail = keys.len() - 1;
    let held = keys[last].value();
    if keys[last + 1..].iter().all(|key| K::error(held, key.value()) <= tolerance) {
        kept[tail] = false;
    }
    kept
}

/// Error of each original key against the curve described by the kept keys
fn reconstruction_errors<K: Reducible>(keys: &[K], kept: &[bool]) -> Vec<f32> {
    let mut next_kept = vec![None; keys.len()];
    let mut next = None;
    for i in (0..keys.len()).rev() {
        next_kept[i] = next;
        if kept[i] {
            next = Some(i);
        }
    }

    let mut errors = vec![0.0; keys.len()];
    let mut previous = 0;
    for (i, key) in keys.iter().enumerate() {
        if kept[i] {
            previous = i;
            continue;
        }
        let approximation = match next_kept[i] {
            Some(next) => interpolate_at(&keys[previous], &keys[next], key.time()),
            None => keys[previous].value(),
        };
        errors[i] = K::error(approximation, key.value());
    }
    errors
}

/// Reinstate dropped keys until every original key meets both the channel
/// tolerance and the hierarchical tolerance. The worst offender goes first.
fn refine<K: Reducible>(keys: &[K], kept: &mut [bool], tolerance: f32, length: f32, hierarchical: f32) {
    loop {
        let errors = reconstruction_errors(keys, kept);
        let worst = errors
            .iter()
            .enumerate()
            .filter(|&(i, _)| !kept[i])
            .map(|(i, &error)| {
                let excess = (error - tolerance).max(K::displacement(error, length) - hierarchical);
                (i, excess)
            })
            .filter(|&(_, excess)| excess > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match worst {
            Some((i, _)) => kept[i] = true,
            None => break,
        }
    }
}
