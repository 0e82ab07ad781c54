//! Animation importers
//!
//! An importer turns a source asset into raw animations whose tracks follow
//! the joint order of the target skeleton.

use anyhow::{Context, Result, bail};
use glam::{Quat, Vec3, Vec4};
use hashbrown::HashMap;
use std::path::Path;

use armature_common::math::{nlerp, normalize_quat};
use armature_common::{
    JointTrack, Keyframe, RawAnimation, RotationKey, ScaleKey, Skeleton, TranslationKey,
};

use crate::error::AnimationImportError;

/// Rate used to resample step and cubic-spline channels when no sampling
/// rate is requested
pub const DEFAULT_SAMPLING_RATE: f32 = 30.0;

/// Source of raw animations
pub trait AnimationImporter {
    /// Import every animation of `source`.
    ///
    /// `sampling_rate` is in hertz; 0 keeps authored keys where the source
    /// interpolation allows it.
    fn import(
        &mut self,
        source: &Path,
        skeleton: &Skeleton,
        sampling_rate: f32,
    ) -> Result<Vec<RawAnimation>, AnimationImportError>;
}

/// glTF 2.0 (`.gltf`/`.glb`) importer. Joints are matched to nodes by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct GltfImporter;

impl AnimationImporter for GltfImporter {
    fn import(
        &mut self,
        source: &Path,
        skeleton: &Skeleton,
        sampling_rate: f32,
    ) -> Result<Vec<RawAnimation>, AnimationImportError> {
        let (document, buffers, _images) =
            gltf::import(source).map_err(|err| AnimationImportError::Load {
                path: source.to_path_buf(),
                message: err.to_string(),
            })?;

        let joint_of_node: HashMap<usize, usize> = document
            .nodes()
            .filter_map(|node| {
                let joint = skeleton.find_joint(node.name()?)?;
                Some((node.index(), joint))
            })
            .collect();
        if joint_of_node.len() < skeleton.num_joints() {
            tracing::warn!(
                "{} of {} skeleton joints have no matching node in {:?}",
                skeleton.num_joints() - joint_of_node.len(),
                skeleton.num_joints(),
                source
            );
        }

        let animations = document
            .animations()
            .map(|animation| {
                extract_animation(&animation, &buffers, &joint_of_node, skeleton, sampling_rate)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if animations.is_empty() {
            return Err(AnimationImportError::NoAnimations {
                path: source.to_path_buf(),
            });
        }
        tracing::info!("Imported {} animation(s) from {:?}", animations.len(), source);
        Ok(animations)
    }
}

fn extract_animation(
    animation: &gltf::Animation,
    buffers: &[gltf::buffer::Data],
    joint_of_node: &HashMap<usize, usize>,
    skeleton: &Skeleton,
    sampling_rate: f32,
) -> Result<RawAnimation, AnimationImportError> {
    let name = animation
        .name()
        .map_or_else(|| format!("animation{}", animation.index()), str::to_string);
    let invalid = |err: anyhow::Error| AnimationImportError::InvalidChannel {
        animation: name.clone(),
        message: format!("{err:#}"),
    };

    let mut duration = 0.0f32;
    for channel in animation.channels() {
        let times = read_accessor::<1>(&channel.sampler().input(), buffers).map_err(invalid)?;
        if let Some(&[t]) = times.last() {
            duration = duration.max(t);
        }
    }
    if !duration.is_finite() {
        return Err(invalid(anyhow::anyhow!("key times are not finite")));
    }
    if duration <= 0.0 {
        return Err(AnimationImportError::ZeroDuration { animation: name });
    }

    let mut tracks = vec![JointTrack::default(); skeleton.num_joints()];
    for channel in animation.channels() {
        let target = channel.target();
        // Channels of nodes outside the skeleton are ignored
        let Some(&joint) = joint_of_node.get(&target.node().index()) else {
            continue;
        };
        let sampler = channel.sampler();
        let times: Vec<f32> = read_accessor::<1>(&sampler.input(), buffers)
            .map_err(invalid)?
            .into_iter()
            .map(|[t]| t)
            .collect();
        let interpolation = Interpolation::from(sampler.interpolation());
        let track = &mut tracks[joint];

        match target.property() {
            gltf::animation::Property::Translation => {
                let values = read_accessor::<3>(&sampler.output(), buffers).map_err(invalid)?;
                let values: Vec<Vec3> = values.into_iter().map(Vec3::from_array).collect();
                track.translations =
                    build_keys(&times, &values, interpolation, duration, sampling_rate).map_err(invalid)?;
            }
            gltf::animation::Property::Rotation => {
                let values = read_accessor::<4>(&sampler.output(), buffers).map_err(invalid)?;
                let values: Vec<Quat> = values
                    .into_iter()
                    .map(|v| normalize_quat(Quat::from_array(v)))
                    .collect();
                track.rotations =
                    build_keys(&times, &values, interpolation, duration, sampling_rate).map_err(invalid)?;
            }
            gltf::animation::Property::Scale => {
                let values = read_accessor::<3>(&sampler.output(), buffers).map_err(invalid)?;
                let values: Vec<Vec3> = values.into_iter().map(Vec3::from_array).collect();
                track.scales =
                    build_keys(&times, &values, interpolation, duration, sampling_rate).map_err(invalid)?;
            }
            gltf::animation::Property::MorphTargetWeights => {}
        }
    }

    // Joints without a channel hold their rest value
    for (track, rest) in tracks.iter_mut().zip(skeleton.rest_poses()) {
        if track.translations.is_empty() {
            track.translations.push(TranslationKey::new(0.0, rest.translation));
        }
        if track.rotations.is_empty() {
            track.rotations.push(RotationKey::new(0.0, rest.rotation));
        }
        if track.scales.is_empty() {
            track.scales.push(ScaleKey::new(0.0, rest.scale));
        }
    }

    let animation = RawAnimation {
        name,
        duration,
        tracks,
    };
    tracing::debug!(
        "Animation '{}': {:.2}s, {} keys",
        animation.name,
        animation.duration,
        animation.key_counts().total()
    );
    Ok(animation)
}

// ============================================================================
// glTF accessor readers
// ============================================================================

fn read_accessor<const N: usize>(
    accessor: &gltf::Accessor,
    buffers: &[gltf::buffer::Data],
) -> Result<Vec<[f32; N]>> {
    if accessor.data_type() != gltf::accessor::DataType::F32 {
        bail!(
            "Accessor {} holds {:?} components, only F32 is supported",
            accessor.index(),
            accessor.data_type()
        );
    }
    if accessor.dimensions().multiplicity() != N {
        bail!(
            "Accessor {} holds {:?} elements, expected {} components",
            accessor.index(),
            accessor.dimensions(),
            N
        );
    }

    let view = accessor.view().context("Accessor has no buffer view")?;
    let buffer = buffers
        .get(view.buffer().index())
        .context("Accessor references a missing buffer")?;
    let offset = view.offset() + accessor.offset();
    let stride = view.stride().unwrap_or(N * 4);

    let mut values = Vec::with_capacity(accessor.count());
    for i in 0..accessor.count() {
        let start = offset + i * stride;
        let bytes = buffer
            .get(start..start + N * 4)
            .with_context(|| format!("Accessor {} reads past the end of its buffer", accessor.index()))?;
        let mut value = [0.0f32; N];
        for (component, chunk) in value.iter_mut().zip(bytes.chunks_exact(4)) {
            *component = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        values.push(value);
    }
    Ok(values)
}

// ============================================================================
// Sampling
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interpolation {
    Step,
    Linear,
    CubicSpline,
}

impl From<gltf::animation::Interpolation> for Interpolation {
    fn from(interpolation: gltf::animation::Interpolation) -> Self {
        match interpolation {
            gltf::animation::Interpolation::Step => Self::Step,
            gltf::animation::Interpolation::Linear => Self::Linear,
            gltf::animation::Interpolation::CubicSpline => Self::CubicSpline,
        }
    }
}

/// Value type that can be evaluated between keys
trait Curve: Copy {
    fn lerp(a: Self, b: Self, t: f32) -> Self;

    /// Cubic Hermite segment; tangents are already scaled by the segment length
    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, t: f32) -> Self;

    fn scale(self, factor: f32) -> Self;
}

fn hermite_basis(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        2.0 * t3 - 3.0 * t2 + 1.0,
        t3 - 2.0 * t2 + t,
        -2.0 * t3 + 3.0 * t2,
        t3 - t2,
    ]
}

impl Curve for Vec3 {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, t: f32) -> Self {
        let [h00, h10, h01, h11] = hermite_basis(t);
        p0 * h00 + m0 * h10 + p1 * h01 + m1 * h11
    }

    fn scale(self, factor: f32) -> Self {
        self * factor
    }
}

impl Curve for Quat {
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        nlerp(a, b, t)
    }

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, t: f32) -> Self {
        let [h00, h10, h01, h11] = hermite_basis(t);
        let v = Vec4::from(p0) * h00 + Vec4::from(m0) * h10 + Vec4::from(p1) * h01 + Vec4::from(m1) * h11;
        normalize_quat(Quat::from_vec4(v))
    }

    fn scale(self, factor: f32) -> Self {
        Quat::from_vec4(Vec4::from(self) * factor)
    }
}

/// Keyframes of one channel
///
/// With no sampling rate, linear channels keep their authored keys (repeated
/// times are dropped); step and cubic-spline channels are resampled at
/// [`DEFAULT_SAMPLING_RATE`] so the runtime linear interpolation follows them.
fn build_keys<K>(
    times: &[f32],
    values: &[K::Value],
    interpolation: Interpolation,
    duration: f32,
    sampling_rate: f32,
) -> Result<Vec<K>>
where
    K: Keyframe,
    K::Value: Curve,
{
    let expected = match interpolation {
        Interpolation::CubicSpline => times.len() * 3,
        _ => times.len(),
    };
    if values.len() != expected {
        bail!(
            "{:?} sampler has {} times but {} values",
            interpolation,
            times.len(),
            values.len()
        );
    }
    if times.is_empty() {
        return Ok(Vec::new());
    }

    if sampling_rate <= 0.0 && interpolation == Interpolation::Linear {
        let mut keys: Vec<K> = Vec::with_capacity(times.len());
        for (&time, &value) in times.iter().zip(values) {
            if time.is_nan() || time < 0.0 || keys.last().is_some_and(|last| time <= last.time()) {
                continue;
            }
            keys.push(K::new(time, value));
        }
        return Ok(keys);
    }

    let rate = if sampling_rate > 0.0 {
        sampling_rate
    } else {
        DEFAULT_SAMPLING_RATE
    };
    Ok(sample_times(duration, rate)
        .into_iter()
        .map(|time| K::new(time, evaluate(times, values, interpolation, time)))
        .collect())
}

/// Evenly spaced, strictly increasing times covering `[0, duration]`, the
/// last one at `duration`
fn sample_times(duration: f32, rate: f32) -> Vec<f32> {
    let mut times: Vec<f32> = (0u32..)
        .map(|i| i as f32 / rate)
        .take_while(|&t| t < duration)
        .collect();
    times.push(duration);
    times
}

fn evaluate<V: Curve>(times: &[f32], values: &[V], interpolation: Interpolation, time: f32) -> V {
    let value = |key: usize| match interpolation {
        Interpolation::CubicSpline => values[key * 3 + 1],
        _ => values[key],
    };

    // Number of keys at or before `time`
    let next = times.partition_point(|&t| t <= time);
    if next == 0 {
        return value(0);
    }
    if next == times.len() {
        return value(times.len() - 1);
    }

    let previous = next - 1;
    let span = times[next] - times[previous];
    let alpha = if span > 0.0 {
        (time - times[previous]) / span
    } else {
        0.0
    };
    match interpolation {
        Interpolation::Step => value(previous),
        Interpolation::Linear => V::lerp(value(previous), value(next), alpha),
        Interpolation::CubicSpline => {
            let out_tangent = values[previous * 3 + 2].scale(span);
            let in_tangent = values[next * 3].scale(span);
            V::hermite(value(previous), out_tangent, value(next), in_tangent, alpha)
        }
    }
}
