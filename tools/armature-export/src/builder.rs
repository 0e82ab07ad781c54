//! Runtime builders
//!
//! [`SkeletonBuilder`] flattens a raw joint hierarchy; [`AnimationBuilder`]
//! compiles a raw animation into the quantized, sampling-ordered runtime form.

use glam::{Quat, Vec3};

use armature_common::formats::encoding::{encode_quat_smallest_three, encode_vec3_f16};
use armature_common::math::normalize_quat;
use armature_common::{
    Animation, Float3Key, Keyframe, QuaternionKey, RawAnimation, RawJoint, RawSkeleton, Skeleton,
};

use crate::error::{CompileError, SkeletonBuildError};

#[derive(Debug, Clone, Copy, Default)]
pub struct SkeletonBuilder;

impl SkeletonBuilder {
    /// Flatten `raw` in depth-first pre-order, so every parent precedes its
    /// children and siblings keep their order.
    pub fn build(&self, raw: &RawSkeleton) -> Result<Skeleton, SkeletonBuildError> {
        let count = raw.num_joints();
        if count > Skeleton::MAX_JOINTS {
            return Err(SkeletonBuildError::TooManyJoints {
                count,
                max: Skeleton::MAX_JOINTS,
            });
        }

        let mut names = Vec::with_capacity(count);
        let mut parents = Vec::with_capacity(count);
        let mut rest_poses = Vec::with_capacity(count);

        let mut stack: Vec<(&RawJoint, Option<u16>)> =
            raw.roots.iter().rev().map(|root| (root, None)).collect();
        while let Some((joint, parent)) = stack.pop() {
            // count <= MAX_JOINTS, so indices fit
            let index = names.len() as u16;
            names.push(joint.name.clone());
            parents.push(parent);
            rest_poses.push(joint.transform);
            stack.extend(joint.children.iter().rev().map(|child| (child, Some(index))));
        }

        Ok(Skeleton::from_parts(names, parents, rest_poses)?)
    }
}

/// Key of any channel on its way to the runtime layout
struct SortingKey<V> {
    /// Ratio of the previous key of the same track, -1 for the first key
    previous: f32,
    ratio: f32,
    track: u16,
    value: V,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnimationBuilder;

impl AnimationBuilder {
    /// Compile `raw` against `skeleton`.
    ///
    /// Every track of the result has at least two keys per channel, the
    /// first at ratio 0 and the last at ratio 1. Empty channels get identity
    /// keys.
    pub fn build(&self, raw: &RawAnimation, skeleton: &Skeleton) -> Result<Animation, CompileError> {
        raw.check()?;
        let num_tracks =
            u16::try_from(raw.num_tracks()).map_err(|_| CompileError::TooManyTracks(raw.num_tracks()))?;
        if raw.num_tracks() != skeleton.num_joints() {
            return Err(CompileError::TrackCountMismatch {
                tracks: raw.num_tracks(),
                joints: skeleton.num_joints(),
            });
        }

        let duration = raw.duration;
        let translations = compile_channel(
            raw.tracks.iter().map(|t| t.translations.as_slice()),
            Vec3::ZERO,
            duration,
        )
        .into_iter()
        .map(|key| Float3Key {
            ratio: key.ratio,
            track: key.track,
            value: encode_vec3_f16(key.value),
        })
        .collect();

        let rotations = compile_channel(
            raw.tracks.iter().map(|t| t.rotations.as_slice()),
            Quat::IDENTITY,
            duration,
        )
        .into_iter()
        .map(|key| QuaternionKey {
            ratio: key.ratio,
            track: key.track,
            value: encode_quat_smallest_three(normalize_quat(key.value)),
        })
        .collect();

        let scales = compile_channel(
            raw.tracks.iter().map(|t| t.scales.as_slice()),
            Vec3::ONE,
            duration,
        )
        .into_iter()
        .map(|key| Float3Key {
            ratio: key.ratio,
            track: key.track,
            value: encode_vec3_f16(key.value),
        })
        .collect();

        Ok(Animation::from_parts(
            raw.name.clone(),
            duration,
            num_tracks,
            translations,
            rotations,
            scales,
        ))
    }
}

/// Pad every track to cover `[0, duration]` and sort all keys in the order
/// a forward sampler needs them.
fn compile_channel<'a, K: Keyframe + 'a>(
    channels: impl Iterator<Item = &'a [K]>,
    identity: K::Value,
    duration: f32,
) -> Vec<SortingKey<K::Value>> {
    let mut keys = Vec::new();
    for (track, channel) in channels.enumerate() {
        let track = track as u16;

        let mut timeline: Vec<(f32, K::Value)> = Vec::with_capacity(channel.len() + 2);
        match (channel.first(), channel.last()) {
            (Some(first), Some(last)) => {
                if first.time() > 0.0 {
                    timeline.push((0.0, first.value()));
                }
                timeline.extend(channel.iter().map(|k| (k.time(), k.value())));
                if last.time() < duration {
                    timeline.push((duration, last.value()));
                }
            }
            _ => {
                timeline.push((0.0, identity));
                timeline.push((duration, identity));
            }
        }

        let mut previous = -1.0;
        for (time, value) in timeline {
            let ratio = time / duration;
            keys.push(SortingKey {
                previous,
                ratio,
                track,
                value,
            });
            previous = ratio;
        }
    }

    keys.sort_by(|a, b| {
        a.previous
            .total_cmp(&b.previous)
            .then(a.track.cmp(&b.track))
    });
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_common::math::quat_angle;
    use armature_common::{JointTrack, RotationKey, ScaleKey, Transform, TranslationKey};

    fn two_joints() -> Skeleton {
        Skeleton::from_parts(
            vec!["root".into(), "tip".into()],
            vec![None, Some(0)],
            vec![Transform::IDENTITY; 2],
        )
        .unwrap()
    }

    fn clip() -> RawAnimation {
        RawAnimation {
            name: "clip".into(),
            duration: 2.0,
            tracks: vec![
                JointTrack {
                    translations: vec![
                        TranslationKey::new(0.5, Vec3::X),
                        TranslationKey::new(1.5, Vec3::Y),
                    ],
                    rotations: vec![RotationKey::new(0.0, -Quat::from_rotation_z(0.6))],
                    scales: vec![ScaleKey::new(2.0, Vec3::splat(3.0))],
                },
                JointTrack::default(),
            ],
        }
    }

    #[test]
    fn test_skeleton_builder_preorder() {
        let offset = |y: f32| Transform {
            translation: Vec3::new(0.0, y, 0.0),
            ..Transform::IDENTITY
        };
        let raw = RawSkeleton {
            roots: vec![
                RawJoint::new("hips", Transform::IDENTITY).with_children(vec![
                    RawJoint::new("spine", offset(1.0))
                        .with_children(vec![RawJoint::new("head", offset(0.5))]),
                    RawJoint::new("leg", offset(-1.0)),
                ]),
                RawJoint::new("prop", offset(2.0)),
            ],
        };

        let skeleton = SkeletonBuilder.build(&raw).unwrap();
        assert_eq!(skeleton.joint_names(), ["hips", "spine", "head", "leg", "prop"]);
        assert_eq!(
            skeleton.joint_parents(),
            [None, Some(0), Some(1), Some(0), None]
        );
        assert_eq!(skeleton.rest_poses()[2], offset(0.5));
        for (joint, parent) in skeleton.joint_parents().iter().enumerate() {
            if let Some(parent) = parent {
                assert!((*parent as usize) < joint);
            }
        }
    }

    #[test]
    fn test_skeleton_builder_limit() {
        let raw = RawSkeleton {
            roots: (0..=Skeleton::MAX_JOINTS)
                .map(|i| RawJoint::new(format!("j{i}"), Transform::IDENTITY))
                .collect(),
        };
        assert!(matches!(
            SkeletonBuilder.build(&raw),
            Err(SkeletonBuildError::TooManyJoints { .. })
        ));
    }

    #[test]
    fn test_keys_cover_whole_duration() {
        let animation = AnimationBuilder.build(&clip(), &two_joints()).unwrap();
        assert_eq!(animation.name(), "clip");
        assert_eq!(animation.duration(), 2.0);
        assert_eq!(animation.num_tracks(), 2);

        for track in 0..2u16 {
            let translations: Vec<f32> = animation
                .translations()
                .iter()
                .filter(|k| k.track == track)
                .map(|k| k.ratio)
                .collect();
            let rotations: Vec<f32> = animation
                .rotations()
                .iter()
                .filter(|k| k.track == track)
                .map(|k| k.ratio)
                .collect();
            for channel in [translations, rotations] {
                assert!(channel.len() >= 2);
                assert_eq!(channel.first(), Some(&0.0));
                assert_eq!(channel.last(), Some(&1.0));
            }
        }
    }

    #[test]
    fn test_sampling_order() {
        let animation = AnimationBuilder.build(&clip(), &two_joints()).unwrap();
        let order: Vec<_> = animation
            .translations()
            .iter()
            .map(|k| (k.track, k.ratio))
            .collect();
        assert_eq!(
            order,
            [(0, 0.0), (1, 0.0), (0, 0.25), (1, 1.0), (0, 0.75), (0, 1.0)]
        );
    }

    #[test]
    fn test_values_and_padding() {
        let animation = AnimationBuilder.build(&clip(), &two_joints()).unwrap();
        let translations = animation.translations();
        // Duplicated first and last keys
        assert_eq!(translations[0].decode(), Vec3::X);
        assert_eq!(translations[5].decode(), Vec3::Y);
        // Identity for the empty channel
        assert_eq!(translations[1].decode(), Vec3::ZERO);

        let scales: Vec<_> = animation.scales().iter().filter(|k| k.track == 0).collect();
        assert_eq!(scales.len(), 2);
        assert!(scales.iter().all(|k| k.decode() == Vec3::splat(3.0)));
        assert!(animation.scales().iter().filter(|k| k.track == 1).all(|k| k.decode() == Vec3::ONE));

        // A negated quaternion is the same rotation
        let rotation = animation.rotations()[0].decode();
        assert!(quat_angle(rotation, Quat::from_rotation_z(0.6)) < 0.01);
    }

    #[test]
    fn test_compile_errors() {
        let mut raw = clip();
        raw.tracks.pop();
        assert!(matches!(
            AnimationBuilder.build(&raw, &two_joints()),
            Err(CompileError::TrackCountMismatch {
                tracks: 1,
                joints: 2
            })
        ));

        let mut raw = clip();
        raw.tracks[0].translations[1].time = 2.5;
        assert!(matches!(
            AnimationBuilder.build(&raw, &two_joints()),
            Err(CompileError::InvalidAnimation(_))
        ));

        let mut raw = clip();
        raw.duration = 0.0;
        assert!(matches!(
            AnimationBuilder.build(&raw, &two_joints()),
            Err(CompileError::InvalidAnimation(_))
        ));
    }
}
