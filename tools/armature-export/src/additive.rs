//! Additive (delta) animation builder
//!
//! Expresses every key relative to a reference pose so the result can be
//! layered on top of another animation.

use glam::{Quat, Vec3};

use armature_common::math::normalize_quat;
use armature_common::{JointTrack, RawAnimation, RotationKey, ScaleKey, Transform, TranslationKey};

use crate::error::AdditiveBuildError;

#[derive(Debug, Clone, Copy, Default)]
pub struct AdditiveAnimationBuilder;

impl AdditiveAnimationBuilder {
    /// Build a delta animation whose reference is the first key of each channel
    pub fn build(&self, input: &RawAnimation) -> Result<RawAnimation, AdditiveBuildError> {
        input.check()?;

        let tracks = input
            .tracks
            .iter()
            .enumerate()
            .map(|(index, track)| {
                let reference = Transform {
                    translation: track.translations.first().map_or(Vec3::ZERO, |k| k.value),
                    rotation: track.rotations.first().map_or(Quat::IDENTITY, |k| k.value),
                    scale: track.scales.first().map_or(Vec3::ONE, |k| k.value),
                };
                delta_track(index, track, &reference)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RawAnimation {
            name: input.name.clone(),
            duration: input.duration,
            tracks,
        })
    }

    /// Build a delta animation against an explicit per-joint reference pose,
    /// such as the skeleton rest pose
    pub fn build_with_reference(
        &self,
        input: &RawAnimation,
        reference: &[Transform],
    ) -> Result<RawAnimation, AdditiveBuildError> {
        input.check()?;
        if reference.len() != input.num_tracks() {
            return Err(AdditiveBuildError::ReferenceLength {
                expected: input.num_tracks(),
                found: reference.len(),
            });
        }

        let tracks = input
            .tracks
            .iter()
            .zip(reference)
            .enumerate()
            .map(|(index, (track, reference))| delta_track(index, track, reference))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RawAnimation {
            name: input.name.clone(),
            duration: input.duration,
            tracks,
        })
    }
}

fn delta_track(
    index: usize,
    track: &JointTrack,
    reference: &Transform,
) -> Result<JointTrack, AdditiveBuildError> {
    // Only a scale channel that is actually used needs an invertible reference
    if !track.scales.is_empty() && reference.scale.cmpeq(Vec3::ZERO).any() {
        return Err(AdditiveBuildError::ZeroScaleReference {
            track: index,
            value: reference.scale,
        });
    }

    let inverse_rotation = reference.rotation.conjugate();
    Ok(JointTrack {
        translations: track
            .translations
            .iter()
            .map(|key| TranslationKey {
                time: key.time,
                value: key.value - reference.translation,
            })
            .collect(),
        rotations: track
            .rotations
            .iter()
            .map(|key| RotationKey {
                time: key.time,
                value: normalize_quat(inverse_rotation * key.value),
            })
            .collect(),
        scales: track
            .scales
            .iter()
            .map(|key| ScaleKey {
                time: key.time,
                value: key.value / reference.scale,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_common::Keyframe;
    use armature_common::math::quat_angle;

    fn walk() -> RawAnimation {
        RawAnimation {
            name: "walk".into(),
            duration: 1.0,
            tracks: vec![
                JointTrack {
                    translations: vec![
                        TranslationKey::new(0.0, Vec3::new(1.0, 2.0, 3.0)),
                        TranslationKey::new(1.0, Vec3::new(2.0, 2.0, 3.0)),
                    ],
                    rotations: vec![
                        RotationKey::new(0.0, Quat::from_rotation_y(0.5)),
                        RotationKey::new(0.5, Quat::from_rotation_y(1.0)),
                    ],
                    scales: vec![
                        ScaleKey::new(0.0, Vec3::splat(2.0)),
                        ScaleKey::new(1.0, Vec3::new(4.0, 2.0, 1.0)),
                    ],
                },
                JointTrack::default(),
            ],
        }
    }

    #[test]
    fn test_first_key_reference() {
        let input = walk();
        let delta = AdditiveAnimationBuilder.build(&input).unwrap();
        let track = &delta.tracks[0];

        assert_eq!(track.translations[0].value, Vec3::ZERO);
        assert_eq!(track.translations[1].value, Vec3::X);
        assert!(quat_angle(track.rotations[0].value, Quat::IDENTITY) < 1e-3);
        assert!(quat_angle(track.rotations[1].value, Quat::from_rotation_y(0.5)) < 1e-3);
        assert_eq!(track.scales[0].value, Vec3::ONE);
        assert_eq!(track.scales[1].value, Vec3::new(2.0, 1.0, 0.5));

        assert_eq!(delta.tracks[1], JointTrack::default());
        assert_eq!(delta.name, input.name);
        assert_eq!(delta.duration, input.duration);
        assert_eq!(delta.key_counts(), input.key_counts());
        // Times are untouched
        assert_eq!(track.rotations[1].time, 0.5);
    }

    #[test]
    fn test_reference_reconstructs_input() {
        let input = walk();
        let reference = [
            Transform {
                translation: Vec3::new(0.5, 0.0, -1.0),
                rotation: Quat::from_rotation_x(0.3),
                scale: Vec3::new(1.0, 2.0, 4.0),
            },
            Transform::IDENTITY,
        ];
        let delta = AdditiveAnimationBuilder
            .build_with_reference(&input, &reference)
            .unwrap();

        let (original, delta) = (&input.tracks[0], &delta.tracks[0]);
        for (o, d) in original.translations.iter().zip(&delta.translations) {
            assert!((reference[0].translation + d.value).distance(o.value) < 1e-5);
        }
        for (o, d) in original.rotations.iter().zip(&delta.rotations) {
            assert!(quat_angle(reference[0].rotation * d.value, o.value) < 1e-3);
        }
        for (o, d) in original.scales.iter().zip(&delta.scales) {
            assert!((reference[0].scale * d.value).distance(o.value) < 1e-5);
        }
    }

    #[test]
    fn test_reference_length_mismatch() {
        let err = AdditiveAnimationBuilder
            .build_with_reference(&walk(), &[Transform::IDENTITY])
            .unwrap_err();
        assert!(matches!(
            err,
            AdditiveBuildError::ReferenceLength {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_zero_scale_reference() {
        let mut input = walk();
        input.tracks[0].scales[0].value = Vec3::new(1.0, 0.0, 1.0);
        assert!(matches!(
            AdditiveAnimationBuilder.build(&input),
            Err(AdditiveBuildError::ZeroScaleReference { track: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_input_rejected() {
        let mut input = walk();
        input.duration = -1.0;
        assert!(matches!(
            AdditiveAnimationBuilder.build(&input),
            Err(AdditiveBuildError::InvalidAnimation(_))
        ));
    }

    #[test]
    fn test_zero_tracks() {
        let input = RawAnimation {
            name: "empty".into(),
            duration: 2.0,
            tracks: Vec::new(),
        };

        let delta = AdditiveAnimationBuilder.build(&input).unwrap();
        assert!(delta.tracks.is_empty());
        assert!(delta.validate());
        assert_eq!(delta.duration, 2.0);
        assert_eq!(delta.name, "empty");

        let delta = AdditiveAnimationBuilder.build_with_reference(&input, &[]).unwrap();
        assert_eq!(delta, input);
    }

    #[test]
    fn test_input_not_mutated() {
        let input = walk();
        let copy = input.clone();
        AdditiveAnimationBuilder.build(&input).unwrap();
        assert_eq!(input, copy);
    }
}
