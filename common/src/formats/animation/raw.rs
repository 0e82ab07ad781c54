//! Raw (editable) animation

use std::fmt;
use std::io::{Read, Write};

use glam::{Quat, Vec3};

use crate::formats::archive::{Archivable, ArchiveError, IArchive, OArchive};

/// Transform component animated by a keyframe sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Translation,
    Rotation,
    Scale,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Translation => f.write_str("translation"),
            Self::Rotation => f.write_str("rotation"),
            Self::Scale => f.write_str("scale"),
        }
    }
}

/// A timed sample of one channel
pub trait Keyframe: Copy {
    type Value: Copy;

    const CHANNEL: Channel;

    fn new(time: f32, value: Self::Value) -> Self;
    fn time(&self) -> f32;
    fn value(&self) -> Self::Value;
}

/// Translation keyframe (meters)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationKey {
    pub time: f32,
    pub value: Vec3,
}

/// Rotation keyframe (unit quaternion)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationKey {
    pub time: f32,
    pub value: Quat,
}

/// Scale keyframe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleKey {
    pub time: f32,
    pub value: Vec3,
}

impl Keyframe for TranslationKey {
    type Value = Vec3;
    const CHANNEL: Channel = Channel::Translation;

    fn new(time: f32, value: Vec3) -> Self {
        Self { time, value }
    }
    fn time(&self) -> f32 {
        self.time
    }
    fn value(&self) -> Vec3 {
        self.value
    }
}

impl Keyframe for RotationKey {
    type Value = Quat;
    const CHANNEL: Channel = Channel::Rotation;

    fn new(time: f32, value: Quat) -> Self {
        Self { time, value }
    }
    fn time(&self) -> f32 {
        self.time
    }
    fn value(&self) -> Quat {
        self.value
    }
}

impl Keyframe for ScaleKey {
    type Value = Vec3;
    const CHANNEL: Channel = Channel::Scale;

    fn new(time: f32, value: Vec3) -> Self {
        Self { time, value }
    }
    fn time(&self) -> f32 {
        self.time
    }
    fn value(&self) -> Vec3 {
        self.value
    }
}

/// Keyframes of a single joint. An empty channel means "use the rest pose".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointTrack {
    pub translations: Vec<TranslationKey>,
    pub rotations: Vec<RotationKey>,
    pub scales: Vec<ScaleKey>,
}

/// Keyframe totals per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyCounts {
    pub translations: usize,
    pub rotations: usize,
    pub scales: usize,
}

impl KeyCounts {
    pub fn total(&self) -> usize {
        self.translations + self.rotations + self.scales
    }
}

/// Structural problem found by [`RawAnimation::check`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RawAnimationError {
    #[error("Animation duration must be positive, got {0}")]
    NonPositiveDuration(f32),

    #[error("Track {track} {channel} key at {time}s lies outside [0, {duration}]")]
    KeyOutOfRange {
        track: usize,
        channel: Channel,
        time: f32,
        duration: f32,
    },

    #[error("Track {track} {channel} key {index} is not after the previous key")]
    UnorderedKeys {
        track: usize,
        channel: Channel,
        index: usize,
    },
}

/// Editable skeletal animation: one track per skeleton joint, in joint order
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnimation {
    pub name: String,
    /// Duration in seconds
    pub duration: f32,
    pub tracks: Vec<JointTrack>,
}

impl Default for RawAnimation {
    fn default() -> Self {
        Self {
            name: String::new(),
            duration: 1.0,
            tracks: Vec::new(),
        }
    }
}

impl RawAnimation {
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Check that the duration is positive and that every channel's key times
    /// are strictly increasing and within `[0, duration]`.
    pub fn check(&self) -> Result<(), RawAnimationError> {
        if self.duration.is_nan() || self.duration <= 0.0 {
            return Err(RawAnimationError::NonPositiveDuration(self.duration));
        }
        for (track_index, track) in self.tracks.iter().enumerate() {
            check_channel(&track.translations, track_index, self.duration)?;
            check_channel(&track.rotations, track_index, self.duration)?;
            check_channel(&track.scales, track_index, self.duration)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }

    pub fn key_counts(&self) -> KeyCounts {
        self.tracks
            .iter()
            .fold(KeyCounts::default(), |counts, track| KeyCounts {
                translations: counts.translations + track.translations.len(),
                rotations: counts.rotations + track.rotations.len(),
                scales: counts.scales + track.scales.len(),
            })
    }
}

fn check_channel<K: Keyframe>(
    keys: &[K],
    track: usize,
    duration: f32,
) -> Result<(), RawAnimationError> {
    let mut previous: Option<f32> = None;
    for (index, key) in keys.iter().enumerate() {
        let time = key.time();
        if !(0.0..=duration).contains(&time) {
            return Err(RawAnimationError::KeyOutOfRange {
                track,
                channel: K::CHANNEL,
                time,
                duration,
            });
        }
        if previous.is_some_and(|previous| time <= previous) {
            return Err(RawAnimationError::UnorderedKeys {
                track,
                channel: K::CHANNEL,
                index,
            });
        }
        previous = Some(time);
    }
    Ok(())
}

// ============================================================================
// Archive support
// ============================================================================

impl Archivable for RawAnimation {
    const TAG: &'static str = "armature-raw_animation";
    const VERSION: u32 = 1;

    fn save<W: Write>(&self, archive: &mut OArchive<W>) -> Result<(), ArchiveError> {
        archive.write_str(&self.name)?;
        archive.write_f32(self.duration)?;
        archive.write_len(self.tracks.len())?;
        for track in &self.tracks {
            archive.write_len(track.translations.len())?;
            for key in &track.translations {
                archive.write_f32(key.time)?;
                archive.write_vec3(key.value)?;
            }
            archive.write_len(track.rotations.len())?;
            for key in &track.rotations {
                archive.write_f32(key.time)?;
                archive.write_quat(key.value)?;
            }
            archive.write_len(track.scales.len())?;
            for key in &track.scales {
                archive.write_f32(key.time)?;
                archive.write_vec3(key.value)?;
            }
        }
        Ok(())
    }

    fn load<R: Read>(archive: &mut IArchive<R>, _version: u32) -> Result<Self, ArchiveError> {
        let name = archive.read_string()?;
        let duration = archive.read_f32()?;
        let track_count = archive.read_len()?;
        let tracks = archive.read_seq(track_count, |archive| {
            let count = archive.read_len()?;
            let translations = archive.read_seq(count, |archive| {
                Ok(TranslationKey {
                    time: archive.read_f32()?,
                    value: archive.read_vec3()?,
                })
            })?;
            let count = archive.read_len()?;
            let rotations = archive.read_seq(count, |archive| {
                Ok(RotationKey {
                    time: archive.read_f32()?,
                    value: archive.read_quat()?,
                })
            })?;
            let count = archive.read_len()?;
            let scales = archive.read_seq(count, |archive| {
                Ok(ScaleKey {
                    time: archive.read_f32()?,
                    value: archive.read_vec3()?,
                })
            })?;
            Ok(JointTrack {
                translations,
                rotations,
                scales,
            })
        })?;

        Ok(Self {
            name,
            duration,
            tracks,
        })
    }
}
