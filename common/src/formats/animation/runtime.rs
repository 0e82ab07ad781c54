//! Compiled runtime animation

use std::io::{Read, Write};

use glam::{Quat, Vec3};

use crate::formats::archive::{Archivable, ArchiveError, IArchive, OArchive};
use crate::formats::encoding::{decode_quat_smallest_three, decode_vec3_f16};

/// Quantized translation or scale key (10 bytes stored)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float3Key {
    /// Key time divided by the animation duration, in [0, 1]
    pub ratio: f32,
    pub track: u16,
    /// f16 × 3
    pub value: [u16; 3],
}

impl Float3Key {
    pub fn decode(&self) -> Vec3 {
        decode_vec3_f16(self.value)
    }
}

/// Quantized rotation key (10 bytes stored)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuaternionKey {
    /// Key time divided by the animation duration, in [0, 1]
    pub ratio: f32,
    pub track: u16,
    /// Smallest-three packed quaternion
    pub value: u32,
}

impl QuaternionKey {
    pub fn decode(&self) -> Quat {
        decode_quat_smallest_three(self.value)
    }
}

/// Immutable, compact animation ready for sampling.
///
/// Keys of all tracks share one array per channel, ordered so that a sampler
/// moving forward in time finds the next key it needs right after the ones it
/// already holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    name: String,
    duration: f32,
    num_tracks: u16,
    translations: Vec<Float3Key>,
    rotations: Vec<QuaternionKey>,
    scales: Vec<Float3Key>,
}

impl Animation {
    /// Assemble a compiled animation. Keys are expected in sampling order.
    pub fn from_parts(
        name: String,
        duration: f32,
        num_tracks: u16,
        translations: Vec<Float3Key>,
        rotations: Vec<QuaternionKey>,
        scales: Vec<Float3Key>,
    ) -> Self {
        Self {
            name,
            duration,
            num_tracks,
            translations,
            rotations,
            scales,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn num_tracks(&self) -> usize {
        self.num_tracks as usize
    }

    pub fn translations(&self) -> &[Float3Key] {
        &self.translations
    }

    pub fn rotations(&self) -> &[QuaternionKey] {
        &self.rotations
    }

    pub fn scales(&self) -> &[Float3Key] {
        &self.scales
    }

    /// Approximate in-memory size of the key data, in bytes
    pub fn size(&self) -> usize {
        self.name.len()
            + std::mem::size_of_val(self.translations.as_slice())
            + std::mem::size_of_val(self.rotations.as_slice())
            + std::mem::size_of_val(self.scales.as_slice())
    }
}

// ============================================================================
// Archive support
// ============================================================================

fn check_track(track: u16, num_tracks: u16) -> Result<u16, ArchiveError> {
    if track < num_tracks {
        Ok(track)
    } else {
        Err(ArchiveError::InvalidData(format!(
            "key references track {track} of {num_tracks}"
        )))
    }
}

fn load_float3_keys<R: Read>(
    archive: &mut IArchive<R>,
    num_tracks: u16,
) -> Result<Vec<Float3Key>, ArchiveError> {
    let count = archive.read_len()?;
    archive.read_seq(count, |archive| {
        Ok(Float3Key {
            ratio: archive.read_f32()?,
            track: check_track(archive.read_u16()?, num_tracks)?,
            value: [archive.read_u16()?, archive.read_u16()?, archive.read_u16()?],
        })
    })
}

fn save_float3_keys<W: Write>(
    archive: &mut OArchive<W>,
    keys: &[Float3Key],
) -> Result<(), ArchiveError> {
    archive.write_len(keys.len())?;
    for key in keys {
        archive.write_f32(key.ratio)?;
        archive.write_u16(key.track)?;
        for component in key.value {
            archive.write_u16(component)?;
        }
    }
    Ok(())
}

impl Archivable for Animation {
    const TAG: &'static str = "armature-animation";
    const VERSION: u32 = 1;

    fn save<W: Write>(&self, archive: &mut OArchive<W>) -> Result<(), ArchiveError> {
        archive.write_str(&self.name)?;
        archive.write_f32(self.duration)?;
        archive.write_u32(u32::from(self.num_tracks))?;

        save_float3_keys(archive, &self.translations)?;
        archive.write_len(self.rotations.len())?;
        for key in &self.rotations {
            archive.write_f32(key.ratio)?;
            archive.write_u16(key.track)?;
            archive.write_u32(key.value)?;
        }
        save_float3_keys(archive, &self.scales)
    }

    fn load<R: Read>(archive: &mut IArchive<R>, _version: u32) -> Result<Self, ArchiveError> {
        let name = archive.read_string()?;
        let duration = archive.read_f32()?;
        let num_tracks = archive.read_u32()?;
        let num_tracks = u16::try_from(num_tracks)
            .map_err(|_| ArchiveError::InvalidData(format!("{num_tracks} tracks is too many")))?;

        let translations = load_float3_keys(archive, num_tracks)?;
        let count = archive.read_len()?;
        let rotations = archive.read_seq(count, |archive| {
            Ok(QuaternionKey {
                ratio: archive.read_f32()?,
                track: check_track(archive.read_u16()?, num_tracks)?,
                value: archive.read_u32()?,
            })
        })?;
        let scales = load_float3_keys(archive, num_tracks)?;

        Ok(Self {
            name,
            duration,
            num_tracks,
            translations,
            rotations,
            scales,
        })
    }
}
