//! Endian-explicit tagged binary archive.
//!
//! # Layout
//! ```text
//! tag        ASCII bytes, NUL-terminated   - type discriminator
//! endianness u8                            - 0 = big, 1 = little
//! version    u32 (in the marked order)     - per-type format version
//! payload    type-specific, in the marked byte order
//! ```
//!
//! Strings are stored as a `u32` byte length followed by UTF-8 bytes.
//! Sequences are stored as a `u32` element count followed by the elements.
//!
//! The byte order of an output archive is chosen by the writer, independently
//! of the host platform. Readers take it from the marker byte, so a file
//! written in either order decodes to the same logical content.

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec3};

use crate::math::Transform;

/// Longest tag accepted when reading, in bytes.
const MAX_TAG_LEN: usize = 64;

/// Upper bound for speculative allocations driven by stored counts.
const MAX_PREALLOCATION: usize = 4096;

/// Byte order of an archive payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the platform running this code
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    fn marker(self) -> u8 {
        match self {
            Self::Big => 0,
            Self::Little => 1,
        }
    }

    fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            0 => Some(Self::Big),
            1 => Some(Self::Little),
            _ => None,
        }
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => f.write_str("Little"),
            Self::Big => f.write_str("Big"),
        }
    }
}

/// Archive read/write failure
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Expected archive tag \"{expected}\", found \"{found}\"")]
    TagMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("Unsupported \"{tag}\" version {version} (latest supported is {latest})")]
    UnsupportedVersion {
        tag: &'static str,
        version: u32,
        latest: u32,
    },

    #[error("Invalid endianness marker 0x{0:02X}")]
    InvalidEndianness(u8),

    #[error("Invalid archive data: {0}")]
    InvalidData(String),
}

/// A type that can be stored in a tagged archive.
///
/// `save` and `load` only handle the payload; the archive writes and checks the
/// tag, endianness marker and version.
pub trait Archivable: Sized {
    /// Type discriminator written before the payload
    const TAG: &'static str;
    /// Current payload version (versions start at 1)
    const VERSION: u32;

    fn save<W: Write>(&self, archive: &mut OArchive<W>) -> Result<(), ArchiveError>;

    fn load<R: Read>(archive: &mut IArchive<R>, version: u32) -> Result<Self, ArchiveError>;
}

// ============================================================================
// Output archive
// ============================================================================

/// Output archive writing objects in a fixed byte order
pub struct OArchive<W: Write> {
    writer: W,
    endianness: Endianness,
}

impl<W: Write> OArchive<W> {
    pub fn new(writer: W, endianness: Endianness) -> Self {
        Self { writer, endianness }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Write a tagged object (tag, endianness marker, version, payload)
    pub fn write<T: Archivable>(&mut self, object: &T) -> Result<(), ArchiveError> {
        self.writer.write_all(T::TAG.as_bytes())?;
        self.writer.write_u8(0)?;
        self.writer.write_u8(self.endianness.marker())?;
        self.write_u32(T::VERSION)?;
        object.save(self)
    }

    /// Consume the archive, returning the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), ArchiveError> {
        match self.endianness {
            Endianness::Little => self.writer.write_u16::<LittleEndian>(value)?,
            Endianness::Big => self.writer.write_u16::<BigEndian>(value)?,
        }
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), ArchiveError> {
        match self.endianness {
            Endianness::Little => self.writer.write_u32::<LittleEndian>(value)?,
            Endianness::Big => self.writer.write_u32::<BigEndian>(value)?,
        }
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), ArchiveError> {
        match self.endianness {
            Endianness::Little => self.writer.write_i32::<LittleEndian>(value)?,
            Endianness::Big => self.writer.write_i32::<BigEndian>(value)?,
        }
        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), ArchiveError> {
        match self.endianness {
            Endianness::Little => self.writer.write_f32::<LittleEndian>(value)?,
            Endianness::Big => self.writer.write_f32::<BigEndian>(value)?,
        }
        Ok(())
    }

    /// Write a sequence length as `u32`
    pub fn write_len(&mut self, len: usize) -> Result<(), ArchiveError> {
        let len = u32::try_from(len).map_err(|_| {
            ArchiveError::InvalidData(format!("sequence of {len} elements is too long"))
        })?;
        self.write_u32(len)
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), ArchiveError> {
        self.write_len(value.len())?;
        self.writer.write_all(value.as_bytes())?;
        Ok(())
    }

    pub fn write_vec3(&mut self, value: Vec3) -> Result<(), ArchiveError> {
        for component in value.to_array() {
            self.write_f32(component)?;
        }
        Ok(())
    }

    /// Write a quaternion as x, y, z, w
    pub fn write_quat(&mut self, value: Quat) -> Result<(), ArchiveError> {
        for component in value.to_array() {
            self.write_f32(component)?;
        }
        Ok(())
    }

    pub fn write_transform(&mut self, value: &Transform) -> Result<(), ArchiveError> {
        self.write_vec3(value.translation)?;
        self.write_quat(value.rotation)?;
        self.write_vec3(value.scale)
    }
}

// ============================================================================
// Input archive
// ============================================================================

/// Input archive; the byte order is taken from each object's marker
pub struct IArchive<R> {
    reader: R,
    endianness: Endianness,
}

impl<R: Read> IArchive<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            endianness: Endianness::native(),
        }
    }

    /// Byte order of the object currently being read
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Read a tagged object, checking its tag and version
    pub fn read<T: Archivable>(&mut self) -> Result<T, ArchiveError> {
        let tag = self.read_tag()?;
        if tag != T::TAG {
            return Err(ArchiveError::TagMismatch {
                expected: T::TAG,
                found: tag,
            });
        }

        let marker = self.reader.read_u8()?;
        self.endianness =
            Endianness::from_marker(marker).ok_or(ArchiveError::InvalidEndianness(marker))?;

        let version = self.read_u32()?;
        if version == 0 || version > T::VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                tag: T::TAG,
                version,
                latest: T::VERSION,
            });
        }

        T::load(self, version)
    }

    fn read_tag(&mut self) -> Result<String, ArchiveError> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.reader.read_u8()?;
            if byte == 0 {
                break;
            }
            if bytes.len() == MAX_TAG_LEN {
                return Err(ArchiveError::InvalidData("archive tag is too long".into()));
            }
            bytes.push(byte);
        }
        String::from_utf8(bytes)
            .map_err(|_| ArchiveError::InvalidData("archive tag is not valid UTF-8".into()))
    }

    pub fn read_u16(&mut self) -> Result<u16, ArchiveError> {
        Ok(match self.endianness {
            Endianness::Little => self.reader.read_u16::<LittleEndian>()?,
            Endianness::Big => self.reader.read_u16::<BigEndian>()?,
        })
    }

    pub fn read_u32(&mut self) -> Result<u32, ArchiveError> {
        Ok(match self.endianness {
            Endianness::Little => self.reader.read_u32::<LittleEndian>()?,
            Endianness::Big => self.reader.read_u32::<BigEndian>()?,
        })
    }

    pub fn read_i32(&mut self) -> Result<i32, ArchiveError> {
        Ok(match self.endianness {
            Endianness::Little => self.reader.read_i32::<LittleEndian>()?,
            Endianness::Big => self.reader.read_i32::<BigEndian>()?,
        })
    }

    pub fn read_f32(&mut self) -> Result<f32, ArchiveError> {
        Ok(match self.endianness {
            Endianness::Little => self.reader.read_f32::<LittleEndian>()?,
            Endianness::Big => self.reader.read_f32::<BigEndian>()?,
        })
    }

    /// Read a `u32` sequence length
    pub fn read_len(&mut self) -> Result<usize, ArchiveError> {
        Ok(self.read_u32()? as usize)
    }

    /// Read `len` elements with `read_one`, without trusting `len` for allocation
    pub fn read_seq<T>(
        &mut self,
        len: usize,
        mut read_one: impl FnMut(&mut Self) -> Result<T, ArchiveError>,
    ) -> Result<Vec<T>, ArchiveError> {
        let mut items = Vec::with_capacity(len.min(MAX_PREALLOCATION));
        for _ in 0..len {
            items.push(read_one(self)?);
        }
        Ok(items)
    }

    pub fn read_string(&mut self) -> Result<String, ArchiveError> {
        let len = self.read_len()?;
        let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOCATION));
        (&mut self.reader).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() != len {
            return Err(ArchiveError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        String::from_utf8(bytes)
            .map_err(|_| ArchiveError::InvalidData("string is not valid UTF-8".into()))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, ArchiveError> {
        Ok(Vec3::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_quat(&mut self) -> Result<Quat, ArchiveError> {
        Ok(Quat::from_xyzw(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    pub fn read_transform(&mut self) -> Result<Transform, ArchiveError> {
        Ok(Transform {
            translation: self.read_vec3()?,
            rotation: self.read_quat()?,
            scale: self.read_vec3()?,
        })
    }
}

impl<R: Read + Seek> IArchive<R> {
    /// Check whether the next object is a `T`, without consuming anything
    pub fn test_tag<T: Archivable>(&mut self) -> Result<bool, ArchiveError> {
        let start = self.reader.stream_position()?;
        let tag = self.read_tag();
        self.reader.seek(SeekFrom::Start(start))?;
        Ok(matches!(tag, Ok(tag) if tag == T::TAG))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Debug, PartialEq)]
    struct Probe {
        id: u32,
        label: String,
    }

    impl Archivable for Probe {
        const TAG: &'static str = "armature-probe";
        const VERSION: u32 = 2;

        fn save<W: Write>(&self, archive: &mut OArchive<W>) -> Result<(), ArchiveError> {
            archive.write_u32(self.id)?;
            archive.write_str(&self.label)
        }

        fn load<R: Read>(archive: &mut IArchive<R>, _version: u32) -> Result<Self, ArchiveError> {
            Ok(Self {
                id: archive.read_u32()?,
                label: archive.read_string()?,
            })
        }
    }

    fn write_probe(endianness: Endianness) -> Vec<u8> {
        let mut archive = OArchive::new(Vec::new(), endianness);
        archive
            .write(&Probe {
                id: 0x0102_0304,
                label: "hip".into(),
            })
            .unwrap();
        archive.into_inner()
    }

    #[test]
    fn test_layout_little_endian() {
        let bytes = write_probe(Endianness::Little);
        let tag_len = Probe::TAG.len();
        assert_eq!(&bytes[..tag_len], Probe::TAG.as_bytes());
        assert_eq!(bytes[tag_len], 0);
        assert_eq!(bytes[tag_len + 1], 1);
        assert_eq!(&bytes[tag_len + 2..tag_len + 6], &2u32.to_le_bytes());
        assert_eq!(&bytes[tag_len + 6..tag_len + 10], &[4u8, 3, 2, 1]);
    }

    #[test]
    fn test_layout_big_endian() {
        let bytes = write_probe(Endianness::Big);
        let tag_len = Probe::TAG.len();
        assert_eq!(bytes[tag_len + 1], 0);
        assert_eq!(&bytes[tag_len + 6..tag_len + 10], &[1u8, 2, 3, 4]);
    }

    #[test]
    fn test_read_either_order() {
        for endianness in [Endianness::Little, Endianness::Big, Endianness::native()] {
            let bytes = write_probe(endianness);
            let mut archive = IArchive::new(Cursor::new(bytes));
            let probe: Probe = archive.read().unwrap();
            assert_eq!(probe.id, 0x0102_0304);
            assert_eq!(probe.label, "hip");
            assert_eq!(archive.endianness(), endianness);
        }
    }

    #[test]
    fn test_test_tag_does_not_consume() {
        let bytes = write_probe(Endianness::Little);
        let mut archive = IArchive::new(Cursor::new(bytes));
        assert!(archive.test_tag::<Probe>().unwrap());
        assert!(archive.test_tag::<Probe>().unwrap());
        assert!(archive.read::<Probe>().is_ok());
    }

    #[test]
    fn test_tag_mismatch() {
        let mut bytes = write_probe(Endianness::Little);
        bytes[0] = b'x';
        let mut archive = IArchive::new(Cursor::new(bytes));
        assert!(!archive.test_tag::<Probe>().unwrap());
        assert!(matches!(
            archive.read::<Probe>(),
            Err(ArchiveError::TagMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = write_probe(Endianness::Little);
        let version_at = Probe::TAG.len() + 2;
        bytes[version_at..version_at + 4].copy_from_slice(&3u32.to_le_bytes());
        let mut archive = IArchive::new(Cursor::new(bytes));
        assert!(matches!(
            archive.read::<Probe>(),
            Err(ArchiveError::UnsupportedVersion { version: 3, .. })
        ));
    }

    #[test]
    fn test_invalid_endianness_marker() {
        let mut bytes = write_probe(Endianness::Little);
        bytes[Probe::TAG.len() + 1] = 7;
        let mut archive = IArchive::new(Cursor::new(bytes));
        assert!(matches!(
            archive.read::<Probe>(),
            Err(ArchiveError::InvalidEndianness(7))
        ));
    }

    #[test]
    fn test_truncated_string() {
        let mut bytes = write_probe(Endianness::Little);
        bytes.truncate(bytes.len() - 1);
        let mut archive = IArchive::new(Cursor::new(bytes));
        assert!(matches!(archive.read::<Probe>(), Err(ArchiveError::Io(_))));
    }

    #[test]
    fn test_empty_stream_has_no_tag() {
        let mut archive = IArchive::new(Cursor::new(Vec::new()));
        assert!(!archive.test_tag::<Probe>().unwrap());
    }
}
