//! Armature binary formats
//!
//! Every serialized object is framed by the tagged archive protocol in
//! [`archive`]: a NUL-terminated type tag, an endianness marker, a version and
//! the payload. The tag lets a reader decide what a file holds before
//! decoding it (raw or runtime skeleton, raw or compiled animation).
//!
//! All archivable types implement the [`Archivable`] trait.

pub mod animation;
pub mod archive;
pub mod encoding;
pub mod skeleton;

pub use animation::*;
pub use archive::{Archivable, ArchiveError, Endianness, IArchive, OArchive};
pub use skeleton::*;
