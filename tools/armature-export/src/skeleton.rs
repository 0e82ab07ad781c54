//! Skeleton import and export
//!
//! Animations are converted against a skeleton archive, either raw (built on
//! load) or already built. The glTF exporter produces such archives from a
//! glTF skin.

use anyhow::{Context, Result, bail};
use hashbrown::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use armature_common::math::normalize_quat;
use armature_common::{
    ArchiveError, Endianness, IArchive, OArchive, RawJoint, RawSkeleton, Skeleton, Transform,
};
use glam::{Quat, Vec3};

use crate::builder::SkeletonBuilder;
use crate::error::SkeletonImportError;

/// Load the skeleton stored at `path`.
///
/// Raw skeletons are built on the fly. Any other archive content is rejected.
pub fn read_skeleton(path: &Path) -> Result<Skeleton, SkeletonImportError> {
    let file = File::open(path).map_err(|source| SkeletonImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive = IArchive::new(BufReader::new(file));
    let archive_error = |source: ArchiveError| SkeletonImportError::Archive {
        path: path.to_path_buf(),
        source,
    };

    if archive.test_tag::<RawSkeleton>().map_err(archive_error)? {
        let raw: RawSkeleton = archive.read().map_err(archive_error)?;
        tracing::debug!("Building skeleton from raw archive ({} joints)", raw.num_joints());
        SkeletonBuilder
            .build(&raw)
            .map_err(|source| SkeletonImportError::Build {
                path: path.to_path_buf(),
                source,
            })
    } else if archive.test_tag::<Skeleton>().map_err(archive_error)? {
        archive.read().map_err(archive_error)
    } else {
        Err(SkeletonImportError::UnknownTag {
            path: path.to_path_buf(),
        })
    }
}

/// Build a raw skeleton from the joints of a glTF skin.
///
/// Joints whose parent node is not part of the skin become roots. Unnamed
/// joints are named after their node index.
pub fn raw_skeleton_from_skin(skin: &gltf::Skin) -> Result<RawSkeleton> {
    let joints: Vec<gltf::Node> = skin.joints().collect();
    if joints.is_empty() {
        bail!("No joints found in skin");
    }
    if joints.len() > Skeleton::MAX_JOINTS {
        bail!(
            "Skin has {} joints, but maximum is {}",
            joints.len(),
            Skeleton::MAX_JOINTS
        );
    }

    let members: HashSet<usize> = joints.iter().map(|joint| joint.index()).collect();
    let children: HashSet<usize> = joints
        .iter()
        .flat_map(|joint| joint.children())
        .map(|child| child.index())
        .filter(|index| members.contains(index))
        .collect();

    let mut remaining = joints.len();
    let roots = joints
        .iter()
        .filter(|joint| !children.contains(&joint.index()))
        .map(|root| build_joint(root, &members, &mut remaining))
        .collect::<Result<Vec<_>>>()?;

    Ok(RawSkeleton { roots })
}

fn build_joint(node: &gltf::Node, members: &HashSet<usize>, remaining: &mut usize) -> Result<RawJoint> {
    // A node reachable twice means the hierarchy is not a tree
    if *remaining == 0 {
        bail!("Skin joint hierarchy is not a tree (node {})", node.index());
    }
    *remaining -= 1;

    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = Transform {
        translation: Vec3::from_array(translation),
        rotation: normalize_quat(Quat::from_array(rotation)),
        scale: Vec3::from_array(scale),
    };
    let name = node
        .name()
        .map_or_else(|| format!("joint{}", node.index()), str::to_string);

    let children = node
        .children()
        .filter(|child| members.contains(&child.index()))
        .map(|child| build_joint(&child, members, remaining))
        .collect::<Result<Vec<_>>>()?;

    Ok(RawJoint::new(name, transform).with_children(children))
}

/// Export a glTF skin as a skeleton archive
///
/// # Arguments
/// * `input` - Path to the glTF/GLB file
/// * `output` - Destination archive
/// * `skin_index` - Skin to export (first skin if None)
/// * `raw` - Write the raw hierarchy instead of the built skeleton
/// * `endianness` - Byte order of the archive
pub fn convert_gltf_skeleton(
    input: &Path,
    output: &Path,
    skin_index: Option<usize>,
    raw: bool,
    endianness: Endianness,
) -> Result<()> {
    let (document, _buffers, _images) =
        gltf::import(input).with_context(|| format!("Failed to load glTF: {:?}", input))?;

    let skin = if let Some(idx) = skin_index {
        document
            .skins()
            .nth(idx)
            .with_context(|| format!("Skin index {} not found in glTF", idx))?
    } else {
        document
            .skins()
            .next()
            .context("No skins found in glTF file")?
    };

    let raw_skeleton = raw_skeleton_from_skin(&skin)?;
    let joint_count = raw_skeleton.num_joints();

    // Build before touching the output so a failure leaves it alone
    let skeleton = if raw {
        None
    } else {
        Some(SkeletonBuilder.build(&raw_skeleton)?)
    };

    let file =
        File::create(output).with_context(|| format!("Failed to create output: {:?}", output))?;
    let mut archive = OArchive::new(BufWriter::new(file), endianness);
    match &skeleton {
        Some(skeleton) => archive.write(skeleton)?,
        None => archive.write(&raw_skeleton)?,
    }
    archive
        .into_inner()
        .flush()
        .with_context(|| format!("Failed to write output: {:?}", output))?;

    tracing::info!(
        "Exported {} skeleton: {} joints from skin '{}' ({} endian)",
        if raw { "raw" } else { "runtime" },
        joint_count,
        skin.name().unwrap_or("unnamed"),
        endianness
    );

    Ok(())
}

/// List available skins in a glTF file
pub fn list_skins(input: &Path) -> Result<()> {
    let (document, _buffers, _images) =
        gltf::import(input).with_context(|| format!("Failed to load glTF: {:?}", input))?;

    let skins: Vec<_> = document.skins().collect();
    if skins.is_empty() {
        tracing::info!("No skins found in {:?}", input);
        return Ok(());
    }

    tracing::info!("Skins in {:?}:", input);
    for (i, skin) in skins.iter().enumerate() {
        let name = skin.name().unwrap_or("unnamed");
        let joint_count = skin.joints().count();
        tracing::info!("  [{}] '{}': {} joints", i, name, joint_count);
    }

    Ok(())
}
