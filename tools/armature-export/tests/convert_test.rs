//! Batch conversion tests over an in-memory importer
//!
//! Covers the whole pipeline after import: configuration, skeleton loading,
//! additive, optimization, compilation and archive output.

use std::fs::File;
use std::path::{Path, PathBuf};

use armature_common::{
    Animation, Endianness, IArchive, JointTrack, Keyframe, OArchive, RawAnimation, RawJoint,
    RawSkeleton, RotationKey, ScaleKey, Skeleton, Transform, TranslationKey,
};
use armature_export::error::{AnimationImportError, ConvertError, ExportError};
use armature_export::{AnimationConverter, AnimationImporter, ConvertOptions, EndianMode};
use glam::{Quat, Vec3};
use serde_json::json;
use tempfile::{TempDir, tempdir};

/// Hands out prepared animations, ignoring the source file
struct MemoryImporter {
    animations: Vec<RawAnimation>,
}

impl AnimationImporter for MemoryImporter {
    fn import(
        &mut self,
        _source: &Path,
        skeleton: &Skeleton,
        _sampling_rate: f32,
    ) -> Result<Vec<RawAnimation>, AnimationImportError> {
        assert_eq!(skeleton.num_joints(), 2);
        Ok(self.animations.clone())
    }
}

fn converter(animations: Vec<RawAnimation>) -> AnimationConverter<MemoryImporter> {
    AnimationConverter::new(MemoryImporter { animations })
}

/// Two-joint arm: the forearm hangs one unit below the shoulder
fn arm() -> RawSkeleton {
    RawSkeleton {
        roots: vec![
            RawJoint::new("shoulder", Transform::IDENTITY).with_children(vec![RawJoint::new(
                "forearm",
                Transform {
                    translation: -Vec3::Y,
                    ..Transform::IDENTITY
                },
            )]),
        ],
    }
}

fn swing(name: &str) -> RawAnimation {
    let rotations = (0..=10)
        .map(|i| {
            let t = i as f32 * 0.1;
            RotationKey::new(t, Quat::from_rotation_z(t))
        })
        .collect();
    let translations = (0..=10)
        .map(|i| TranslationKey::new(i as f32 * 0.1, -Vec3::Y))
        .collect();
    RawAnimation {
        name: name.into(),
        duration: 1.0,
        tracks: vec![
            JointTrack {
                rotations,
                ..Default::default()
            },
            JointTrack {
                translations,
                ..Default::default()
            },
        ],
    }
}

/// Workspace with a skeleton archive and a placeholder source file
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().expect("Failed to create temp dir");
        let file = File::create(dir.path().join("arm.skel")).unwrap();
        OArchive::new(file, Endianness::Big).write(&arm()).unwrap();
        std::fs::write(dir.path().join("source.gltf"), b"{}").unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn options(&self, config: serde_json::Value, endian: EndianMode) -> ConvertOptions {
        ConvertOptions {
            file: self.path("source.gltf"),
            skeleton: self.path("arm.skel"),
            config: config.to_string(),
            endian,
            sampling_rate: 0.0,
        }
    }

    fn pattern(&self, pattern: &str) -> String {
        self.path(pattern).to_string_lossy().into_owned()
    }
}

fn read_runtime(path: &Path) -> (Animation, Endianness) {
    let mut archive = IArchive::new(File::open(path).unwrap());
    let animation = archive.read().unwrap();
    (animation, archive.endianness())
}

#[test]
fn test_wildcard_exports_every_animation() {
    let fixture = Fixture::new();
    let config = json!({ "animations": [{ "output": fixture.pattern("*.anim") }] });

    let mut converter = converter(vec![swing("walk"), swing("run")]);
    let report = converter
        .convert(&fixture.options(config, EndianMode::Native))
        .unwrap();

    assert!(report.success());
    assert!(report.discarded.is_empty());
    let names: Vec<_> = report.exports.iter().map(|e| e.animation.as_str()).collect();
    assert_eq!(names, ["walk", "run"]);

    for name in ["walk", "run"] {
        let (animation, _) = read_runtime(&fixture.path(&format!("{name}.anim")));
        assert_eq!(animation.name(), name);
        assert_eq!(animation.num_tracks(), 2);
        // The constant forearm translation reduces to its padded endpoints
        assert_eq!(
            animation.translations().iter().filter(|k| k.track == 1).count(),
            2
        );
    }

    let summary = report.exports[0].result.as_ref().unwrap();
    let stats = summary.stats.unwrap();
    assert_eq!(stats.before.translations, 11);
    assert_eq!(stats.after.translations, 1);
}

#[test]
fn test_pattern_without_wildcard_keeps_first_match() {
    let fixture = Fixture::new();
    let config = json!({ "animations": [{ "output": fixture.pattern("single.anim") }] });

    let mut converter = converter(vec![swing("walk"), swing("run"), swing("idle")]);
    let report = converter
        .convert(&fixture.options(config, EndianMode::Little))
        .unwrap();

    assert!(report.success());
    assert_eq!(report.exports.len(), 1);
    assert_eq!(report.exports[0].animation, "walk");
    let discarded: Vec<_> = report.discarded.iter().map(|d| d.animation.as_str()).collect();
    assert_eq!(discarded, ["run", "idle"]);

    let (animation, _) = read_runtime(&fixture.path("single.anim"));
    assert_eq!(animation.name(), "walk");
}

#[test]
fn test_failure_does_not_abort_batch() {
    let fixture = Fixture::new();
    let mut broken = swing("broken");
    broken.tracks[0].scales = vec![ScaleKey::new(0.0, Vec3::ZERO), ScaleKey::new(1.0, Vec3::ONE)];

    let config = json!({
        "animations": [{ "output": fixture.pattern("*.anim"), "additive": true }]
    });
    let mut converter = converter(vec![swing("walk"), broken, swing("run")]);
    let report = converter
        .convert(&fixture.options(config, EndianMode::Native))
        .unwrap();

    assert!(!report.success());
    let failures: Vec<_> = report.failures().map(|e| e.animation.as_str()).collect();
    assert_eq!(failures, ["broken"]);
    assert!(matches!(
        report.exports[1].result,
        Err(ExportError::Additive(_))
    ));
    assert!(fixture.path("walk.anim").exists());
    assert!(fixture.path("run.anim").exists());
    assert!(!fixture.path("broken.anim").exists());
}

#[test]
fn test_entries_select_clips() {
    let fixture = Fixture::new();
    let config = json!({
        "animations": [
            { "clip": "w*", "output": fixture.pattern("*.raw"), "raw": true, "optimize": false },
            { "clip": "r?n", "output": fixture.pattern("*_additive.anim"), "additive": true },
            { "clip": "jump", "output": fixture.pattern("*.unused") }
        ]
    });

    let mut converter = converter(vec![swing("walk"), swing("run")]);
    let report = converter
        .convert(&fixture.options(config, EndianMode::Native))
        .unwrap();
    assert!(report.success());
    assert_eq!(report.exports.len(), 2);

    let mut archive = IArchive::new(File::open(fixture.path("walk.raw")).unwrap());
    let raw: RawAnimation = archive.read().unwrap();
    assert_eq!(raw, swing("walk"));

    let (additive, _) = read_runtime(&fixture.path("run_additive.anim"));
    assert_eq!(additive.name(), "run");
    // Additive rotations start at identity
    let first = additive
        .rotations()
        .iter()
        .find(|k| k.track == 0)
        .unwrap()
        .decode();
    assert!(first.abs_diff_eq(Quat::IDENTITY, 1e-3) || first.abs_diff_eq(-Quat::IDENTITY, 1e-3));

    assert!(!fixture.path("run.raw").exists());
}

#[test]
fn test_output_byte_order_does_not_change_content() {
    let fixture = Fixture::new();
    let mut decoded = Vec::new();
    for (endian, expected) in [
        (EndianMode::Little, Endianness::Little),
        (EndianMode::Big, Endianness::Big),
        (EndianMode::Native, Endianness::native()),
    ] {
        let pattern = fixture.pattern(&format!("*_{expected:?}_{}.anim", decoded.len()));
        let config = json!({ "animations": [{ "output": pattern }] });
        let report = converter(vec![swing("walk")])
            .convert(&fixture.options(config, endian))
            .unwrap();
        assert!(report.success());

        let path = &report.exports[0].output;
        let (animation, endianness) = read_runtime(path);
        assert_eq!(endianness, expected);
        decoded.push(animation);
    }
    assert_eq!(decoded[0], decoded[1]);
    assert_eq!(decoded[1], decoded[2]);
}

#[test]
fn test_fatal_errors() {
    let fixture = Fixture::new();

    let mut converter = converter(vec![swing("walk")]);
    let err = converter
        .convert(&ConvertOptions {
            config: r#"{"animations": [{"optimize": "yes"}]}"#.into(),
            ..fixture.options(json!({}), EndianMode::Native)
        })
        .unwrap_err();
    assert!(matches!(err, ConvertError::Config(_)));

    let err = converter
        .convert(&ConvertOptions {
            file: fixture.path("missing.gltf"),
            ..fixture.options(json!({}), EndianMode::Native)
        })
        .unwrap_err();
    assert!(matches!(err, ConvertError::MissingInput(_)));

    let err = converter
        .convert(&ConvertOptions {
            skeleton: fixture.path("source.gltf"),
            ..fixture.options(json!({}), EndianMode::Native)
        })
        .unwrap_err();
    assert!(matches!(err, ConvertError::Skeleton(_)));
}
