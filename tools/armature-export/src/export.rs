//! Animation export
//!
//! [`export_animation`] runs the processing stages of one animation and
//! writes the result. [`AnimationConverter`] drives a whole batch: it reads
//! the configuration and skeleton, imports the source and exports every
//! selected animation. A failing animation does not stop the others.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use armature_common::{Archivable, ArchiveError, Endianness, OArchive, RawAnimation, Skeleton};

use crate::additive::AdditiveAnimationBuilder;
use crate::builder::AnimationBuilder;
use crate::config::{AdditiveReference, AnimationConfig, ConversionConfig};
use crate::error::{CompileError, ConvertError, ExportError, OutputIoError};
use crate::import::AnimationImporter;
use crate::optimizer::{AnimationOptimizer, OptimizationStats};

/// Byte order requested for output archives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EndianMode {
    /// Byte order of the machine running the conversion
    #[default]
    Native,
    Little,
    Big,
}

impl EndianMode {
    pub fn resolve(self) -> Endianness {
        match self {
            EndianMode::Native => Endianness::native(),
            EndianMode::Little => Endianness::Little,
            EndianMode::Big => Endianness::Big,
        }
    }
}

/// Inputs of a conversion batch
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Source asset to import animations from
    pub file: PathBuf,
    /// Skeleton archive the animations are converted against
    pub skeleton: PathBuf,
    /// JSON configuration document
    pub config: String,
    pub endian: EndianMode,
    /// Sampling rate in hertz, 0 to keep authored keys
    pub sampling_rate: f32,
}

/// Successful export of one animation
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    /// The raw animation was written instead of the compiled one
    pub raw: bool,
    /// Present when the optimization stage ran
    pub stats: Option<OptimizationStats>,
}

/// Outcome of one animation of a batch
#[derive(Debug)]
pub struct AnimationExport {
    pub animation: String,
    pub output: PathBuf,
    pub result: Result<ExportSummary, ExportError>,
}

/// Animation skipped because its entry's output pattern has no `*` and an
/// earlier animation already claimed the file
#[derive(Debug, Clone, PartialEq)]
pub struct Discarded {
    pub animation: String,
    pub output: PathBuf,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub exports: Vec<AnimationExport>,
    pub discarded: Vec<Discarded>,
}

impl BatchReport {
    /// True when every attempted export succeeded
    pub fn success(&self) -> bool {
        self.exports.iter().all(|export| export.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &AnimationExport> {
        self.exports.iter().filter(|export| export.result.is_err())
    }
}

/// Output path of `animation` for `pattern`: every `*` is replaced by the
/// animation name, in a single pass.
pub fn output_path(pattern: &str, animation: &str) -> PathBuf {
    PathBuf::from(pattern.replace('*', animation))
}

/// Process `raw` as `config` describes and write it next to its output path.
///
/// The compiled animation is fully built before the output file is created,
/// so a failing stage leaves the destination untouched.
pub fn export_animation(
    raw: &RawAnimation,
    skeleton: &Skeleton,
    config: &AnimationConfig,
    endianness: Endianness,
) -> Result<ExportSummary, ExportError> {
    let mut animation = Cow::Borrowed(raw);

    if config.additive {
        tracing::info!("Building additive animation ({:?} reference)", config.additive_reference);
        let delta = match config.additive_reference {
            AdditiveReference::Animation => AdditiveAnimationBuilder.build(&animation)?,
            AdditiveReference::Skeleton => {
                AdditiveAnimationBuilder.build_with_reference(&animation, skeleton.rest_poses())?
            }
        };
        animation = Cow::Owned(delta);
    }

    let stats = if config.optimize {
        let optimizer = AnimationOptimizer::new(config.tolerances);
        let (optimized, stats) = optimizer.optimize(&animation, skeleton)?;
        tracing::info!(
            "Optimization stage results: translations {:.1}%, rotations {:.1}%, scales {:.1}% removed",
            stats.translation_reduction(),
            stats.rotation_reduction(),
            stats.scale_reduction()
        );
        animation = Cow::Owned(optimized);
        Some(stats)
    } else {
        tracing::info!("Optimization stage skipped");
        None
    };

    let path = output_path(&config.output, &raw.name);
    if config.raw {
        animation.check().map_err(CompileError::from)?;
        write_archive(&path, animation.as_ref(), endianness)?;
    } else {
        let compiled = AnimationBuilder.build(&animation, skeleton)?;
        tracing::debug!("Compiled animation: {} bytes of keys", compiled.size());
        write_archive(&path, &compiled, endianness)?;
    }

    tracing::info!(
        "Wrote {} animation '{}' to {:?} ({} endian)",
        if config.raw { "raw" } else { "runtime" },
        raw.name,
        path,
        endianness
    );
    Ok(ExportSummary {
        path,
        raw: config.raw,
        stats,
    })
}

/// Create `path` and write `object` to it through a buffered archive
fn write_archive<T: Archivable>(
    path: &Path,
    object: &T,
    endianness: Endianness,
) -> Result<(), OutputIoError> {
    let file = File::create(path).map_err(|source| OutputIoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let write_error = |source: ArchiveError| OutputIoError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut archive = OArchive::new(BufWriter::new(file), endianness);
    archive.write(object).map_err(write_error)?;
    archive
        .into_inner()
        .flush()
        .map_err(|err| write_error(ArchiveError::Io(err)))
}

/// Full error chain on one line
fn describe(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Batch driver over an [`AnimationImporter`]
pub struct AnimationConverter<I> {
    importer: I,
}

impl<I: AnimationImporter> AnimationConverter<I> {
    pub fn new(importer: I) -> Self {
        Self { importer }
    }

    /// Run a conversion batch.
    ///
    /// Errors are returned only for failures that prevent any export. The
    /// outcome of each animation is recorded in the report.
    pub fn convert(&mut self, options: &ConvertOptions) -> Result<BatchReport, ConvertError> {
        let config = ConversionConfig::parse(&options.config)?;
        tracing::debug!("Sanitized configuration:\n{}", config.document().to_document());

        if !options.file.exists() {
            return Err(ConvertError::MissingInput(options.file.clone()));
        }

        tracing::info!("Importing skeleton {:?}", options.skeleton);
        let skeleton = crate::skeleton::read_skeleton(&options.skeleton)?;

        tracing::info!("Importing animations from {:?}", options.file);
        let animations = self
            .importer
            .import(&options.file, &skeleton, options.sampling_rate)?;

        let endianness = options.endian.resolve();
        let mut report = BatchReport::default();
        for entry in &config.animations {
            let selected: Vec<&RawAnimation> = animations
                .iter()
                .filter(|animation| entry.matches(&animation.name))
                .collect();
            if selected.is_empty() {
                tracing::warn!("No imported animation matches clip {:?}", entry.clip);
                continue;
            }

            let per_animation = entry.output.contains('*');
            for (index, animation) in selected.into_iter().enumerate() {
                let output = output_path(&entry.output, &animation.name);
                if index > 0 && !per_animation {
                    tracing::warn!(
                        "Output {:?} has no '*' wildcard, discarding animation '{}'",
                        entry.output,
                        animation.name
                    );
                    report.discarded.push(Discarded {
                        animation: animation.name.clone(),
                        output,
                    });
                    continue;
                }

                tracing::info!("Exporting animation '{}'", animation.name);
                let result = export_animation(animation, &skeleton, entry, endianness);
                if let Err(err) = &result {
                    tracing::error!(
                        "Failed to export animation '{}': {}",
                        animation.name,
                        describe(err)
                    );
                }
                report.exports.push(AnimationExport {
                    animation: animation.name.clone(),
                    output,
                    result,
                });
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armature_common::{Animation, IArchive, JointTrack, Keyframe, Transform, TranslationKey};
    use glam::Vec3;
    use tempfile::tempdir;

    fn skeleton() -> Skeleton {
        Skeleton::from_parts(vec!["root".into()], vec![None], vec![Transform::IDENTITY]).unwrap()
    }

    fn slide(name: &str) -> RawAnimation {
        RawAnimation {
            name: name.into(),
            duration: 1.0,
            tracks: vec![JointTrack {
                translations: (0..5)
                    .map(|i| TranslationKey::new(i as f32 * 0.25, Vec3::X * i as f32))
                    .collect(),
                ..Default::default()
            }],
        }
    }

    fn config(output: &Path) -> AnimationConfig {
        AnimationConfig {
            output: output.to_string_lossy().into_owned(),
            ..AnimationConfig::default()
        }
    }

    #[test]
    fn test_output_path_single_pass() {
        assert_eq!(output_path("*.ozz", "walk"), PathBuf::from("walk.ozz"));
        assert_eq!(output_path("out/*_*.anim", "run"), PathBuf::from("out/run_run.anim"));
        assert_eq!(output_path("*.ozz", "a*b"), PathBuf::from("a*b.ozz"));
        assert_eq!(output_path("fixed.ozz", "walk"), PathBuf::from("fixed.ozz"));
    }

    #[test]
    fn test_endian_mode_resolve() {
        assert_eq!(EndianMode::Little.resolve(), Endianness::Little);
        assert_eq!(EndianMode::Big.resolve(), Endianness::Big);
        assert_eq!(EndianMode::default().resolve(), Endianness::native());
    }

    #[test]
    fn test_export_compiled() {
        let dir = tempdir().expect("Failed to create temp dir");
        let entry = config(&dir.path().join("*.anim"));

        let summary = export_animation(&slide("slide"), &skeleton(), &entry, Endianness::Big).unwrap();
        assert_eq!(summary.path, dir.path().join("slide.anim"));
        assert!(!summary.raw);
        let stats = summary.stats.unwrap();
        assert_eq!(stats.before.translations, 5);
        assert_eq!(stats.after.translations, 2);

        let file = File::open(&summary.path).unwrap();
        let mut archive = IArchive::new(std::io::BufReader::new(file));
        let animation: Animation = archive.read().unwrap();
        assert_eq!(archive.endianness(), Endianness::Big);
        assert_eq!(animation.name(), "slide");
    }

    #[test]
    fn test_additive_against_rest_pose() {
        let dir = tempdir().expect("Failed to create temp dir");
        let skeleton = Skeleton::from_parts(
            vec!["root".into()],
            vec![None],
            vec![Transform {
                translation: Vec3::new(0.0, 2.0, 0.0),
                ..Transform::IDENTITY
            }],
        )
        .unwrap();
        let entry = AnimationConfig {
            raw: true,
            optimize: false,
            additive: true,
            additive_reference: AdditiveReference::Skeleton,
            ..config(&dir.path().join("*.raw"))
        };

        let summary = export_animation(&slide("slide"), &skeleton, &entry, Endianness::Little).unwrap();
        let mut archive = IArchive::new(File::open(&summary.path).unwrap());
        let written: RawAnimation = archive.read().unwrap();
        let values: Vec<Vec3> = written.tracks[0].translations.iter().map(|k| k.value).collect();
        assert_eq!(values[0], Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(values[4], Vec3::new(4.0, -2.0, 0.0));

        // The first-key reference makes the first delta zero instead
        let entry = AnimationConfig {
            additive_reference: AdditiveReference::Animation,
            ..entry
        };
        let summary = export_animation(&slide("slide"), &skeleton, &entry, Endianness::Little).unwrap();
        let mut archive = IArchive::new(File::open(&summary.path).unwrap());
        let written: RawAnimation = archive.read().unwrap();
        assert_eq!(written.tracks[0].translations[0].value, Vec3::ZERO);
    }

    #[test]
    fn test_export_raw_unoptimized() {
        let dir = tempdir().expect("Failed to create temp dir");
        let entry = AnimationConfig {
            raw: true,
            optimize: false,
            ..config(&dir.path().join("*.raw"))
        };

        let input = slide("slide");
        let summary = export_animation(&input, &skeleton(), &entry, Endianness::Little).unwrap();
        assert!(summary.raw);
        assert!(summary.stats.is_none());

        let mut archive = IArchive::new(File::open(&summary.path).unwrap());
        let written: RawAnimation = archive.read().unwrap();
        assert_eq!(written, input);
    }

    #[test]
    fn test_failed_stage_leaves_no_file() {
        let dir = tempdir().expect("Failed to create temp dir");
        let entry = config(&dir.path().join("*.anim"));
        let mut input = slide("broken");
        input.tracks.push(JointTrack::default());

        let err = export_animation(&input, &skeleton(), &entry, Endianness::Little).unwrap_err();
        assert!(matches!(err, ExportError::Optimization(_)));
        assert!(!dir.path().join("broken.anim").exists());
    }

    #[test]
    fn test_unwritable_output() {
        let dir = tempdir().expect("Failed to create temp dir");
        let entry = config(&dir.path().join("missing").join("*.anim"));
        let err = export_animation(&slide("slide"), &skeleton(), &entry, Endianness::Little).unwrap_err();
        assert!(matches!(err, ExportError::Output(OutputIoError::Open { .. })));
    }

    #[test]
    fn test_report_success_is_conjunction() {
        let ok = |name: &str| AnimationExport {
            animation: name.into(),
            output: PathBuf::from(name),
            result: Ok(ExportSummary {
                path: PathBuf::from(name),
                raw: false,
                stats: None,
            }),
        };
        let mut report = BatchReport::default();
        assert!(report.success());
        report.exports.push(ok("a"));
        assert!(report.success());
        report.exports.push(AnimationExport {
            animation: "b".into(),
            output: PathBuf::from("b"),
            result: Err(ExportError::Output(OutputIoError::Open {
                path: PathBuf::from("b"),
                source: std::io::ErrorKind::NotFound.into(),
            })),
        });
        report.exports.push(ok("c"));
        assert!(!report.success());
        assert_eq!(report.failures().count(), 1);
    }
}
