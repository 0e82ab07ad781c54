//! Conversion configuration
//!
//! The configuration is a JSON document listing the animations to extract
//! and how to process each of them. [`ConversionConfig::parse`] reads it,
//! runs the schema [`sanitize`]r and extracts one typed [`AnimationConfig`]
//! per `animations` entry.

mod sanitize;
mod value;

pub use sanitize::{DEFAULT_ADDITIVE_REFERENCE, DEFAULT_CLIP, DEFAULT_OUTPUT, SchemaErrors, SchemaTypeError, sanitize};
pub use value::{Member, Value, ValueType};

use crate::optimizer::OptimizationTolerances;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Configuration does not match the schema:\n{0}")]
    Schema(#[from] SchemaErrors),

    #[error(
        "animations[{entry}].additive_reference must be \"animation\" or \"skeleton\", got \"{value}\""
    )]
    InvalidAdditiveReference { entry: usize, value: String },

    #[error("animations[{entry}].optimization_tolerances.{name} must not be negative, got {value}")]
    NegativeTolerance {
        entry: usize,
        name: &'static str,
        value: f32,
    },
}

/// Reference pose an additive animation is expressed against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdditiveReference {
    /// First key of each channel
    #[default]
    Animation,
    /// Rest pose of the skeleton
    Skeleton,
}

impl AdditiveReference {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "animation" => Some(Self::Animation),
            "skeleton" => Some(Self::Skeleton),
            _ => None,
        }
    }
}

/// Processing options of one `animations` entry
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationConfig {
    /// Selector for imported animation names (`*` and `?` wildcards)
    pub clip: String,
    /// Output path pattern, `*` is replaced by the animation name
    pub output: String,
    pub optimize: bool,
    pub tolerances: OptimizationTolerances,
    /// Write the raw animation instead of the compiled one
    pub raw: bool,
    pub additive: bool,
    pub additive_reference: AdditiveReference,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            clip: DEFAULT_CLIP.to_string(),
            output: DEFAULT_OUTPUT.to_string(),
            optimize: true,
            tolerances: OptimizationTolerances::default(),
            raw: false,
            additive: false,
            additive_reference: AdditiveReference::default(),
        }
    }
}

impl AnimationConfig {
    /// Read a sanitized entry. Members that are missing fall back to defaults.
    fn from_value(entry: &Value, index: usize) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let string = |key: &str, default: String| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .map_or(default, str::to_string)
        };
        let flag = |key: &str, default: bool| entry.get(key).and_then(Value::as_bool).unwrap_or(default);

        let tolerances = entry.get("optimization_tolerances");
        let tolerance = |name: &'static str, default: f32| {
            let value = tolerances
                .and_then(|t| t.get(name))
                .and_then(Value::as_f64)
                .map_or(default, |v| v as f32);
            if value < 0.0 {
                Err(ConfigError::NegativeTolerance {
                    entry: index,
                    name,
                    value,
                })
            } else {
                Ok(value)
            }
        };

        let additive_reference = match entry.get("additive_reference").and_then(Value::as_str) {
            None => defaults.additive_reference,
            Some(value) => AdditiveReference::parse(value).ok_or_else(|| {
                ConfigError::InvalidAdditiveReference {
                    entry: index,
                    value: value.to_string(),
                }
            })?,
        };

        Ok(Self {
            clip: string("clip", defaults.clip),
            output: string("output", defaults.output),
            optimize: flag("optimize", defaults.optimize),
            tolerances: OptimizationTolerances {
                translation: tolerance("translation", defaults.tolerances.translation)?,
                rotation: tolerance("rotation", defaults.tolerances.rotation)?,
                scale: tolerance("scale", defaults.tolerances.scale)?,
                hierarchical: tolerance("hierarchical", defaults.tolerances.hierarchical)?,
            },
            raw: flag("raw", defaults.raw),
            additive: flag("additive", defaults.additive),
            additive_reference,
        })
    }

    /// Whether this entry applies to the imported animation `name`
    pub fn matches(&self, name: &str) -> bool {
        wildcard_match(&self.clip, name)
    }
}

/// Sanitized conversion document and its typed entries
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub animations: Vec<AnimationConfig>,
    document: Value,
}

impl ConversionConfig {
    /// Parse and sanitize a JSON configuration. An empty string is treated
    /// as an empty document.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let document = if text.trim().is_empty() {
            Value::object()
        } else {
            Value::from_json_str(text)?
        };
        Self::from_value(document)
    }

    pub fn from_value(mut document: Value) -> Result<Self, ConfigError> {
        sanitize(&mut document)?;

        let animations = document
            .get("animations")
            .and_then(Value::as_array)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, entry)| AnimationConfig::from_value(entry, index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            animations,
            document,
        })
    }

    /// The sanitized document, defaults included
    pub fn document(&self) -> &Value {
        &self.document
    }
}

/// Glob match supporting `*` (any run of characters) and `?` (one character)
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
