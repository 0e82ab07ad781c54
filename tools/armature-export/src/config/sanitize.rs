//! Schema sanitizer for conversion documents
//!
//! Fills every missing option with its documented default and reports every
//! member whose type does not match the schema. All rules are visited even
//! after a failure so that one run reports all problems.

use std::fmt;

use super::value::{Value, ValueType};
use crate::optimizer::OptimizationTolerances;

/// Default output pattern, `*` is replaced by the animation name
pub const DEFAULT_OUTPUT: &str = "*.ozz";

/// Default clip selector, matches every imported animation
pub const DEFAULT_CLIP: &str = "*";

/// Default additive reference pose, the first key of each channel
pub const DEFAULT_ADDITIVE_REFERENCE: &str = "animation";

/// A member holds a value of the wrong type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid type \"{found}\" for json member \"{path}\". \"{expected}\" expected.")]
pub struct SchemaTypeError {
    pub path: String,
    pub found: ValueType,
    pub expected: ValueType,
}

/// Every type error found in one sanitizer pass
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaErrors(pub Vec<SchemaTypeError>);

impl fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaErrors {}

/// Bring `root` to the schema, inserting defaults for absent members.
///
/// A `null` root is treated as an empty document. On failure the tree may be
/// partially filled and must not be used for conversion.
pub fn sanitize(root: &mut Value) -> Result<(), SchemaErrors> {
    let mut schema = Schema::default();

    if matches!(root, Value::Null) {
        *root = Value::object();
    }
    if !schema.check(root, "root".to_string(), ValueType::Object) {
        return schema.finish();
    }

    if let Some(Value::Array(animations)) = schema.array(root, "", "animations", "Animations to extract.") {
        for (index, entry) in animations.iter_mut().enumerate() {
            if matches!(entry, Value::Null) {
                *entry = Value::object();
            }
            let path = format!("animations[{index}]");
            if schema.check(entry, path.clone(), ValueType::Object) {
                sanitize_animation(&mut schema, entry, &path);
            }
        }
    }

    schema.finish()
}

fn sanitize_animation(schema: &mut Schema, entry: &mut Value, path: &str) {
    schema.scalar(
        entry,
        path,
        "clip",
        Value::from(DEFAULT_CLIP),
        "Imported animation(s) this entry applies to. '*' matches any sequence of \
         characters and '?' any single character.",
    );
    schema.scalar(
        entry,
        path,
        "output",
        Value::from(DEFAULT_OUTPUT),
        "Specifies animation output file(s). When importing multiple animations, use a '*' \
         character to specify part(s) of the filename that should be replaced by the \
         animation name.",
    );
    schema.scalar(entry, path, "optimize", Value::from(true), "Activates keyframes optimization.");
    sanitize_tolerances(schema, entry, path);
    schema.scalar(entry, path, "raw", Value::from(false), "Outputs raw animation.");
    schema.scalar(
        entry,
        path,
        "additive",
        Value::from(false),
        "Creates a delta animation that can be used for additive blending.",
    );
    schema.scalar(
        entry,
        path,
        "additive_reference",
        Value::from(DEFAULT_ADDITIVE_REFERENCE),
        "Select reference pose to use to build additive/delta animation. Can be \"animation\" \
         to use the 1st animation keyframe as reference, or \"skeleton\" to use skeleton rest \
         pose.",
    );
}

fn sanitize_tolerances(schema: &mut Schema, entry: &mut Value, path: &str) {
    let key = "optimization_tolerances";
    let Some(tolerances) = schema.object(entry, path, key, "Optimization tolerances.") else {
        return;
    };
    let path = join(path, key);
    let defaults = OptimizationTolerances::default();

    schema.scalar(
        tolerances,
        &path,
        "translation",
        Value::from(defaults.translation),
        "Translation optimization tolerance, defined as the distance between two translation \
         values in meters.",
    );
    schema.scalar(
        tolerances,
        &path,
        "rotation",
        Value::from(defaults.rotation),
        "Rotation optimization tolerance, ie: the angle between two rotation values in radian.",
    );
    schema.scalar(
        tolerances,
        &path,
        "scale",
        Value::from(defaults.scale),
        "Scale optimization tolerance, ie: the norm of the difference of two scales.",
    );
    schema.scalar(
        tolerances,
        &path,
        "hierarchical",
        Value::from(defaults.hierarchical),
        "Hierarchical translation optimization tolerance, ie: the maximum error (distance) \
         that an optimization on a joint is allowed to generate on its whole child hierarchy.",
    );
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Member of `parent`, inserted with `default` when absent
fn ensure<'a>(parent: &'a mut Value, key: &str, default: Value, comment: &str) -> Option<&'a mut Value> {
    if parent.get(key).is_none() {
        return parent.push_member(key, default, Some(comment));
    }
    parent.get_mut(key)
}

#[derive(Default)]
struct Schema {
    errors: Vec<SchemaTypeError>,
}

impl Schema {
    /// Record an error unless `value` has the `expected` type. Integers are
    /// accepted where floats are expected.
    fn check(&mut self, value: &Value, path: String, expected: ValueType) -> bool {
        let found = value.value_type();
        let valid = found == expected || (expected == ValueType::Float && found == ValueType::Int);
        if !valid {
            self.errors.push(SchemaTypeError {
                path,
                found,
                expected,
            });
        }
        valid
    }

    fn scalar(&mut self, parent: &mut Value, path: &str, key: &str, default: Value, comment: &str) {
        let expected = default.value_type();
        if let Some(value) = ensure(parent, key, default, comment) {
            self.check(value, join(path, key), expected);
        }
    }

    fn object<'a>(
        &mut self,
        parent: &'a mut Value,
        path: &str,
        key: &str,
        comment: &str,
    ) -> Option<&'a mut Value> {
        let value = ensure(parent, key, Value::object(), comment)?;
        self.check(value, join(path, key), ValueType::Object)
            .then_some(value)
    }

    /// Absent arrays default to a single empty object
    fn array<'a>(
        &mut self,
        parent: &'a mut Value,
        path: &str,
        key: &str,
        comment: &str,
    ) -> Option<&'a mut Value> {
        let value = ensure(parent, key, Value::Array(vec![Value::object()]), comment)?;
        self.check(value, join(path, key), ValueType::Array)
            .then_some(value)
    }

    fn finish(self) -> Result<(), SchemaErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaErrors(self.errors))
        }
    }
}
