// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Decode dynamic result trees into caller-supplied structures.
//!
//! A target type declares an introspectable binding table: one
//! [`FieldBinding`] per field, naming the result attribute it binds and how
//! to set it. [`unmarshal`] walks the tagged tree against that table —
//! scalar attributes coerce losslessly into the declared field type, child
//! lists recurse per element in result order. Unmatched result attributes
//! are ignored; unmatched target fields keep their `Default` value, so
//! partial results are not an error.

use lattice_proto::{ResultNode, ScalarValue};
use std::collections::HashMap;

/// Unmarshalling failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnmarshalError {
    /// A scalar could not be coerced losslessly into the declared field
    /// type.
    #[error("type mismatch for field `{field}`: cannot read {value} as {want}")]
    TypeMismatch {
        /// Target field name.
        field: &'static str,
        /// Declared field type.
        want: &'static str,
        /// Offending value, rendered.
        value: String,
    },

    /// Two target fields bind the same result attribute; refusing to pick
    /// one nondeterministically.
    #[error("ambiguous binding: fields `{first}` and `{second}` both bind attribute {attr:?}")]
    AmbiguousBinding {
        /// The doubly-bound attribute name.
        attr: String,
        /// First field claiming it.
        first: &'static str,
        /// Second field claiming it.
        second: &'static str,
    },
}

/// How one bound field consumes its result attribute.
pub enum BindKind<T> {
    /// Text field, from a `Str` scalar.
    Text(fn(&mut T, String)),
    /// Integer field, from `Int`, integral `Float`, or numeric `Str`.
    Int(fn(&mut T, i64)),
    /// Float field, from `Float`, exactly-representable `Int`, or numeric
    /// `Str`.
    Float(fn(&mut T, f64)),
    /// Boolean field, from `Bool` or `"true"`/`"false"` text.
    Bool(fn(&mut T, bool)),
    /// Timestamp field (epoch milliseconds), from `Timestamp` or `Int`.
    Timestamp(fn(&mut T, i64)),
    /// Singular nested field, from the first child under the attribute.
    One(fn(&mut T, &ResultNode) -> Result<(), UnmarshalError>),
    /// Repeated nested field, from every child in result order.
    Many(fn(&mut T, &[ResultNode]) -> Result<(), UnmarshalError>),
}

impl<T> BindKind<T> {
    fn want(&self) -> &'static str {
        match self {
            BindKind::Text(_) => "text",
            BindKind::Int(_) => "integer",
            BindKind::Float(_) => "float",
            BindKind::Bool(_) => "boolean",
            BindKind::Timestamp(_) => "timestamp",
            BindKind::One(_) => "nested",
            BindKind::Many(_) => "repeated nested",
        }
    }
}

/// Binds one target field to one result attribute.
pub struct FieldBinding<T> {
    /// Result-attribute name this field consumes.
    pub attr: &'static str,
    /// Target field name (diagnostics only).
    pub field: &'static str,
    /// Setter and declared type.
    pub kind: BindKind<T>,
}

/// Target types declare their binding table through this trait. Fields
/// without a binding are simply never populated.
pub trait FromResult: Default + Sized {
    /// The field-binding table for this type.
    fn bindings() -> Vec<FieldBinding<Self>>;
}

/// Decode one result node into `T`. Running this twice over the same tree
/// yields equal values — nothing is consumed from the tree.
pub fn unmarshal<T: FromResult>(node: &ResultNode) -> Result<T, UnmarshalError> {
    let bindings = T::bindings();

    // Fail fast on doubly-bound attributes instead of picking one.
    let mut seen: HashMap<&'static str, &'static str> = HashMap::new();
    for b in &bindings {
        if let Some(first) = seen.insert(b.attr, b.field) {
            return Err(UnmarshalError::AmbiguousBinding {
                attr: b.attr.to_string(),
                first,
                second: b.field,
            });
        }
    }

    let mut out = T::default();
    for b in &bindings {
        match &b.kind {
            BindKind::One(set) => {
                if let Some(child) = node.child(b.attr) {
                    set(&mut out, child)?;
                }
            }
            BindKind::Many(set) => {
                let list = node.child_list(b.attr);
                if !list.is_empty() {
                    set(&mut out, list)?;
                }
            }
            scalar => {
                if let Some(value) = node.attr(b.attr) {
                    apply_scalar(&mut out, b, scalar, value)?;
                }
            }
        }
    }
    Ok(out)
}

/// Decode every node of a child list, preserving result order.
pub fn unmarshal_all<T: FromResult>(list: &[ResultNode]) -> Result<Vec<T>, UnmarshalError> {
    list.iter().map(unmarshal).collect()
}

fn apply_scalar<T>(
    out: &mut T,
    binding: &FieldBinding<T>,
    kind: &BindKind<T>,
    value: &ScalarValue,
) -> Result<(), UnmarshalError> {
    let mismatch = || UnmarshalError::TypeMismatch {
        field: binding.field,
        want: kind.want(),
        value: value.to_string(),
    };
    match kind {
        BindKind::Text(set) => match value {
            ScalarValue::Str(s) => set(out, s.clone()),
            _ => return Err(mismatch()),
        },
        BindKind::Int(set) => set(out, coerce_int(value).ok_or_else(mismatch)?),
        BindKind::Float(set) => set(out, coerce_float(value).ok_or_else(mismatch)?),
        BindKind::Bool(set) => match value {
            ScalarValue::Bool(b) => set(out, *b),
            ScalarValue::Str(s) if s == "true" => set(out, true),
            ScalarValue::Str(s) if s == "false" => set(out, false),
            _ => return Err(mismatch()),
        },
        BindKind::Timestamp(set) => match value {
            ScalarValue::Timestamp(t) | ScalarValue::Int(t) => set(out, *t),
            _ => return Err(mismatch()),
        },
        // Child kinds are dispatched before apply_scalar.
        BindKind::One(_) | BindKind::Many(_) => return Err(mismatch()),
    }
    Ok(())
}

/// Largest integer magnitude a 64-bit float represents exactly.
const FLOAT_EXACT_INT: i64 = 1 << 53;

fn coerce_int(value: &ScalarValue) -> Option<i64> {
    match value {
        ScalarValue::Int(i) => Some(*i),
        ScalarValue::Float(f) if f.fract() == 0.0 && f.abs() <= FLOAT_EXACT_INT as f64 => {
            Some(*f as i64)
        }
        ScalarValue::Str(s) => s.parse().ok(),
        _ => None,
    }
}

fn coerce_float(value: &ScalarValue) -> Option<f64> {
    match value {
        ScalarValue::Float(f) => Some(*f),
        ScalarValue::Int(i) if i.abs() <= FLOAT_EXACT_INT => Some(*i as f64),
        ScalarValue::Str(s) => s.parse().ok(),
        _ => None,
    }
}
