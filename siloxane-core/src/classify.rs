//! Storage classification of declared field types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::descriptor::TypeDescriptor;

/// Storage representation chosen for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Encoded to JSON text before storage, decoded on read.
    Json,
    /// Native array column; values pass through untouched.
    Array,
    /// Fixed-width float vector; values pass through untouched.
    Vector,
    /// Date/time column converted between text and native values.
    Date,
    /// Passed through untouched.
    Plain,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Json => "json",
            Classification::Array => "array",
            Classification::Vector => "vector",
            Classification::Date => "date",
            Classification::Plain => "plain",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a declared type.
///
/// Total over well-formed descriptors and referentially transparent; only
/// ever returns `Json`, `Vector` or `Plain`.
///
/// - nullability never changes the result
/// - a sequence of floats (the element may be nullable once) is a `Vector`,
///   any other sequence is `Json`
/// - mappings are `Json`
/// - a union takes `Json` if any member is `Json`, else `Vector` if any
///   member is `Vector`
/// - scalars and structured references are `Plain`
pub fn classify(descriptor: &TypeDescriptor) -> Classification {
    match descriptor {
        TypeDescriptor::Scalar(_) | TypeDescriptor::Structured(_) => Classification::Plain,
        TypeDescriptor::Optional(inner) => classify(inner),
        TypeDescriptor::Sequence(element) => {
            if is_float_element(element) {
                Classification::Vector
            } else {
                Classification::Json
            }
        }
        TypeDescriptor::Mapping(_) => Classification::Json,
        TypeDescriptor::Union(members) => {
            let mut result = Classification::Plain;
            for member in members.iter().filter(|m| !m.is_null()) {
                match classify(member) {
                    Classification::Json => return Classification::Json,
                    Classification::Vector => result = Classification::Vector,
                    _ => {}
                }
            }
            result
        }
    }
}

fn is_float_element(element: &TypeDescriptor) -> bool {
    matches!(
        element.strip_optional(),
        TypeDescriptor::Scalar(kind) if kind.is_float()
    )
}
