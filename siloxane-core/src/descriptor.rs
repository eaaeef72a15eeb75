use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::classify::{classify, Classification};

/// Integer type variants for descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
}

/// Floating-point type variants for descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatType {
    F32,
    F64,
}

/// Leaf kinds a field may be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int(IntType),
    Float(FloatType),
    /// UTF-8 text.
    Text,
    /// Raw byte string.
    Bytes,
    Uuid,
    /// Calendar date without time.
    Date,
    /// Wall-clock time without date.
    Time,
    /// Date and time, with or without an offset.
    DateTime,
    /// Fixed-precision decimal.
    Decimal,
    /// The null type; only meaningful as a union member.
    Null,
    /// Unconstrained value.
    Any,
}

impl ScalarKind {
    pub fn is_float(&self) -> bool {
        matches!(self, ScalarKind::Float(_))
    }

    /// Returns true for the date/time kinds.
    pub fn is_temporal(&self) -> bool {
        matches!(self, ScalarKind::Date | ScalarKind::Time | ScalarKind::DateTime)
    }
}

/// Declared shape of a single record field.
///
/// Descriptors are built once by the calling layer (usually through
/// `#[derive(Record)]`) and are never inspected against runtime values.
/// They must be acyclic: a record that refers to itself is described with
/// [`TypeDescriptor::Structured`] carrying the record name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    /// A leaf value.
    Scalar(ScalarKind),
    /// A nullable value.
    Optional(Box<TypeDescriptor>),
    /// One of several alternatives. May contain `Scalar(Null)`.
    Union(Vec<TypeDescriptor>),
    /// Homogeneous list.
    Sequence(Box<TypeDescriptor>),
    /// String-keyed map; only the value type is described.
    Mapping(Box<TypeDescriptor>),
    /// Reference to another record type by name. Opaque to classification.
    Structured(String),
}

impl TypeDescriptor {
    pub fn scalar(kind: ScalarKind) -> Self {
        TypeDescriptor::Scalar(kind)
    }

    /// Creates a nullable descriptor.
    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(inner))
    }

    /// Creates a sequence descriptor.
    pub fn sequence(element: TypeDescriptor) -> Self {
        TypeDescriptor::Sequence(Box::new(element))
    }

    /// Describes a `Vec` of the element: a byte string for `u8`, a sequence
    /// otherwise.
    pub fn vec(element: TypeDescriptor) -> Self {
        match element {
            TypeDescriptor::Scalar(ScalarKind::Int(IntType::U8)) => {
                TypeDescriptor::Scalar(ScalarKind::Bytes)
            }
            element => TypeDescriptor::sequence(element),
        }
    }

    /// Creates a mapping descriptor from its value type.
    pub fn mapping(value: TypeDescriptor) -> Self {
        TypeDescriptor::Mapping(Box::new(value))
    }

    /// Creates a union descriptor.
    pub fn union(members: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        TypeDescriptor::Union(members.into_iter().collect())
    }

    /// Creates a reference to a named record type.
    pub fn structured(name: impl Into<String>) -> Self {
        TypeDescriptor::Structured(name.into())
    }

    /// Returns true if `None`/null is an accepted value.
    pub fn is_nullable(&self) -> bool {
        match self {
            TypeDescriptor::Optional(_) | TypeDescriptor::Scalar(ScalarKind::Null) => true,
            TypeDescriptor::Union(members) => members.iter().any(TypeDescriptor::is_nullable),
            _ => false,
        }
    }

    /// Strips one layer of nullability.
    ///
    /// `Optional(T)` yields `T`; a union whose only non-null member is `T`
    /// also yields `T`. Anything else is returned unchanged.
    pub fn strip_optional(&self) -> &TypeDescriptor {
        match self {
            TypeDescriptor::Optional(inner) => inner,
            TypeDescriptor::Union(members) => {
                let mut non_null = members.iter().filter(|m| !m.is_null());
                match (non_null.next(), non_null.next()) {
                    (Some(only), None) if members.len() > 1 => only,
                    _ => self,
                }
            }
            _ => self,
        }
    }

    pub(crate) fn is_null(&self) -> bool {
        matches!(self, TypeDescriptor::Scalar(ScalarKind::Null))
    }

    /// Resolves the leaf kind behind any number of nullable wrappers.
    pub fn leaf_kind(&self) -> Option<ScalarKind> {
        let mut current = self;
        loop {
            let next = current.strip_optional();
            if std::ptr::eq(next, current) {
                break;
            }
            current = next;
        }
        match current {
            TypeDescriptor::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Analyzes the descriptor for inspection and debugging.
    pub fn analyze(&self) -> TypeAnalysis {
        let members = match self {
            TypeDescriptor::Union(members) => members.len(),
            TypeDescriptor::Scalar(_) | TypeDescriptor::Structured(_) => 0,
            _ => 1,
        };
        TypeAnalysis {
            classification: classify(self),
            origin: self.origin(),
            is_optional: self.is_nullable(),
            members,
        }
    }

    fn origin(&self) -> &'static str {
        match self {
            TypeDescriptor::Scalar(_) => "scalar",
            TypeDescriptor::Optional(_) => "optional",
            TypeDescriptor::Union(_) => "union",
            TypeDescriptor::Sequence(_) => "sequence",
            TypeDescriptor::Mapping(_) => "mapping",
            TypeDescriptor::Structured(_) => "structured",
        }
    }
}

/// Result of [`TypeDescriptor::analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnalysis {
    pub classification: Classification,
    /// Name of the outermost descriptor variant.
    pub origin: &'static str,
    pub is_optional: bool,
    /// Number of direct type arguments (union members, wrapped element).
    pub members: usize,
}

/// A named, ordered description of a record's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    fields: IndexMap<String, TypeDescriptor>,
}

impl Schema {
    /// Creates a schema from field definitions, preserving their order.
    pub fn new<N: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (N, TypeDescriptor)>,
    ) -> Self {
        Schema {
            name: name.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &IndexMap<String, TypeDescriptor> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&TypeDescriptor> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the names of fields that classify as JSON on their own.
    pub fn detect_json_fields(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|(_, d)| classify(d) == Classification::Json)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Per-field marshaling overrides declared alongside a record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOverrides {
    pub json_fields: BTreeSet<String>,
    pub array_fields: BTreeSet<String>,
    pub vector_fields: BTreeSet<String>,
    pub date_fields: BTreeSet<String>,
}

impl FieldOverrides {
    pub fn is_empty(&self) -> bool {
        self.json_fields.is_empty()
            && self.array_fields.is_empty()
            && self.vector_fields.is_empty()
            && self.date_fields.is_empty()
    }
}

/// A type with a statically known descriptor.
pub trait Described {
    fn descriptor() -> TypeDescriptor;
}

/// A record type whose fields can be marshaled.
///
/// Usually derived with `#[derive(Record)]`.
pub trait Record {
    /// Returns the field descriptors of this record.
    fn schema() -> Schema;

    /// Returns overrides declared on the record's fields.
    fn overrides() -> FieldOverrides {
        FieldOverrides::default()
    }
}

macro_rules! impl_described {
    ($($t:ty => $kind:expr),* $(,)?) => {
        $(
            impl Described for $t {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::Scalar($kind)
                }
            }
        )*
    };
}

impl_described! {
    bool => ScalarKind::Bool,
    u8 => ScalarKind::Int(IntType::U8),
    u16 => ScalarKind::Int(IntType::U16),
    u32 => ScalarKind::Int(IntType::U32),
    u64 => ScalarKind::Int(IntType::U64),
    i8 => ScalarKind::Int(IntType::I8),
    i16 => ScalarKind::Int(IntType::I16),
    i32 => ScalarKind::Int(IntType::I32),
    i64 => ScalarKind::Int(IntType::I64),
    f32 => ScalarKind::Float(FloatType::F32),
    f64 => ScalarKind::Float(FloatType::F64),
    String => ScalarKind::Text,
    &str => ScalarKind::Text,
    char => ScalarKind::Text,
    uuid::Uuid => ScalarKind::Uuid,
    chrono::NaiveDate => ScalarKind::Date,
    chrono::NaiveTime => ScalarKind::Time,
    chrono::NaiveDateTime => ScalarKind::DateTime,
    rust_decimal::Decimal => ScalarKind::Decimal,
    () => ScalarKind::Null,
}

impl<Tz: chrono::TimeZone> Described for chrono::DateTime<Tz> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Scalar(ScalarKind::DateTime)
    }
}

impl Described for serde_json::Value {
    fn descriptor() -> TypeDescriptor {
        let any = TypeDescriptor::Scalar(ScalarKind::Any);
        TypeDescriptor::union([
            TypeDescriptor::mapping(any.clone()),
            TypeDescriptor::sequence(any),
            TypeDescriptor::Scalar(ScalarKind::Text),
            TypeDescriptor::Scalar(ScalarKind::Float(FloatType::F64)),
            TypeDescriptor::Scalar(ScalarKind::Int(IntType::I64)),
            TypeDescriptor::Scalar(ScalarKind::Bool),
            TypeDescriptor::Scalar(ScalarKind::Null),
        ])
    }
}

impl<T: Described> Described for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::optional(T::descriptor())
    }
}

impl<T: Described + ?Sized> Described for Box<T> {
    fn descriptor() -> TypeDescriptor {
        T::descriptor()
    }
}

macro_rules! impl_described_sequence {
    ($($t:ident),*) => {
        $(
            impl<T: Described> Described for $t<T> {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::sequence(T::descriptor())
                }
            }
        )*
    };
}

impl_described_sequence!(VecDeque, HashSet, BTreeSet);

impl<T: Described> Described for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::vec(T::descriptor())
    }
}

macro_rules! impl_described_mapping {
    ($($t:ident),*) => {
        $(
            impl<K, V: Described> Described for $t<K, V> {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::mapping(V::descriptor())
                }
            }
        )*
    };
}

impl_described_mapping!(HashMap, BTreeMap, IndexMap);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_preserves_field_order() {
        let schema = Schema::new(
            "Item",
            [
                ("first", bool::descriptor()),
                ("second", u32::descriptor()),
                ("third", String::descriptor()),
            ],
        );

        let keys: Vec<_> = schema.fields().keys().collect();
        assert_eq!(keys, vec!["first", "second", "third"]);
        assert_eq!(schema.name(), "Item");
    }

    #[test]
    fn container_descriptors() {
        assert_eq!(
            <Vec<f32>>::descriptor(),
            TypeDescriptor::sequence(TypeDescriptor::Scalar(ScalarKind::Float(FloatType::F32)))
        );
        assert_eq!(
            <HashMap<String, i64>>::descriptor(),
            TypeDescriptor::mapping(TypeDescriptor::Scalar(ScalarKind::Int(IntType::I64)))
        );
        assert_eq!(
            <Option<Box<String>>>::descriptor(),
            TypeDescriptor::optional(TypeDescriptor::Scalar(ScalarKind::Text))
        );
    }

    #[test]
    fn byte_vectors_are_byte_strings() {
        assert_eq!(<Vec<u8>>::descriptor(), TypeDescriptor::Scalar(ScalarKind::Bytes));
        assert_eq!(classify(&<Vec<u8>>::descriptor()), Classification::Plain);
        assert_eq!(
            <VecDeque<u8>>::descriptor(),
            TypeDescriptor::sequence(TypeDescriptor::Scalar(ScalarKind::Int(IntType::U8)))
        );
        assert_eq!(
            <Vec<Vec<u8>>>::descriptor(),
            TypeDescriptor::sequence(TypeDescriptor::Scalar(ScalarKind::Bytes))
        );
    }

    #[test]
    fn strip_optional_handles_nullable_union() {
        let text = TypeDescriptor::Scalar(ScalarKind::Text);
        let union = TypeDescriptor::union([text.clone(), TypeDescriptor::Scalar(ScalarKind::Null)]);
        assert_eq!(union.strip_optional(), &text);
        assert!(union.is_nullable());

        let wide = TypeDescriptor::union([text.clone(), TypeDescriptor::Scalar(ScalarKind::Bool)]);
        assert_eq!(wide.strip_optional(), &wide);
        assert!(!wide.is_nullable());
    }

    #[test]
    fn leaf_kind_looks_through_nullability() {
        let d = TypeDescriptor::optional(TypeDescriptor::union([
            chrono::NaiveDate::descriptor(),
            TypeDescriptor::Scalar(ScalarKind::Null),
        ]));
        assert_eq!(d.leaf_kind(), Some(ScalarKind::Date));
        assert_eq!(<Vec<String>>::descriptor().leaf_kind(), None);
    }

    #[test]
    fn analyze_reports_shape() {
        let analysis = <Option<HashMap<String, String>>>::descriptor().analyze();
        assert_eq!(analysis.classification, Classification::Json);
        assert_eq!(analysis.origin, "optional");
        assert!(analysis.is_optional);

        let analysis = i32::descriptor().analyze();
        assert_eq!(analysis.classification, Classification::Plain);
        assert_eq!(analysis.origin, "scalar");
        assert!(!analysis.is_optional);
        assert_eq!(analysis.members, 0);
    }

    #[test]
    fn detect_json_fields() {
        let schema = Schema::new(
            "User",
            [
                ("id", i64::descriptor()),
                ("name", String::descriptor()),
                ("metadata", <HashMap<String, serde_json::Value>>::descriptor()),
                ("tags", <Vec<String>>::descriptor()),
                ("embedding", <Vec<f32>>::descriptor()),
            ],
        );

        let detected = schema.detect_json_fields();
        assert_eq!(
            detected,
            BTreeSet::from(["metadata".to_string(), "tags".to_string()])
        );
    }

    #[test]
    fn descriptor_serde_roundtrip() {
        let original = TypeDescriptor::union([
            TypeDescriptor::mapping(TypeDescriptor::Scalar(ScalarKind::Any)),
            TypeDescriptor::structured("Address"),
        ]);
        let json = serde_json::to_string(&original).unwrap();
        let recovered: TypeDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(original, recovered);
    }
}
