//! JSON text codec for value trees.
//!
//! Encoding walks the value depth-first, converting leaves that are not
//! JSON primitives through an ordered registry of [`LeafConverter`]s.
//! Decoding delegates to `serde_json`, so the set of rejected inputs and
//! the duplicate-key policy (last occurrence wins) are the parser's own.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;

use crate::error::{
    DeserializationCause, DeserializationError, SerializationCause, SerializationError,
};
use crate::temporal::format_iso;
use crate::value::Value;

/// Converts one family of non-JSON leaves into encodable values.
///
/// The returned value is encoded recursively, so a converter may produce
/// containers or even other convertible leaves.
pub trait LeafConverter: Send + Sync {
    fn name(&self) -> &str;

    /// Converts the leaf, or returns `None` if it is not handled here.
    fn convert(&self, leaf: &Value) -> Option<Value>;
}

/// Unique identifiers become their hyphenated string form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidConverter;

impl LeafConverter for UuidConverter {
    fn name(&self) -> &str {
        "uuid"
    }

    fn convert(&self, leaf: &Value) -> Option<Value> {
        match leaf {
            Value::Uuid(u) => Some(Value::String(u.hyphenated().to_string())),
            _ => None,
        }
    }
}

/// Dates and times become ISO-8601 strings, offsets included.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalConverter;

impl LeafConverter for TemporalConverter {
    fn name(&self) -> &str {
        "temporal"
    }

    fn convert(&self, leaf: &Value) -> Option<Value> {
        format_iso(leaf).map(Value::String)
    }
}

/// Decimals become the nearest double.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalConverter;

impl LeafConverter for DecimalConverter {
    fn name(&self) -> &str {
        "decimal"
    }

    fn convert(&self, leaf: &Value) -> Option<Value> {
        match leaf {
            Value::Decimal(d) => d.to_f64().map(Value::Float),
            _ => None,
        }
    }
}

/// Unordered collections become lists in their stored order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetConverter;

impl LeafConverter for SetConverter {
    fn name(&self) -> &str {
        "set"
    }

    fn convert(&self, leaf: &Value) -> Option<Value> {
        match leaf {
            Value::Set(items) => Some(Value::list(items.iter().cloned())),
            _ => None,
        }
    }
}

/// Structured records become their plain form.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainFormConverter;

impl LeafConverter for PlainFormConverter {
    fn name(&self) -> &str {
        "plain-form"
    }

    fn convert(&self, leaf: &Value) -> Option<Value> {
        match leaf {
            Value::Record(record) => Some(record.plain_form()),
            _ => None,
        }
    }
}

/// Encodes value trees to JSON text and decodes them back.
///
/// Holds no per-call state; share one instance freely across threads.
#[derive(Clone)]
pub struct Codec {
    converters: Vec<Arc<dyn LeafConverter>>,
}

impl Codec {
    /// Creates a codec with the built-in converters, in priority order:
    /// uuid, temporal, decimal, set, plain-form.
    pub fn new() -> Self {
        Codec {
            converters: vec![
                Arc::new(UuidConverter),
                Arc::new(TemporalConverter),
                Arc::new(DecimalConverter),
                Arc::new(SetConverter),
                Arc::new(PlainFormConverter),
            ],
        }
    }

    /// Registers a converter after the existing ones.
    pub fn with_converter(mut self, converter: impl LeafConverter + 'static) -> Self {
        self.converters.push(Arc::new(converter));
        self
    }

    /// Names of the registered converters, in priority order.
    pub fn converter_names(&self) -> Vec<&str> {
        self.converters.iter().map(|c| c.name()).collect()
    }

    /// Encodes a value to JSON text.
    pub fn encode(&self, value: &Value) -> Result<String, SerializationError> {
        let json = self.to_json(value)?;
        serde_json::to_string(&json).map_err(|e| {
            SerializationError::new(format!("{value:?}"), SerializationCause::Write(e))
        })
    }

    /// Converts a value to the JSON data model without rendering text.
    pub fn to_json(&self, value: &Value) -> Result<serde_json::Value, SerializationError> {
        Encoder {
            codec: self,
            active: HashSet::new(),
            depth: 0,
        }
        .encode(value)
    }

    /// Returns true if the value can be encoded.
    pub fn is_serializable(&self, value: &Value) -> bool {
        self.to_json(value).is_ok()
    }

    /// Decodes JSON text.
    pub fn decode(&self, text: &str) -> Result<Value, DeserializationError> {
        serde_json::from_str::<serde_json::Value>(text)
            .map(Value::from)
            .map_err(|e| DeserializationError::new(text, DeserializationCause::MalformedText(e)))
    }

    /// Decodes JSON text given as UTF-8 bytes.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Value, DeserializationError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            DeserializationError::new(
                String::from_utf8_lossy(bytes),
                DeserializationCause::InvalidUtf8(e),
            )
        })?;
        self.decode(text)
    }

    fn convert_leaf(&self, leaf: &Value) -> Option<Value> {
        self.converters.iter().find_map(|c| c.convert(leaf))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("converters", &self.converter_names())
            .finish()
    }
}

/// Deepest nesting the encoder accepts. Matches the recursion limit
/// `serde_json` applies when parsing.
pub const MAX_DEPTH: usize = 128;

/// Depth-first encoder. `active` holds the identities of the containers and
/// records on the current path; meeting one again means a cycle. `depth`
/// counts containers and leaf conversions on the path.
struct Encoder<'a> {
    codec: &'a Codec,
    active: HashSet<usize>,
    depth: usize,
}

impl Encoder<'_> {
    fn encode(&mut self, value: &Value) -> Result<serde_json::Value, SerializationError> {
        use serde_json::Value as Json;

        match value {
            Value::Null => Ok(Json::Null),
            Value::Bool(b) => Ok(Json::Bool(*b)),
            Value::Int(i) => Ok(Json::from(*i)),
            Value::UInt(u) => Ok(Json::from(*u)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| {
                    SerializationError::new(
                        format!("{f:?}"),
                        SerializationCause::NonFiniteNumber { value: *f },
                    )
                }),
            Value::String(s) => Ok(Json::String(s.clone())),
            Value::List(list) => {
                let id = self.enter(list.id(), value)?;
                let items = list.to_vec();
                let encoded = items
                    .iter()
                    .map(|item| self.encode(item))
                    .collect::<Result<Vec<_>, _>>();
                self.leave(id);
                encoded.map(Json::Array)
            }
            Value::Map(map) => {
                let id = self.enter(map.id(), value)?;
                let at_root = self.depth == 1;
                let entries: Vec<(String, Value)> = map
                    .read()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let mut object = serde_json::Map::with_capacity(entries.len());
                let mut result = Ok(());
                for (k, v) in &entries {
                    match self.encode(v) {
                        Ok(json) => {
                            object.insert(k.clone(), json);
                        }
                        Err(e) if at_root && e.field.is_none() => {
                            result = Err(e.with_field(k.as_str()));
                            break;
                        }
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }
                }
                self.leave(id);
                result.map(|()| Json::Object(object))
            }
            Value::Record(record) => {
                let id = self.enter(Arc::as_ptr(record) as *const () as usize, value)?;
                let encoded = self.encode_leaf(value);
                self.leave(id);
                encoded
            }
            _ => {
                self.descend(value)?;
                let encoded = self.encode_leaf(value);
                self.depth -= 1;
                encoded
            }
        }
    }

    fn encode_leaf(&mut self, leaf: &Value) -> Result<serde_json::Value, SerializationError> {
        match self.codec.convert_leaf(leaf) {
            Some(converted) => self.encode(&converted),
            None => Err(SerializationError::new(
                format!("{leaf:?}"),
                SerializationCause::UnsupportedLeafType {
                    type_name: leaf.type_name().to_string(),
                },
            )),
        }
    }

    fn descend(&mut self, value: &Value) -> Result<(), SerializationError> {
        if self.depth >= MAX_DEPTH {
            return Err(SerializationError::new(
                format!("<{} nested deeper than {MAX_DEPTH}>", value.type_name()),
                SerializationCause::DepthLimitExceeded { limit: MAX_DEPTH },
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn enter(&mut self, id: usize, value: &Value) -> Result<usize, SerializationError> {
        if !self.active.insert(id) {
            return Err(SerializationError::new(
                format!("{value:?}"),
                SerializationCause::CycleDetected,
            ));
        }
        if let Err(e) = self.descend(value) {
            self.active.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    fn leave(&mut self, id: usize) {
        self.active.remove(&id);
        self.depth -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PlainForm;
    use chrono::{FixedOffset, NaiveDate, TimeZone};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use uuid::Uuid;

    fn codec() -> Codec {
        Codec::new()
    }

    #[test]
    fn encode_primitives() {
        let value = Value::map([
            ("name", Value::from("test")),
            ("value", Value::from(123)),
            ("active", Value::from(true)),
            ("null_field", Value::Null),
        ]);
        assert_eq!(
            codec().encode(&value).unwrap(),
            r#"{"name":"test","value":123,"active":true,"null_field":null}"#
        );
    }

    #[test]
    fn roundtrip_primitive_structures() {
        let original = Value::map([
            ("string", Value::from("hello")),
            ("int", Value::from(-123)),
            ("float", Value::from(0.000001)),
            ("big", Value::from(999_999_999_999_999_999i64)),
            ("list", Value::from(vec![1, 2, 3])),
            (
                "nested",
                Value::map([("level2", Value::map([("content", Value::from("deep"))]))]),
            ),
            ("empty_list", Value::list([])),
            ("empty_map", Value::map::<String>([])),
            ("unicode", Value::from("你好世界 🚀")),
        ]);
        let text = codec().encode(&original).unwrap();
        assert!(text.contains("你好世界"));
        assert_eq!(codec().decode(&text).unwrap(), original);
    }

    #[test]
    fn special_leaves_are_converted() {
        let id = Uuid::new_v4();
        let tz = FixedOffset::east_opt(0).unwrap();
        let created = tz.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let value = Value::map([
            ("uuid", Value::from(id)),
            ("datetime", Value::from(created)),
            ("date", Value::from(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())),
            ("decimal", Value::from(Decimal::from_str("123.45").unwrap())),
            ("set", Value::set([Value::from("a"), Value::from("b")])),
        ]);

        let decoded = codec().decode(&codec().encode(&value).unwrap()).unwrap();
        assert_eq!(decoded.get("uuid"), Some(Value::String(id.to_string())));
        assert_eq!(decoded.get("datetime"), Some(Value::from("2024-01-15T10:30:00+00:00")));
        assert_eq!(decoded.get("date"), Some(Value::from("2024-01-15")));
        assert_eq!(decoded.get("decimal"), Some(Value::Float(123.45)));
        assert_eq!(decoded.get("set"), Some(Value::from(vec!["a", "b"])));
    }

    #[derive(Debug)]
    struct Point {
        x: i64,
        y: i64,
        owner: Uuid,
    }

    impl PlainForm for Point {
        fn type_name(&self) -> &str {
            "Point"
        }

        fn plain_form(&self) -> Value {
            Value::map([
                ("x", Value::from(self.x)),
                ("y", Value::from(self.y)),
                ("owner", Value::from(self.owner)),
            ])
        }
    }

    #[test]
    fn records_encode_through_plain_form() {
        let owner = Uuid::new_v4();
        let value = Value::list([Value::record(Point { x: 1, y: 2, owner })]);
        let decoded = codec().decode(&codec().encode(&value).unwrap()).unwrap();
        let point = decoded.at(0).unwrap();
        assert_eq!(point.get("x"), Some(Value::Int(1)));
        assert_eq!(point.get("owner"), Some(Value::String(owner.to_string())));
    }

    #[test]
    fn cycle_is_detected() {
        let a = Value::map([("k", Value::from("v"))]);
        a.insert("self", a.clone());

        let err = codec().encode(&Value::map([("metadata", a)])).unwrap_err();
        assert!(matches!(err.cause, SerializationCause::CycleDetected));
        assert_eq!(err.field.as_deref(), Some("metadata"));
    }

    #[test]
    fn failing_field_is_named_at_the_root_only() {
        let inner = Value::map([("bad", Value::Float(f64::NAN))]);
        let value = Value::map([("ok", Value::from(1)), ("payload", inner)]);
        let err = codec().encode(&value).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("payload"));

        let err = codec().encode(&Value::list([Value::Float(f64::NAN)])).unwrap_err();
        assert_eq!(err.field, None);
    }

    fn nested_lists(depth: usize) -> Value {
        let mut value = Value::from(1);
        for _ in 0..depth {
            value = Value::list([value]);
        }
        value
    }

    #[test]
    fn nesting_is_bounded() {
        assert!(codec().encode(&nested_lists(MAX_DEPTH)).is_ok());

        let err = codec().encode(&nested_lists(1_000)).unwrap_err();
        match err.cause {
            SerializationCause::DepthLimitExceeded { limit } => assert_eq!(limit, MAX_DEPTH),
            other => panic!("unexpected cause: {other:?}"),
        }

        let err = codec()
            .encode(&Value::map([("deep", nested_lists(MAX_DEPTH))]))
            .unwrap_err();
        assert!(matches!(err.cause, SerializationCause::DepthLimitExceeded { .. }));
        assert_eq!(err.field.as_deref(), Some("deep"));
    }

    #[test]
    fn self_converting_leaf_is_bounded() {
        struct Echo;

        impl LeafConverter for Echo {
            fn name(&self) -> &str {
                "echo"
            }

            fn convert(&self, leaf: &Value) -> Option<Value> {
                matches!(leaf, Value::Opaque(_)).then(|| leaf.clone())
            }
        }

        let codec = Codec::new().with_converter(Echo);
        let err = codec.encode(&Value::opaque(1u8)).unwrap_err();
        assert!(matches!(err.cause, SerializationCause::DepthLimitExceeded { .. }));
    }

    #[test]
    fn indirect_list_cycle_is_detected() {
        let outer = Value::list([]);
        let inner = Value::list([outer.clone()]);
        outer.push(inner);
        let err = codec().encode(&outer).unwrap_err();
        assert!(matches!(err.cause, SerializationCause::CycleDetected));
    }

    #[test]
    fn shared_subtree_is_not_a_cycle() {
        let shared = Value::map([("k", Value::from(1))]);
        let value = Value::list([shared.clone(), shared]);
        assert_eq!(codec().encode(&value).unwrap(), r#"[{"k":1},{"k":1}]"#);
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = codec().encode(&Value::list([Value::Float(f)])).unwrap_err();
            assert!(matches!(err.cause, SerializationCause::NonFiniteNumber { .. }));
        }
    }

    #[test]
    fn unsupported_leaf_is_rejected() {
        struct Socket;
        let err = codec()
            .encode(&Value::map([("obj", Value::opaque(Socket))]))
            .unwrap_err();
        match err.cause {
            SerializationCause::UnsupportedLeafType { type_name } => {
                assert!(type_name.ends_with("Socket"))
            }
            other => panic!("unexpected cause: {other:?}"),
        }

        assert!(!codec().is_serializable(&Value::Bytes(vec![1, 2])));
    }

    #[test]
    fn registered_converter_handles_opaque_leaf() {
        struct Money(i64);

        struct MoneyConverter;

        impl LeafConverter for MoneyConverter {
            fn name(&self) -> &str {
                "money"
            }

            fn convert(&self, leaf: &Value) -> Option<Value> {
                match leaf {
                    Value::Opaque(o) => o.downcast_ref::<Money>().map(|m| Value::from(m.0)),
                    _ => None,
                }
            }
        }

        let codec = Codec::new().with_converter(MoneyConverter);
        assert_eq!(codec.converter_names().last(), Some(&"money"));
        assert_eq!(codec.encode(&Value::opaque(Money(250))).unwrap(), "250");
    }

    #[test]
    fn malformed_text_is_rejected() {
        for text in [
            "",
            "{invalid json}",
            "{\"key\": value}",
            "{'key': 'value'}",
            "{\"key\": \"value\",}",
            "[1, 2, 3,]",
            "{\"key\": \"unterminated",
            "NaN",
        ] {
            let err = codec().decode(text).unwrap_err();
            assert!(matches!(err.cause, DeserializationCause::MalformedText(_)), "{text:?}");
            assert_eq!(err.raw_text, text);
        }
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let value = codec().decode(r#"{"a": 1, "a": 2}"#).unwrap();
        assert_eq!(value.get("a"), Some(Value::Int(2)));
    }

    #[test]
    fn decode_bytes() {
        let value = codec().decode_bytes(br#"{"test": "value", "number": 42}"#).unwrap();
        assert_eq!(value.get("number"), Some(Value::Int(42)));

        let err = codec().decode_bytes(&[0xff, 0xfe, 0xfd]).unwrap_err();
        assert!(matches!(err.cause, DeserializationCause::InvalidUtf8(_)));
    }
}
