use thiserror::Error;

/// Why a value could not be encoded to JSON text.
#[derive(Debug, Error)]
pub enum SerializationCause {
    #[error("circular reference detected")]
    CycleDetected,
    #[error("no converter for leaf of type {type_name}")]
    UnsupportedLeafType { type_name: String },
    #[error("non-finite number {value} is not valid JSON")]
    NonFiniteNumber { value: f64 },
    #[error("value nested deeper than {limit} levels")]
    DepthLimitExceeded { limit: usize },
    #[error("failed to write JSON: {0}")]
    Write(#[source] serde_json::Error),
}

/// Encoding a value to JSON text failed.
#[derive(Debug, Error)]
#[error("failed to serialize{}: {cause}", field_suffix(.field))]
pub struct SerializationError {
    /// Field whose value was being encoded, if known.
    pub field: Option<String>,
    /// Debug rendering of the offending value.
    pub value: String,
    #[source]
    pub cause: SerializationCause,
}

impl SerializationError {
    pub fn new(value: String, cause: SerializationCause) -> Self {
        SerializationError {
            field: None,
            value,
            cause,
        }
    }

    /// Attaches the field name.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Why JSON text could not be decoded.
#[derive(Debug, Error)]
pub enum DeserializationCause {
    #[error("malformed JSON: {0}")]
    MalformedText(#[source] serde_json::Error),
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[source] std::str::Utf8Error),
    #[error("malformed date/time, expected {expected}")]
    MalformedDate { expected: &'static str },
}

/// Decoding a wire value failed.
#[derive(Debug, Error)]
#[error("failed to deserialize{}: {cause}", field_suffix(.field))]
pub struct DeserializationError {
    /// Field whose wire value was being decoded, if known.
    pub field: Option<String>,
    /// The text that failed to decode.
    pub raw_text: String,
    #[source]
    pub cause: DeserializationCause,
}

impl DeserializationError {
    pub fn new(raw_text: impl Into<String>, cause: DeserializationCause) -> Self {
        DeserializationError {
            field: None,
            raw_text: raw_text.into(),
            cause,
        }
    }

    /// Attaches the field name.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// A row-level marshaling operation was aborted.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),
}

impl ProcessingError {
    /// Name of the field that caused the failure.
    pub fn field(&self) -> Option<&str> {
        match self {
            ProcessingError::Serialization(e) => e.field.as_deref(),
            ProcessingError::Deserialization(e) => e.field.as_deref(),
        }
    }
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" field '{f}'"))
        .unwrap_or_default()
}
