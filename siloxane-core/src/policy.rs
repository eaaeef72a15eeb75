//! Row-level marshaling between record values and wire values.

use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::classify::Classification;
use crate::codec::Codec;
use crate::config::MarshalConfig;
use crate::descriptor::{Record, Schema};
use crate::diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
use crate::error::{DeserializationCause, DeserializationError, ProcessingError, SerializationError};
use crate::plan::{DateRepresentation, FieldPlan, MarshalingPlan, PlanCache};
use crate::temporal::{format_iso, parse_as, parse_iso};
use crate::value::{Row, Value};

/// Applies a marshaling plan to rows.
///
/// A policy is immutable once built and can be shared across threads; every
/// call works on its own copy of the row.
#[derive(Clone)]
pub struct MarshalingPolicy {
    plan: Arc<MarshalingPlan>,
    codec: Arc<Codec>,
    sink: Arc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for MarshalingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarshalingPolicy")
            .field("plan", &self.plan)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl MarshalingPolicy {
    /// Resolves a plan for the schema and builds a policy around it.
    pub fn new(schema: &Schema, config: &MarshalConfig) -> Self {
        Self::from_plan(Arc::new(MarshalingPlan::resolve(schema, config)))
    }

    /// Builds a policy around a plan taken from (or added to) a cache.
    pub fn cached(schema: &Schema, config: &MarshalConfig, cache: &PlanCache) -> Self {
        Self::from_plan(cache.get_or_resolve(schema, config))
    }

    /// Builds a policy for a record type, adding the overrides it declares.
    pub fn for_record<R: Record>(config: MarshalConfig) -> Self {
        Self::new(&R::schema(), &config.with_overrides(R::overrides()))
    }

    pub fn from_plan(plan: Arc<MarshalingPlan>) -> Self {
        MarshalingPolicy {
            plan,
            codec: Arc::new(Codec::new()),
            sink: Arc::new(TracingSink),
        }
    }

    /// Replaces the diagnostic sink used in lenient mode.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn plan(&self) -> &MarshalingPlan {
        &self.plan
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Converts a record row into a wire row.
    ///
    /// JSON fields are encoded to text and date fields holding ISO text are
    /// parsed into native values. Everything else, including nulls and fields
    /// outside the plan, passes through. Encoding failures abort the call in
    /// both strict and lenient mode.
    #[instrument(level = "debug", skip_all, fields(schema = %self.plan.schema_name()))]
    pub fn to_wire_row(&self, row: &Row) -> Result<Row, ProcessingError> {
        let mut wire = Row::with_capacity(row.len());
        let mut converted = 0usize;

        for (name, value) in row {
            let encoded = match self.plan.field(name) {
                Some(field) => self.encode_field(name, field, value)?,
                None => None,
            };
            let value = match encoded {
                Some(encoded) => {
                    converted += 1;
                    encoded
                }
                None => value.clone(),
            };
            wire.insert(name.clone(), value);
        }

        debug!(fields = row.len(), converted, "encoded row");
        Ok(wire)
    }

    /// Converts a wire row back into a record row.
    ///
    /// In strict mode the first field failure is returned. In lenient mode the
    /// field keeps its wire value, a diagnostic goes to the sink and the rest
    /// of the row is still processed.
    #[instrument(level = "debug", skip_all, fields(schema = %self.plan.schema_name(), strict = self.plan.is_strict()))]
    pub fn from_wire_row(&self, row: &Row) -> Result<Row, ProcessingError> {
        let mut record = Row::with_capacity(row.len());
        let mut converted = 0usize;
        let mut failed = 0usize;

        for (name, wire) in row {
            let outcome = match self.plan.field(name) {
                Some(field) => self.decode_field(name, field, wire),
                None => Ok(None),
            };
            let value = match outcome {
                Ok(Some(decoded)) => {
                    converted += 1;
                    decoded
                }
                Ok(None) => wire.clone(),
                Err(err) if self.plan.is_strict() => {
                    error!(field = %name, error = %err, "failed to decode field, aborting");
                    return Err(err.into());
                }
                Err(err) => {
                    failed += 1;
                    self.sink.report(Diagnostic::from_error(name, &err));
                    wire.clone()
                }
            };
            record.insert(name.clone(), value);
        }

        debug!(fields = row.len(), converted, failed, "decoded row");
        Ok(record)
    }

    /// Returns the wire value for a field, or `None` to pass it through.
    fn encode_field(
        &self,
        name: &str,
        field: &FieldPlan,
        value: &Value,
    ) -> Result<Option<Value>, SerializationError> {
        if value.is_null() {
            return Ok(None);
        }

        let mut current = None;
        if field.date.is_some() {
            current = value.as_str().and_then(parse_iso);
            if current.is_some() {
                debug!(field = %name, "parsed date text");
            }
        }

        if field.classification == Classification::Json {
            let source = current.as_ref().unwrap_or(value);
            let text = self
                .codec
                .encode(source)
                .map_err(|e| e.with_field(name))?;
            debug!(field = %name, "encoded JSON field");
            current = Some(Value::String(text));
        }

        Ok(current)
    }

    /// Returns the record value for a field, or `None` to keep the wire value.
    fn decode_field(
        &self,
        name: &str,
        field: &FieldPlan,
        wire: &Value,
    ) -> Result<Option<Value>, DeserializationError> {
        if wire.is_null() {
            return Ok(None);
        }

        let mut current = None;
        if field.classification == Classification::Json {
            current = match wire {
                Value::String(text) => Some(self.codec.decode(text)),
                Value::Bytes(bytes) => Some(self.codec.decode_bytes(bytes)),
                _ => None,
            }
            .transpose()
            .map_err(|e| e.with_field(name))?;
            if current.is_some() {
                debug!(field = %name, "decoded JSON field");
            }
        }

        if let Some(representation) = field.date {
            let source = current.as_ref().unwrap_or(wire);
            if let Some(date) = date_for_record(source, representation).map_err(|e| e.with_field(name))? {
                debug!(field = %name, ?representation, "converted date field");
                current = Some(date);
            }
        }

        Ok(current)
    }
}

fn date_for_record(
    value: &Value,
    representation: DateRepresentation,
) -> Result<Option<Value>, DeserializationError> {
    match representation {
        DateRepresentation::Text => Ok(format_iso(value).map(Value::String)),
        DateRepresentation::Native(kind) => match value.as_str() {
            Some(text) => parse_as(text, kind).map(Some).ok_or_else(|| {
                DeserializationError::new(
                    text,
                    DeserializationCause::MalformedDate {
                        expected: kind.expected_format(),
                    },
                )
            }),
            None => Ok(None),
        },
        DateRepresentation::Unknown => Ok(None),
    }
}
