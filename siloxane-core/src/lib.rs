//! Siloxane marshals record fields to and from the representations a
//! relational store expects.
//!
//! Core concepts:
//! - **TypeDescriptor**: The declared shape of a field, built once per record type
//! - **Classification**: How a field is stored (JSON text, native array, vector, date, plain)
//! - **Codec**: Converts in-memory value trees to JSON text and back
//! - **MarshalingPlan**: The resolved, immutable classification of every field in a schema
//! - **MarshalingPolicy**: Applies a plan to rows, in strict or lenient mode
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use siloxane_core::{Described, MarshalConfig, MarshalingPolicy, Row, Schema, Value};
//!
//! let schema = Schema::new("Document", [
//!     ("id", i64::descriptor()),
//!     ("metadata", <HashMap<String, String>>::descriptor()),
//! ]);
//! let policy = MarshalingPolicy::new(&schema, &MarshalConfig::default());
//!
//! let mut row = Row::new();
//! row.insert("id".into(), Value::Int(1));
//! row.insert("metadata".into(), Value::map([("lang", Value::from("en"))]));
//!
//! let wire = policy.to_wire_row(&row).unwrap();
//! assert_eq!(wire["metadata"], Value::from(r#"{"lang":"en"}"#));
//!
//! let back = policy.from_wire_row(&wire).unwrap();
//! assert_eq!(back["metadata"], row["metadata"]);
//! ```

mod classify;
mod codec;
mod config;
mod descriptor;
mod diagnostics;
mod error;
mod fingerprint;
mod plan;
mod policy;
mod temporal;
mod value;

pub use classify::{classify, Classification};
pub use codec::{
    Codec, DecimalConverter, LeafConverter, PlainFormConverter, SetConverter, TemporalConverter,
    UuidConverter, MAX_DEPTH,
};
pub use config::MarshalConfig;
pub use descriptor::{
    Described, FieldOverrides, FloatType, IntType, Record, ScalarKind, Schema, TypeAnalysis,
    TypeDescriptor,
};
pub use diagnostics::{CapturingSink, Diagnostic, DiagnosticSink, TracingSink};
pub use error::{
    DeserializationCause, DeserializationError, ProcessingError, SerializationCause,
    SerializationError,
};
pub use fingerprint::{Fingerprint, Fingerprinted};
pub use plan::{
    resolve_plan, DateRepresentation, FieldPlan, MarshalingPlan, PlanCache, PlanIdentity,
    PlanSource,
};
pub use policy::MarshalingPolicy;
pub use temporal::{format_iso, parse_as, parse_iso, TemporalKind};
pub use value::{OpaqueLeaf, PlainForm, Row, SharedList, SharedMap, Value};

#[cfg(feature = "derive")]
pub use siloxane_derive::Record;
