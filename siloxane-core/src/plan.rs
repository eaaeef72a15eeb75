//! Resolution of a schema and configuration into a marshaling plan.

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::debug;

use crate::classify::{classify, Classification};
use crate::config::MarshalConfig;
use crate::descriptor::{Schema, ScalarKind, TypeDescriptor};
use crate::fingerprint::Fingerprint;
use crate::temporal::TemporalKind;

/// How a date-overridden field is represented on the record side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateRepresentation {
    /// The record declares text; native wire values are formatted as ISO-8601.
    Text,
    /// The record declares a native date/time; wire text is parsed.
    Native(TemporalKind),
    /// The declared type is neither (or unknown); only encode-side parsing applies.
    Unknown,
}

impl DateRepresentation {
    fn of(descriptor: Option<&TypeDescriptor>) -> Self {
        match descriptor.and_then(TypeDescriptor::leaf_kind) {
            Some(ScalarKind::Text) => DateRepresentation::Text,
            Some(kind) => TemporalKind::from_scalar(kind)
                .map(DateRepresentation::Native)
                .unwrap_or(DateRepresentation::Unknown),
            None => DateRepresentation::Unknown,
        }
    }
}

/// Where a field's classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanSource {
    Override,
    Detected,
    Default,
}

/// Resolved handling of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldPlan {
    pub classification: Classification,
    /// Present when the field is date-overridden. Applies regardless of the
    /// classification.
    pub date: Option<DateRepresentation>,
    pub source: PlanSource,
}

/// Identity of a plan: which schema, under which configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanIdentity {
    pub schema: Fingerprint,
    pub config: Fingerprint,
}

/// Immutable per-schema marshaling plan.
///
/// Safe to share read-only across threads.
#[derive(Debug, Clone)]
pub struct MarshalingPlan {
    schema_name: String,
    fields: IndexMap<String, FieldPlan>,
    auto_detect: bool,
    strict: bool,
    identity: PlanIdentity,
}

/// Resolves a plan for a schema under a configuration.
pub fn resolve_plan(schema: &Schema, config: &MarshalConfig) -> MarshalingPlan {
    MarshalingPlan::resolve(schema, config)
}

impl MarshalingPlan {
    /// Resolves a plan for a schema under a configuration.
    ///
    /// Per field, an override wins outright (array over vector over json);
    /// otherwise auto-detection classifies the declared type if enabled;
    /// otherwise the field is plain. A date override is layered on top and
    /// turns an otherwise plain field into a date field. Names that only
    /// appear in override sets are planned too.
    pub fn resolve(schema: &Schema, config: &MarshalConfig) -> Self {
        let mut fields = IndexMap::with_capacity(schema.len());

        for (name, descriptor) in schema.fields() {
            fields.insert(name.clone(), resolve_field(name, Some(descriptor), config));
        }

        let extra: std::collections::BTreeSet<&String> = config
            .json_fields
            .iter()
            .chain(&config.array_fields)
            .chain(&config.vector_fields)
            .chain(&config.date_fields)
            .filter(|name| !fields.contains_key(*name))
            .collect();
        for name in extra {
            debug!(schema = %schema.name(), field = %name, "override names a field missing from the schema");
            fields.insert(name.clone(), resolve_field(name, None, config));
        }

        let plan = MarshalingPlan {
            schema_name: schema.name().to_string(),
            fields,
            auto_detect: config.auto_detect,
            strict: config.strict,
            identity: PlanIdentity {
                schema: Fingerprint::of(schema),
                config: Fingerprint::of(config),
            },
        };

        debug!(
            schema = %plan.schema_name,
            json = plan.fields_classified(Classification::Json).len(),
            array = plan.fields_classified(Classification::Array).len(),
            vector = plan.fields_classified(Classification::Vector).len(),
            date = plan.date_fields().len(),
            "resolved marshaling plan"
        );
        plan
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn identity(&self) -> PlanIdentity {
        self.identity
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn auto_detect(&self) -> bool {
        self.auto_detect
    }

    pub fn fields(&self) -> &IndexMap<String, FieldPlan> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldPlan> {
        self.fields.get(name)
    }

    /// Classification of a field; unplanned fields are plain.
    pub fn classification(&self, name: &str) -> Classification {
        self.fields
            .get(name)
            .map_or(Classification::Plain, |f| f.classification)
    }

    /// Names of the fields with the given classification, in plan order.
    pub fn fields_classified(&self, classification: Classification) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.classification == classification)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of the date-overridden fields, in plan order.
    pub fn date_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.date.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

fn resolve_field(name: &str, descriptor: Option<&TypeDescriptor>, config: &MarshalConfig) -> FieldPlan {
    let (classification, source) = if config.array_fields.contains(name) {
        (Classification::Array, PlanSource::Override)
    } else if config.vector_fields.contains(name) {
        (Classification::Vector, PlanSource::Override)
    } else if config.json_fields.contains(name) {
        (Classification::Json, PlanSource::Override)
    } else if let (true, Some(descriptor)) = (config.auto_detect, descriptor) {
        let detected = match classify(descriptor) {
            Classification::Vector if !config.auto_detect_vector => Classification::Json,
            other => other,
        };
        (detected, PlanSource::Detected)
    } else {
        (Classification::Plain, PlanSource::Default)
    };

    let date = config
        .date_fields
        .contains(name)
        .then(|| DateRepresentation::of(descriptor));

    let classification = match (classification, date) {
        (Classification::Plain, Some(_)) => Classification::Date,
        (c, _) => c,
    };

    if classification != Classification::Plain {
        debug!(field = %name, %classification, ?source, "classified field");
    }

    FieldPlan {
        classification,
        date,
        source,
    }
}

/// Concurrent memoization of resolved plans.
///
/// Keyed by schema and configuration together, so two policies over the same
/// schema with different overrides never share a plan.
#[derive(Debug, Default)]
pub struct PlanCache {
    plans: DashMap<PlanIdentity, Arc<MarshalingPlan>>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached plan for this schema and configuration, resolving
    /// and caching it on first use.
    pub fn get_or_resolve(&self, schema: &Schema, config: &MarshalConfig) -> Arc<MarshalingPlan> {
        let identity = PlanIdentity {
            schema: Fingerprint::of(schema),
            config: Fingerprint::of(config),
        };
        if let Some(plan) = self.plans.get(&identity) {
            return Arc::clone(plan.value());
        }
        let plan = Arc::new(MarshalingPlan::resolve(schema, config));
        Arc::clone(self.plans.entry(identity).or_insert(plan).value())
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn clear(&self) {
        self.plans.clear();
    }
}
