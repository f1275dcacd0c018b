//! Datum transformer schemas.
//!
//! A transformer schema maps data types to payload transformers. The
//! controller runs every data point through three stages: a privacy schema,
//! a data format schema and a caller-supplied transformer.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::Datum;

/// Name of the built-in CARP schema (identity).
pub const CARP_SCHEMA: &str = "carp";

/// Name of the built-in privacy schema.
pub const PRIVACY_SCHEMA: &str = "privacy";

/// A payload transformer.
pub type DatumTransformer = Arc<dyn Fn(Datum) -> Datum + Send + Sync>;

/// The identity transformer.
pub fn identity() -> DatumTransformer {
    Arc::new(|datum: Datum| datum)
}

/// A namespace of per-data-type transformers.
#[derive(Clone)]
pub struct TransformerSchema {
    namespace: String,
    transformers: HashMap<String, DatumTransformer>,
}

impl TransformerSchema {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            transformers: HashMap::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Register a transformer for a data type.
    pub fn add(&mut self, data_type: impl Into<String>, transformer: DatumTransformer) {
        self.transformers.insert(data_type.into(), transformer);
    }

    pub fn with(mut self, data_type: impl Into<String>, transformer: DatumTransformer) -> Self {
        self.add(data_type, transformer);
        self
    }

    /// Transform a datum. Data types without a transformer pass unchanged.
    pub fn transform(&self, datum: Datum) -> Datum {
        match self.transformers.get(datum.data_type()) {
            Some(transformer) => transformer(datum),
            None => datum,
        }
    }

    /// Data types this schema transforms.
    pub fn data_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.transformers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for TransformerSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerSchema")
            .field("namespace", &self.namespace)
            .field("data_types", &self.data_types())
            .finish()
    }
}

/// SHA-256 hex digest of a string.
pub fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Transformer replacing the named string fields with their SHA-256 hash.
pub fn anonymize_fields(fields: &[&str]) -> DatumTransformer {
    let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
    Arc::new(move |mut datum: Datum| {
        for field in &fields {
            if let Some(Value::String(text)) = datum.data.get(field) {
                let hashed = hash_text(text);
                datum.data.insert(field.clone(), Value::String(hashed));
            }
        }
        datum
    })
}

/// The built-in privacy schema: identifying text fields are hashed.
pub fn privacy_schema() -> TransformerSchema {
    TransformerSchema::new(PRIVACY_SCHEMA)
        .with("text_message", anonymize_fields(&["address", "body"]))
        .with("phone_log", anonymize_fields(&["number", "formatted_number", "name"]))
        .with("contacts", anonymize_fields(&["name", "phone_number", "email"]))
        .with("calendar", anonymize_fields(&["title", "description", "location"]))
}

/// Registry of transformer schemas keyed by name.
#[derive(Debug, Default)]
pub struct TransformerSchemaRegistry {
    schemas: HashMap<String, Arc<TransformerSchema>>,
}

impl TransformerSchemaRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `carp` and `privacy` schemas.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TransformerSchema::new(CARP_SCHEMA));
        registry.register(privacy_schema());
        registry
    }

    /// Register a schema under its namespace, replacing any previous one.
    pub fn register(&mut self, schema: TransformerSchema) {
        self.schemas
            .insert(schema.namespace().to_ascii_lowercase(), Arc::new(schema));
    }

    /// Look up a schema by name (case insensitive).
    pub fn lookup(&self, name: &str) -> Option<Arc<TransformerSchema>> {
        self.schemas.get(&name.to_ascii_lowercase()).cloned()
    }

    /// All registered schema names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
