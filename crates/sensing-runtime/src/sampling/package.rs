//! Sampling packages and their registry.
//!
//! A sampling package bundles the probe factories for a set of measure
//! types together with the permissions they need and the sampling schema
//! presets the power-awareness machine switches between.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::warn;

use super::schema::{SamplingSchema, SamplingSchemaType};
use crate::domain::Measure;
use crate::platform::Permission;
use crate::probe::Probe;

/// A bundle of probe factories for a set of measure types.
pub trait SamplingPackage: Send + Sync {
    /// Package name.
    fn name(&self) -> &str;

    /// Measure types this package can create probes for.
    fn data_types(&self) -> Vec<String>;

    /// Runtime permissions the package's probes require.
    fn permissions(&self) -> Vec<Permission> {
        Vec::new()
    }

    /// Create a probe for a measure type, if this package provides one.
    fn create(&self, measure_type: &str) -> Option<Arc<dyn Probe>>;

    /// Schema disabling every measure type of this package.
    fn none(&self) -> SamplingSchema {
        self.data_types()
            .into_iter()
            .fold(SamplingSchema::empty(SamplingSchemaType::None), |schema, t| {
                schema.with_measure(Measure::new(t).with_enabled(false))
            })
    }

    fn minimum(&self) -> SamplingSchema {
        SamplingSchema::empty(SamplingSchemaType::Minimum)
    }

    fn light(&self) -> SamplingSchema {
        SamplingSchema::empty(SamplingSchemaType::Light)
    }

    /// Schema with no overrides: measures run as the protocol declares them.
    fn normal(&self) -> SamplingSchema {
        SamplingSchema::empty(SamplingSchemaType::Normal)
    }
}

/// Registry of sampling packages with a measure-type index.
#[derive(Default)]
pub struct SamplingPackageRegistry {
    packages: Vec<Arc<dyn SamplingPackage>>,
    by_type: HashMap<String, Arc<dyn SamplingPackage>>,
}

impl SamplingPackageRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package. A later package takes over measure types an
    /// earlier one already provides.
    pub fn register(&mut self, package: Arc<dyn SamplingPackage>) {
        for data_type in package.data_types() {
            if let Some(previous) = self.by_type.insert(data_type.clone(), Arc::clone(&package)) {
                warn!(
                    measure_type = %data_type,
                    previous = %previous.name(),
                    package = %package.name(),
                    "Measure type re-registered by another sampling package"
                );
            }
        }
        self.packages.push(package);
    }

    /// Package providing the given measure type.
    pub fn lookup(&self, measure_type: &str) -> Option<Arc<dyn SamplingPackage>> {
        self.by_type.get(measure_type).cloned()
    }

    /// Create a probe for a measure, if a factory is registered for its type.
    pub fn create(&self, measure: &Measure) -> Option<Arc<dyn Probe>> {
        self.lookup(&measure.measure_type)?
            .create(&measure.measure_type)
    }

    /// All measure types with a registered factory.
    pub fn data_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_type.keys().cloned().collect();
        types.sort();
        types
    }

    /// Union of the permissions required by all packages.
    pub fn permissions(&self) -> HashSet<Permission> {
        self.packages
            .iter()
            .flat_map(|p| p.permissions())
            .collect()
    }

    /// Names of the registered packages, in registration order.
    pub fn package_names(&self) -> Vec<&str> {
        self.packages.iter().map(|p| p.name()).collect()
    }

    pub fn none(&self) -> SamplingSchema {
        self.combine(SamplingSchemaType::None, |p| p.none())
    }

    pub fn minimum(&self) -> SamplingSchema {
        self.combine(SamplingSchemaType::Minimum, |p| p.minimum())
    }

    pub fn light(&self) -> SamplingSchema {
        self.combine(SamplingSchemaType::Light, |p| p.light())
    }

    pub fn normal(&self) -> SamplingSchema {
        self.combine(SamplingSchemaType::Normal, |p| p.normal())
    }

    /// Combined preset of the given kind. `Custom` has no preset and yields
    /// an empty schema.
    pub fn preset(&self, schema_type: SamplingSchemaType) -> SamplingSchema {
        match schema_type {
            SamplingSchemaType::None => self.none(),
            SamplingSchemaType::Minimum => self.minimum(),
            SamplingSchemaType::Light => self.light(),
            SamplingSchemaType::Normal => self.normal(),
            SamplingSchemaType::Custom => SamplingSchema::empty(SamplingSchemaType::Custom),
        }
    }

    fn combine<F>(&self, schema_type: SamplingSchemaType, f: F) -> SamplingSchema
    where
        F: Fn(&dyn SamplingPackage) -> SamplingSchema,
    {
        self.packages.iter().fold(
            SamplingSchema::empty(schema_type).with_power_aware(true),
            |mut schema, package| {
                schema.merge(f(package.as_ref()));
                schema
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingPackage;

    #[test]
    fn test_lookup_by_measure_type() {
        let mut registry = SamplingPackageRegistry::new();
        registry.register(Arc::new(RecordingPackage::new("device", &["battery", "memory"])));

        assert!(registry.lookup("battery").is_some());
        assert!(registry.lookup("gps").is_none());
        assert!(registry.create(&Measure::new("memory")).is_some());
        assert!(registry.create(&Measure::new("gps")).is_none());
        assert_eq!(registry.data_types(), vec!["battery", "memory"]);
    }

    #[test]
    fn test_later_package_takes_over_type() {
        let mut registry = SamplingPackageRegistry::new();
        registry.register(Arc::new(RecordingPackage::new("first", &["battery"])));
        registry.register(Arc::new(RecordingPackage::new("second", &["battery"])));

        assert_eq!(registry.lookup("battery").unwrap().name(), "second");
        assert_eq!(registry.package_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_none_preset_disables_every_type() {
        let mut registry = SamplingPackageRegistry::new();
        registry.register(Arc::new(RecordingPackage::new("a", &["battery"])));
        registry.register(Arc::new(RecordingPackage::new("b", &["gps", "memory"])));

        let none = registry.none();
        assert_eq!(none.schema_type, SamplingSchemaType::None);
        assert_eq!(none.measures.len(), 3);
        assert!(none.measures.values().all(|m| !m.enabled));
        assert!(registry.normal().measures.is_empty());
    }

    #[test]
    fn test_permissions_union() {
        let mut registry = SamplingPackageRegistry::new();
        registry.register(Arc::new(
            RecordingPackage::new("a", &["gps"]).with_permissions(&[Permission::Location]),
        ));
        registry.register(Arc::new(
            RecordingPackage::new("b", &["audio"])
                .with_permissions(&[Permission::Microphone, Permission::Location]),
        ));

        let permissions = registry.permissions();
        assert_eq!(permissions.len(), 2);
        assert!(permissions.contains(&Permission::Microphone));
    }
}
