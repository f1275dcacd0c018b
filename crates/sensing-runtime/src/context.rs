//! Collaborators shared by every controller in a process.

use std::sync::Arc;

use crate::data_manager::{DataManager, DataManagerRegistry};
use crate::platform::{
    DeviceInfoResolver, GrantAllPermissions, PermissionResolver, SystemDeviceInfo,
};
use crate::sampling::{SamplingPackage, SamplingPackageRegistry};
use crate::transform::{TransformerSchema, TransformerSchemaRegistry};

/// Registries and platform resolvers a controller runs against.
#[derive(Clone)]
pub struct SensingContext {
    pub packages: Arc<SamplingPackageRegistry>,
    pub data_managers: Arc<DataManagerRegistry>,
    pub transformers: Arc<TransformerSchemaRegistry>,
    pub device_info: Arc<dyn DeviceInfoResolver>,
    pub permissions: Arc<dyn PermissionResolver>,
}

impl SensingContext {
    pub fn builder() -> SensingContextBuilder {
        SensingContextBuilder::default()
    }
}

impl Default for SensingContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`SensingContext`].
///
/// Starts from the console data manager, the built-in transformer schemas,
/// the host device info and a resolver granting every permission.
pub struct SensingContextBuilder {
    packages: SamplingPackageRegistry,
    data_managers: DataManagerRegistry,
    transformers: TransformerSchemaRegistry,
    device_info: Arc<dyn DeviceInfoResolver>,
    permissions: Arc<dyn PermissionResolver>,
}

impl Default for SensingContextBuilder {
    fn default() -> Self {
        Self {
            packages: SamplingPackageRegistry::new(),
            data_managers: DataManagerRegistry::with_defaults(),
            transformers: TransformerSchemaRegistry::with_defaults(),
            device_info: Arc::new(SystemDeviceInfo::new()),
            permissions: Arc::new(GrantAllPermissions),
        }
    }
}

impl SensingContextBuilder {
    pub fn package(mut self, package: Arc<dyn SamplingPackage>) -> Self {
        self.packages.register(package);
        self
    }

    pub fn data_manager(mut self, manager: Arc<dyn DataManager>) -> Self {
        self.data_managers.register(manager);
        self
    }

    /// Replace the data manager registry, dropping the console default.
    pub fn data_managers(mut self, registry: DataManagerRegistry) -> Self {
        self.data_managers = registry;
        self
    }

    pub fn transformer_schema(mut self, schema: TransformerSchema) -> Self {
        self.transformers.register(schema);
        self
    }

    pub fn device_info(mut self, resolver: Arc<dyn DeviceInfoResolver>) -> Self {
        self.device_info = resolver;
        self
    }

    pub fn permissions(mut self, resolver: Arc<dyn PermissionResolver>) -> Self {
        self.permissions = resolver;
        self
    }

    pub fn build(self) -> SensingContext {
        SensingContext {
            packages: Arc::new(self.packages),
            data_managers: Arc::new(self.data_managers),
            transformers: Arc::new(self.transformers),
            device_info: self.device_info,
            permissions: self.permissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingDataManager, RecordingPackage};

    #[test]
    fn test_defaults() {
        let context = SensingContext::default();
        assert!(context.data_managers.lookup("PRINT").is_some());
        assert!(context.transformers.lookup("privacy").is_some());
        assert!(context.packages.data_types().is_empty());
    }

    #[test]
    fn test_builder_registers_collaborators() {
        let context = SensingContext::builder()
            .package(Arc::new(RecordingPackage::new("device", &["battery"])))
            .data_managers(DataManagerRegistry::new())
            .data_manager(Arc::new(RecordingDataManager::new("MEMORY")))
            .transformer_schema(TransformerSchema::new("omh"))
            .build();

        assert_eq!(context.packages.data_types(), vec!["battery"]);
        assert!(context.data_managers.lookup("PRINT").is_none());
        assert!(context.data_managers.lookup("memory").is_some());
        assert!(context.transformers.lookup("omh").is_some());
    }
}
