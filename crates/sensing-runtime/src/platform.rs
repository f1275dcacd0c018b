//! Device identity and runtime permission collaborators.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Platform and device identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub platform: String,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
}

/// Resolves platform and device identity.
#[async_trait]
pub trait DeviceInfoResolver: Send + Sync {
    /// Prepare the resolver. Called once before `device_info`.
    async fn init(&self) -> Result<()>;

    async fn device_info(&self) -> Result<DeviceInfo>;
}

/// Resolves device identity from the host system via `sysinfo`.
///
/// The device id is generated once per resolver unless given explicitly.
pub struct SystemDeviceInfo {
    device_id: String,
    info: Mutex<Option<DeviceInfo>>,
}

impl SystemDeviceInfo {
    pub fn new() -> Self {
        Self::with_device_id(Uuid::new_v4().to_string())
    }

    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            info: Mutex::new(None),
        }
    }
}

impl Default for SystemDeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceInfoResolver for SystemDeviceInfo {
    async fn init(&self) -> Result<()> {
        let info = DeviceInfo {
            platform: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            device_id: self.device_id.clone(),
            hardware: System::host_name(),
            os_version: System::os_version(),
        };
        debug!(platform = %info.platform, device_id = %info.device_id, "Resolved device info");
        *self.info.lock() = Some(info);
        Ok(())
    }

    async fn device_info(&self) -> Result<DeviceInfo> {
        self.info
            .lock()
            .clone()
            .ok_or_else(|| Error::precondition("device info resolver used before init"))
    }
}

/// Runtime permission kinds a sampling package may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Location,
    LocationAlways,
    Sensors,
    ActivityRecognition,
    Microphone,
    Camera,
    Phone,
    Sms,
    Calendar,
    Contacts,
    Storage,
    Notification,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::LocationAlways => "location_always",
            Self::Sensors => "sensors",
            Self::ActivityRecognition => "activity_recognition",
            Self::Microphone => "microphone",
            Self::Camera => "camera",
            Self::Phone => "phone",
            Self::Sms => "sms",
            Self::Calendar => "calendar",
            Self::Contacts => "contacts",
            Self::Storage => "storage",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Limited,
    Denied,
    Restricted,
    PermanentlyDenied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted | Self::Limited)
    }
}

/// Requests runtime permissions from the platform.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn request_permissions(
        &self,
        permissions: &HashSet<Permission>,
    ) -> HashMap<Permission, PermissionStatus>;
}

/// Grants every requested permission. Used on hosts without a permission
/// model.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantAllPermissions;

#[async_trait]
impl PermissionResolver for GrantAllPermissions {
    async fn request_permissions(
        &self,
        permissions: &HashSet<Permission>,
    ) -> HashMap<Permission, PermissionStatus> {
        permissions
            .iter()
            .map(|p| (*p, PermissionStatus::Granted))
            .collect()
    }
}
