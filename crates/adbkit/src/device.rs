//! Device Registry: connection state and cached device properties.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};

use crate::backend::{Backend, SPAWN_ERROR_PREFIX};
use crate::parser;
use crate::types::{DeviceInfo, NOT_AVAILABLE};

/// Property keys read on every refresh.
const PROP_MODEL: &str = "ro.product.model";
const PROP_MANUFACTURER: &str = "ro.product.manufacturer";
const PROP_OS_VERSION: &str = "ro.build.version.release";

/// Mount queried for the device's storage totals.
pub const DATA_MOUNT: &str = "/data";

/// Tracks the attached device. Every refresh replaces the cached record.
pub struct DeviceRegistry {
    backend: Arc<dyn Backend>,
    current: Mutex<DeviceInfo>,
    tool_missing: AtomicBool,
}

impl DeviceRegistry {
    /// Create a registry that starts out disconnected.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            current: Mutex::new(DeviceInfo::disconnected()),
            tool_missing: AtomicBool::new(false),
        }
    }

    /// Probe for a device and, when one is attached, read its properties.
    ///
    /// Without a device the property queries are skipped entirely: adb waits
    /// for a device on `shell` calls, so issuing them would only time out.
    pub fn refresh(&self) -> DeviceInfo {
        let devices = self.backend.execute(&["devices"]);
        self.tool_missing
            .store(devices.starts_with(SPAWN_ERROR_PREFIX), Ordering::Relaxed);

        let info = if parser::has_active_device(&devices) {
            self.read_properties()
        } else {
            debug!("no device in the `device` state");
            DeviceInfo::disconnected()
        };

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = info.clone();
        info
    }

    fn read_properties(&self) -> DeviceInfo {
        let ((model, manufacturer), (os_version, df)) = rayon::join(
            || {
                rayon::join(
                    || self.getprop(PROP_MODEL),
                    || self.getprop(PROP_MANUFACTURER),
                )
            },
            || {
                rayon::join(
                    || self.getprop(PROP_OS_VERSION),
                    || self.backend.execute(&["shell", "df", DATA_MOUNT]),
                )
            },
        );

        let usage = parser::parse_df(&df).or_else(|| parser::parse_df_robust(&df));
        let (total_storage_gb, available_storage_gb) = usage
            .map(|u| (u.total_gb(), u.available_gb()))
            .unwrap_or_default();

        info!("connected to {manufacturer} {model} (Android {os_version})");

        DeviceInfo {
            is_connected: true,
            model,
            manufacturer,
            os_version,
            total_storage_gb,
            available_storage_gb,
        }
    }

    fn getprop(&self, key: &str) -> String {
        let value = self.backend.execute(&["shell", "getprop", key]);
        let value = value.trim();
        if value.is_empty() {
            NOT_AVAILABLE.to_string()
        } else {
            value.to_string()
        }
    }

    /// The record from the last refresh.
    pub fn current(&self) -> DeviceInfo {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the last refresh found a device.
    pub fn is_connected(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_connected
    }

    /// Whether the last probe failed because adb could not be started.
    pub fn tool_missing(&self) -> bool {
        self.tool_missing.load(Ordering::Relaxed)
    }
}
