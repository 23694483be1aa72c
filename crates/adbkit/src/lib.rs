//! # adbkit
//!
//! Android device introspection and file management over `adb`.
//!
//! This crate provides functionality for:
//! - Detecting the attached device and reading its properties
//! - Browsing and editing the device filesystem with a path access policy
//! - Building a storage dashboard (totals, category breakdown, large files)
//! - Pulling files into a transient local cache for preview and streaming
//!
//! Everything talks to the device through the [`Backend`] trait, which runs
//! `adb` and returns its text output. Remote failures degrade to empty or
//! zero values; the [`Error`] type only covers local faults and refusals.
//!
//! ## Example
//!
//! ```no_run
//! use adbkit::{Client, StorageCategory};
//!
//! let client = Client::new();
//!
//! let device = client.require_device().expect("no device");
//! println!("{} {} (Android {})", device.manufacturer, device.model, device.os_version);
//!
//! let navigator = client.navigator(false);
//! for entry in navigator.list_directory(None).files {
//!     println!("{:>10}  {}", entry.formatted_size(), entry.name);
//! }
//!
//! let analyzer = client.analyzer();
//! let dashboard = analyzer.analyze_dashboard();
//! for category in &dashboard.categories {
//!     println!("{}: {}", category.category, category.formatted_size());
//! }
//! let photos = analyzer.files_for_category(StorageCategory::Photos);
//! println!("{} photos", photos.len());
//! ```
//!
//! ## Testing
//!
//! ```
//! use std::sync::Arc;
//! use adbkit::{Client, MockBackend};
//!
//! let mock = MockBackend::new();
//! mock.respond("devices", "List of devices attached\n");
//!
//! let client = Client::with_backend(Arc::new(mock));
//! assert!(!client.registry().refresh().is_connected);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analyzer;
pub mod backend;
pub mod device;
pub mod error;
pub mod navigator;
pub mod parser;
pub mod transfer;
pub mod types;

pub use analyzer::{AnalyzerEvent, Dashboard, LargeFileScan, StorageAnalyzer};
pub use backend::{AdbBackend, Backend, MockBackend, Resolution, ToolLocation};
pub use device::DeviceRegistry;
pub use error::{Error, Result};
pub use navigator::{Navigator, NavigatorState, PathPolicy, SortKey};
pub use transfer::{
    CachedFile, CancelToken, CommandViewer, PreviewOutcome, Purpose, StreamReport,
    TransferConfig, TransferManager, Viewer, ViewerExit,
};
pub use types::{
    CategoryStats, DeviceInfo, EntryId, FileEntry, FileKind, Measurement, Outcome,
    StorageCategory, StorageStats,
};

use std::path::Path;
use std::sync::Arc;

/// Entry point that wires the components to one backend.
///
/// The device registry is shared; navigators, analyzers and transfer
/// managers are created on demand and all use the same backend.
pub struct Client {
    backend: Arc<dyn Backend>,
    registry: DeviceRegistry,
}

impl Client {
    /// Create a client that runs the `adb` found on this machine.
    #[must_use]
    pub fn new() -> Self {
        Self::with_location(ToolLocation::resolve(None))
    }

    /// Create a client for an explicit `adb` path, or the default lookup.
    #[must_use]
    pub fn with_adb_path(path: Option<&Path>) -> Self {
        Self::with_location(ToolLocation::resolve(path))
    }

    /// Create a client for an already resolved tool location.
    #[must_use]
    pub fn with_location(location: ToolLocation) -> Self {
        Self::with_backend(Arc::new(AdbBackend::new(location)))
    }

    /// Create a client with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self {
            registry: DeviceRegistry::new(Arc::clone(&backend)),
            backend,
        }
    }

    /// Backend shared by every component
    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    /// Shared device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Refresh the registry and fail unless a device is attached.
    pub fn require_device(&self) -> Result<DeviceInfo> {
        let info = self.registry.refresh();
        if info.is_connected {
            return Ok(info);
        }
        if self.registry.tool_missing() {
            if let Some(location) = self.backend.tool_location() {
                return Err(Error::ToolNotFound(location.path().to_path_buf()));
            }
        }
        Err(Error::Disconnected)
    }

    /// A navigator starting at `/sdcard/`.
    pub fn navigator(&self, allow_system_access: bool) -> Navigator {
        Navigator::new(self.backend(), PathPolicy::new(allow_system_access))
    }

    /// A storage analyzer with an empty dashboard.
    pub fn analyzer(&self) -> StorageAnalyzer {
        StorageAnalyzer::new(self.backend())
    }

    /// A transfer manager with its own busy slot.
    pub fn transfers(&self, config: TransferConfig) -> TransferManager {
        TransferManager::new(self.backend(), config)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}
