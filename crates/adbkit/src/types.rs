use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Marker used for every string field of a disconnected device.
pub const NOT_AVAILABLE: &str = "N/A";

/// Name of the synthetic entry that points at the parent directory.
pub const PARENT_MARKER: &str = "..";

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

// ============================================================================
// Device
// ============================================================================

/// Snapshot of the attached device, rebuilt wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Whether a device answered in the `device` state
    pub is_connected: bool,
    /// `ro.product.model`
    pub model: String,
    /// `ro.product.manufacturer`
    pub manufacturer: String,
    /// `ro.build.version.release`
    pub os_version: String,
    /// Size of the data partition in GB
    pub total_storage_gb: f64,
    /// Free space on the data partition in GB
    pub available_storage_gb: f64,
}

impl DeviceInfo {
    /// The sentinel returned when no device is attached.
    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
            model: NOT_AVAILABLE.to_string(),
            manufacturer: NOT_AVAILABLE.to_string(),
            os_version: NOT_AVAILABLE.to_string(),
            total_storage_gb: 0.0,
            available_storage_gb: 0.0,
        }
    }

    /// Used space in GB
    pub fn used_storage_gb(&self) -> f64 {
        (self.total_storage_gb - self.available_storage_gb).max(0.0)
    }

    /// Used space as a percentage of the total, 0 when the total is unknown
    pub fn storage_used_percentage(&self) -> f64 {
        if self.total_storage_gb <= 0.0 {
            0.0
        } else {
            self.used_storage_gb() / self.total_storage_gb * 100.0
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::disconnected()
    }
}

// ============================================================================
// File entries
// ============================================================================

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Synthetic identity of a [`FileEntry`].
///
/// Two entries fetched for the same path are still different records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        Self(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Display classification of an entry, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    /// Directory (including the parent marker)
    Folder,
    /// Still image
    Image,
    /// Video clip
    Video,
    /// Audio track
    Audio,
    /// Office or text document
    Document,
    /// Android package
    Apk,
    /// Compressed archive
    Archive,
    /// Anything else
    Other,
}

impl FileKind {
    /// Classify a file name. Directories are handled by [`FileEntry::kind`].
    pub fn from_name(name: &str) -> Self {
        match extension(name).as_deref() {
            Some("jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "heic") => Self::Image,
            Some("mp4" | "avi" | "mkv" | "mov" | "wmv" | "flv" | "webm") => Self::Video,
            Some("mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a") => Self::Audio,
            Some("pdf" | "doc" | "docx" | "txt" | "rtf" | "odt") => Self::Document,
            Some("apk") => Self::Apk,
            Some("zip" | "rar" | "7z" | "tar" | "gz" | "bz2") => Self::Archive,
            _ => Self::Other,
        }
    }

    /// Short label for listings
    pub fn label(&self) -> &'static str {
        match self {
            Self::Folder => "dir",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "doc",
            Self::Apk => "apk",
            Self::Archive => "archive",
            Self::Other => "file",
        }
    }

    /// Whether the kind is something an external player can stream
    pub fn is_streamable(&self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }
}

/// A file or directory on the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Synthetic identity, unique per fetched record
    pub id: EntryId,
    /// Base name
    pub name: String,
    /// Absolute remote path
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Permission string as printed by `ls` (may be empty for scan results)
    pub permissions: String,
    /// Modification time, device wall clock
    pub modified: Option<NaiveDateTime>,
    /// Owning user
    pub owner: Option<String>,
}

impl FileEntry {
    /// Create a new entry with a fresh id
    pub fn new(name: impl Into<String>, path: impl Into<String>, size: u64, is_dir: bool) -> Self {
        Self {
            id: EntryId::next(),
            name: name.into(),
            path: path.into(),
            size,
            is_dir,
            permissions: String::new(),
            modified: None,
            owner: None,
        }
    }

    /// Set the permission string
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }

    /// Set the modification time
    pub fn with_modified(mut self, modified: Option<NaiveDateTime>) -> Self {
        self.modified = modified;
        self
    }

    /// Set the owner
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// The synthetic `..` entry for `path`. Carries no time or owner.
    pub fn parent_marker(path: &str) -> Self {
        Self::new(PARENT_MARKER, parent_path(path), 0, true).with_permissions("drwxr-xr-x")
    }

    /// Whether this is the synthetic parent entry
    pub fn is_parent_marker(&self) -> bool {
        self.name == PARENT_MARKER
    }

    /// Display classification
    pub fn kind(&self) -> FileKind {
        if self.is_dir {
            FileKind::Folder
        } else {
            FileKind::from_name(&self.name)
        }
    }

    /// Storage category of the file, `None` for directories
    pub fn category(&self) -> Option<StorageCategory> {
        if self.is_dir {
            None
        } else {
            Some(StorageCategory::from_file_name(&self.name))
        }
    }

    /// Human-readable size, `--` for directories
    pub fn formatted_size(&self) -> String {
        if self.is_dir {
            return "--".to_string();
        }
        let bytes = self.size as f64;
        if self.size < KB {
            format!("{} B", self.size)
        } else if self.size < MB {
            format!("{:.1} KB", bytes / KB as f64)
        } else if self.size < GB {
            format!("{:.1} MB", bytes / MB as f64)
        } else {
            format!("{:.2} GB", bytes / GB as f64)
        }
    }

    /// Human-readable modification time, `--` when unknown
    pub fn formatted_date(&self) -> String {
        self.modified
            .map(|d| d.format("%b %-d, %Y %H:%M").to_string())
            .unwrap_or_else(|| "--".to_string())
    }
}

impl PartialEq for FileEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FileEntry {}

impl Hash for FileEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Strip the last segment of a remote path.
///
/// `/sdcard/DCIM/` and `/sdcard/DCIM` both yield `/sdcard`; the root stays `/`.
/// A relative single segment yields an empty string.
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') {
            "/".to_string()
        } else {
            String::new()
        };
    }
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => String::new(),
    }
}

/// Join a directory and a child name with exactly one separator.
pub fn join_path(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

/// Last segment of a remote path.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

// ============================================================================
// Storage
// ============================================================================

/// Byte totals for the primary user-data partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageStats {
    /// Partition size in bytes
    pub total: u64,
    /// Used bytes
    pub used: u64,
    /// Free bytes
    pub free: u64,
}

impl StorageStats {
    /// Used share in percent, 0 when the total is 0
    pub fn usage_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64 * 100.0
        }
    }

    /// Total in GB with one decimal
    pub fn formatted_total(&self) -> String {
        format_gb(self.total)
    }

    /// Used in GB with one decimal
    pub fn formatted_used(&self) -> String {
        format_gb(self.used)
    }

    /// Free in GB with one decimal
    pub fn formatted_free(&self) -> String {
        format_gb(self.free)
    }
}

fn format_gb(bytes: u64) -> String {
    format!("{:.1} GB", bytes as f64 / GB as f64)
}

/// Content categories of the storage breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageCategory {
    /// Images in the media index
    Photos,
    /// Videos in the media index
    Videos,
    /// Audio in the media index
    Audio,
    /// Documents (estimated)
    Documents,
    /// Installed applications
    Apps,
    /// Everything not accounted for elsewhere (estimated)
    Other,
}

impl StorageCategory {
    /// All categories in display order
    pub const ALL: [StorageCategory; 6] = [
        Self::Photos,
        Self::Videos,
        Self::Audio,
        Self::Documents,
        Self::Apps,
        Self::Other,
    ];

    /// Display name
    pub fn label(&self) -> &'static str {
        match self {
            Self::Photos => "Photos",
            Self::Videos => "Videos",
            Self::Audio => "Audio",
            Self::Documents => "Documents",
            Self::Apps => "Apps",
            Self::Other => "Other",
        }
    }

    /// Media index URI for categories measured from the index
    pub fn media_uri(&self) -> Option<&'static str> {
        match self {
            Self::Photos => Some("content://media/external/images/media"),
            Self::Videos => Some("content://media/external/video/media"),
            Self::Audio => Some("content://media/external/audio/media"),
            _ => None,
        }
    }

    /// Extensions matched by the per-category file scan
    pub fn scan_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Photos => &["jpg", "jpeg", "png", "heic", "webp", "dng"],
            Self::Videos => &["mp4", "mkv", "avi", "mov", "3gp", "webm"],
            Self::Audio => &["mp3", "wav", "aac", "m4a", "flac", "ogg"],
            Self::Documents => &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt"],
            Self::Apps | Self::Other => &[],
        }
    }

    /// Classify a file name for storage accounting.
    pub fn from_file_name(name: &str) -> Self {
        match extension(name).as_deref() {
            Some("jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "heic" | "raw") => Self::Photos,
            Some("mp4" | "avi" | "mkv" | "mov" | "wmv" | "flv" | "webm" | "3gp") => Self::Videos,
            Some("mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "wma") => Self::Audio,
            Some(
                "pdf" | "doc" | "docx" | "txt" | "rtf" | "odt" | "xls" | "xlsx" | "ppt" | "pptx",
            ) => Self::Documents,
            Some("apk") => Self::Apps,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a category figure was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Measurement {
    /// Read from the device (media index, diagnostic dump)
    Measured,
    /// Derived from remainder arithmetic
    Estimated,
    /// The query returned nothing usable; the size is reported as zero
    Unavailable,
}

/// Size and item count of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Which category
    pub category: StorageCategory,
    /// Aggregate size in bytes
    pub size: u64,
    /// Number of items (files, or packages for Apps)
    pub file_count: u64,
    /// Where the size comes from
    pub measurement: Measurement,
}

impl CategoryStats {
    /// GB with one decimal from 1 GB upwards, whole MB below
    pub fn formatted_size(&self) -> String {
        let gb = self.size as f64 / GB as f64;
        if gb >= 1.0 {
            format!("{gb:.1} GB")
        } else {
            format!("{:.0} MB", self.size as f64 / MB as f64)
        }
    }

    /// Share of `used` bytes in percent, 0 when `used` is 0
    pub fn share_of(&self, used: u64) -> f64 {
        if used == 0 {
            0.0
        } else {
            self.size as f64 / used as f64 * 100.0
        }
    }

    /// Whether the size was read from the device
    pub fn is_measured(&self) -> bool {
        self.measurement == Measurement::Measured
    }
}

// ============================================================================
// Operation outcomes
// ============================================================================

/// Result of an operation whose success can only be inferred from text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The output confirmed success
    Success,
    /// The output contained a failure marker; carries the offending line
    Failure(String),
    /// Nothing in the output confirms or denies success
    Unknown,
}

impl Outcome {
    /// Confirmed success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Confirmed failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure(reason) => write!(f, "failed: {reason}"),
            Self::Unknown => f.write_str("unverified"),
        }
    }
}
