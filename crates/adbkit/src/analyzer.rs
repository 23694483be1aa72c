//! Storage Analyzer.
//!
//! Builds the storage dashboard in three phases:
//!
//! 1. **Stats**: `df` on the user storage mount.
//! 2. **Categories**: media index aggregates for Photos/Videos/Audio, the
//!    package manager and `dumpsys diskstats` for Apps, and remainder
//!    arithmetic for Documents and Other. The dashboard is ready after this.
//! 3. **Large files**: a `find`/`stat` scan of the media folders on a
//!    background thread. It never delays readiness.
//!
//! Every phase publishes into one locked [`Dashboard`]; readers take cloned
//! snapshots or [`subscribe`](StorageAnalyzer::subscribe) to events.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::parser;
use crate::types::{CategoryStats, FileEntry, Measurement, StorageCategory, StorageStats};

/// Mount whose usage the dashboard reports.
pub const USER_STORAGE_MOUNT: &str = "/sdcard";

/// Folders walked by the large-file scan.
pub const LARGE_FILE_ROOTS: &[&str] = &[
    "/sdcard/DCIM",
    "/sdcard/Movies",
    "/sdcard/Download",
    "/sdcard/Pictures",
];

/// Largest files kept by the scan, before the size filter.
pub const LARGE_FILE_LIMIT: usize = 100;

/// Default minimum size of a "large" file.
pub const DEFAULT_LARGE_FILE_MIN_SIZE: u64 = 10 * 1024 * 1024;

/// Cap on the per-category file listing.
pub const CATEGORY_FILE_LIMIT: usize = 2000;

/// Categories measured from the media index.
const MEDIA_CATEGORIES: [StorageCategory; 3] = [
    StorageCategory::Photos,
    StorageCategory::Videos,
    StorageCategory::Audio,
];

/// Share of the unmeasured remainder attributed to Documents.
pub const DOCUMENTS_SHARE: f64 = 0.686;

/// Snapshot of the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dashboard {
    /// Phases 1 and 2 are running
    pub is_analyzing: bool,
    /// Phase 3 is running
    pub is_analyzing_large_files: bool,
    /// Phases 1 and 2 have completed at least once
    pub is_ready: bool,
    /// Partition totals, `None` when `df` gave nothing usable
    pub stats: Option<StorageStats>,
    /// Category breakdown, largest first
    pub categories: Vec<CategoryStats>,
    /// Large files, largest first
    pub large_files: Vec<FileEntry>,
    /// Why the breakdown is incomplete
    pub error_message: Option<String>,
}

impl Dashboard {
    /// Sum of all category sizes, saturating at `u64::MAX`
    pub fn categorized_total(&self) -> u64 {
        self.categories
            .iter()
            .map(|c| c.size)
            .fold(0, u64::saturating_add)
    }

    /// Breakdown entry for `category`
    pub fn category(&self, category: StorageCategory) -> Option<&CategoryStats> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// Progress notifications, sent in phase order.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerEvent {
    /// Phase 1 finished
    StatsReady(Option<StorageStats>),
    /// Phase 2 finished; the dashboard is ready
    DashboardReady(Vec<CategoryStats>),
    /// Phase 3 started
    LargeFilesStarted,
    /// Phase 3 finished with this many files
    LargeFilesReady(usize),
}

struct Shared {
    backend: Arc<dyn Backend>,
    dashboard: Mutex<Dashboard>,
    subscribers: Mutex<Vec<Sender<AnalyzerEvent>>>,
}

impl Shared {
    fn update<F: FnOnce(&mut Dashboard)>(&self, f: F) {
        let mut dashboard = self
            .dashboard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut dashboard);
    }

    fn emit(&self, event: &AnalyzerEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn shell(&self, command: &str) -> String {
        self.backend.execute(&["shell", command])
    }
}

/// Handle to a running large-file scan.
pub struct LargeFileScan {
    handle: JoinHandle<Vec<FileEntry>>,
}

impl LargeFileScan {
    /// Whether the scan thread has finished
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the scan and return what it found.
    pub fn join(self) -> Vec<FileEntry> {
        self.handle.join().unwrap_or_else(|_| {
            warn!("large file scan thread panicked");
            Vec::new()
        })
    }
}

/// Aggregates storage usage of the attached device.
#[derive(Clone)]
pub struct StorageAnalyzer {
    shared: Arc<Shared>,
    large_file_min_size: u64,
}

impl StorageAnalyzer {
    /// Create an analyzer with an empty dashboard.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                dashboard: Mutex::new(Dashboard::default()),
                subscribers: Mutex::new(Vec::new()),
            }),
            large_file_min_size: DEFAULT_LARGE_FILE_MIN_SIZE,
        }
    }

    /// Minimum size used by [`analyze`](Self::analyze).
    #[must_use]
    pub fn with_large_file_min_size(mut self, bytes: u64) -> Self {
        self.large_file_min_size = bytes;
        self
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> Receiver<AnalyzerEvent> {
        let (tx, rx) = mpsc::channel();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Current dashboard
    pub fn snapshot(&self) -> Dashboard {
        self.shared
            .dashboard
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Run all phases. Returns once the dashboard is ready, with the large
    /// file scan still running in the background.
    pub fn analyze(&self) -> LargeFileScan {
        self.analyze_dashboard();
        self.start_large_file_scan(self.large_file_min_size)
    }

    /// Run phases 1 and 2 and return the ready dashboard.
    pub fn analyze_dashboard(&self) -> Dashboard {
        let started = Instant::now();
        self.shared.update(|d| {
            d.is_analyzing = true;
            d.error_message = None;
        });

        let stats = self.storage_stats();
        self.shared.update(|d| d.stats = stats);
        self.shared.emit(&AnalyzerEvent::StatsReady(stats));

        let categories = self.category_breakdown(stats);
        self.shared.update(|d| {
            d.categories = categories.clone();
            if stats.is_none() {
                d.error_message = Some("could not read storage usage".to_string());
            }
            d.is_analyzing = false;
            d.is_ready = true;
        });
        self.shared.emit(&AnalyzerEvent::DashboardReady(categories));

        info!(
            "dashboard ready in {:.1}s",
            started.elapsed().as_secs_f64()
        );
        self.snapshot()
    }

    /// Start phase 3 on a background thread.
    pub fn start_large_file_scan(&self, min_size: u64) -> LargeFileScan {
        self.shared.update(|d| d.is_analyzing_large_files = true);
        self.shared.emit(&AnalyzerEvent::LargeFilesStarted);

        let analyzer = self.clone();
        let handle = std::thread::spawn(move || {
            let started = Instant::now();
            let files = analyzer.find_large_files(min_size);
            let count = files.len();
            analyzer.shared.update(|d| {
                d.large_files = files.clone();
                d.is_analyzing_large_files = false;
            });
            analyzer
                .shared
                .emit(&AnalyzerEvent::LargeFilesReady(count));
            info!(
                "found {count} large files in {:.1}s",
                started.elapsed().as_secs_f64()
            );
            files
        });

        LargeFileScan { handle }
    }

    // =========================================================================
    // Phase 1: stats
    // =========================================================================

    /// Totals of the user storage mount.
    pub fn storage_stats(&self) -> Option<StorageStats> {
        let output = self
            .shared
            .backend
            .execute(&["shell", "df", USER_STORAGE_MOUNT]);
        let usage = parser::parse_df_robust(&output)?;
        Some(StorageStats {
            total: usage.total_bytes,
            used: usage.used_bytes,
            free: usage.available_bytes,
        })
    }

    // =========================================================================
    // Phase 2: categories
    // =========================================================================

    /// Category breakdown for `stats`, largest first.
    ///
    /// Documents get [`DOCUMENTS_SHARE`] of what the media index does not
    /// account for. Other is the final remainder after Apps, so the sizes
    /// add up to `used` as long as Apps fit in the rest of the remainder.
    pub fn category_breakdown(&self, stats: Option<StorageStats>) -> Vec<CategoryStats> {
        let (media, apps) = rayon::join(
            || {
                MEDIA_CATEGORIES
                    .par_iter()
                    .map(|&category| self.measure_media(category))
                    .collect::<Vec<_>>()
            },
            || self.measure_apps(),
        );

        let media_total = media.iter().map(|c| c.size).fold(0, u64::saturating_add);

        let (documents, other) = match stats {
            Some(stats) => {
                let remainder = stats.used.saturating_sub(media_total);
                let documents = (remainder as f64 * DOCUMENTS_SHARE) as u64;
                let accounted = media_total
                    .saturating_add(apps.size)
                    .saturating_add(documents);
                let other = stats.used.saturating_sub(accounted);
                debug!("remainder {remainder}: documents {documents}, other {other}");
                (
                    estimated(StorageCategory::Documents, documents),
                    estimated(StorageCategory::Other, other),
                )
            }
            None => (
                unavailable(StorageCategory::Documents),
                unavailable(StorageCategory::Other),
            ),
        };

        let mut categories = media;
        categories.extend([documents, apps, other]);
        categories.sort_by(|a, b| b.size.cmp(&a.size));
        categories
    }

    fn measure_media(&self, category: StorageCategory) -> CategoryStats {
        let Some(uri) = category.media_uri() else {
            return unavailable(category);
        };

        let (size, count) = rayon::join(
            || {
                self.shared.shell(&format!(
                    "content query --uri {uri} --projection _size | awk -F= '{{sum += $2}} END {{print sum+0}}'"
                ))
            },
            || {
                self.shared
                    .shell(&format!("content query --uri {uri} --projection _id | wc -l"))
            },
        );

        // `wc -l` counts the "No result found." line or a trailing header
        let file_count = parser::parse_scalar(&count).map_or(0, |n| n.saturating_sub(1));

        match parser::parse_scalar(&size) {
            Some(size) => {
                debug!("{category}: {size} bytes in {file_count} files");
                CategoryStats {
                    category,
                    size,
                    file_count,
                    measurement: Measurement::Measured,
                }
            }
            None => {
                warn!("media index query for {category} returned nothing usable");
                CategoryStats {
                    file_count,
                    ..unavailable(category)
                }
            }
        }
    }

    fn measure_apps(&self) -> CategoryStats {
        let (count, dump) = rayon::join(
            || self.shared.shell("pm list packages -3 2>/dev/null | wc -l"),
            || {
                self.shared.shell(
                    "dumpsys diskstats | grep -E '^(App Sizes|App Data Sizes|Cache Sizes):'",
                )
            },
        );

        let file_count = parser::parse_scalar(&count).unwrap_or(0);

        match parser::parse_diskstats_app_total(&dump) {
            Some(size) if size > 0 => CategoryStats {
                category: StorageCategory::Apps,
                size,
                file_count,
                measurement: Measurement::Measured,
            },
            _ => {
                warn!("could not parse app sizes from dumpsys diskstats");
                CategoryStats {
                    file_count,
                    ..unavailable(StorageCategory::Apps)
                }
            }
        }
    }

    // =========================================================================
    // Phase 3: large files
    // =========================================================================

    /// Largest files under [`LARGE_FILE_ROOTS`] of at least `min_size` bytes.
    ///
    /// Blocks for the whole scan. Does not touch the dashboard.
    pub fn find_large_files(&self, min_size: u64) -> Vec<FileEntry> {
        let command = format!(
            "find {} -type f -exec stat -c \"%s %n\" {{}} + 2>/dev/null | sort -rn | head -{LARGE_FILE_LIMIT}",
            LARGE_FILE_ROOTS.join(" ")
        );
        let mut files = parser::parse_size_scan(&self.shared.shell(&command));
        files.sort_by(|a, b| b.size.cmp(&a.size));
        files.truncate(LARGE_FILE_LIMIT);
        files.retain(|f| f.size >= min_size);
        files
    }

    /// Page of the cached large-file list. Empty when `offset` is past the end.
    pub fn get_large_files(&self, offset: usize, limit: usize) -> Vec<FileEntry> {
        let dashboard = self
            .shared
            .dashboard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        dashboard
            .large_files
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    // =========================================================================
    // Category listings
    // =========================================================================

    /// Files of one category, independent of the dashboard.
    ///
    /// Apps lists installed packages by name. Other categories scan
    /// `/sdcard` by extension (skipping `/sdcard/Android`), newest first.
    pub fn files_for_category(&self, category: StorageCategory) -> Vec<FileEntry> {
        if category == StorageCategory::Apps {
            return self.installed_apps();
        }

        let extensions = category.scan_extensions();
        if extensions.is_empty() {
            return Vec::new();
        }

        let patterns = extensions
            .iter()
            .map(|ext| format!("-iname \"*.{ext}\""))
            .collect::<Vec<_>>()
            .join(" -o ");
        let command = format!(
            "find /sdcard/ -path /sdcard/Android -prune -o -type f \\( {patterns} \\) -exec stat -c \"%Y %s %n\" {{}} + 2>/dev/null | sort -rn | head -{CATEGORY_FILE_LIMIT}"
        );

        let mut files = parser::parse_timed_scan(&self.shared.shell(&command));
        files.sort_by(|a, b| b.modified.cmp(&a.modified));
        files.truncate(CATEGORY_FILE_LIMIT);
        debug!("{} files in {category}", files.len());
        files
    }

    /// Installed packages, sorted by name. Paths point at the APK.
    pub fn installed_apps(&self) -> Vec<FileEntry> {
        let output = self
            .shared
            .backend
            .execute(&["shell", "pm", "list", "packages", "-f"]);
        let mut packages = parser::parse_package_paths(&output);
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        packages
            .into_iter()
            .map(|p| FileEntry::new(p.name, p.apk_path, 0, false))
            .collect()
    }
}

fn estimated(category: StorageCategory, size: u64) -> CategoryStats {
    CategoryStats {
        category,
        size,
        file_count: 0,
        measurement: Measurement::Estimated,
    }
}

fn unavailable(category: StorageCategory) -> CategoryStats {
    CategoryStats {
        category,
        size: 0,
        file_count: 0,
        measurement: Measurement::Unavailable,
    }
}
