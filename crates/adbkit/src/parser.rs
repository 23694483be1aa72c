//! Parsers for adb's line-oriented text output.
//!
//! Every grammar here is whitespace-delimited with a free-form trailing field
//! (file names and paths may contain spaces). Parsing never fails as a whole:
//! short lines are dropped, unparsable numbers become zero and unparsable
//! dates become `None`.

use std::cmp::Ordering;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{FileEntry, Outcome, file_name, join_path};

/// Date format printed by toybox `ls -la`.
pub const LISTING_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Lowercase substrings that mark an output as a failure.
const FAILURE_MARKERS: &[&str] = &[
    "error",
    "failed",
    "no such file",
    "permission denied",
    "read-only file system",
    "not a directory",
    "is a directory",
    "operation not permitted",
    "cannot",
];

static DISKSTATS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:App Sizes|App Data Sizes|Cache Sizes):\s*\[(.*)\]").expect("valid regex")
});

// ============================================================================
// Long-format directory listing
// ============================================================================

/// Parse `ls -la <base_path>` output into entries.
///
/// Format: `perms links owner group size date time name...`
///
/// `.` and `..` are dropped (the caller injects its own parent marker) and
/// the result is in listing order, see [`sort_listing`].
pub fn parse_long_listing(output: &str, base_path: &str) -> Vec<FileEntry> {
    let mut entries: Vec<FileEntry> = output
        .lines()
        .filter_map(|line| parse_listing_line(line, base_path))
        .collect();
    sort_listing(&mut entries);
    entries
}

fn parse_listing_line(line: &str, base_path: &str) -> Option<FileEntry> {
    if line.trim().is_empty() || line.starts_with("total") {
        return None;
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 8 {
        return None;
    }

    let permissions = fields[0];
    let owner = fields[2];
    let size = fields[4].parse::<u64>().unwrap_or(0);
    let modified = parse_listing_date(fields[5], fields[6]);

    let mut name = fields[7..].join(" ");
    if permissions.starts_with('l') {
        // Symlinks print as `name -> target`
        if let Some((link, _target)) = name.split_once(" -> ") {
            name = link.to_string();
        }
    }

    if name == "." || name == ".." {
        return None;
    }

    let is_dir = permissions.starts_with('d');
    let path = join_path(base_path, &name);

    Some(
        FileEntry::new(name, path, size, is_dir)
            .with_permissions(permissions)
            .with_modified(modified)
            .with_owner(owner),
    )
}

/// Parse the `date time` pair of a listing line.
pub fn parse_listing_date(date: &str, time: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), LISTING_DATE_FORMAT).ok()
}

/// Sort entries the way listings are presented: parent marker, then
/// directories, then files, each group by case-insensitive name.
pub fn sort_listing(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| {
        parent_first(a, b)
            .then_with(|| b.is_dir.cmp(&a.is_dir))
            .then_with(|| compare_names(&a.name, &b.name))
    });
}

/// Orders the parent marker before everything else, otherwise `Equal`.
pub fn parent_first(a: &FileEntry, b: &FileEntry) -> Ordering {
    b.is_parent_marker().cmp(&a.is_parent_marker())
}

/// Case-insensitive comparison with a case-sensitive tie-break.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

// ============================================================================
// Disk usage
// ============================================================================

/// One data row of `df` output, converted to bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// Filesystem column
    pub filesystem: String,
    /// Size in bytes
    pub total_bytes: u64,
    /// Used bytes
    pub used_bytes: u64,
    /// Available bytes
    pub available_bytes: u64,
    /// `Use%` column without the percent sign
    pub use_percent: Option<u8>,
    /// Mount point, when printed
    pub mount_point: Option<String>,
}

impl DiskUsage {
    /// Total size in GB
    pub fn total_gb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Available space in GB
    pub fn available_gb(&self) -> f64 {
        self.available_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }
}

/// Parse `df` output taking the second line as the data row.
pub fn parse_df(output: &str) -> Option<DiskUsage> {
    output.lines().nth(1).and_then(parse_df_row)
}

/// Parse `df` output taking the first line that names a device or storage
/// mount as the data row. Tolerates banners and blank lines.
pub fn parse_df_robust(output: &str) -> Option<DiskUsage> {
    output
        .lines()
        .find(|line| line.contains("/dev/") || line.contains("/storage") || line.contains("/data"))
        .and_then(parse_df_row)
}

fn parse_df_row(line: &str) -> Option<DiskUsage> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }

    let blocks = |s: &str| s.parse::<u64>().unwrap_or(0).saturating_mul(1024);

    Some(DiskUsage {
        filesystem: fields[0].to_string(),
        total_bytes: blocks(fields[1]),
        used_bytes: blocks(fields[2]),
        available_bytes: blocks(fields[3]),
        use_percent: fields
            .get(4)
            .and_then(|p| p.trim_end_matches('%').parse().ok()),
        mount_point: (fields.len() > 5).then(|| fields[5..].join(" ")),
    })
}

// ============================================================================
// stat-based scans
// ============================================================================

/// Parse `stat -c "%s %n"` lines into file entries.
pub fn parse_size_scan(output: &str) -> Vec<FileEntry> {
    output
        .lines()
        .filter_map(|line| {
            let (size, path) = split_field(line)?;
            Some(scan_entry(path, size.parse().unwrap_or(0), None))
        })
        .collect()
}

/// Parse `stat -c "%Y %s %n"` lines into file entries with modification times.
pub fn parse_timed_scan(output: &str) -> Vec<FileEntry> {
    output
        .lines()
        .filter_map(|line| {
            let (mtime, rest) = split_field(line)?;
            let (size, path) = split_field(rest)?;
            let modified = mtime
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(|dt| dt.naive_utc());
            Some(scan_entry(path, size.parse().unwrap_or(0), modified))
        })
        .collect()
}

fn scan_entry(path: &str, size: u64, modified: Option<NaiveDateTime>) -> FileEntry {
    FileEntry::new(file_name(path), path, size, false).with_modified(modified)
}

/// Split off the first whitespace-delimited field, keeping the rest verbatim.
fn split_field(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let (head, rest) = line.split_once(char::is_whitespace)?;
    let rest = rest.trim_start().trim_end_matches(['\r', '\n']);
    if head.is_empty() || rest.is_empty() {
        return None;
    }
    Some((head, rest))
}

// ============================================================================
// Packages
// ============================================================================

/// An installed package from `pm list packages -f`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    /// Package name, e.g. `com.example.foo`
    pub name: String,
    /// Path to the installed APK
    pub apk_path: String,
}

/// Parse `package:<path>=<name>` lines.
///
/// APK paths on recent releases contain `==`, so the name is whatever
/// follows the last `=`.
pub fn parse_package_paths(output: &str) -> Vec<PackageEntry> {
    output
        .lines()
        .filter_map(|line| {
            let raw = line.trim().strip_prefix("package:")?;
            let (path, name) = raw.rsplit_once('=')?;
            if path.is_empty() || name.is_empty() {
                return None;
            }
            Some(PackageEntry {
                name: name.to_string(),
                apk_path: path.to_string(),
            })
        })
        .collect()
}

// ============================================================================
// Scalars, device list, diagnostic dumps
// ============================================================================

/// Parse a single number printed by `wc -l` or an awk aggregate.
///
/// Accepts awk's exponent form for large sums.
pub fn parse_scalar(output: &str) -> Option<u64> {
    let text = output.trim();
    if let Ok(value) = text.parse::<u64>() {
        return Some(value);
    }
    let value = text.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value as u64)
}

/// Whether `adb devices` lists at least one device in the `device` state.
pub fn has_active_device(output: &str) -> bool {
    output.lines().any(|line| {
        line.split_once('\t')
            .and_then(|(_, state)| state.split_whitespace().next())
            == Some("device")
    })
}

/// Sum the `App Sizes`, `App Data Sizes` and `Cache Sizes` arrays of
/// `dumpsys diskstats`. `None` when no array was found.
pub fn parse_diskstats_app_total(output: &str) -> Option<u64> {
    let mut found = false;
    let mut total: u64 = 0;

    for line in output.lines() {
        if let Some(caps) = DISKSTATS_LINE.captures(line.trim()) {
            found = true;
            total = caps[1]
                .split(',')
                .filter_map(|v| v.trim().parse::<u64>().ok())
                .fold(total, u64::saturating_add);
        }
    }

    found.then_some(total)
}

// ============================================================================
// Success heuristics
// ============================================================================

/// Classify the output of a mutating shell command (`mkdir`, `rm`, `mv`, `cp`).
///
/// These commands are silent on success, so empty output counts as success.
/// Output with a failure marker is a failure; anything else is unknown.
pub fn shell_outcome(output: &str) -> Outcome {
    if let Some(line) = failure_line(output) {
        return Outcome::Failure(line);
    }
    if output.trim().is_empty() {
        Outcome::Success
    } else {
        Outcome::Unknown
    }
}

/// Classify the output of `adb pull`/`adb push`.
///
/// `marker` is `pulled` or `pushed`; adb prints e.g. `1 file pulled, 0 skipped`.
pub fn transfer_outcome(output: &str, marker: &str) -> Outcome {
    if let Some(line) = failure_line(output) {
        return Outcome::Failure(line);
    }
    if output.contains(marker) {
        Outcome::Success
    } else {
        Outcome::Unknown
    }
}

fn failure_line(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| {
            let lower = line.to_lowercase();
            FAILURE_MARKERS.iter().any(|m| lower.contains(m))
        })
        .map(|line| line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PARENT_MARKER;

    const LISTING: &str = "\
total 48
drwxrwx--x  6 root sdcard_rw 4096 2024-01-15 09:00 .
drwx--x--x  4 root sdcard_rw 4096 2024-01-10 08:00 ..
-rw-rw----  1 root sdcard_rw 1234567 2024-01-15 10:30 photo.jpg
drwxrwx---  2 root sdcard_rw 4096 2024-01-15 09:00 DCIM
-rw-rw----  1 u0_a12 sdcard_rw 52 2024-02-01 12:00 My Notes.txt
drwxrwx---  2 root sdcard_rw 4096 2024-01-15 09:00 android
-rw-rw----  1 root sdcard_rw oops 2024-13-45 99:99 broken.bin
lrwxrwxrwx  1 root root 21 2024-01-15 10:30 sdcard -> /storage/self/primary
short line here
";

    #[test]
    fn test_parse_listing_scenario() {
        let entries = parse_long_listing(
            "-rw-rw---- 1 root sdcard_rw 1234567 2024-01-15 10:30 photo.jpg",
            "/sdcard/",
        );
        assert_eq!(entries.len(), 1);
        let photo = &entries[0];
        assert_eq!(photo.name, "photo.jpg");
        assert_eq!(photo.path, "/sdcard/photo.jpg");
        assert_eq!(photo.size, 1234567);
        assert!(!photo.is_dir);
        assert_eq!(photo.owner.as_deref(), Some("root"));
        assert_eq!(
            photo.modified,
            Some(NaiveDateTime::parse_from_str("2024-01-15 10:30", LISTING_DATE_FORMAT).unwrap())
        );
    }

    #[test]
    fn test_parse_listing_skips_dots_totals_and_short_lines() {
        let entries = parse_long_listing(LISTING, "/sdcard");
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["android", "DCIM", "broken.bin", "My Notes.txt", "photo.jpg", "sdcard"]
        );
    }

    #[test]
    fn test_parse_listing_defensive_fields() {
        let entries = parse_long_listing(LISTING, "/sdcard");
        let broken = entries.iter().find(|e| e.name == "broken.bin").unwrap();
        assert_eq!(broken.size, 0);
        assert!(broken.modified.is_none());
    }

    #[test]
    fn test_parse_listing_names_with_spaces_and_links() {
        let entries = parse_long_listing(LISTING, "/sdcard");
        let notes = entries.iter().find(|e| e.name == "My Notes.txt").unwrap();
        assert_eq!(notes.path, "/sdcard/My Notes.txt");
        assert_eq!(notes.owner.as_deref(), Some("u0_a12"));

        let link = entries.iter().find(|e| e.name == "sdcard").unwrap();
        assert_eq!(link.path, "/sdcard/sdcard");
        assert!(!link.is_dir);
    }

    #[test]
    fn test_sort_listing_parent_first() {
        let mut entries = vec![
            FileEntry::new("b.txt", "/x/b.txt", 1, false),
            FileEntry::new("A", "/x/A", 1, true),
            FileEntry::parent_marker("/x"),
            FileEntry::new("a.txt", "/x/a.txt", 1, false),
        ];
        sort_listing(&mut entries);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![PARENT_MARKER, "A", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_parse_df_scenario() {
        let output = "Filesystem     1K-blocks      Used Available Use% Mounted on\n\
                      /dev/fuse      115462124 106726360   8604692  93% /storage/emulated\n";
        let usage = parse_df(output).unwrap();
        assert_eq!(usage.total_bytes, 115462124 * 1024);
        assert_eq!(usage.used_bytes, 106726360 * 1024);
        assert_eq!(usage.available_bytes, 8604692 * 1024);
        assert_eq!(usage.use_percent, Some(93));
        assert_eq!(usage.mount_point.as_deref(), Some("/storage/emulated"));
        assert_eq!(parse_df_robust(output), Some(usage));
    }

    #[test]
    fn test_parse_df_robust_skips_banner() {
        let output = "WARNING: linker noise\n\
                      Filesystem 1K-blocks Used Available Use% Mounted on\n\
                      /dev/block/dm-5 56000000 28000000 28000000 50% /data\n";
        // The second line is the header here, so the naive variant reads zeros
        assert_eq!(parse_df(output).map(|u| u.total_bytes), Some(0));
        let usage = parse_df_robust(output).unwrap();
        assert_eq!(usage.filesystem, "/dev/block/dm-5");
        assert_eq!(usage.total_bytes, 56000000 * 1024);
    }

    #[test]
    fn test_parse_df_degenerate() {
        assert!(parse_df("").is_none());
        assert!(parse_df("Filesystem 1K-blocks Used Available Use% Mounted on").is_none());
        assert!(parse_df_robust("error: no devices/emulators found").is_none());
        let usage = parse_df("header\n/dev/fuse abc 10 20").unwrap();
        assert_eq!(usage.total_bytes, 0);
        assert_eq!(usage.used_bytes, 10 * 1024);
        assert_eq!(usage.use_percent, None);
    }

    #[test]
    fn test_parse_size_scan() {
        let output = "734003200 /sdcard/Movies/Holiday Trip 2023.mp4\n\
                      15728640 /sdcard/DCIM/Camera/VID_1.mp4\n\
                      garbage\n\
                      \n\
                      nan /sdcard/x.bin\n";
        let entries = parse_size_scan(output);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "Holiday Trip 2023.mp4");
        assert_eq!(entries[0].path, "/sdcard/Movies/Holiday Trip 2023.mp4");
        assert_eq!(entries[0].size, 734003200);
        assert!(!entries[0].is_dir);
        assert_eq!(entries[2].size, 0);
    }

    #[test]
    fn test_parse_timed_scan() {
        let output = "1705314600 2048 /sdcard/Documents/a b.pdf\n1705314600 2048\n";
        let entries = parse_timed_scan(output);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a b.pdf");
        assert_eq!(entries[0].size, 2048);
        assert_eq!(
            entries[0].modified,
            DateTime::from_timestamp(1705314600, 0).map(|d| d.naive_utc())
        );
    }

    #[test]
    fn test_parse_package_scenario() {
        let packages = parse_package_paths(
            "package:/data/app/foo/base.apk=com.example.foo\n\
             package:/data/app/~~Xy1==/com.bar-Qz==/base.apk=com.example.bar\n\
             not a package line\n\
             package:missing-separator\n",
        );
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "com.example.foo");
        assert_eq!(packages[0].apk_path, "/data/app/foo/base.apk");
        assert_eq!(packages[1].name, "com.example.bar");
        assert_eq!(packages[1].apk_path, "/data/app/~~Xy1==/com.bar-Qz==/base.apk");
    }

    #[test]
    fn test_parse_scalar() {
        assert_eq!(parse_scalar("  42\n"), Some(42));
        assert_eq!(parse_scalar("1.23457e+10"), Some(12345700000));
        assert_eq!(parse_scalar(""), None);
        assert_eq!(parse_scalar("error: device offline"), None);
        assert_eq!(parse_scalar("-5"), None);
    }

    #[test]
    fn test_has_active_device() {
        assert!(has_active_device("List of devices attached\nR58N\tdevice\n\n"));
        assert!(has_active_device(
            "List of devices attached\nemulator-5554\tdevice product:sdk model:x\n"
        ));
        assert!(!has_active_device("List of devices attached\n\n"));
        assert!(!has_active_device("List of devices attached\nR58N\tunauthorized\n"));
        assert!(!has_active_device("List of devices attached\nR58N\toffline\n"));
        assert!(!has_active_device(""));
    }

    #[test]
    fn test_parse_diskstats() {
        let output = "App Sizes: [100, 200, 300]\n\
                      App Data Sizes: [10,20]\n\
                      Cache Sizes: [1]\n";
        assert_eq!(parse_diskstats_app_total(output), Some(631));
        assert_eq!(parse_diskstats_app_total("Package Names: [\"a\"]"), None);
        assert_eq!(parse_diskstats_app_total(""), None);
    }

    #[test]
    fn test_shell_outcome() {
        assert_eq!(shell_outcome(""), Outcome::Success);
        assert_eq!(shell_outcome("\n"), Outcome::Success);
        assert_eq!(
            shell_outcome("rm: /sdcard/x: No such file or directory\n"),
            Outcome::Failure("rm: /sdcard/x: No such file or directory".to_string())
        );
        assert!(shell_outcome("mkdir: '/system/x': Read-only file system").is_failure());
        assert!(shell_outcome("error: failed to execute adb: not found").is_failure());
        assert_eq!(shell_outcome("some chatter"), Outcome::Unknown);
    }

    #[test]
    fn test_transfer_outcome() {
        assert_eq!(
            transfer_outcome("/sdcard/a.jpg: 1 file pulled, 0 skipped. 30.1 MB/s", "pulled"),
            Outcome::Success
        );
        assert!(
            transfer_outcome(
                "adb: error: failed to stat remote object '/sdcard/x': No such file",
                "pulled"
            )
            .is_failure()
        );
        assert_eq!(transfer_outcome("", "pushed"), Outcome::Unknown);
    }
}
