//! Remote Filesystem Navigator.
//!
//! Keeps the current directory and its listing, and runs the mutating shell
//! commands (`mkdir`, `rm`, `mv`, `cp`) plus `pull`/`push`. Success of those
//! commands is inferred from their output, see [`Outcome`].
//!
//! A [`PathPolicy`] refuses sensitive system trees before any I/O happens.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::parser;
use crate::types::{FileEntry, Outcome, parent_path};

/// Directory a fresh navigator starts in.
pub const DEFAULT_START_PATH: &str = "/sdcard/";

/// Prefixes refused unless system access is enabled.
pub const RESTRICTED_PREFIXES: &[&str] = &[
    "/system",
    "/data/data",
    "/data/system",
    "/proc",
    "/dev",
    "/sys",
];

/// Paths at which no parent entry is injected.
const ROOT_PATHS: &[&str] = &["", "/sdcard"];

/// Access policy for remote paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathPolicy {
    allow_system_access: bool,
}

impl PathPolicy {
    /// Create a policy; `allow_system_access` lifts every restriction.
    pub fn new(allow_system_access: bool) -> Self {
        Self {
            allow_system_access,
        }
    }

    /// Whether the override is on
    pub fn allows_system_access(&self) -> bool {
        self.allow_system_access
    }

    /// Whether `path` is, or is under, a restricted prefix.
    ///
    /// Matching is per path segment: `/system` and `/system/app` are
    /// restricted, `/systemfoo` is not.
    pub fn is_restricted(path: &str) -> bool {
        RESTRICTED_PREFIXES.iter().any(|prefix| {
            path.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    /// Refuse restricted paths unless the override is on.
    pub fn check(&self, path: &str) -> Result<()> {
        if path.trim().is_empty() {
            return Err(Error::InvalidPath(path.to_string()));
        }
        if !self.allow_system_access && Self::is_restricted(path) {
            return Err(Error::Restricted(path.to_string()));
        }
        Ok(())
    }
}

/// User-selectable sort of a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    /// Directories first, then case-insensitive name
    #[default]
    Name,
    /// File size
    Size,
    /// Modification time
    Date,
}

/// Snapshot of the navigator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigatorState {
    /// Directory the listing belongs to
    pub current_path: String,
    /// Entries of `current_path`, parent marker first when not at a root
    pub files: Vec<FileEntry>,
    /// Set while a listing is being fetched
    pub is_loading: bool,
    /// Message of the last refused or failed listing
    pub error_message: Option<String>,
}

impl Default for NavigatorState {
    fn default() -> Self {
        Self {
            current_path: DEFAULT_START_PATH.to_string(),
            files: Vec::new(),
            is_loading: false,
            error_message: None,
        }
    }
}

impl NavigatorState {
    /// The listing re-ordered by `key`. The parent marker always stays first.
    pub fn sorted_files(&self, key: SortKey, descending: bool) -> Vec<FileEntry> {
        let mut files = self.files.clone();
        files.sort_by(|a, b| {
            let order = match key {
                SortKey::Name => b
                    .is_dir
                    .cmp(&a.is_dir)
                    .then_with(|| parser::compare_names(&a.name, &b.name)),
                SortKey::Size => a.size.cmp(&b.size),
                SortKey::Date => a.modified.cmp(&b.modified),
            };
            let order = if descending { order.reverse() } else { order };
            match parser::parent_first(a, b) {
                Ordering::Equal => order,
                parent => parent,
            }
        });
        files
    }
}

/// Browses and edits the device filesystem.
pub struct Navigator {
    backend: Arc<dyn Backend>,
    policy: PathPolicy,
    state: Mutex<NavigatorState>,
}

impl Navigator {
    /// Create a navigator at [`DEFAULT_START_PATH`].
    pub fn new(backend: Arc<dyn Backend>, policy: PathPolicy) -> Self {
        Self {
            backend,
            policy,
            state: Mutex::new(NavigatorState::default()),
        }
    }

    /// Start somewhere other than the default directory.
    #[must_use]
    pub fn with_start_path(self, path: impl Into<String>) -> Self {
        self.update(|state| state.current_path = path.into());
        self
    }

    /// Access policy in effect
    pub fn policy(&self) -> PathPolicy {
        self.policy
    }

    /// Current snapshot
    pub fn state(&self) -> NavigatorState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update<F: FnOnce(&mut NavigatorState)>(&self, f: F) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// List `path`, or the current directory when `None`.
    ///
    /// On success the path and files are replaced together. A refused or
    /// failed listing only sets `error_message`; the previous listing stays.
    pub fn list_directory(&self, path: Option<&str>) -> NavigatorState {
        let target = match path {
            Some(p) => p.to_string(),
            None => self.state().current_path,
        };

        if let Err(e) = self.policy.check(&target) {
            debug!("listing refused: {e}");
            self.update(|state| state.error_message = Some(e.to_string()));
            return self.state();
        }

        self.update(|state| {
            state.is_loading = true;
            state.error_message = None;
        });

        let output = self
            .backend
            .execute(&["shell", "ls", "-la", &quote(&target)]);
        let mut files = parser::parse_long_listing(&output, &target);
        debug!("{} entries in {target}", files.len());

        if files.is_empty() {
            if let Outcome::Failure(reason) = parser::shell_outcome(&output) {
                warn!("listing {target} failed: {reason}");
                self.update(|state| {
                    state.is_loading = false;
                    state.error_message = Some(reason);
                });
                return self.state();
            }
        }

        if !is_root(&target) {
            files.insert(0, FileEntry::parent_marker(&target));
        }

        self.update(|state| {
            state.current_path = target;
            state.files = files;
            state.is_loading = false;
        });
        self.state()
    }

    /// List the parent of the current directory.
    pub fn to_parent(&self) -> NavigatorState {
        let current = self.state().current_path;
        let parent = parent_path(&current);
        let parent = if parent.is_empty() { "/".to_string() } else { parent };
        self.list_directory(Some(&parent))
    }

    /// List an arbitrary directory.
    pub fn to_path(&self, path: &str) -> NavigatorState {
        self.list_directory(Some(path))
    }

    /// Re-list the current directory.
    pub fn refresh(&self) -> NavigatorState {
        self.list_directory(None)
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Copy a device file to the local machine.
    pub fn pull_file(&self, remote: &str, local: &Path) -> Outcome {
        if let Some(refused) = self.refuse(remote) {
            return refused;
        }
        let local = local.to_string_lossy();
        let output = self.backend.execute(&["pull", remote, &local]);
        parser::transfer_outcome(&output, "pulled")
    }

    /// Copy a local file to the device.
    pub fn push_file(&self, local: &Path, remote: &str) -> Outcome {
        if let Some(refused) = self.refuse(remote) {
            return refused;
        }
        let local = local.to_string_lossy();
        let output = self.backend.execute(&["push", &local, remote]);
        parser::transfer_outcome(&output, "pushed")
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// `mkdir -p`
    pub fn create_directory(&self, path: &str) -> Outcome {
        self.shell_op(&["mkdir", "-p"], &[path])
    }

    /// `rm`, or `rm -rf` for directories.
    pub fn delete_item(&self, path: &str, is_dir: bool) -> Outcome {
        let command: &[&str] = if is_dir { &["rm", "-rf"] } else { &["rm"] };
        self.shell_op(command, &[path])
    }

    /// `mv old new`
    pub fn rename_item(&self, old_path: &str, new_path: &str) -> Outcome {
        self.shell_op(&["mv"], &[old_path, new_path])
    }

    /// `cp`, or `cp -r` for directories.
    pub fn copy_item(&self, source: &str, destination: &str, is_dir: bool) -> Outcome {
        let command: &[&str] = if is_dir { &["cp", "-r"] } else { &["cp"] };
        self.shell_op(command, &[source, destination])
    }

    /// Check every path against the policy, then run `command` with the
    /// quoted paths appended.
    fn shell_op(&self, command: &[&str], paths: &[&str]) -> Outcome {
        if let Some(refused) = paths.iter().find_map(|p| self.refuse(p)) {
            return refused;
        }

        let quoted: Vec<String> = paths.iter().map(|p| quote(p)).collect();
        let mut args = vec!["shell"];
        args.extend_from_slice(command);
        args.extend(quoted.iter().map(String::as_str));

        let outcome = parser::shell_outcome(&self.backend.execute(&args));
        debug!("{} -> {outcome}", command.join(" "));
        outcome
    }

    fn refuse(&self, path: &str) -> Option<Outcome> {
        self.policy
            .check(path)
            .err()
            .map(|e| Outcome::Failure(e.to_string()))
    }
}

/// Whether no parent entry belongs above `path`.
pub fn is_root(path: &str) -> bool {
    ROOT_PATHS.contains(&path.trim_end_matches('/'))
}

/// Single-quote a path for the device shell, which re-splits `adb shell` arguments.
pub fn quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::types::PARENT_MARKER;

    const SDCARD_LISTING: &str = "\
total 24
drwxrwx--x 2 root sdcard_rw 4096 2024-01-15 09:00 .
drwx--x--x 4 root sdcard_rw 4096 2024-01-10 08:00 ..
drwxrwx--- 2 root sdcard_rw 4096 2024-01-15 09:00 DCIM
-rw-rw---- 1 root sdcard_rw 1234567 2024-01-15 10:30 photo.jpg
-rw-rw---- 1 root sdcard_rw 10 2023-06-01 08:00 a.txt
";

    fn navigator(mock: &MockBackend, allow_system: bool) -> Navigator {
        Navigator::new(Arc::new(mock.clone()), PathPolicy::new(allow_system))
    }

    #[test]
    fn test_policy_is_segment_aware() {
        assert!(PathPolicy::is_restricted("/system"));
        assert!(PathPolicy::is_restricted("/system/app"));
        assert!(PathPolicy::is_restricted("/data/data/com.example"));
        assert!(PathPolicy::is_restricted("/proc/1/maps"));
        assert!(!PathPolicy::is_restricted("/systemfoo"));
        assert!(!PathPolicy::is_restricted("/data/local/tmp"));
        assert!(!PathPolicy::is_restricted("/sdcard/sys"));
        assert!(!PathPolicy::is_restricted("/sdcard/"));
    }

    #[test]
    fn test_policy_check() {
        assert!(matches!(
            PathPolicy::new(false).check("/sys/kernel"),
            Err(Error::Restricted(_))
        ));
        assert!(PathPolicy::new(true).check("/sys/kernel").is_ok());
        assert!(matches!(
            PathPolicy::new(true).check("  "),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_is_root() {
        assert!(is_root("/"));
        assert!(is_root("/sdcard"));
        assert!(is_root("/sdcard/"));
        assert!(!is_root("/sdcard/DCIM"));
        assert!(!is_root("/storage"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("/sdcard/My Files"), "'/sdcard/My Files'");
        assert_eq!(quote("/sdcard/it's"), r"'/sdcard/it'\''s'");
    }

    #[test]
    fn test_list_root_has_no_parent_marker() {
        let mock = MockBackend::new();
        mock.respond("ls -la '/sdcard/'", SDCARD_LISTING);
        let nav = navigator(&mock, false);

        let state = nav.list_directory(None);
        assert_eq!(state.current_path, "/sdcard/");
        assert!(!state.is_loading);
        assert!(state.error_message.is_none());
        let names: Vec<&str> = state.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["DCIM", "a.txt", "photo.jpg"]);
    }

    #[test]
    fn test_list_subdirectory_injects_parent_first() {
        let mock = MockBackend::new();
        mock.respond(
            "ls -la '/sdcard/DCIM'",
            "-rw-rw---- 1 root sdcard_rw 5 2024-01-15 10:30 IMG_1.jpg\n",
        );
        let nav = navigator(&mock, false);

        let state = nav.to_path("/sdcard/DCIM");
        assert_eq!(state.current_path, "/sdcard/DCIM");
        assert_eq!(state.files.len(), 2);
        assert_eq!(state.files[0].name, PARENT_MARKER);
        assert_eq!(state.files[0].path, "/sdcard");
        assert_eq!(state.files[1].path, "/sdcard/DCIM/IMG_1.jpg");
    }

    #[test]
    fn test_restricted_path_leaves_files_unchanged() {
        let mock = MockBackend::new();
        mock.respond("ls -la '/sdcard/'", SDCARD_LISTING);
        let nav = navigator(&mock, false);
        let before = nav.list_directory(None);
        let calls_before = mock.calls().len();

        let state = nav.list_directory(Some("/system/app"));
        assert!(state.error_message.as_deref().unwrap().contains("restricted"));
        assert_eq!(state.current_path, "/sdcard/");
        assert_eq!(state.files, before.files);
        assert_eq!(mock.calls().len(), calls_before);
    }

    #[test]
    fn test_system_access_override() {
        let mock = MockBackend::new();
        mock.respond(
            "ls -la '/system/app'",
            "drwxr-xr-x 3 root root 4096 2024-01-01 00:00 Chrome\n",
        );
        let nav = navigator(&mock, true);

        let state = nav.to_path("/system/app");
        assert!(state.error_message.is_none());
        assert_eq!(state.current_path, "/system/app");
        assert_eq!(state.files[1].name, "Chrome");
    }

    #[test]
    fn test_failed_listing_sets_error() {
        let mock = MockBackend::new();
        mock.respond("ls -la '/sdcard/'", SDCARD_LISTING);
        mock.respond(
            "ls -la '/sdcard/missing'",
            "ls: /sdcard/missing: No such file or directory\n",
        );
        let nav = navigator(&mock, false);
        nav.refresh();

        let state = nav.to_path("/sdcard/missing");
        assert!(state.error_message.unwrap().contains("No such file"));
        assert_eq!(state.current_path, "/sdcard/");
        assert_eq!(state.files.len(), 3);
    }

    #[test]
    fn test_to_parent() {
        let mock = MockBackend::new();
        mock.respond("ls -la '/sdcard'", SDCARD_LISTING);
        let nav = navigator(&mock, false).with_start_path("/sdcard/DCIM");

        let state = nav.to_parent();
        assert_eq!(state.current_path, "/sdcard");
        assert!(state.files.iter().all(|f| !f.is_parent_marker()));
    }

    #[test]
    fn test_sorted_files_keeps_parent_first() {
        let mock = MockBackend::new();
        mock.respond("ls -la '/sdcard/Download'", SDCARD_LISTING);
        let nav = navigator(&mock, false);
        let state = nav.to_path("/sdcard/Download");

        for key in [SortKey::Name, SortKey::Size, SortKey::Date] {
            for descending in [false, true] {
                let sorted = state.sorted_files(key, descending);
                assert!(sorted[0].is_parent_marker(), "{key:?} desc={descending}");
            }
        }

        let by_size = state.sorted_files(SortKey::Size, true);
        assert_eq!(by_size[1].name, "photo.jpg");
        let by_date = state.sorted_files(SortKey::Date, false);
        assert_eq!(by_date[1].name, "a.txt");
    }

    #[test]
    fn test_mutations_issue_quoted_commands() {
        let mock = MockBackend::new();
        let nav = navigator(&mock, false);

        assert!(nav.create_directory("/sdcard/New Folder").is_success());
        assert!(nav.delete_item("/sdcard/old", true).is_success());
        assert!(nav.delete_item("/sdcard/a.txt", false).is_success());
        assert!(nav.rename_item("/sdcard/a.txt", "/sdcard/b.txt").is_success());
        assert!(nav.copy_item("/sdcard/DCIM", "/sdcard/Backup", true).is_success());

        assert_eq!(
            mock.calls(),
            vec![
                "shell mkdir -p '/sdcard/New Folder'",
                "shell rm -rf '/sdcard/old'",
                "shell rm '/sdcard/a.txt'",
                "shell mv '/sdcard/a.txt' '/sdcard/b.txt'",
                "shell cp -r '/sdcard/DCIM' '/sdcard/Backup'",
            ]
        );
    }

    #[test]
    fn test_mutation_failure_and_unknown() {
        let mock = MockBackend::new();
        mock.respond("rm", "rm: /sdcard/nope: No such file or directory");
        mock.respond("mv", "warning: something odd");
        let nav = navigator(&mock, false);

        assert!(nav.delete_item("/sdcard/nope", false).is_failure());
        assert_eq!(nav.rename_item("/sdcard/a", "/sdcard/b"), Outcome::Unknown);
    }

    #[test]
    fn test_mutation_on_restricted_path_is_refused_without_io() {
        let mock = MockBackend::new();
        let nav = navigator(&mock, false);

        assert!(nav.delete_item("/system/app", true).is_failure());
        assert!(nav.copy_item("/sdcard/a", "/proc/x", false).is_failure());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_pull_and_push() {
        let mock = MockBackend::new();
        mock.respond("pull", "/sdcard/a.jpg: 1 file pulled, 0 skipped.");
        mock.respond("push", "adb: error: failed to copy 'a' to '/sdcard/a'");
        let nav = navigator(&mock, false);

        assert!(nav.pull_file("/sdcard/a.jpg", Path::new("/tmp/a.jpg")).is_success());
        assert!(nav.push_file(Path::new("/tmp/a"), "/sdcard/a").is_failure());
        assert_eq!(mock.calls()[0], "pull /sdcard/a.jpg /tmp/a.jpg");
    }
}
