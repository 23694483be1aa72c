//! Transfer & Cache Manager.
//!
//! Pulls single files into a local scratch cache so an external viewer can
//! open them. Each operation gets its own subdirectory (a [`TempDir`]) under
//! a per-purpose directory, so two files with the same name never collide and
//! nothing outlives the operation that created it.
//!
//! Every operation directory holds a locked `.owner.lock` file for as long
//! as the operation (or the [`CachedFile`] it returned) is alive. Purging
//! skips directories whose lock is still held, so several processes can
//! share one scratch root.
//!
//! Streaming starts the pull in the background, waits out a short buffering
//! window and then hands the growing file to the viewer. When the viewer is
//! done the pull is killed and the directory removed.

use std::fs::{self, File, TryLockError};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tempfile::TempDir;

use crate::backend::{Backend, RunningCommand};
use crate::error::{Error, Result};
use crate::parser;
use crate::types::{Outcome, file_name};

/// Directory under the system temp dir that holds all scratch caches.
pub const SCRATCH_DIR_NAME: &str = "droidscope";

/// Default buffering window before a stream is handed to the viewer.
pub const DEFAULT_STREAM_BUFFER: Duration = Duration::from_secs(5);

/// Previews above this size deserve a confirmation first.
pub const PREVIEW_WARN_SIZE: u64 = 100 * 1024 * 1024;

/// Rough USB transfer rate used for time estimates, in bytes per second.
pub const ESTIMATED_PULL_RATE: u64 = 50 * 1024 * 1024;

/// Entries without an owner lock younger than this survive a purge.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(60);

const CANCEL_POLL: Duration = Duration::from_millis(100);

const OWNER_LOCK: &str = ".owner.lock";

/// Seconds a pull of `size` bytes is expected to take.
pub fn estimated_pull_secs(size: u64) -> u64 {
    size / ESTIMATED_PULL_RATE
}

/// Separate cache namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Full pull, then open
    Preview,
    /// Background pull, open while it runs
    Stream,
}

impl Purpose {
    /// Directory name under the scratch root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Stream => "stream",
        }
    }
}

/// Where to cache and how long to buffer.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Parent of the per-purpose directories
    pub scratch_root: PathBuf,
    /// Buffering window for streams
    pub buffer: Duration,
    /// Minimum age of an unlocked entry before a purge removes it
    pub stale_after: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir().join(SCRATCH_DIR_NAME),
            buffer: DEFAULT_STREAM_BUFFER,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

impl TransferConfig {
    /// Use a different scratch root.
    #[must_use]
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Use a different buffering window.
    #[must_use]
    pub fn with_buffer(mut self, buffer: Duration) -> Self {
        self.buffer = buffer;
        self
    }

    /// Use a different grace period for unlocked entries.
    #[must_use]
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Directory for one purpose
    pub fn purpose_dir(&self, purpose: Purpose) -> PathBuf {
        self.scratch_root.join(purpose.dir_name())
    }
}

/// Cloneable flag to abort a stream during buffering.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Viewers
// ============================================================================

/// How a viewer returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerExit {
    /// The viewer ran and has exited
    Exited,
    /// The viewer was launched without waiting for it
    Detached,
}

/// Opens a local file for the user.
pub trait Viewer: Send + Sync {
    /// Open `path`. Blocks until the viewer exits unless it detaches.
    fn view(&self, path: &Path) -> Result<ViewerExit>;
}

/// A viewer launched as an external command with the file as last argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandViewer {
    program: String,
    args: Vec<String>,
    wait: bool,
}

impl CommandViewer {
    /// Run `program` and wait for it to exit.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            wait: true,
        }
    }

    /// Parse a command line such as `vlc --file-caching=5000`.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program).with_args(words))
    }

    /// The platform opener (`open` on macOS, `xdg-open` elsewhere). It
    /// returns before the document is closed, so it never waits.
    pub fn system_default() -> Self {
        let program = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        Self {
            program: program.to_string(),
            args: Vec::new(),
            wait: false,
        }
    }

    /// Arguments placed before the file path.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Whether `view` blocks until the program exits
    pub fn waits(&self) -> bool {
        self.wait
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Viewer for CommandViewer {
    fn view(&self, path: &Path) -> Result<ViewerExit> {
        debug!("opening {} with {}", path.display(), self.program);
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(path);

        if self.wait {
            let status = command
                .status()
                .map_err(|e| Error::Viewer(format!("{}: {e}", self.program)))?;
            if !status.success() {
                warn!("{} exited with {status}", self.program);
            }
            Ok(ViewerExit::Exited)
        } else {
            command
                .spawn()
                .map_err(|e| Error::Viewer(format!("{}: {e}", self.program)))?;
            Ok(ViewerExit::Detached)
        }
    }
}

// ============================================================================
// Cache entries
// ============================================================================

/// A pulled file. Deleted together with its directory on drop.
#[derive(Debug)]
pub struct CachedFile {
    // Released before the directory is removed
    _owner: File,
    dir: TempDir,
    path: PathBuf,
    remote: String,
}

impl CachedFile {
    /// Local path of the pulled file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remote path it was pulled from
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Directory that is removed on drop
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Copy the file out of the cache. Returns the bytes copied.
    pub fn save_to(&self, destination: &Path) -> Result<u64> {
        Ok(fs::copy(&self.path, destination)?)
    }
}

/// Result of [`TransferManager::preview_file`].
#[derive(Debug)]
pub enum PreviewOutcome {
    /// The viewer exited and the cached copy is already gone
    Closed,
    /// The viewer detached; the copy lives until this value is dropped
    Opened(CachedFile),
}

/// What happened during a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamReport {
    /// How the viewer returned, `None` when cancelled before launch
    pub viewer: Option<ViewerExit>,
    /// Whether the background pull was still running and got killed
    pub pull_terminated: bool,
    /// Whether the caller cancelled during buffering
    pub cancelled: bool,
}

// ============================================================================
// Manager
// ============================================================================

/// Serializes pulls and streams for one caller context.
pub struct TransferManager {
    backend: Arc<dyn Backend>,
    config: TransferConfig,
    busy: AtomicBool,
}

/// Clears the busy flag when the operation ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TransferManager {
    /// Create a manager.
    pub fn new(backend: Arc<dyn Backend>, config: TransferConfig) -> Self {
        Self {
            backend,
            config,
            busy: AtomicBool::new(false),
        }
    }

    /// Configuration in effect
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Whether a pull or stream is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn begin(&self) -> Result<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    /// Fresh per-operation directory inside the purpose directory, plus
    /// the locked owner file that keeps other purges away from it.
    fn scratch_dir(&self, purpose: Purpose) -> Result<(TempDir, File)> {
        let parent = self.config.purpose_dir(purpose);
        fs::create_dir_all(&parent)?;
        let dir = tempfile::Builder::new().prefix("op-").tempdir_in(parent)?;
        let owner = File::create(dir.path().join(OWNER_LOCK))?;
        owner.lock()?;
        Ok((dir, owner))
    }

    fn local_target(dir: &TempDir, remote: &str) -> Result<PathBuf> {
        let name = file_name(remote);
        if name.is_empty() || name == "." || name == ".." || name == OWNER_LOCK {
            return Err(Error::InvalidPath(remote.to_string()));
        }
        let local = dir.path().join(name);
        if local.exists() {
            fs::remove_file(&local)?;
        }
        Ok(local)
    }

    /// Pull `remote` completely into the cache.
    pub fn fetch(&self, remote: &str, purpose: Purpose) -> Result<CachedFile> {
        let _guard = self.begin()?;
        self.fetch_unguarded(remote, purpose)
    }

    fn fetch_unguarded(&self, remote: &str, purpose: Purpose) -> Result<CachedFile> {
        let (dir, owner) = self.scratch_dir(purpose)?;
        let local = Self::local_target(&dir, remote)?;

        let started = Instant::now();
        let output = self
            .backend
            .execute(&["pull", remote, &local.to_string_lossy()]);

        match parser::transfer_outcome(&output, "pulled") {
            Outcome::Failure(reason) => {
                return Err(Error::PullFailed {
                    remote: remote.to_string(),
                    reason,
                });
            }
            Outcome::Unknown => debug!("pull of {remote} printed no confirmation"),
            Outcome::Success => {}
        }

        if !local.exists() {
            return Err(Error::PullFailed {
                remote: remote.to_string(),
                reason: "no local file was written".to_string(),
            });
        }

        info!(
            "pulled {remote} in {:.1}s",
            started.elapsed().as_secs_f64()
        );
        Ok(CachedFile {
            _owner: owner,
            dir,
            path: local,
            remote: remote.to_string(),
        })
    }

    /// Pull `remote` and open it.
    ///
    /// A waiting viewer means the cached copy is deleted before returning.
    /// A detached viewer gets the copy back in [`PreviewOutcome::Opened`].
    pub fn preview_file(&self, remote: &str, viewer: &dyn Viewer) -> Result<PreviewOutcome> {
        let _guard = self.begin()?;
        let cached = self.fetch_unguarded(remote, Purpose::Preview)?;
        match viewer.view(cached.path())? {
            ViewerExit::Exited => Ok(PreviewOutcome::Closed),
            ViewerExit::Detached => Ok(PreviewOutcome::Opened(cached)),
        }
    }

    /// Play `remote` while it downloads.
    ///
    /// The viewer sees a growing file. Once it returns (immediately for a
    /// detached viewer) the pull is killed and the cache entry removed.
    pub fn stream_file(
        &self,
        remote: &str,
        viewer: &dyn Viewer,
        cancel: &CancelToken,
    ) -> Result<StreamReport> {
        let _guard = self.begin()?;
        let (dir, _owner) = self.scratch_dir(Purpose::Stream)?;
        let local = Self::local_target(&dir, remote)?;

        let mut pull = self
            .backend
            .spawn(&["pull", remote, &local.to_string_lossy()])?;
        debug!("buffering {remote} for {:?}", self.config.buffer);

        let pull_ok = match wait_for_buffer(pull.as_mut(), self.config.buffer, cancel) {
            Buffering::Cancelled => {
                info!("stream of {remote} cancelled");
                pull.terminate();
                return Ok(StreamReport {
                    viewer: None,
                    pull_terminated: true,
                    cancelled: true,
                });
            }
            Buffering::Ready => true,
            Buffering::Finished { success } => {
                debug!("pull of {remote} finished while buffering");
                if !success {
                    warn!("pull of {remote} exited with an error");
                }
                success
            }
        };

        if !local.exists() {
            pull.terminate();
            let reason = if pull_ok {
                "nothing was received while buffering"
            } else {
                "the pull exited with an error"
            };
            return Err(Error::PullFailed {
                remote: remote.to_string(),
                reason: reason.to_string(),
            });
        }

        let exit = match viewer.view(&local) {
            Ok(exit) => exit,
            Err(e) => {
                pull.terminate();
                return Err(e);
            }
        };

        let pull_terminated = pull.is_running();
        if pull_terminated {
            debug!("terminating background pull of {remote}");
        }
        pull.terminate();

        Ok(StreamReport {
            viewer: Some(exit),
            pull_terminated,
            cancelled: false,
        })
    }

    /// Remove leftovers of a purpose directory (e.g. after a crash).
    /// Returns the number of entries removed.
    ///
    /// Operation directories whose owner lock is still held, by this or any
    /// other process, are left alone. Entries without a lock file are only
    /// removed once they are older than [`TransferConfig::stale_after`].
    pub fn purge_stale(&self, purpose: Purpose) -> Result<usize> {
        let dir = self.config.purpose_dir(purpose);
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !self.is_stale(&path) {
                debug!("keeping {} (in use)", path.display());
                continue;
            }
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed += 1;
        }
        Ok(removed)
    }

    fn is_stale(&self, path: &Path) -> bool {
        let lock_path = path.join(OWNER_LOCK);
        if path.is_dir() && lock_path.exists() {
            // The lock taken here is released again when the file drops
            let owner = File::options().write(true).open(&lock_path);
            return match owner.map(|f| f.try_lock()) {
                Ok(Ok(())) => true,
                Ok(Err(TryLockError::WouldBlock)) => false,
                Ok(Err(TryLockError::Error(e))) | Err(e) => {
                    warn!("cannot check owner of {}: {e}", path.display());
                    false
                }
            };
        }
        match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => modified
                .elapsed()
                .is_ok_and(|age| age >= self.config.stale_after),
            Err(_) => true,
        }
    }
}

/// How the buffering window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Buffering {
    Cancelled,
    Ready,
    /// The pull exited before the window was over and has been reaped
    Finished { success: bool },
}

/// Sleep through the buffering window in slices, checking for cancellation
/// and for a pull that has already finished.
fn wait_for_buffer(
    pull: &mut dyn RunningCommand,
    buffer: Duration,
    cancel: &CancelToken,
) -> Buffering {
    let deadline = Instant::now() + buffer;
    loop {
        if cancel.is_cancelled() {
            return Buffering::Cancelled;
        }
        if !pull.is_running() {
            return Buffering::Finished {
                success: pull.wait(),
            };
        }
        let now = Instant::now();
        if now >= deadline {
            return Buffering::Ready;
        }
        std::thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::sync::Mutex;

    /// Records what it was asked to open and whether the file existed then.
    struct RecordingViewer {
        exit: ViewerExit,
        seen: Mutex<Vec<(PathBuf, Option<Vec<u8>>)>>,
    }

    impl RecordingViewer {
        fn new(exit: ViewerExit) -> Self {
            Self {
                exit,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Viewer for RecordingViewer {
        fn view(&self, path: &Path) -> Result<ViewerExit> {
            let content = fs::read(path).ok();
            self.seen.lock().unwrap().push((path.to_path_buf(), content));
            Ok(self.exit)
        }
    }

    struct FailingViewer;

    impl Viewer for FailingViewer {
        fn view(&self, _path: &Path) -> Result<ViewerExit> {
            Err(Error::Viewer("no display".to_string()))
        }
    }

    /// Answers `pull` by writing the local file like adb would.
    #[derive(Default)]
    struct PullingBackend {
        inner: MockBackend,
        payload: Vec<u8>,
    }

    impl Backend for PullingBackend {
        fn execute(&self, args: &[&str]) -> String {
            let output = self.inner.execute(args);
            if args.first() == Some(&"pull") {
                if let Some(local) = args.last() {
                    let _ = fs::write(local, &self.payload);
                }
                return format!("{}: 1 file pulled, 0 skipped.", args[1]);
            }
            output
        }

        fn spawn(&self, args: &[&str]) -> Result<Box<dyn RunningCommand>> {
            self.inner.spawn(args)
        }
    }

    fn manager(backend: Arc<dyn Backend>, root: &Path) -> TransferManager {
        let config = TransferConfig::default()
            .with_scratch_root(root)
            .with_buffer(Duration::from_millis(20));
        TransferManager::new(backend, config)
    }

    #[test]
    fn test_purpose_dirs_are_separate() {
        let config = TransferConfig::default().with_scratch_root("/tmp/x");
        assert_eq!(config.purpose_dir(Purpose::Preview), Path::new("/tmp/x/preview"));
        assert_eq!(config.purpose_dir(Purpose::Stream), Path::new("/tmp/x/stream"));
        assert_eq!(TransferConfig::default().buffer, DEFAULT_STREAM_BUFFER);
    }

    #[test]
    fn test_estimated_pull_secs() {
        assert_eq!(estimated_pull_secs(0), 0);
        assert_eq!(estimated_pull_secs(500 * 1024 * 1024), 10);
    }

    #[test]
    fn test_command_viewer_parsing() {
        let viewer = CommandViewer::from_command_line("vlc --file-caching=5000").unwrap();
        assert_eq!(viewer.program(), "vlc");
        assert!(viewer.waits());
        assert!(CommandViewer::from_command_line("   ").is_none());
        assert!(!CommandViewer::system_default().waits());
    }

    #[test]
    fn test_fetch_pulls_into_fresh_directories() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(PullingBackend {
            payload: b"jpeg".to_vec(),
            ..Default::default()
        });
        let transfers = manager(backend, root.path());

        let first = transfers.fetch("/sdcard/DCIM/a.jpg", Purpose::Preview).unwrap();
        let second = transfers.fetch("/sdcard/Download/a.jpg", Purpose::Preview).unwrap();
        assert_ne!(first.path(), second.path());
        assert_eq!(fs::read(first.path()).unwrap(), b"jpeg");
        assert!(first.path().starts_with(root.path().join("preview")));
        assert_eq!(first.remote(), "/sdcard/DCIM/a.jpg");

        let dir = first.dir().to_path_buf();
        drop(first);
        assert!(!dir.exists());
        assert!(!transfers.is_busy());
    }

    #[test]
    fn test_fetch_failure_reports_reason() {
        let root = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        mock.respond(
            "pull",
            "adb: error: failed to stat remote object '/sdcard/gone.mp4': No such file or directory",
        );
        let transfers = manager(Arc::new(mock), root.path());

        let err = transfers.fetch("/sdcard/gone.mp4", Purpose::Preview).unwrap_err();
        assert!(matches!(err, Error::PullFailed { ref reason, .. } if reason.contains("No such file")));
        assert!(!transfers.is_busy());
    }

    #[test]
    fn test_fetch_without_local_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let transfers = manager(Arc::new(MockBackend::new()), root.path());
        assert!(matches!(
            transfers.fetch("/sdcard/a.jpg", Purpose::Preview),
            Err(Error::PullFailed { .. })
        ));
    }

    #[test]
    fn test_preview_with_waiting_viewer_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(PullingBackend {
            payload: b"pdf".to_vec(),
            ..Default::default()
        });
        let transfers = manager(backend, root.path());
        let viewer = RecordingViewer::new(ViewerExit::Exited);

        let outcome = transfers.preview_file("/sdcard/doc.pdf", &viewer).unwrap();
        assert!(matches!(outcome, PreviewOutcome::Closed));

        let seen = viewer.seen.lock().unwrap();
        assert_eq!(seen[0].1.as_deref(), Some(&b"pdf"[..]));
        assert!(!seen[0].0.exists());
    }

    #[test]
    fn test_preview_with_detached_viewer_hands_back_file() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(PullingBackend {
            payload: b"png".to_vec(),
            ..Default::default()
        });
        let transfers = manager(backend, root.path());
        let viewer = RecordingViewer::new(ViewerExit::Detached);

        let PreviewOutcome::Opened(cached) = transfers.preview_file("/sdcard/a.png", &viewer).unwrap()
        else {
            panic!("expected the cached file back");
        };
        assert!(cached.path().exists());

        let saved = root.path().join("saved.png");
        assert_eq!(cached.save_to(&saved).unwrap(), 3);
        let path = cached.path().to_path_buf();
        drop(cached);
        assert!(!path.exists());
        assert!(saved.exists());
    }

    #[test]
    fn test_stream_terminates_pull_and_removes_file() {
        let root = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        mock.set_pull_payload(b"partial video".to_vec());
        let transfers = manager(Arc::new(mock.clone()), root.path());
        let viewer = RecordingViewer::new(ViewerExit::Exited);

        let report = transfers
            .stream_file("/sdcard/Movies/clip.mp4", &viewer, &CancelToken::new())
            .unwrap();
        assert_eq!(report.viewer, Some(ViewerExit::Exited));
        assert!(report.pull_terminated);
        assert!(!report.cancelled);
        assert!(mock.was_terminated());

        let seen = viewer.seen.lock().unwrap();
        assert_eq!(seen[0].1.as_deref(), Some(&b"partial video"[..]));
        assert!(seen[0].0.starts_with(root.path().join("stream")));
        assert!(!seen[0].0.exists());
    }

    #[test]
    fn test_stream_cancelled_before_viewer() {
        let root = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        mock.set_pull_payload(b"x".to_vec());
        let transfers = manager(Arc::new(mock.clone()), root.path());
        let viewer = RecordingViewer::new(ViewerExit::Exited);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = transfers.stream_file("/sdcard/a.mp4", &viewer, &cancel).unwrap();
        assert!(report.cancelled);
        assert!(report.viewer.is_none());
        assert!(mock.was_terminated());
        assert!(viewer.seen.lock().unwrap().is_empty());
        assert_eq!(fs::read_dir(root.path().join("stream")).unwrap().count(), 0);
    }

    #[test]
    fn test_stream_viewer_failure_still_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        mock.set_pull_payload(b"x".to_vec());
        let transfers = manager(Arc::new(mock.clone()), root.path());

        let err = transfers
            .stream_file("/sdcard/a.mp4", &FailingViewer, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::Viewer(_)));
        assert!(mock.was_terminated());
        assert!(!transfers.is_busy());
        assert_eq!(fs::read_dir(root.path().join("stream")).unwrap().count(), 0);
    }

    #[test]
    fn test_stream_without_data_fails() {
        let root = tempfile::tempdir().unwrap();
        let transfers = manager(Arc::new(MockBackend::new()), root.path());
        let viewer = RecordingViewer::new(ViewerExit::Exited);

        let result = transfers.stream_file("/sdcard/a.mp4", &viewer, &CancelToken::new());
        assert!(matches!(result, Err(Error::PullFailed { .. })));
        assert!(viewer.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_busy_slot_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let transfers = manager(Arc::new(MockBackend::new()), root.path());

        let guard = transfers.begin().unwrap();
        assert!(transfers.is_busy());
        assert!(matches!(
            transfers.fetch("/sdcard/a.jpg", Purpose::Preview),
            Err(Error::Busy)
        ));
        drop(guard);
        assert!(!transfers.is_busy());
    }

    #[test]
    fn test_stream_reaps_pull_that_finished_early() {
        let root = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        mock.set_pull_payload(b"short clip".to_vec());
        mock.finish_spawned(true);
        let config = TransferConfig::default()
            .with_scratch_root(root.path())
            .with_buffer(Duration::from_secs(30));
        let transfers = TransferManager::new(Arc::new(mock.clone()), config);
        let viewer = RecordingViewer::new(ViewerExit::Exited);

        let started = Instant::now();
        let report = transfers
            .stream_file("/sdcard/a.mp4", &viewer, &CancelToken::new())
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(report.viewer, Some(ViewerExit::Exited));
        assert!(!report.pull_terminated);
        assert!(mock.was_reaped());
        assert!(!mock.was_terminated());
    }

    #[test]
    fn test_stream_pull_error_without_data_fails() {
        let root = tempfile::tempdir().unwrap();
        let mock = MockBackend::new();
        mock.finish_spawned(false);
        let transfers = manager(Arc::new(mock.clone()), root.path());
        let viewer = RecordingViewer::new(ViewerExit::Exited);

        let err = transfers
            .stream_file("/sdcard/a.mp4", &viewer, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::PullFailed { ref reason, .. } if reason.contains("exited with an error")));
        assert!(mock.was_reaped());
        assert!(viewer.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lock_file_name_is_not_pullable() {
        let root = tempfile::tempdir().unwrap();
        let transfers = manager(Arc::new(PullingBackend::default()), root.path());
        assert!(matches!(
            transfers.fetch("/sdcard/.owner.lock", Purpose::Preview),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_purge_stale() {
        let root = tempfile::tempdir().unwrap();
        let config = TransferConfig::default()
            .with_scratch_root(root.path())
            .with_stale_after(Duration::ZERO);
        let transfers = TransferManager::new(Arc::new(MockBackend::new()), config);
        assert_eq!(transfers.purge_stale(Purpose::Preview).unwrap(), 0);

        // Left behind by a process that died: lock file present, lock free
        let dir = root.path().join("preview");
        fs::create_dir_all(dir.join("op-crashed")).unwrap();
        fs::write(dir.join("op-crashed").join(OWNER_LOCK), b"").unwrap();
        fs::create_dir_all(dir.join("op-old")).unwrap();
        fs::write(dir.join("stray.jpg"), b"x").unwrap();
        assert_eq!(transfers.purge_stale(Purpose::Preview).unwrap(), 3);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_purge_keeps_recent_unlocked_entries() {
        let root = tempfile::tempdir().unwrap();
        let transfers = manager(Arc::new(MockBackend::new()), root.path());
        assert_eq!(transfers.config().stale_after, DEFAULT_STALE_AFTER);

        let dir = root.path().join("preview");
        fs::create_dir_all(dir.join("op-new")).unwrap();
        fs::write(dir.join("stray.jpg"), b"x").unwrap();
        assert_eq!(transfers.purge_stale(Purpose::Preview).unwrap(), 0);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);
    }

    #[test]
    fn test_purge_spares_live_entries_of_other_managers() {
        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(PullingBackend {
            payload: b"jpeg".to_vec(),
            ..Default::default()
        });
        let first = manager(backend.clone(), root.path());
        let config = TransferConfig::default()
            .with_scratch_root(root.path())
            .with_stale_after(Duration::ZERO);
        let second = TransferManager::new(backend, config);

        let cached = first.fetch("/sdcard/a.jpg", Purpose::Preview).unwrap();
        assert_eq!(second.purge_stale(Purpose::Preview).unwrap(), 0);
        assert_eq!(fs::read(cached.path()).unwrap(), b"jpeg");

        // Once the owner lets go the entry is gone and nothing is left to purge
        let dir = cached.dir().to_path_buf();
        drop(cached);
        assert!(!dir.exists());
        assert_eq!(second.purge_stale(Purpose::Preview).unwrap(), 0);
    }
}
