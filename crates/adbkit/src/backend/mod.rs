//! Command executor abstraction.
//!
//! The [`Backend`] trait is the only place adbkit talks to the outside world.
//! Every component takes an `Arc<dyn Backend>`, which allows:
//! - Real execution through the `adb` binary ([`adb::AdbBackend`])
//! - Canned responses for tests ([`MockBackend`])
//!
//! # Testing
//!
//! ```
//! use adbkit::backend::{Backend, MockBackend};
//!
//! let mock = MockBackend::new();
//! mock.respond("devices", "List of devices attached\nR58N\tdevice\n");
//!
//! let output = mock.execute(&["devices"]);
//! assert!(output.contains("\tdevice"));
//! assert_eq!(mock.calls(), vec!["devices".to_string()]);
//! ```

pub mod adb;

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub use adb::{AdbBackend, Resolution, ToolLocation};

/// Prefix of the text returned when the tool could not be started.
///
/// It contains the word "error" so mutating operations classify it as a
/// failure, while parsers simply find no usable rows in it.
pub const SPAWN_ERROR_PREFIX: &str = "error: failed to execute";

/// Runs the external bridge tool.
pub trait Backend: Send + Sync {
    /// Run the tool once with `args` and return stdout followed by stderr.
    ///
    /// Never fails: a spawn failure yields a string starting with
    /// [`SPAWN_ERROR_PREFIX`]. Blocks the calling thread until the tool exits.
    fn execute(&self, args: &[&str]) -> String;

    /// Start the tool without waiting for it (used for streaming pulls).
    fn spawn(&self, args: &[&str]) -> Result<Box<dyn RunningCommand>>;

    /// Where the real tool lives, if this backend runs one.
    fn tool_location(&self) -> Option<&ToolLocation> {
        None
    }
}

/// A child process started by [`Backend::spawn`].
pub trait RunningCommand: Send {
    /// Whether the process is still running
    fn is_running(&mut self) -> bool;

    /// Kill the process if it is still running and reap it
    fn terminate(&mut self);

    /// Block until the process exits. Returns true on a zero exit status.
    fn wait(&mut self) -> bool;
}

impl RunningCommand for std::process::Child {
    fn is_running(&mut self) -> bool {
        matches!(self.try_wait(), Ok(None))
    }

    fn terminate(&mut self) {
        if self.is_running() {
            let _ = self.kill();
        }
        let _ = std::process::Child::wait(self);
    }

    fn wait(&mut self) -> bool {
        std::process::Child::wait(self)
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

// ============================================================================
// Mock backend
// ============================================================================

/// In-memory backend for tests.
///
/// Responses are matched by substring against the space-joined arguments,
/// first registered rule wins. Unmatched calls return an empty string, the
/// same thing a missing device produces.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    rules: Arc<Mutex<Vec<(String, String)>>>,
    calls: Arc<Mutex<Vec<String>>>,
    pull_payload: Arc<Mutex<Option<Vec<u8>>>>,
    pull_exit: Arc<Mutex<Option<bool>>>,
    terminated: Arc<AtomicBool>,
    reaped: Arc<AtomicBool>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call whose joined arguments contain `pattern`.
    pub fn respond(&self, pattern: impl Into<String>, output: impl Into<String>) {
        let mut rules = self.rules.lock().unwrap();
        rules.push((pattern.into(), output.into()));
    }

    /// Bytes written to the local destination of a spawned `pull`.
    pub fn set_pull_payload(&self, bytes: impl Into<Vec<u8>>) {
        *self.pull_payload.lock().unwrap() = Some(bytes.into());
    }

    /// Make spawned commands exit at once with the given success status
    /// instead of running until terminated.
    pub fn finish_spawned(&self, success: bool) {
        *self.pull_exit.lock().unwrap() = Some(success);
    }

    /// Joined arguments of every `execute`/`spawn` call so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose joined arguments contain `pattern`.
    pub fn call_count(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    /// Whether a spawned command was terminated before finishing.
    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Whether a spawned command was waited on.
    pub fn was_reaped(&self) -> bool {
        self.reaped.load(Ordering::SeqCst)
    }

    fn record(&self, args: &[&str]) -> String {
        let joined = args.join(" ");
        self.calls.lock().unwrap().push(joined.clone());
        joined
    }
}

impl Backend for MockBackend {
    fn execute(&self, args: &[&str]) -> String {
        let joined = self.record(args);
        let rules = self.rules.lock().unwrap();
        rules
            .iter()
            .find(|(pattern, _)| joined.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }

    fn spawn(&self, args: &[&str]) -> Result<Box<dyn RunningCommand>> {
        self.record(args);
        if let (Some("pull"), Some(local)) = (args.first().copied(), args.last()) {
            if let Some(bytes) = self.pull_payload.lock().unwrap().as_ref() {
                std::fs::write(local, bytes)?;
            }
        }
        let exit = *self.pull_exit.lock().unwrap();
        Ok(Box::new(MockCommand {
            running: exit.is_none(),
            success: exit.unwrap_or(true),
            terminated: Arc::clone(&self.terminated),
            reaped: Arc::clone(&self.reaped),
        }))
    }
}

/// Spawned mock process. Stays "running" until terminated or waited on,
/// unless [`MockBackend::finish_spawned`] was called.
struct MockCommand {
    running: bool,
    success: bool,
    terminated: Arc<AtomicBool>,
    reaped: Arc<AtomicBool>,
}

impl RunningCommand for MockCommand {
    fn is_running(&mut self) -> bool {
        self.running
    }

    fn terminate(&mut self) {
        if self.running {
            self.terminated.store(true, Ordering::SeqCst);
        }
        self.running = false;
    }

    fn wait(&mut self) -> bool {
        self.running = false;
        self.reaped.store(true, Ordering::SeqCst);
        self.success
    }
}
