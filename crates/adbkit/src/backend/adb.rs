//! Real backend that shells out to the `adb` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, trace};

use crate::error::{Error, Result};

use super::{Backend, RunningCommand, SPAWN_ERROR_PREFIX};

/// How a [`ToolLocation`] was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Explicit path from configuration or the command line
    Configured,
    /// First existing entry of the fixed search list
    SearchList,
    /// Bare program name, left to the process search path
    SearchPath,
}

/// Where the `adb` executable lives. Resolved once, then passed around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolLocation {
    path: PathBuf,
    resolution: Resolution,
}

impl ToolLocation {
    /// Program name used when nothing in the search list exists.
    pub const PROGRAM: &'static str = "adb";

    /// Use an explicit path without checking it.
    pub fn configured(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            resolution: Resolution::Configured,
        }
    }

    /// Resolve the tool: explicit override, then the search list, then `adb`.
    pub fn resolve(override_path: Option<&Path>) -> Self {
        if let Some(path) = override_path {
            return Self::configured(path);
        }
        Self::from_candidates(&search_list())
    }

    /// First candidate that exists, else the bare program name.
    pub fn from_candidates(candidates: &[PathBuf]) -> Self {
        candidates
            .iter()
            .find(|p| p.exists())
            .map(|p| Self {
                path: p.clone(),
                resolution: Resolution::SearchList,
            })
            .unwrap_or_else(|| Self {
                path: PathBuf::from(Self::PROGRAM),
                resolution: Resolution::SearchPath,
            })
    }

    /// Path (or bare name) to execute
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How the location was determined
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// Common install locations of the platform tools.
pub fn search_list() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/usr/local/bin/adb"), // Intel Homebrew, manual installs
        PathBuf::from("/opt/homebrew/bin/adb"), // Apple Silicon Homebrew
    ];

    for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
        if let Ok(sdk) = std::env::var(var) {
            paths.push(PathBuf::from(sdk).join("platform-tools").join("adb"));
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let home = PathBuf::from(home);
        paths.push(home.join("Library/Android/sdk/platform-tools/adb")); // Android Studio, macOS
        paths.push(home.join("Android/Sdk/platform-tools/adb")); // Android Studio, Linux
    }

    paths
}

/// Backend that executes real `adb` commands.
pub struct AdbBackend {
    location: ToolLocation,
}

impl AdbBackend {
    /// Create a backend for an already resolved location.
    pub fn new(location: ToolLocation) -> Self {
        Self { location }
    }

    /// Where this backend runs `adb` from.
    pub fn location(&self) -> &ToolLocation {
        &self.location
    }
}

impl Backend for AdbBackend {
    fn execute(&self, args: &[&str]) -> String {
        debug!("adb {}", args.join(" "));

        let output = match Command::new(self.location.path())
            .args(args)
            .stdin(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!("failed to execute {}: {e}", self.location.path().display());
                return format!(
                    "{SPAWN_ERROR_PREFIX} {}: {e}",
                    self.location.path().display()
                );
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        trace!("adb returned {} bytes", text.len());
        text
    }

    fn spawn(&self, args: &[&str]) -> Result<Box<dyn RunningCommand>> {
        debug!("adb {} (background)", args.join(" "));

        let child = Command::new(self.location.path())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Spawn {
                program: self.location.path().to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(Box::new(child))
    }

    fn tool_location(&self) -> Option<&ToolLocation> {
        Some(&self.location)
    }
}
