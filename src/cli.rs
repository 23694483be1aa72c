use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "droidscope")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Inspect and manage an Android device over adb", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the adb executable (overrides config and search list)
    #[arg(long, global = true, env = "DROIDSCOPE_ADB")]
    pub adb: Option<PathBuf>,

    /// Allow browsing and editing system directories (/system, /proc, ...)
    #[arg(long, global = true)]
    pub allow_system: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the connected device
    Device,

    /// List a directory on the device
    Ls {
        /// Remote directory (default: configured start path)
        path: Option<String>,

        /// Sort order
        #[arg(short, long, value_enum, default_value = "name")]
        sort: SortArg,

        /// Reverse the sort order
        #[arg(short, long)]
        reverse: bool,
    },

    /// Create a directory (with parents)
    Mkdir {
        /// Remote path
        path: String,
    },

    /// Delete a file or directory
    Rm {
        /// Remote path
        path: String,

        /// Delete a directory and everything in it
        #[arg(short, long)]
        recursive: bool,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Rename or move a file or directory
    Mv {
        /// Current remote path
        from: String,

        /// New remote path
        to: String,
    },

    /// Copy a file or directory on the device
    Cp {
        /// Source remote path
        from: String,

        /// Destination remote path
        to: String,

        /// Copy directories recursively
        #[arg(short, long)]
        recursive: bool,
    },

    /// Copy a file from the device
    Pull {
        /// Remote path
        remote: String,

        /// Local destination (default: current directory)
        local: Option<PathBuf>,
    },

    /// Copy a file to the device
    Push {
        /// Local file
        local: PathBuf,

        /// Remote destination
        remote: String,
    },

    /// Storage dashboard: totals, categories and large files
    Storage {
        /// Print the dashboard as JSON
        #[arg(long)]
        json: bool,

        /// Skip the large file scan
        #[arg(long)]
        no_large_files: bool,
    },

    /// List the largest files in media folders
    LargeFiles {
        /// Skip this many files
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Show at most this many files
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Minimum file size (e.g., 10MB, 1GB)
        #[arg(short, long)]
        min_size: Option<String>,
    },

    /// List files of one storage category
    Category {
        /// Category to list
        #[arg(value_enum)]
        category: CategoryArg,

        /// Show at most this many entries
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Pull a file and open it locally
    Preview {
        /// Remote path
        remote: String,

        /// Skip the large file confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Play a video or audio file while it downloads
    Stream {
        /// Remote path
        remote: String,
    },

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

// ============================================================================
// Value enums
// ============================================================================

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Name,
    Size,
    Date,
}

impl From<SortArg> for adbkit::SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => Self::Name,
            SortArg::Size => Self::Size,
            SortArg::Date => Self::Date,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CategoryArg {
    Photos,
    Videos,
    Audio,
    Documents,
    Apps,
    Other,
}

impl From<CategoryArg> for adbkit::StorageCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Photos => Self::Photos,
            CategoryArg::Videos => Self::Videos,
            CategoryArg::Audio => Self::Audio,
            CategoryArg::Documents => Self::Documents,
            CategoryArg::Apps => Self::Apps,
            CategoryArg::Other => Self::Other,
        }
    }
}
