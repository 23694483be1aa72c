use adbkit::ToolLocation;
use anyhow::{bail, Result};

use crate::cli::ConfigCommand;
use crate::config::{config_path, Config};
use crate::ui;

pub fn run(cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(),
        ConfigCommand::Path => {
            println!("{}", config_path()?.display());
            Ok(())
        }
        ConfigCommand::Init { force } => init(force),
    }
}

fn show() -> Result<()> {
    let path = config_path()?;
    let config = Config::load()?;

    ui::header("Configuration");
    ui::kv("File", &path.display().to_string());
    if !path.exists() {
        ui::dim("Not found, showing defaults. Run 'droidscope config init' to create it.");
    }

    ui::section("adb");
    let location = ToolLocation::resolve(config.adb_path().as_deref());
    ui::kv(
        "Executable",
        &format!("{} ({:?})", location.path().display(), location.resolution()),
    );

    ui::section("Settings");
    ui::kv("Start path", &config.start_path);
    ui::kv("System access", &config.allow_system_access.to_string());
    ui::kv("Large file minimum", &config.large_file_min_size);
    ui::kv("Stream buffer", &format!("{}s", config.stream_buffer_secs));
    ui::kv("Viewer", config.viewer.as_deref().unwrap_or("system default"));
    ui::kv(
        "Cache",
        &config.transfer_config().scratch_root.display().to_string(),
    );

    // Surface a bad size now rather than at the first scan
    if let Err(e) = config.large_file_min_size() {
        ui::warn(&e.to_string());
    }
    Ok(())
}

fn init(force: bool) -> Result<()> {
    let path = config_path()?;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let path = Config::default().save()?;
    ui::success(&format!("Wrote {}", path.display()));
    Ok(())
}
