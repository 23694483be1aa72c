mod cli;
mod commands;
mod config;
mod progress;
mod ui;

use adbkit::Client;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Config,
    pub client: Client,
    /// `--allow-system` or `allow_system_access` in the config
    pub allow_system: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    // Completions and config commands work without a device or a valid config
    match cli.command {
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "droidscope", &mut io::stdout());
            return Ok(());
        }
        Command::Config(cmd) => return commands::config::run(cmd),
        _ => {}
    }

    let config = Config::load()?;
    let adb_path = cli.adb.clone().or_else(|| config.adb_path());
    let client = Client::with_adb_path(adb_path.as_deref());
    log::debug!("adb: {:?}", client.backend().tool_location());

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        allow_system: cli.allow_system || config.allow_system_access,
        config,
        client,
    };

    let result = match cli.command {
        Command::Device => commands::device::run(&ctx),
        Command::Ls {
            path,
            sort,
            reverse,
        } => commands::files::list(&ctx, path.as_deref(), sort.into(), reverse),
        Command::Mkdir { path } => commands::files::mkdir(&ctx, &path),
        Command::Rm {
            path,
            recursive,
            yes,
        } => commands::files::remove(&ctx, &path, recursive, yes),
        Command::Mv { from, to } => commands::files::rename(&ctx, &from, &to),
        Command::Cp {
            from,
            to,
            recursive,
        } => commands::files::copy(&ctx, &from, &to, recursive),
        Command::Pull { remote, local } => commands::files::pull(&ctx, &remote, local.as_deref()),
        Command::Push { local, remote } => commands::files::push(&ctx, &local, &remote),
        Command::Storage {
            json,
            no_large_files,
        } => commands::storage::dashboard(&ctx, json, !no_large_files),
        Command::LargeFiles {
            offset,
            limit,
            min_size,
        } => commands::storage::large_files(&ctx, offset, limit, min_size.as_deref()),
        Command::Category { category, limit } => {
            commands::storage::category(&ctx, category.into(), limit)
        }
        Command::Preview { remote, yes } => commands::media::preview(&ctx, &remote, yes),
        Command::Stream { remote } => commands::media::stream(&ctx, &remote),
        Command::Config(_) | Command::Completions { .. } => Ok(()),
    };

    if let Some(hint) = result
        .as_ref()
        .err()
        .and_then(|e| e.downcast_ref::<adbkit::Error>())
        .and_then(commands::hint)
    {
        ui::dim(hint);
    }
    result
}
