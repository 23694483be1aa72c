use adbkit::types::{file_name, parent_path};
use adbkit::{FileEntry, FileKind, SortKey};
use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use dialoguer::Confirm;
use std::path::{Path, PathBuf};

use super::{navigator, require_device};
use crate::progress;
use crate::ui;
use crate::Context;

// ============================================================================
// Listing
// ============================================================================

pub fn list(ctx: &Context, path: Option<&str>, sort: SortKey, reverse: bool) -> Result<()> {
    require_device(ctx)?;
    let nav = navigator(ctx);

    let state = nav.list_directory(path);
    if let Some(message) = &state.error_message {
        bail!(
            "Cannot list {}: {message}",
            path.unwrap_or(state.current_path.as_str())
        );
    }

    let files = state.sorted_files(sort, reverse);
    ui::header(&state.current_path);

    let real = files.iter().filter(|f| !f.is_parent_marker()).count();
    if real == 0 {
        ui::dim("(empty)");
        return Ok(());
    }

    for entry in &files {
        println!("{}", entry_line(entry, ctx.verbose > 0));
    }

    let total: u64 = files.iter().filter(|f| !f.is_dir).map(|f| f.size).sum();
    println!();
    ui::dim(&format!("{real} entries, {} in files", ui::format_size(total)));
    Ok(())
}

/// One listing row: size, date, name (and permissions/owner when verbose)
fn entry_line(entry: &FileEntry, verbose: bool) -> String {
    if entry.is_parent_marker() {
        return format!("  {:>10}  {:<18}  {}", "", "", entry.name.dimmed());
    }

    let name = match entry.kind() {
        FileKind::Folder => format!("{}/", entry.name).blue().bold().to_string(),
        FileKind::Image | FileKind::Video | FileKind::Audio => entry.name.magenta().to_string(),
        FileKind::Apk | FileKind::Archive => entry.name.yellow().to_string(),
        FileKind::Document | FileKind::Other => entry.name.clone(),
    };

    let prefix = if verbose {
        format!(
            "{} {:<8} ",
            entry.permissions.dimmed(),
            entry.owner.as_deref().unwrap_or("-")
        )
    } else {
        String::new()
    };

    format!(
        "  {prefix}{:>10}  {:<18}  {name}",
        entry.formatted_size(),
        entry.formatted_date().dimmed()
    )
}

// ============================================================================
// Mutations
// ============================================================================

pub fn mkdir(ctx: &Context, path: &str) -> Result<()> {
    require_device(ctx)?;
    let outcome = navigator(ctx).create_directory(path);
    ui::outcome(&format!("Created {path}"), &outcome)
}

pub fn remove(ctx: &Context, path: &str, recursive: bool, yes: bool) -> Result<()> {
    require_device(ctx)?;

    if !yes {
        let what = if recursive {
            format!("{path} and everything in it")
        } else {
            path.to_string()
        };
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete {what}?"))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::info("Cancelled");
            return Ok(());
        }
    }

    let outcome = navigator(ctx).delete_item(path, recursive);
    ui::outcome(&format!("Deleted {path}"), &outcome)
}

pub fn rename(ctx: &Context, from: &str, to: &str) -> Result<()> {
    require_device(ctx)?;
    let outcome = navigator(ctx).rename_item(from, to);
    ui::outcome(&format!("Moved {from} → {to}"), &outcome)
}

pub fn copy(ctx: &Context, from: &str, to: &str, recursive: bool) -> Result<()> {
    require_device(ctx)?;
    let outcome = navigator(ctx).copy_item(from, to, recursive);
    ui::outcome(&format!("Copied {from} → {to}"), &outcome)
}

// ============================================================================
// Transfers
// ============================================================================

pub fn pull(ctx: &Context, remote: &str, local: Option<&Path>) -> Result<()> {
    require_device(ctx)?;
    let target = pull_target(remote, local)?;

    let pb = progress::spinner(&format!("Pulling {}", file_name(remote)), ctx.quiet);
    let outcome = navigator(ctx).pull_file(remote, &target);
    progress::finish_clear(&pb);

    ui::outcome(
        &format!("Pulled {remote} → {}", target.display()),
        &outcome,
    )
}

pub fn push(ctx: &Context, local: &Path, remote: &str) -> Result<()> {
    if !local.is_file() {
        bail!("Not a file: {}", local.display());
    }
    require_device(ctx)?;

    let size = local.metadata().map(|m| m.len()).unwrap_or(0);
    let pb = progress::spinner(
        &format!("Pushing {} ({})", local.display(), ui::format_size(size)),
        ctx.quiet,
    );
    let outcome = navigator(ctx).push_file(local, remote);
    progress::finish_clear(&pb);

    ui::outcome(
        &format!("Pushed {} → {remote}", local.display()),
        &outcome,
    )
}

/// Local destination of a pull: a directory gets the remote file name
fn pull_target(remote: &str, local: Option<&Path>) -> Result<PathBuf> {
    let name = file_name(remote);
    if name.is_empty() {
        bail!("Nothing to pull at {remote}");
    }
    let target = match local {
        Some(path) if path.is_dir() => path.join(name),
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?.join(name),
    };
    log::debug!("pull {remote} (in {}) -> {}", parent_path(remote), target.display());
    Ok(target)
}
