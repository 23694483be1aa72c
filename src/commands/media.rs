use adbkit::transfer::{estimated_pull_secs, PREVIEW_WARN_SIZE};
use adbkit::types::{file_name, parent_path};
use adbkit::{
    CancelToken, FileEntry, PathPolicy, PreviewOutcome, Purpose, TransferManager, Viewer,
    ViewerExit,
};
use anyhow::{Context as _, Result};
use dialoguer::Confirm;

use super::{navigator, require_device};
use crate::progress;
use crate::ui;
use crate::Context;

fn transfers(ctx: &Context, purpose: Purpose) -> TransferManager {
    let manager = ctx.client.transfers(ctx.config.transfer_config());
    match manager.purge_stale(purpose) {
        Ok(0) => {}
        Ok(n) => log::info!("removed {n} stale {} cache entries", purpose.dir_name()),
        Err(e) => log::warn!("could not clean {} cache: {e}", purpose.dir_name()),
    }
    manager
}

/// Look the file up in its parent listing to learn its size
fn remote_entry(ctx: &Context, remote: &str) -> Option<FileEntry> {
    let state = navigator(ctx).list_directory(Some(&parent_path(remote)));
    state.files.into_iter().find(|f| !f.is_dir && f.path == remote)
}

/// Question to ask before pulling a large file, if any
fn large_file_prompt(entry: &FileEntry) -> Option<String> {
    if entry.size <= PREVIEW_WARN_SIZE {
        return None;
    }
    Some(format!(
        "{} is {}, about {}s to download. Continue?",
        entry.name,
        ui::format_size(entry.size),
        estimated_pull_secs(entry.size)
    ))
}

// ============================================================================
// Preview
// ============================================================================

pub fn preview(ctx: &Context, remote: &str, yes: bool) -> Result<()> {
    PathPolicy::new(ctx.allow_system).check(remote)?;
    require_device(ctx)?;

    if let Some(entry) = remote_entry(ctx, remote) {
        if let Some(prompt) = large_file_prompt(&entry).filter(|_| !yes) {
            let confirmed = Confirm::new()
                .with_prompt(prompt)
                .default(true)
                .interact()
                .context("Failed to read confirmation")?;
            if !confirmed {
                ui::info("Cancelled");
                return Ok(());
            }
        }
    } else {
        log::debug!("{remote} not found in its parent listing, pulling anyway");
    }

    let viewer = ctx.config.viewer();
    let manager = transfers(ctx, Purpose::Preview);

    let pb = progress::spinner(&format!("Downloading {}", file_name(remote)), ctx.quiet);
    let outcome = manager.preview_file(remote, &viewer);
    progress::finish_clear(&pb);

    match outcome? {
        PreviewOutcome::Closed => ui::success(&format!("Closed {}", file_name(remote))),
        PreviewOutcome::Opened(cached) => {
            ui::success(&format!("Opened {} with {}", cached.path().display(), viewer.program()));
            let keep = Confirm::new()
                .with_prompt("Keep a copy in the current directory?")
                .default(false)
                .interact()
                .context("Failed to read confirmation")?;
            if keep {
                let destination = std::env::current_dir()?.join(file_name(cached.remote()));
                let bytes = cached.save_to(&destination)?;
                ui::success(&format!(
                    "Saved {} ({})",
                    destination.display(),
                    ui::format_size(bytes)
                ));
            }
            // Dropping `cached` removes the local copy
        }
    }
    Ok(())
}

// ============================================================================
// Stream
// ============================================================================

pub fn stream(ctx: &Context, remote: &str) -> Result<()> {
    PathPolicy::new(ctx.allow_system).check(remote)?;
    require_device(ctx)?;

    let kind = FileEntry::new(file_name(remote), remote, 0, false).kind();
    if !kind.is_streamable() {
        ui::warn(&format!("{} is not audio or video", file_name(remote)));
    }

    let viewer = ctx.config.viewer();
    if !viewer.waits() {
        ui::warn(&format!(
            "{} returns immediately, so the download stops once it opens the file",
            viewer.program()
        ));
        ui::dim("Set `viewer` in the config to a player such as \"mpv\" or \"vlc\".");
    }

    run_stream(ctx, remote, &viewer, &CancelToken::new())
}

fn run_stream(ctx: &Context, remote: &str, viewer: &dyn Viewer, cancel: &CancelToken) -> Result<()> {
    let manager = transfers(ctx, Purpose::Stream);
    let pb = progress::spinner(
        &format!(
            "Buffering {} for {}s",
            file_name(remote),
            manager.config().buffer.as_secs()
        ),
        ctx.quiet,
    );
    let report = manager.stream_file(remote, viewer, cancel);
    progress::finish_clear(&pb);

    let report = report?;
    if report.cancelled {
        ui::info("Cancelled");
        return Ok(());
    }
    match report.viewer {
        Some(ViewerExit::Exited) if report.pull_terminated => {
            ui::success("Player closed, download stopped");
        }
        Some(ViewerExit::Exited) => ui::success("Player closed"),
        Some(ViewerExit::Detached) | None => ui::info("Player launched, cache removed"),
    }
    Ok(())
}
