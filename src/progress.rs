//! Spinners for the slow device round-trips.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Start a spinner, or a hidden one in quiet mode
pub fn spinner(msg: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}
