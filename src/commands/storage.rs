use adbkit::{AnalyzerEvent, CategoryStats, Dashboard, Measurement, StorageAnalyzer, StorageCategory};
use anyhow::{anyhow, Result};
use colored::Colorize;

use super::require_device;
use crate::progress;
use crate::ui;
use crate::Context;

fn analyzer(ctx: &Context, min_size: u64) -> StorageAnalyzer {
    ctx.client.analyzer().with_large_file_min_size(min_size)
}

fn configured_min_size(ctx: &Context, flag: Option<&str>) -> Result<u64> {
    match flag {
        Some(size) => ui::parse_size(size).map_err(|e| anyhow!("--min-size: {e}")),
        None => ctx.config.large_file_min_size(),
    }
}

// ============================================================================
// Dashboard
// ============================================================================

pub fn dashboard(ctx: &Context, json: bool, with_large_files: bool) -> Result<()> {
    require_device(ctx)?;
    let min_size = configured_min_size(ctx, None)?;
    let analyzer = analyzer(ctx, min_size);

    let pb = progress::spinner("Reading storage usage...", ctx.quiet || json);
    let events = analyzer.subscribe();
    let listener = pb.clone();
    std::thread::spawn(move || {
        for event in events {
            match event {
                AnalyzerEvent::StatsReady(_) => listener.set_message("Measuring categories..."),
                AnalyzerEvent::LargeFilesStarted => {
                    listener.set_message("Scanning media folders for large files...");
                }
                AnalyzerEvent::DashboardReady(_) | AnalyzerEvent::LargeFilesReady(_) => {}
            }
        }
    });

    if !with_large_files {
        let snapshot = analyzer.analyze_dashboard();
        progress::finish_clear(&pb);
        return if json {
            print_json(&snapshot)
        } else {
            print_dashboard(&snapshot);
            Ok(())
        };
    }

    let scan = analyzer.analyze();
    if !json {
        // The breakdown is ready while the scan keeps running
        pb.suspend(|| print_dashboard(&analyzer.snapshot()));
    }
    let large = scan.join();
    progress::finish_clear(&pb);

    if json {
        return print_json(&analyzer.snapshot());
    }

    ui::section(&format!("Large files (≥ {})", ui::format_size(min_size)));
    if large.is_empty() {
        ui::dim("None found");
    }
    for file in large.iter().take(10) {
        println!(
            "  {:>10}  {}",
            file.formatted_size(),
            ui::truncate_path(&file.path, 60)
        );
    }
    if large.len() > 10 {
        ui::dim(&format!(
            "... and {} more (droidscope large-files --offset 10)",
            large.len() - 10
        ));
    }
    Ok(())
}

fn print_json(dashboard: &Dashboard) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(dashboard)?);
    Ok(())
}

fn print_dashboard(dashboard: &Dashboard) {
    ui::header("Storage");
    match dashboard.stats {
        Some(stats) => {
            ui::kv(
                "Used",
                &format!(
                    "{} of {} ({:.0}%)",
                    stats.formatted_used(),
                    stats.formatted_total(),
                    stats.usage_percentage()
                ),
            );
            println!("  {}", ui::usage_bar(stats.usage_percentage(), 30));
            ui::kv("Free", &stats.formatted_free());
        }
        None => ui::warn("Storage totals unavailable"),
    }
    if let Some(message) = &dashboard.error_message {
        ui::warn(message);
    }

    ui::section("Categories");
    let used = dashboard.stats.map_or(0, |s| s.used);
    for stats in &dashboard.categories {
        println!("{}", category_line(stats, used));
    }
}

fn category_line(stats: &CategoryStats, used: u64) -> String {
    let marker = match stats.measurement {
        Measurement::Measured => String::new(),
        Measurement::Estimated => " (estimated)".dimmed().to_string(),
        Measurement::Unavailable => " (unavailable)".yellow().to_string(),
    };
    let count = match stats.category {
        StorageCategory::Apps => format!("{} apps", stats.file_count),
        StorageCategory::Documents | StorageCategory::Other => String::new(),
        _ => format!("{} files", stats.file_count),
    };
    format!(
        "  {:<10} {:>9} {:>5.1}%  {:<12}{marker}",
        stats.category.label(),
        stats.formatted_size(),
        stats.share_of(used),
        count.dimmed()
    )
}

// ============================================================================
// Large files
// ============================================================================

pub fn large_files(
    ctx: &Context,
    offset: usize,
    limit: usize,
    min_size: Option<&str>,
) -> Result<()> {
    let min_size = configured_min_size(ctx, min_size)?;
    require_device(ctx)?;
    let analyzer = analyzer(ctx, min_size);

    let pb = progress::spinner("Scanning media folders...", ctx.quiet);
    let total = analyzer.start_large_file_scan(min_size).join().len();
    progress::finish_clear(&pb);

    let page = analyzer.get_large_files(offset, limit);
    ui::header(&format!("Large files (≥ {})", ui::format_size(min_size)));
    if page.is_empty() {
        ui::dim(if total == 0 {
            "None found"
        } else {
            "No files at this offset"
        });
        return Ok(());
    }

    for (i, file) in page.iter().enumerate() {
        println!(
            "  {:>4}. {:>10}  {}",
            offset + i + 1,
            file.formatted_size(),
            ui::truncate_path(&file.path, 70)
        );
    }
    println!();
    ui::dim(&format!(
        "Showing {}-{} of {total}",
        offset + 1,
        offset + page.len()
    ));
    Ok(())
}

// ============================================================================
// Category listing
// ============================================================================

pub fn category(ctx: &Context, category: StorageCategory, limit: usize) -> Result<()> {
    require_device(ctx)?;
    let analyzer = ctx.client.analyzer();

    let pb = progress::spinner(&format!("Collecting {}...", category.label()), ctx.quiet);
    let files = analyzer.files_for_category(category);
    progress::finish_clear(&pb);

    ui::header(category.label());
    if files.is_empty() {
        ui::dim("Nothing found");
        return Ok(());
    }

    for file in files.iter().take(limit) {
        if category == StorageCategory::Apps {
            println!("  {:<45} {}", file.name, file.path.dimmed());
        } else {
            println!(
                "  {:>10}  {:<18}  {}",
                file.formatted_size(),
                file.formatted_date().dimmed(),
                ui::truncate_path(&file.path, 60)
            );
        }
    }
    if files.len() > limit {
        println!();
        ui::dim(&format!("{} of {} shown (--limit)", limit, files.len()));
    }
    Ok(())
}
