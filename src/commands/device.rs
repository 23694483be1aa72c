use anyhow::Result;

use super::require_device;
use crate::ui;
use crate::Context;

pub fn run(ctx: &Context) -> Result<()> {
    let info = require_device(ctx)?;

    ui::header(&format!("{} {}", info.manufacturer, info.model));
    ui::kv("Android", &info.os_version);

    if info.total_storage_gb > 0.0 {
        let percent = info.storage_used_percentage();
        ui::kv(
            "Storage",
            &format!(
                "{:.1} GB used of {:.1} GB ({:.0}%)",
                info.used_storage_gb(),
                info.total_storage_gb,
                percent
            ),
        );
        println!("  {}", ui::usage_bar(percent, 30));
        ui::kv("Free", &format!("{:.1} GB", info.available_storage_gb));
    } else {
        ui::kv("Storage", "unknown");
    }

    if ctx.verbose > 0 {
        if let Some(location) = ctx.client.backend().tool_location() {
            ui::kv("adb", &location.path().display().to_string());
        }
    }

    Ok(())
}
