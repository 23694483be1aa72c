pub mod config;
pub mod device;
pub mod files;
pub mod media;
pub mod storage;

use adbkit::{DeviceInfo, Error, Navigator};
use anyhow::Result;

use crate::progress;
use crate::Context;

/// Probe for a device
pub fn require_device(ctx: &Context) -> Result<DeviceInfo> {
    let pb = progress::spinner("Looking for a device...", ctx.quiet);
    let result = ctx.client.require_device();
    progress::finish_clear(&pb);

    let info = result?;
    log::info!("using {} {}", info.manufacturer, info.model);
    Ok(info)
}

/// What the user can do about a failed command, if anything
pub fn hint(err: &Error) -> Option<&'static str> {
    match err {
        Error::ToolNotFound(_) => {
            Some("Install Android platform-tools, or pass --adb / set adb_path in the config.")
        }
        Error::Disconnected => Some(
            "Connect a device with USB debugging enabled, accept the prompt on it and try again.",
        ),
        Error::Restricted(_) => {
            Some("Pass --allow-system or set allow_system_access to reach system paths.")
        }
        e if e.is_transient() => {
            Some("Another transfer is still running. Try again when it finishes.")
        }
        _ => None,
    }
}

/// Navigator honoring the effective access policy and start path
pub fn navigator(ctx: &Context) -> Navigator {
    ctx.client
        .navigator(ctx.allow_system)
        .with_start_path(ctx.config.start_path.clone())
}

#[cfg(test)]
pub fn test_context(mock: adbkit::MockBackend) -> Context {
    use std::sync::Arc;

    Context {
        verbose: 0,
        quiet: true,
        config: crate::config::Config::default(),
        client: adbkit::Client::with_backend(Arc::new(mock)),
        allow_system: false,
    }
}
