//! Command handlers and the hub they share.

pub mod devices;
pub mod ops;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use hostwatch_api::SshTransport;
use hostwatch_config::{Config, resolve_device};
use hostwatch_core::{Hub, MemoryRegistry, TargetSelection};

use crate::cli::{Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Settings every handler needs, resolved once in `main`.
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    pub format: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices => devices::handle(ctx, global),
        Command::Watch => watch::handle(ctx, global).await,
        other => ops::handle(other, ctx, global).await,
    }
}

/// Build a hub holding the selected devices (every device when none are
/// named). Names that are not configured are left for the dispatcher to
/// report.
pub fn build_hub(
    ctx: &Context,
    selected: &[String],
) -> Result<(Arc<Hub>, Arc<MemoryRegistry>), CliError> {
    if ctx.config.devices.is_empty() {
        return Err(CliError::NoDevices {
            path: ctx.config_path.display().to_string(),
        });
    }

    let registry = Arc::new(MemoryRegistry::new());
    let hub = Hub::new(registry.clone());
    for (id, entry) in &ctx.config.devices {
        if !selected.is_empty() && !selected.contains(id) {
            continue;
        }
        let resolved = resolve_device(id, entry, &ctx.config.defaults)?;
        debug!(device = %id, host = %resolved.ssh.host, "adding device");
        hub.add_device(resolved.device, Arc::new(SshTransport::new(resolved.ssh)))?;
    }
    Ok((hub, registry))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupMode {
    /// Initial sensor read and running timers.
    Watch,
    /// Probe and register only; the operation reads what it needs.
    Dispatch,
}

/// Run every device's setup. Failures are logged; the affected devices
/// still answer operations with their own error records.
pub async fn setup(hub: &Hub, mode: SetupMode) {
    let outcomes = match mode {
        SetupMode::Watch => hub.setup_all(true).await,
        SetupMode::Dispatch => hub.setup_all_for_dispatch().await,
    };
    for (device, outcome) in outcomes {
        if let Err(e) = outcome {
            warn!(device = %device, error = %e, "device setup failed");
        }
    }
}

/// Selection for whole-device operations.
pub fn device_selection(global: &GlobalOpts) -> TargetSelection {
    if global.devices.is_empty() {
        TargetSelection::All
    } else {
        TargetSelection::Devices(global.devices.clone())
    }
}
