//! Device subcommand handlers.

use serde::Serialize;
use tabled::Tabled;

use pullpoint_core::{DEFAULT_ONVIF_PORT, RegistryRecord};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

/// Registry record as shown to the user. Never carries the password.
#[derive(Debug, Serialize)]
struct DeviceView {
    id: u32,
    address: String,
    port: u32,
    username: String,
    events_enabled: bool,
    disabled: bool,
    watchable: bool,
}

impl From<&RegistryRecord> for DeviceView {
    fn from(r: &RegistryRecord) -> Self {
        Self {
            id: r.id,
            address: r.address.trim().to_owned(),
            port: r
                .port
                .filter(|p| *p != 0)
                .unwrap_or(u32::from(DEFAULT_ONVIF_PORT)),
            username: r.display_username(),
            events_enabled: r.events_enabled,
            disabled: r.disabled,
            watchable: r.events_enabled && !r.disabled,
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: u32,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "User")]
    username: String,
    #[tabled(rename = "Events")]
    events: String,
    #[tabled(rename = "Disabled")]
    disabled: String,
}

pub fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List { all } => {
            let cfg = config::load(global)?;
            let mut devices: Vec<DeviceView> = cfg
                .devices
                .iter()
                .map(DeviceView::from)
                .filter(|d| all || d.watchable)
                .collect();
            devices.sort_by_key(|d| d.id);

            let color = output::should_color(global.color);
            let out = output::render_list(
                global.output,
                &devices,
                |d| DeviceRow {
                    id: d.id,
                    address: format!("{}:{}", d.address, d.port),
                    username: d.username.clone(),
                    events: output::flag(d.events_enabled, color),
                    disabled: output::flag(d.disabled, color),
                },
                |d| d.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
