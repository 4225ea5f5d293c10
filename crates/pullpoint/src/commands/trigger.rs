//! Manual trigger emission.

use pullpoint_core::{CoreError, DeviceRegistry, TriggerRecord, build_sink};

use crate::cli::{GlobalOpts, TriggerArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &TriggerArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;

    // Only known devices; enabled state is not checked for manual triggers.
    let registry = pullpoint_config::static_registry(&cfg);
    if registry.find_by_id(args.device).await?.is_none() {
        return Err(CoreError::DeviceNotFound {
            device_id: args.device,
        }
        .into());
    }

    let trigger_config = pullpoint_config::to_trigger_config(&cfg)?;
    let sink = build_sink(&trigger_config)?;
    let record = TriggerRecord::new(args.device, args.label, args.transition);

    tracing::info!(
        device_id = %record.device_id,
        label = %record.label,
        transition = %record.transition,
        mode = ?trigger_config.mode,
        "emitting manual trigger"
    );
    sink.deliver(&record).await?;

    let out = output::render_single(
        global.output,
        &record,
        ToString::to_string,
        ToString::to_string,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
