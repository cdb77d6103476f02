//! Flash an image into the simulated bootloader.

use {
    super::info::{load_firmware, resolve_format},
    crate::{
        Cli, CliError, Format,
        progress::{BarSink, session_bar},
        use_fancy_output,
    },
    anyhow::Result,
    bootflash::{
        DeviceProfile, FaultPlan, FlashCoordinator, Outcome, SimulatedBootloader, run_session,
    },
    console::style,
    log::{info, warn},
    std::path::Path,
    std::sync::Arc,
};

/// Simulate command implementation.
pub(crate) fn cmd_simulate(
    cli: &Cli,
    firmware: &Path,
    format: Option<Format>,
    profile: &DeviceProfile,
    plan: FaultPlan,
    json: bool,
) -> Result<()> {
    let format = resolve_format(firmware, format);
    let map = Arc::new(load_firmware(firmware, format, profile)?);
    let pages_total = map.len();

    if !cli.quiet && !json {
        eprintln!(
            "{} Loaded {} ({format}, {pages_total} pages of {} bytes)",
            style("📦").cyan(),
            firmware.display(),
            map.page_size()
        );
    }
    if plan.fail_page.is_some() || plan.disconnect_after.is_some() || plan.stale_acks > 0 {
        info!("Injecting device faults: {plan:?}");
    }

    let pb = session_bar(pages_total, !cli.quiet && !json && use_fancy_output());
    let (device, events) = SimulatedBootloader::new(plan);
    let mut coordinator = FlashCoordinator::new(device, BarSink::new(pb));

    let session = coordinator.start_flash_pages(Arc::clone(&map), profile.max_retries)?;
    let outcome = run_session(&mut coordinator, session, &events)?;
    let (device, sink) = coordinator.into_parts();

    if json {
        let output = serde_json::json!({
            "ok": outcome.is_success(),
            "data": {
                "outcome": outcome,
                "pages": pages_total,
                "writes": device.writes().len(),
                "retries": sink.retries(),
                "pages_on_device": device.flash().len(),
                "reset": device.reset_requested(),
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    match outcome {
        Outcome::Completed => {
            if !cli.quiet && !json {
                eprintln!(
                    "\n{} Flashed {pages_total} pages ({} writes, {} retries)",
                    style("🎉").green().bold(),
                    device.writes().len(),
                    sink.retries()
                );
            }
            Ok(())
        },
        Outcome::Failed { reason } => Err(CliError::FlashFailed(reason.to_string()).into()),
        Outcome::Aborted { pages_done } => {
            warn!("Device holds a partial image ({pages_done}/{pages_total} pages)");
            Err(CliError::Cancelled(format!(
                "Cancelled after {pages_done} of {pages_total} pages"
            ))
            .into())
        },
    }
}
