//! Drivers command - list drivers and discoverable devices

use anyhow::Result;
use burstline_sim::hal::create_default_registry;
use burstline_sim::DeviceInfo;
use serde_json::json;

/// Execute the drivers command
pub fn execute() -> Result<()> {
    let registry = create_default_registry();
    let devices: Vec<DeviceInfo> = registry
        .discover_all()
        .into_iter()
        .map(|(_, info)| info)
        .collect();

    let listing = json!({
        "drivers": registry.list(),
        "devices": devices,
    });
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
