//! Devices command implementation

use anyhow::{Context, Result};
use hostnet_core::DeviceKind;
use hostnet_driver::DevicePolicy;

pub async fn execute(all: bool) -> Result<()> {
    let mut devices = hostnet_netns::list_devices()
        .await
        .context("Failed to list host devices")?;

    if !all {
        devices = DevicePolicy::default().filter(devices);
    }

    println!("\n🔌 Host devices");
    println!("{:-<72}", "");
    println!(
        "{:<6} {:<16} {:<9} {:<5} {:<6} {}",
        "Index", "Name", "Kind", "Up", "MTU", "MAC"
    );
    println!("{:-<72}", "");

    for device in &devices {
        let kind = match device.kind {
            DeviceKind::Physical => "physical",
            DeviceKind::Virtual => "virtual",
            DeviceKind::Loopback => "loopback",
        };

        println!(
            "{:<6} {:<16} {:<9} {:<5} {:<6} {}",
            device.index,
            device.name,
            kind,
            if device.up { "yes" } else { "no" },
            device.mtu.map(|m| m.to_string()).unwrap_or_default(),
            device
                .hardware_addr
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        );
    }

    if devices.is_empty() {
        println!("No relocatable devices found");
    } else {
        println!("{:-<72}", "");
        println!("Total: {} device(s)", devices.len());
    }

    Ok(())
}
