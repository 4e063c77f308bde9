//! Detach command implementation

use anyhow::{Context, Result};
use hostnet_core::{DeviceName, NamespaceRef};

pub async fn execute(
    netns: &NamespaceRef,
    device: &DeviceName,
    restore_name: Option<&DeviceName>,
) -> Result<()> {
    tracing::info!(device = %device, netns = %netns, "Detaching device");

    hostnet_netns::detach(netns, device, restore_name)
        .await
        .with_context(|| format!("Failed to detach {device} from {netns}"))?;

    println!(
        "✅ {device} returned to the host namespace{}",
        restore_name.map(|n| format!(" as {n}")).unwrap_or_default()
    );

    Ok(())
}
