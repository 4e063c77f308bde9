//! Attach command implementation

use anyhow::{Context, Result};
use hostnet_core::LinkConfig;

use crate::cli::AttachArgs;

pub async fn execute(args: AttachArgs) -> Result<()> {
    let mut config = LinkConfig::new();
    if let Some(name) = args.name {
        config = config.with_name(name);
    }
    if let Some(mtu) = args.mtu {
        config = config.with_mtu(mtu);
    }
    if let Some(addr) = args.hardware_address {
        config = config.with_hardware_addr(addr);
    }

    tracing::info!(
        device = %args.device,
        netns = %args.netns,
        addresses = args.addresses.len(),
        "Attaching device"
    );

    let data = hostnet_netns::attach(&args.device, &args.netns, &config, &args.addresses)
        .await
        .with_context(|| format!("Failed to attach {} to {}", args.device, args.netns))?;

    println!("{}", serde_json::to_string_pretty(&data)?);

    Ok(())
}
