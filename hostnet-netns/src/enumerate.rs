//! Host device enumeration

use hostnet_core::{Device, DeviceKind, Result};
use netlink_packet_route::link::{LinkFlag, LinkMessage};

use crate::handle::{self, NetlinkHandle};

/// List every link in the host namespace
///
/// # Errors
/// Returns error if the netlink dump fails
pub async fn list_devices() -> Result<Vec<Device>> {
    let host = NetlinkHandle::current()?;
    let links = host.links().await?;

    let devices: Vec<Device> = links.iter().filter_map(to_device).collect();
    tracing::debug!(count = devices.len(), "Enumerated host links");

    Ok(devices)
}

/// Convert a link message into a device record; nameless links are skipped
#[must_use]
pub fn to_device(link: &LinkMessage) -> Option<Device> {
    let name = handle::link_name(link)?.to_string();

    let kind = if handle::has_flag(link, LinkFlag::Loopback) {
        DeviceKind::Loopback
    } else if handle::has_link_kind(link) {
        DeviceKind::Virtual
    } else {
        DeviceKind::Physical
    };

    Some(Device {
        index: link.header.index,
        name,
        hardware_addr: handle::link_address(link),
        mtu: handle::link_mtu(link),
        up: handle::has_flag(link, LinkFlag::Up),
        kind,
    })
}
