//! Moving network devices across namespaces
//!
//! Both directions issue a single `RTM_SETLINK` that renames the device,
//! applies the requested attributes and changes its namespace in one step,
//! so the device is never visible under a half-applied identity.

use hostnet_core::{DeviceName, Error, LinkConfig, NamespaceRef, NetworkDeviceData, Result};
use ipnetwork::IpNetwork;
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use netlink_packet_utils::nla::DefaultNla;
use rtnetlink::LinkSetRequest;

use crate::handle::{self, NetlinkHandle};
use crate::resolver::NamespaceContext;

const IFLA_GSO_MAX_SIZE: u16 = 41;
const IFLA_GRO_MAX_SIZE: u16 = 58;
const IFLA_GSO_IPV4_MAX_SIZE: u16 = 63;
const IFLA_GRO_IPV4_MAX_SIZE: u16 = 64;

/// Move `host_device` from the host namespace into `target`
///
/// The device is taken down, renamed and reconfigured while it moves, then
/// the addresses are applied and the device is brought up inside `target`.
/// Addresses added before a failing one are left in place.
///
/// # Errors
/// - `NotFound` if the device or namespace does not exist
/// - `ProtocolRejected` if the kernel refuses the move
/// - `AddressAssignment` naming the first address that could not be added
/// - `EnableFailed` if the moved device could not be brought up
pub async fn attach(
    host_device: &DeviceName,
    target: &NamespaceRef,
    config: &LinkConfig,
    addresses: &[IpNetwork],
) -> Result<NetworkDeviceData> {
    let host = NetlinkHandle::current()?;

    let link = host.link_by_name(host_device.as_str()).await?;
    let index = link.header.index;

    // Devices can only be renamed while down
    host.set_down(index).await?;

    let target_ns = NamespaceContext::open(target)?;
    let ns_name = config.name.as_ref().unwrap_or(host_device);

    tracing::debug!(
        device = %host_device,
        index,
        name = %ns_name,
        namespace = %target,
        "Moving device into namespace"
    );

    let mut request = host
        .raw()
        .link()
        .set(index)
        .name(ns_name.to_string())
        .setns_by_fd(target_ns.raw_fd());
    apply_config(request.message_mut(), config);
    execute_move(request, host_device, target).await?;

    // The moved device is only reachable through a socket opened in the target
    let in_ns = NetlinkHandle::in_namespace(&target_ns)?;
    let moved = in_ns.link_by_name(ns_name.as_str()).await.map_err(|e| {
        tracing::error!(device = %ns_name, namespace = %target, error = %e, "Moved device not found");
        e
    })?;
    let moved_index = moved.header.index;

    let mut ips = Vec::with_capacity(addresses.len());
    for address in addresses {
        in_ns
            .add_address(moved_index, *address)
            .await
            .map_err(|e| Error::AddressAssignment {
                address: address.to_string(),
                namespace: target.to_string(),
                message: e.to_string(),
            })?;
        ips.push(address.ip().to_string());
    }

    in_ns
        .set_up(moved_index)
        .await
        .map_err(|e| enable_failed(ns_name.as_str(), &target.to_string(), &e))?;

    let data = NetworkDeviceData {
        interface_name: handle::link_name(&moved)
            .unwrap_or(ns_name.as_str())
            .to_string(),
        hardware_address: handle::link_address(&moved)
            .map(|addr| addr.to_string())
            .unwrap_or_default(),
        ips,
    };

    tracing::info!(
        device = %host_device,
        interface = %data.interface_name,
        namespace = %target,
        addresses = data.ips.len(),
        "Device attached"
    );

    Ok(data)
}

/// Move `device` out of `ns` back into the host namespace
///
/// The outgoing name is `restore_name` when given, otherwise the alias
/// recorded on the link, otherwise its current name.
///
/// # Errors
/// - `NotFound` if the namespace or device does not exist
/// - `ProtocolRejected` if the move is refused
/// - `EnableFailed` if the device is back on the host but still down
pub async fn detach(
    ns: &NamespaceRef,
    device: &DeviceName,
    restore_name: Option<&DeviceName>,
) -> Result<()> {
    let ns_ctx = NamespaceContext::open(ns)?;
    let in_ns = NetlinkHandle::in_namespace(&ns_ctx)?;

    let link = in_ns.link_by_name(device.as_str()).await?;
    let index = link.header.index;

    // Down before it reappears on the host to avoid address conflicts
    in_ns.set_down(index).await?;

    let out_name = outgoing_name(&link, device, restore_name);
    let host_ns = NamespaceContext::host()?;

    tracing::debug!(
        device = %device,
        index,
        name = %out_name,
        namespace = %ns,
        "Moving device back to host namespace"
    );

    let request = in_ns
        .raw()
        .link()
        .set(index)
        .name(out_name.clone())
        .setns_by_fd(host_ns.raw_fd());
    execute_move(request, device, ns).await?;

    // Host workloads may depend on the device
    bring_up_on_host(&out_name)
        .await
        .map_err(|e| enable_failed(&out_name, "host", &e))?;

    tracing::info!(device = %device, restored = %out_name, namespace = %ns, "Device detached");

    Ok(())
}

async fn bring_up_on_host(name: &str) -> Result<()> {
    let host = NetlinkHandle::current()?;
    let restored = host.link_by_name(name).await?;
    host.set_up(restored.header.index).await
}

/// The move went through; only bringing the device up at `destination` failed
fn enable_failed(device: &str, destination: &str, err: &Error) -> Error {
    tracing::warn!(
        device,
        destination,
        error = %err,
        "Device moved but could not be brought up"
    );
    Error::EnableFailed {
        device: device.to_string(),
        destination: destination.to_string(),
        message: err.to_string(),
    }
}

async fn execute_move(
    request: LinkSetRequest,
    device: &DeviceName,
    ns: &NamespaceRef,
) -> Result<()> {
    match request.execute().await {
        Ok(()) => Ok(()),
        Err(err) if handle::is_dump_interrupted(&err) => {
            tracing::debug!(device = %device, "Link modify reported an interrupted dump, continuing");
            Ok(())
        }
        Err(err) => {
            tracing::error!(device = %device, namespace = %ns, error = %err, "Link modify rejected");
            Err(handle::rejected(format!("move {device} to {ns}"), &err))
        }
    }
}

/// Add the optional attributes of `config` to a link request
fn apply_config(message: &mut LinkMessage, config: &LinkConfig) {
    if let Some(mtu) = config.mtu.filter(|v| *v > 0) {
        message.attributes.push(LinkAttribute::Mtu(mtu));
    }

    if let Some(addr) = config.hardware_addr.as_ref().filter(|a| !a.as_bytes().is_empty()) {
        message
            .attributes
            .push(LinkAttribute::Address(addr.as_bytes().to_vec()));
    }

    let offloads = [
        (IFLA_GSO_MAX_SIZE, config.gso_max_size),
        (IFLA_GRO_MAX_SIZE, config.gro_max_size),
        (IFLA_GSO_IPV4_MAX_SIZE, config.gso_ipv4_max_size),
        (IFLA_GRO_IPV4_MAX_SIZE, config.gro_ipv4_max_size),
    ];
    for (kind, value) in offloads {
        if let Some(value) = value.filter(|v| *v > 0) {
            message.attributes.push(LinkAttribute::Other(DefaultNla::new(
                kind,
                value.to_ne_bytes().to_vec(),
            )));
        }
    }
}

fn outgoing_name(link: &LinkMessage, device: &DeviceName, restore_name: Option<&DeviceName>) -> String {
    restore_name
        .map(ToString::to_string)
        .or_else(|| handle::link_alias(link).map(str::to_string))
        .unwrap_or_else(|| device.to_string())
}
