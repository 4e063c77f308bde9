//! Device, allocation and relocation value objects

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{DeviceName, Error, Result};

/// Attribute key for the in-namespace interface name
pub const ATTR_INTERFACE_NAME: &str = "interface-name";
/// Attribute key for the link MTU
pub const ATTR_MTU: &str = "mtu";
/// Attribute key for the hardware address
pub const ATTR_HARDWARE_ADDRESS: &str = "hardware-address";
/// Attribute key for the comma-separated address list
pub const ATTR_ADDRESSES: &str = "addresses";
/// Attribute key for the published MAC address
pub const ATTR_MAC_ADDRESS: &str = "mac-address";

/// Link-layer hardware address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareAddr(Vec<u8>);

impl HardwareAddr {
    /// Longest hardware address the kernel accepts (`MAX_ADDR_LEN`)
    pub const MAX_LENGTH: usize = 32;

    /// Create from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for HardwareAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for HardwareAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidConfig {
            message: format!("Invalid hardware address: {s:?}"),
        };

        let bytes = s
            .split(':')
            .map(|octet| {
                if octet.len() == 2 {
                    u8::from_str_radix(octet, 16).map_err(|_| invalid())
                } else {
                    Err(invalid())
                }
            })
            .collect::<Result<Vec<u8>>>()?;

        if bytes.len() > Self::MAX_LENGTH {
            return Err(invalid());
        }

        Ok(Self(bytes))
    }
}

impl TryFrom<String> for HardwareAddr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<HardwareAddr> for String {
    fn from(addr: HardwareAddr) -> Self {
        addr.to_string()
    }
}

/// Classification of a host interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Backed by hardware
    Physical,
    /// Software device (has a link kind such as veth, bridge, dummy)
    Virtual,
    /// Loopback
    Loopback,
}

/// A host network interface as seen by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Kernel interface index
    pub index: u32,
    /// Interface name
    pub name: String,
    /// Hardware address, if the link has one
    pub hardware_addr: Option<HardwareAddr>,
    /// MTU
    pub mtu: Option<u32>,
    /// Administratively up
    pub up: bool,
    /// Classification
    pub kind: DeviceKind,
}

/// A device granted to a workload by the allocation source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedDevice {
    /// Host device name
    pub name: DeviceName,
    /// Pool the device was allocated from
    #[serde(default)]
    pub pool: String,
    /// Request that was satisfied
    #[serde(default)]
    pub request: String,
    /// Opaque attributes attached to the grant
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl AllocatedDevice {
    /// Create an allocation without attributes
    #[must_use]
    pub fn new(name: DeviceName, pool: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            name,
            pool: pool.into(),
            request: request.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Desired link attributes applied while moving a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Name inside the target namespace (keeps the current name when unset)
    pub name: Option<DeviceName>,
    /// MTU
    pub mtu: Option<u32>,
    /// Hardware address
    pub hardware_addr: Option<HardwareAddr>,
    /// `IFLA_GSO_MAX_SIZE`
    pub gso_max_size: Option<u32>,
    /// `IFLA_GRO_MAX_SIZE`
    pub gro_max_size: Option<u32>,
    /// `IFLA_GSO_IPV4_MAX_SIZE`
    pub gso_ipv4_max_size: Option<u32>,
    /// `IFLA_GRO_IPV4_MAX_SIZE`
    pub gro_ipv4_max_size: Option<u32>,
}

impl LinkConfig {
    /// Create an empty configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the in-namespace name
    #[must_use]
    pub fn with_name(mut self, name: DeviceName) -> Self {
        self.name = Some(name);
        self
    }

    /// Set the MTU
    #[must_use]
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = Some(mtu);
        self
    }

    /// Set the hardware address
    #[must_use]
    pub fn with_hardware_addr(mut self, addr: HardwareAddr) -> Self {
        self.hardware_addr = Some(addr);
        self
    }

    /// Set the GSO and GRO maximum sizes
    #[must_use]
    pub fn with_offload(mut self, gso_max_size: u32, gro_max_size: u32) -> Self {
        self.gso_max_size = Some(gso_max_size);
        self.gro_max_size = Some(gro_max_size);
        self
    }

    /// Set the IPv4 GSO and GRO maximum sizes
    #[must_use]
    pub fn with_ipv4_offload(mut self, gso_max_size: u32, gro_max_size: u32) -> Self {
        self.gso_ipv4_max_size = Some(gso_max_size);
        self.gro_ipv4_max_size = Some(gro_max_size);
        self
    }
}

/// Result of attaching a device into a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDeviceData {
    /// Interface name inside the namespace
    pub interface_name: String,
    /// Hardware address inside the namespace
    pub hardware_address: String,
    /// Addresses that were applied
    pub ips: Vec<String>,
}

/// One device ready to be relocated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedDevice {
    /// Name in the host namespace, also used to restore the device on detach
    pub host_name: DeviceName,
    /// Link configuration applied during attach
    pub config: LinkConfig,
    /// Addresses assigned inside the namespace
    pub addresses: Vec<IpNetwork>,
}

impl PreparedDevice {
    /// Build from a granted device, reading the optional attribute keys
    ///
    /// # Errors
    /// Returns `InvalidConfig` if an attribute value cannot be parsed
    pub fn from_allocation(device: &AllocatedDevice) -> Result<Self> {
        let attrs = &device.attributes;

        let name = match attrs.get(ATTR_INTERFACE_NAME) {
            Some(name) => name.parse()?,
            None => device.name.clone(),
        };

        let mut config = LinkConfig::new().with_name(name);

        if let Some(mtu) = attrs.get(ATTR_MTU) {
            let mtu = mtu.trim().parse::<u32>().map_err(|e| Error::InvalidConfig {
                message: format!("Invalid mtu {mtu:?} for device {}: {e}", device.name),
            })?;
            config = config.with_mtu(mtu);
        }

        if let Some(addr) = attrs.get(ATTR_HARDWARE_ADDRESS) {
            config = config.with_hardware_addr(addr.trim().parse()?);
        }

        let addresses = match attrs.get(ATTR_ADDRESSES) {
            Some(list) => parse_address_list(list)?,
            None => Vec::new(),
        };

        Ok(Self {
            host_name: device.name.clone(),
            config,
            addresses,
        })
    }

    /// Name the device carries inside the namespace
    #[must_use]
    pub fn namespace_name(&self) -> &DeviceName {
        self.config.name.as_ref().unwrap_or(&self.host_name)
    }
}

/// Output of prepare: everything attach and detach need for a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedArtifact {
    /// One entry per granted device, in grant order
    pub devices: Vec<PreparedDevice>,
}

impl PreparedArtifact {
    /// Build the artifact for an allocation
    ///
    /// # Errors
    /// Returns `Precondition` if nothing was granted and `InvalidConfig` for bad attributes
    pub fn from_allocation(devices: &[AllocatedDevice]) -> Result<Self> {
        if devices.is_empty() {
            return Err(Error::Precondition {
                message: "allocation has no granted devices".to_string(),
            });
        }

        let devices = devices
            .iter()
            .map(PreparedDevice::from_allocation)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { devices })
    }
}

/// Parse a comma-separated CIDR list
fn parse_address_list(list: &str) -> Result<Vec<IpNetwork>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNetwork>().map_err(|e| Error::InvalidConfig {
                message: format!("Invalid address {s:?}: {e}"),
            })
        })
        .collect()
}
