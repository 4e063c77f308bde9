//! Relocation seam between the coordinator and the kernel

use async_trait::async_trait;
use hostnet_core::{
    DeviceName, Error, HardwareAddr, LinkConfig, NamespaceRef, NetworkDeviceData, Result,
};
use ipnetwork::IpNetwork;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Moves devices between the host namespace and workload namespaces
///
/// - [`NetlinkRelocator`] - Production, talks to the kernel
/// - [`MockRelocator`] - Testing, simulates namespaces in memory
///
/// # Thread Safety
/// Implementations are shared across lifecycle tasks and must be `Send + Sync`.
#[async_trait]
pub trait Relocator: Send + Sync {
    /// Move `host_device` into `target`, apply `config` and `addresses`, bring it up
    ///
    /// # Errors
    /// Returns error if the device or namespace is missing or the kernel refuses
    async fn attach(
        &self,
        host_device: &DeviceName,
        target: &NamespaceRef,
        config: &LinkConfig,
        addresses: &[IpNetwork],
    ) -> Result<NetworkDeviceData>;

    /// Move `device` out of `ns` back into the host namespace
    ///
    /// # Errors
    /// Returns error if the device or namespace is missing or the kernel refuses
    async fn detach(
        &self,
        ns: &NamespaceRef,
        device: &DeviceName,
        restore_name: Option<&DeviceName>,
    ) -> Result<()>;
}

/// Relocator backed by route netlink
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkRelocator;

impl NetlinkRelocator {
    /// Create a new netlink relocator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Relocator for NetlinkRelocator {
    async fn attach(
        &self,
        host_device: &DeviceName,
        target: &NamespaceRef,
        config: &LinkConfig,
        addresses: &[IpNetwork],
    ) -> Result<NetworkDeviceData> {
        hostnet_netns::attach(host_device, target, config, addresses).await
    }

    async fn detach(
        &self,
        ns: &NamespaceRef,
        device: &DeviceName,
        restore_name: Option<&DeviceName>,
    ) -> Result<()> {
        hostnet_netns::detach(ns, device, restore_name).await
    }
}

/// A simulated link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLink {
    /// Administratively up
    pub up: bool,
    /// MTU
    pub mtu: u32,
    /// Hardware address
    pub hardware_addr: HardwareAddr,
    /// Interface alias
    pub alias: Option<String>,
    /// Addresses assigned to the link
    pub addresses: Vec<IpNetwork>,
}

impl MockLink {
    fn new(hardware_addr: HardwareAddr) -> Self {
        Self {
            up: true,
            mtu: 1500,
            hardware_addr,
            alias: None,
            addresses: Vec::new(),
        }
    }
}

/// Which relocation step a device should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    /// Refuse to move the device into a namespace
    Attach,
    /// Refuse to move the device back to the host
    Detach,
    /// Reject the last requested address after moving the device
    Address,
    /// Move the device but leave it down at its destination
    Enable,
}

/// In-memory relocator for tests (doesn't touch the kernel)
///
/// Keeps one link table for the host and one per registered namespace.
/// Links move between tables the way the kernel moves them between
/// namespaces.
///
/// # Example
/// ```
/// use hostnet_core::{DeviceName, LinkConfig, NamespaceRef};
/// use hostnet_driver::{MockRelocator, Relocator};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let ns = NamespaceRef::path("/run/ns/w1");
/// let relocator = MockRelocator::new()
///     .with_host_device("eth-phys0")
///     .with_namespace(ns.clone());
///
/// let dev = DeviceName::new("eth-phys0").unwrap();
/// relocator.attach(&dev, &ns, &LinkConfig::new(), &[]).await.unwrap();
/// assert!(relocator.namespace_link(&ns, "eth-phys0").is_some());
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MockRelocator {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    host: BTreeMap<String, MockLink>,
    namespaces: HashMap<NamespaceRef, BTreeMap<String, MockLink>>,
    failures: HashSet<(FailOn, String)>,
    call_count: usize,
}

impl MockRelocator {
    /// Create a mock with an empty host namespace
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an up link to the host namespace
    #[must_use]
    pub fn with_host_device(self, name: &str) -> Self {
        {
            let mut state = self.state.lock();
            let index = u8::try_from(state.host.len() + 1).unwrap_or(u8::MAX);
            state.host.insert(
                name.to_string(),
                MockLink::new(HardwareAddr::from_bytes(vec![0x02, 0, 0, 0, 0, index])),
            );
        }
        self
    }

    /// Register an existing namespace
    #[must_use]
    pub fn with_namespace(self, ns: NamespaceRef) -> Self {
        self.state.lock().namespaces.entry(ns).or_default();
        self
    }

    /// Make a relocation step fail for a device
    #[must_use]
    pub fn with_failure(self, step: FailOn, device: &str) -> Self {
        self.inject_failure(step, device);
        self
    }

    /// Make a relocation step fail from now on
    pub fn inject_failure(&self, step: FailOn, device: &str) {
        self.state.lock().failures.insert((step, device.to_string()));
    }

    /// Set an alias on a host link
    pub fn set_alias(&self, name: &str, alias: &str) {
        if let Some(link) = self.state.lock().host.get_mut(name) {
            link.alias = Some(alias.to_string());
        }
    }

    /// Get the number of relocation calls made (for testing)
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().call_count
    }

    /// Look up a link in the host namespace
    #[must_use]
    pub fn host_link(&self, name: &str) -> Option<MockLink> {
        self.state.lock().host.get(name).cloned()
    }

    /// Look up a link inside a namespace
    #[must_use]
    pub fn namespace_link(&self, ns: &NamespaceRef, name: &str) -> Option<MockLink> {
        self.state
            .lock()
            .namespaces
            .get(ns)
            .and_then(|links| links.get(name).cloned())
    }

    /// Names of the links inside a namespace
    #[must_use]
    pub fn namespace_links(&self, ns: &NamespaceRef) -> Vec<String> {
        self.state
            .lock()
            .namespaces
            .get(ns)
            .map(|links| links.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for MockRelocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRelocator").finish_non_exhaustive()
    }
}

fn refused(operation: String) -> Error {
    Error::ProtocolRejected {
        operation,
        message: "operation not permitted (mock)".to_string(),
    }
}

#[async_trait]
impl Relocator for MockRelocator {
    async fn attach(
        &self,
        host_device: &DeviceName,
        target: &NamespaceRef,
        config: &LinkConfig,
        addresses: &[IpNetwork],
    ) -> Result<NetworkDeviceData> {
        let mut state = self.state.lock();
        state.call_count += 1;

        if !state.host.contains_key(host_device.as_str()) {
            return Err(Error::device_not_found(host_device.as_str()));
        }
        if !state.namespaces.contains_key(target) {
            return Err(Error::namespace_not_found(target.to_string()));
        }
        if state.failures.contains(&(FailOn::Attach, host_device.to_string())) {
            return Err(refused(format!("move {host_device} to {target}")));
        }
        let fail_address = state.failures.contains(&(FailOn::Address, host_device.to_string()));
        let fail_enable = state.failures.contains(&(FailOn::Enable, host_device.to_string()));

        let Some(mut link) = state.host.remove(host_device.as_str()) else {
            return Err(Error::device_not_found(host_device.as_str()));
        };

        let name = config.name.as_ref().unwrap_or(host_device).to_string();
        if let Some(mtu) = config.mtu.filter(|v| *v > 0) {
            link.mtu = mtu;
        }
        if let Some(addr) = &config.hardware_addr {
            link.hardware_addr = addr.clone();
        }
        let rejected = addresses.last().filter(|_| fail_address);
        let applied = if rejected.is_some() {
            &addresses[..addresses.len() - 1]
        } else {
            addresses
        };
        link.addresses = applied.to_vec();
        link.up = !fail_enable && rejected.is_none();

        let data = NetworkDeviceData {
            interface_name: name.clone(),
            hardware_address: link.hardware_addr.to_string(),
            ips: applied.iter().map(|a| a.ip().to_string()).collect(),
        };

        state
            .namespaces
            .entry(target.clone())
            .or_default()
            .insert(name.clone(), link);

        if let Some(address) = rejected {
            return Err(Error::AddressAssignment {
                address: address.to_string(),
                namespace: target.to_string(),
                message: "file exists (mock)".to_string(),
            });
        }
        if fail_enable {
            return Err(Error::EnableFailed {
                device: name,
                destination: target.to_string(),
                message: "device or resource busy (mock)".to_string(),
            });
        }

        tracing::debug!(device = %host_device, namespace = %target, "Mock: Attached device");

        Ok(data)
    }

    async fn detach(
        &self,
        ns: &NamespaceRef,
        device: &DeviceName,
        restore_name: Option<&DeviceName>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.call_count += 1;

        let fail = state.failures.contains(&(FailOn::Detach, device.to_string()));

        let links = state
            .namespaces
            .get_mut(ns)
            .ok_or_else(|| Error::namespace_not_found(ns.to_string()))?;
        if !links.contains_key(device.as_str()) {
            return Err(Error::device_not_found(device.as_str()));
        }
        if fail {
            return Err(refused(format!("move {device} out of {ns}")));
        }

        let Some(mut link) = links.remove(device.as_str()) else {
            return Err(Error::device_not_found(device.as_str()));
        };

        let out_name = restore_name
            .map(ToString::to_string)
            .or_else(|| link.alias.clone().filter(|a| !a.is_empty()))
            .unwrap_or_else(|| device.to_string());

        let fail_enable = state.failures.contains(&(FailOn::Enable, out_name.clone()));

        // Moving a link drops its addresses
        link.addresses.clear();
        link.up = !fail_enable;
        state.host.insert(out_name.clone(), link);

        if fail_enable {
            return Err(Error::EnableFailed {
                device: out_name,
                destination: "host".to_string(),
                message: "device or resource busy (mock)".to_string(),
            });
        }

        tracing::debug!(device = %device, restored = %out_name, "Mock: Detached device");

        Ok(())
    }
}
