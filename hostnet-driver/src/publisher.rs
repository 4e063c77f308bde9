//! Periodic publication of relocatable host devices
//!
//! Provides a background loop that enumerates host links, filters them
//! through a [`DevicePolicy`] and hands the result to a [`DeviceSink`].

use async_trait::async_trait;
use hostnet_core::device::{ATTR_INTERFACE_NAME, ATTR_MAC_ADDRESS};
use hostnet_core::{Device, DeviceKind, DriverConfig, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Where devices are enumerated from
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// List the links of the host namespace
    ///
    /// # Errors
    /// Returns error if enumeration fails
    async fn devices(&self) -> Result<Vec<Device>>;
}

/// Where published devices go
#[async_trait]
pub trait DeviceSink: Send + Sync {
    /// Replace the published device set of `pool`
    ///
    /// # Errors
    /// Returns error if the devices could not be published
    async fn publish(&self, pool: &str, devices: Vec<PublishedDevice>) -> Result<()>;
}

/// Enumerates host links over route netlink
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkDeviceSource;

#[async_trait]
impl DeviceSource for NetlinkDeviceSource {
    async fn devices(&self) -> Result<Vec<Device>> {
        hostnet_netns::list_devices().await
    }
}

/// Which host devices may be offered to workloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePolicy {
    excluded_prefixes: Vec<String>,
}

impl DevicePolicy {
    /// Exclude names starting with any of `prefixes`
    #[must_use]
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            excluded_prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Policy from the driver configuration
    #[must_use]
    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.excluded_prefixes.iter().cloned())
    }

    /// Check if a device may be published
    ///
    /// Loopback and administratively down links are never published.
    #[must_use]
    pub fn allows(&self, device: &Device) -> bool {
        device.kind != DeviceKind::Loopback
            && device.up
            && !self
                .excluded_prefixes
                .iter()
                .any(|prefix| device.name.starts_with(prefix.as_str()))
    }

    /// Keep the publishable devices
    #[must_use]
    pub fn filter(&self, devices: Vec<Device>) -> Vec<Device> {
        devices.into_iter().filter(|d| self.allows(d)).collect()
    }
}

impl Default for DevicePolicy {
    fn default() -> Self {
        Self::from_config(&DriverConfig::default())
    }
}

/// A device as offered to the allocation source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedDevice {
    /// Device name
    pub name: String,
    /// Published attributes
    pub attributes: BTreeMap<String, String>,
}

impl From<&Device> for PublishedDevice {
    fn from(device: &Device) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(ATTR_INTERFACE_NAME.to_string(), device.name.clone());
        attributes.insert(
            ATTR_MAC_ADDRESS.to_string(),
            device
                .hardware_addr
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        );

        Self {
            name: device.name.clone(),
            attributes,
        }
    }
}

/// Sink that keeps the last published snapshot per pool
///
/// Changes are logged; identical republications are not.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSink {
    pools: Arc<Mutex<BTreeMap<String, Vec<PublishedDevice>>>>,
}

impl SnapshotSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last snapshot published for `pool`
    #[must_use]
    pub fn snapshot(&self, pool: &str) -> Option<Vec<PublishedDevice>> {
        self.pools.lock().get(pool).cloned()
    }
}

#[async_trait]
impl DeviceSink for SnapshotSink {
    async fn publish(&self, pool: &str, devices: Vec<PublishedDevice>) -> Result<()> {
        let mut pools = self.pools.lock();

        if pools.get(pool) != Some(&devices) {
            tracing::info!(
                pool,
                devices = devices.len(),
                names = ?devices.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
                "Published device set changed"
            );
            pools.insert(pool.to_string(), devices);
        }

        Ok(())
    }
}

/// Periodically publishes the relocatable host devices
pub struct DevicePublisher {
    source: Arc<dyn DeviceSource>,
    sink: Arc<dyn DeviceSink>,
    policy: DevicePolicy,
    pool: String,
    interval: Duration,
}

impl DevicePublisher {
    /// Create a publisher for `pool` (the node name)
    ///
    /// # Arguments
    /// * `source` - Where devices are enumerated from
    /// * `sink` - Where the filtered set is published
    /// * `pool` - Pool the devices are published under
    #[must_use]
    pub fn new(
        source: Arc<dyn DeviceSource>,
        sink: Arc<dyn DeviceSink>,
        pool: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sink,
            policy: DevicePolicy::default(),
            pool: pool.into(),
            interval: Duration::from_secs(5),
        }
    }

    /// Use a different filter
    #[must_use]
    pub fn with_policy(mut self, policy: DevicePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Publish every `interval`
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enumerate, filter and publish once
    ///
    /// # Errors
    /// Returns error if enumeration or publication fails; the sink keeps its
    /// previous snapshot in both cases
    pub async fn publish_once(&self) -> Result<usize> {
        let devices = self.source.devices().await?;
        let published: Vec<PublishedDevice> = self
            .policy
            .filter(devices)
            .iter()
            .map(PublishedDevice::from)
            .collect();

        for device in &published {
            tracing::debug!(device = %device.name, "Discovered device");
        }

        let count = published.len();
        self.sink.publish(&self.pool, published).await?;
        Ok(count)
    }

    /// Publish until `cancel` fires
    ///
    /// Failures are logged and retried on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            pool = %self.pool,
            interval_secs = self.interval.as_secs(),
            "Device publishing started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_once().await {
                        tracing::error!(pool = %self.pool, error = %e, "Failed to publish devices");
                    }
                }
            }
        }

        tracing::info!(pool = %self.pool, "Device publishing stopped");
    }
}

impl std::fmt::Debug for DevicePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePublisher")
            .field("pool", &self.pool)
            .field("interval", &self.interval)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostnet_core::{Error, HardwareAddr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn device(name: &str, kind: DeviceKind, up: bool) -> Device {
        Device {
            index: 1,
            name: name.to_string(),
            hardware_addr: Some(HardwareAddr::from_bytes(vec![2, 0, 0, 0, 0, 1])),
            mtu: Some(1500),
            up,
            kind,
        }
    }

    /// Returns a fixed list, failing on the calls listed in `fail_on`
    struct ScriptedSource {
        devices: Vec<Device>,
        fail_on: Vec<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeviceSource for ScriptedSource {
        async fn devices(&self) -> Result<Vec<Device>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&call) {
                return Err(Error::ProtocolRejected {
                    operation: "dump links".to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            Ok(self.devices.clone())
        }
    }

    fn host_devices() -> Vec<Device> {
        vec![
            device("lo", DeviceKind::Loopback, true),
            device("eth-phys0", DeviceKind::Physical, true),
            device("eth-phys1", DeviceKind::Physical, false),
            device("veth1234", DeviceKind::Virtual, true),
            device("docker0", DeviceKind::Virtual, true),
            device("cni0", DeviceKind::Virtual, true),
            device("dummy0", DeviceKind::Virtual, true),
        ]
    }

    #[test]
    fn test_default_policy() {
        let policy = DevicePolicy::default();
        let names: Vec<_> = policy
            .filter(host_devices())
            .into_iter()
            .map(|d| d.name)
            .collect();

        assert_eq!(names, vec!["eth-phys0", "dummy0"]);
    }

    #[test]
    fn test_custom_prefixes() {
        let policy = DevicePolicy::new(["eth"]);
        let names: Vec<_> = policy
            .filter(host_devices())
            .into_iter()
            .map(|d| d.name)
            .collect();

        assert_eq!(names, vec!["veth1234", "docker0", "cni0", "dummy0"]);
    }

    #[test]
    fn test_published_attributes() {
        let published = PublishedDevice::from(&device("eth-phys0", DeviceKind::Physical, true));
        assert_eq!(published.attributes[ATTR_INTERFACE_NAME], "eth-phys0");
        assert_eq!(published.attributes[ATTR_MAC_ADDRESS], "02:00:00:00:00:01");

        let mut bare = device("eth-phys1", DeviceKind::Physical, true);
        bare.hardware_addr = None;
        assert_eq!(PublishedDevice::from(&bare).attributes[ATTR_MAC_ADDRESS], "");
    }

    #[tokio::test]
    async fn test_failed_enumeration_keeps_snapshot() {
        let source = Arc::new(ScriptedSource {
            devices: host_devices(),
            fail_on: vec![1],
            calls: AtomicUsize::new(0),
        });
        let sink = SnapshotSink::new();
        let publisher = DevicePublisher::new(source, Arc::new(sink.clone()), "node-a");

        assert_eq!(publisher.publish_once().await.unwrap(), 2);
        let first = sink.snapshot("node-a").unwrap();

        assert!(publisher.publish_once().await.is_err());
        assert_eq!(sink.snapshot("node-a").unwrap(), first);
        assert!(sink.snapshot("node-b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_publishes_until_cancelled() {
        let source = Arc::new(ScriptedSource {
            devices: host_devices(),
            fail_on: vec![0],
            calls: AtomicUsize::new(0),
        });
        let sink = SnapshotSink::new();
        let publisher = Arc::new(
            DevicePublisher::new(source.clone(), Arc::new(sink.clone()), "node-a")
                .with_interval(Duration::from_secs(5)),
        );

        let cancel = CancellationToken::new();
        let task = {
            let publisher = Arc::clone(&publisher);
            let cancel = cancel.clone();
            tokio::spawn(async move { publisher.run(cancel).await })
        };

        // Ticks at 0s (fails), 5s and 10s
        tokio::time::sleep(Duration::from_secs(11)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.snapshot("node-a").unwrap().len(), 2);
    }
}
