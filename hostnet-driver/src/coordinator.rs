//! Lifecycle coordination
//!
//! Ties allocation events (prepare, unprepare) to workload lifecycle events
//! (network ready, stopping, removed). Each workload moves through the
//! phases recorded in the [`StateStore`]; the actual device moves go through
//! a [`Relocator`].

use hostnet_core::{
    AllocatedDevice, DeviceName, DriverEvent, Error, NamespaceRef, NetworkDeviceData,
    PreparedArtifact, Result, WorkloadId,
};
use std::sync::Arc;

use crate::relocator::Relocator;
use crate::store::StateStore;

/// Outcome of returning one device to the host
#[derive(Debug)]
pub struct DetachOutcome {
    /// Host-side name of the device
    pub device: DeviceName,
    /// `Ok` if the device is back on the host and up
    pub result: Result<()>,
}

impl DetachOutcome {
    /// Check if the device left the workload namespace, up or not
    #[must_use]
    pub fn returned(&self) -> bool {
        match &self.result {
            Ok(()) => true,
            Err(e) => e.device_moved(),
        }
    }
}

/// Per-device outcomes of a stopping workload
#[derive(Debug, Default)]
pub struct DetachReport {
    /// One entry per attached device, in artifact order
    pub outcomes: Vec<DetachOutcome>,
}

impl DetachReport {
    /// Check if every device was returned and brought up
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Devices still inside the workload namespace
    pub fn failures(&self) -> impl Iterator<Item = &DetachOutcome> {
        self.outcomes.iter().filter(|o| !o.returned())
    }

    /// Devices back on the host that could not be brought up
    pub fn restored_down(&self) -> impl Iterator<Item = &DetachOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err() && o.returned())
    }

    /// Number of devices returned to the host
    #[must_use]
    pub fn detached(&self) -> usize {
        self.outcomes.iter().filter(|o| o.returned()).count()
    }
}

/// One workload's share of a prepare batch
#[derive(Debug, Clone)]
pub struct Claim {
    /// Workload the devices were granted to
    pub workload: WorkloadId,
    /// Granted devices
    pub devices: Vec<AllocatedDevice>,
}

/// Drives devices through the workload lifecycle
///
/// Cloning is cheap; clones share the store and relocator.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<StateStore>,
    relocator: Arc<dyn Relocator>,
}

impl Coordinator {
    /// Create a coordinator with an empty store
    #[must_use]
    pub fn new(relocator: Arc<dyn Relocator>) -> Self {
        Self {
            store: Arc::new(StateStore::new()),
            relocator,
        }
    }

    /// Use an existing store
    #[must_use]
    pub fn with_store(mut self, store: Arc<StateStore>) -> Self {
        self.store = store;
        self
    }

    /// Shared state store
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Prepare the devices granted to a workload
    ///
    /// Nothing is recorded when preparation fails.
    ///
    /// # Errors
    /// - `Precondition` if no device was granted
    /// - `InvalidConfig` if a device attribute cannot be parsed
    pub fn prepare(
        &self,
        workload: &WorkloadId,
        devices: &[AllocatedDevice],
    ) -> Result<PreparedArtifact> {
        let artifact = PreparedArtifact::from_allocation(devices).map_err(|e| {
            tracing::warn!(workload = %workload, error = %e, "Prepare failed");
            e
        })?;

        let dropped = self
            .store
            .record_prepared(workload, devices.to_vec(), artifact.clone());
        for device in &dropped {
            tracing::warn!(
                workload = %workload,
                device = %device,
                "Attached device is no longer allocated, forgetting it"
            );
        }

        tracing::info!(
            workload = %workload,
            devices = artifact.devices.len(),
            "Workload prepared"
        );

        Ok(artifact)
    }

    /// Prepare several workloads; one failure does not stop the others
    #[must_use]
    pub fn prepare_batch(&self, claims: &[Claim]) -> Vec<(WorkloadId, Result<PreparedArtifact>)> {
        tracing::debug!(claims = claims.len(), "Preparing batch");

        claims
            .iter()
            .map(|claim| {
                (
                    claim.workload.clone(),
                    self.prepare(&claim.workload, &claim.devices),
                )
            })
            .collect()
    }

    /// Drop a workload's prepared artifact
    ///
    /// Safe to call repeatedly and for workloads that were never prepared.
    pub fn unprepare(&self, workload: &WorkloadId) {
        if self.store.clear_prepared(workload) {
            tracing::info!(workload = %workload, "Workload unprepared");
        } else {
            tracing::debug!(workload = %workload, "Nothing to unprepare");
        }
    }

    /// Move every prepared device into the workload's namespace
    ///
    /// Devices already attached by an earlier delivery of the same event are
    /// skipped. A workload the driver holds nothing for is left alone.
    ///
    /// # Errors
    /// - `Precondition` if the namespace is missing or the workload was
    ///   allocated but never prepared
    /// - The first relocation error; devices attached before it stay attached,
    ///   as does the failing device when the error came after its move
    pub async fn on_network_ready(
        &self,
        workload: &WorkloadId,
        namespace: Option<&NamespaceRef>,
    ) -> Result<Vec<NetworkDeviceData>> {
        let Some(ns) = namespace else {
            return Err(Error::Precondition {
                message: format!("workload {workload} has no network namespace"),
            });
        };

        let Some(snapshot) = self.store.read(workload) else {
            tracing::debug!(workload = %workload, "No devices held for workload");
            return Ok(Vec::new());
        };

        let Some(artifact) = snapshot.prepared else {
            return Err(Error::Precondition {
                message: format!("workload {workload} was allocated but not prepared"),
            });
        };

        let mut attached = Vec::with_capacity(artifact.devices.len());
        for device in &artifact.devices {
            if snapshot.attached.contains(&device.host_name) {
                tracing::debug!(
                    workload = %workload,
                    device = %device.host_name,
                    "Device already attached, skipping"
                );
                continue;
            }

            tracing::info!(
                workload = %workload,
                device = %device.host_name,
                interface = %device.namespace_name(),
                namespace = %ns,
                "Moving device into workload"
            );

            let data = self
                .relocator
                .attach(&device.host_name, ns, &device.config, &device.addresses)
                .await
                .map_err(|e| {
                    tracing::error!(
                        workload = %workload,
                        device = %device.host_name,
                        error = %e,
                        "Attach failed"
                    );
                    // The device is inside the namespace and must come back on stop
                    if e.device_moved() {
                        self.store.mark_attached(workload, &device.host_name);
                    }
                    e
                })?;

            self.store.mark_attached(workload, &device.host_name);
            attached.push(data);
        }

        Ok(attached)
    }

    /// Return every attached device to the host, best effort
    ///
    /// Failures are logged and reported; the remaining devices are still
    /// processed. Prepared devices that never made it into the namespace are
    /// skipped.
    pub async fn on_stopping(
        &self,
        workload: &WorkloadId,
        namespace: Option<&NamespaceRef>,
    ) -> DetachReport {
        let mut report = DetachReport::default();

        let Some(snapshot) = self.store.read(workload) else {
            tracing::debug!(workload = %workload, "No prepared devices to detach");
            return report;
        };
        let Some(artifact) = snapshot.prepared else {
            tracing::debug!(workload = %workload, "No prepared devices to detach");
            return report;
        };

        let Some(ns) = namespace else {
            tracing::warn!(workload = %workload, "Stopping workload has no network namespace");
            return report;
        };

        for device in &artifact.devices {
            if !snapshot.attached.contains(&device.host_name) {
                tracing::debug!(
                    workload = %workload,
                    device = %device.host_name,
                    "Device was never attached, skipping"
                );
                continue;
            }

            let in_ns = device.namespace_name();

            tracing::info!(
                workload = %workload,
                device = %in_ns,
                restore = %device.host_name,
                "Moving device back to host"
            );

            let result = self
                .relocator
                .detach(ns, in_ns, Some(&device.host_name))
                .await;

            let outcome = DetachOutcome {
                device: device.host_name.clone(),
                result,
            };

            if outcome.returned() {
                self.store.mark_detached(workload, &device.host_name);
            }
            if let Err(e) = &outcome.result {
                tracing::error!(
                    workload = %workload,
                    device = %device.host_name,
                    returned = outcome.returned(),
                    error = %e,
                    "Failed to detach device"
                );
            }

            report.outcomes.push(outcome);
        }

        self.store.mark_network_detached(workload);
        report
    }

    /// Forget a workload, whatever happened to its devices
    pub fn on_removed(&self, workload: &WorkloadId) {
        if self.store.purge(workload) {
            tracing::info!(workload = %workload, "Workload purged");
        }
    }

    /// Dispatch a driver event
    ///
    /// Stopping never fails; its per-device failures are only logged here.
    ///
    /// # Errors
    /// Returns the prepare or attach error of the event
    pub async fn handle(&self, event: DriverEvent) -> Result<()> {
        event.emit_trace();

        match event {
            DriverEvent::Allocated { workload, devices } => {
                self.prepare(&workload, &devices).map(|_| ())
            }
            DriverEvent::Released { workload } => {
                self.unprepare(&workload);
                Ok(())
            }
            DriverEvent::NetworkReady {
                workload,
                namespace,
            } => self
                .on_network_ready(&workload, namespace.as_ref())
                .await
                .map(|_| ()),
            DriverEvent::Stopping {
                workload,
                namespace,
            } => {
                let report = self.on_stopping(&workload, namespace.as_ref()).await;
                if !report.is_complete() {
                    tracing::warn!(
                        workload = %workload,
                        failed = report.failures().count(),
                        detached = report.detached(),
                        "Some devices were not returned to the host"
                    );
                }
                Ok(())
            }
            DriverEvent::Removed { workload } => {
                self.on_removed(&workload);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("workloads", &self.store.len())
            .finish_non_exhaustive()
    }
}
