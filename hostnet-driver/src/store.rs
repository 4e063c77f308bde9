//! Per-workload allocation and preparation state
//!
//! Every operation is one short critical section. Nothing is awaited while
//! the lock is held and callers only ever receive clones.

use hostnet_core::{AllocatedDevice, DeviceName, PreparedArtifact, WorkloadId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Where a workload is in its device lifecycle
///
/// `Unknown` covers both never-seen and purged workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadPhase {
    /// No record
    Unknown,
    /// Devices granted, not prepared
    Allocated,
    /// Artifact recorded, waiting for the namespace
    Prepared,
    /// Devices live inside the workload namespace
    NetworkAttached,
    /// Devices returned to the host
    NetworkDetached,
}

impl fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Allocated => "allocated",
            Self::Prepared => "prepared",
            Self::NetworkAttached => "network_attached",
            Self::NetworkDetached => "network_detached",
        };
        write!(f, "{s}")
    }
}

/// Consistent copy of one workload's record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadSnapshot {
    /// Granted devices
    pub allocation: Vec<AllocatedDevice>,
    /// Prepared artifact, absent before prepare and after unprepare
    pub prepared: Option<PreparedArtifact>,
    /// Lifecycle phase
    pub phase: WorkloadPhase,
    /// Host names of the devices currently inside the workload namespace
    pub attached: BTreeSet<DeviceName>,
}

#[derive(Debug)]
struct WorkloadEntry {
    allocation: Vec<AllocatedDevice>,
    prepared: Option<PreparedArtifact>,
    phase: WorkloadPhase,
    attached: BTreeSet<DeviceName>,
}

impl WorkloadEntry {
    const fn new(allocation: Vec<AllocatedDevice>) -> Self {
        Self {
            allocation,
            prepared: None,
            phase: WorkloadPhase::Allocated,
            attached: BTreeSet::new(),
        }
    }

    fn snapshot(&self) -> WorkloadSnapshot {
        WorkloadSnapshot {
            allocation: self.allocation.clone(),
            prepared: self.prepared.clone(),
            phase: self.phase,
            attached: self.attached.clone(),
        }
    }
}

/// Shared record of what every workload was granted and prepared
#[derive(Debug, Default)]
pub struct StateStore {
    entries: Mutex<HashMap<WorkloadId, WorkloadEntry>>,
}

impl StateStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the devices granted to a workload
    ///
    /// A repeated grant replaces the device list and keeps any later state.
    pub fn record_allocation(&self, workload: &WorkloadId, devices: Vec<AllocatedDevice>) {
        let mut entries = self.entries.lock();
        match entries.get_mut(workload) {
            Some(entry) => entry.allocation = devices,
            None => {
                entries.insert(workload.clone(), WorkloadEntry::new(devices));
            }
        }
    }

    /// Record allocation and artifact together
    ///
    /// Replayed prepares keep the attached devices that are still part of the
    /// artifact, so they are not moved twice. Attached devices missing from
    /// the new artifact are dropped from the record and returned.
    pub fn record_prepared(
        &self,
        workload: &WorkloadId,
        devices: Vec<AllocatedDevice>,
        artifact: PreparedArtifact,
    ) -> Vec<DeviceName> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(workload.clone())
            .or_insert_with(|| WorkloadEntry::new(Vec::new()));

        let (kept, dropped): (BTreeSet<_>, BTreeSet<_>) =
            std::mem::take(&mut entry.attached)
                .into_iter()
                .partition(|name| artifact.devices.iter().any(|d| &d.host_name == name));
        entry.attached = kept;

        entry.allocation = devices;
        entry.prepared = Some(artifact);
        if matches!(entry.phase, WorkloadPhase::Unknown | WorkloadPhase::Allocated) {
            entry.phase = WorkloadPhase::Prepared;
        }

        dropped.into_iter().collect()
    }

    /// Read a workload's allocation and artifact as one snapshot
    #[must_use]
    pub fn read(&self, workload: &WorkloadId) -> Option<WorkloadSnapshot> {
        self.entries.lock().get(workload).map(WorkloadEntry::snapshot)
    }

    /// Drop a workload's artifact, keeping the allocation
    ///
    /// Returns whether an artifact was present.
    pub fn clear_prepared(&self, workload: &WorkloadId) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(workload) else {
            return false;
        };

        let had_artifact = entry.prepared.take().is_some();
        if entry.phase == WorkloadPhase::Prepared {
            entry.phase = WorkloadPhase::Allocated;
        }
        had_artifact
    }

    /// Note that a device now lives inside the workload namespace
    pub fn mark_attached(&self, workload: &WorkloadId, device: &DeviceName) {
        if let Some(entry) = self.entries.lock().get_mut(workload) {
            entry.attached.insert(device.clone());
            entry.phase = WorkloadPhase::NetworkAttached;
        }
    }

    /// Note that a device is back on the host
    pub fn mark_detached(&self, workload: &WorkloadId, device: &DeviceName) {
        if let Some(entry) = self.entries.lock().get_mut(workload) {
            entry.attached.remove(device);
        }
    }

    /// Note that the workload's namespace has been torn down
    pub fn mark_network_detached(&self, workload: &WorkloadId) {
        if let Some(entry) = self.entries.lock().get_mut(workload) {
            entry.phase = WorkloadPhase::NetworkDetached;
        }
    }

    /// Forget a workload entirely
    ///
    /// Returns whether a record existed.
    pub fn purge(&self, workload: &WorkloadId) -> bool {
        self.entries.lock().remove(workload).is_some()
    }

    /// Current phase of a workload
    #[must_use]
    pub fn phase(&self, workload: &WorkloadId) -> WorkloadPhase {
        self.entries
            .lock()
            .get(workload)
            .map_or(WorkloadPhase::Unknown, |entry| entry.phase)
    }

    /// Check if a workload has a record
    #[must_use]
    pub fn contains(&self, workload: &WorkloadId) -> bool {
        self.entries.lock().contains_key(workload)
    }

    /// Number of tracked workloads
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no workload is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(s: &str) -> WorkloadId {
        WorkloadId::new(s).unwrap()
    }

    fn name(s: &str) -> DeviceName {
        DeviceName::new(s).unwrap()
    }

    fn grant(dev: &str) -> Vec<AllocatedDevice> {
        vec![AllocatedDevice::new(name(dev), "node-a", "nic")]
    }

    #[test]
    fn test_prepare_then_read() {
        let store = StateStore::new();
        let w1 = workload("w1");
        let devices = grant("eth-phys0");
        let artifact = PreparedArtifact::from_allocation(&devices).unwrap();

        store.record_prepared(&w1, devices.clone(), artifact.clone());

        let snap = store.read(&w1).unwrap();
        assert_eq!(snap.allocation, devices);
        assert_eq!(snap.prepared, Some(artifact));
        assert_eq!(snap.phase, WorkloadPhase::Prepared);
        assert!(snap.attached.is_empty());
    }

    #[test]
    fn test_allocation_without_prepare() {
        let store = StateStore::new();
        let w1 = workload("w1");

        store.record_allocation(&w1, grant("eth-phys0"));
        assert_eq!(store.phase(&w1), WorkloadPhase::Allocated);
        assert!(store.read(&w1).unwrap().prepared.is_none());
    }

    #[test]
    fn test_clear_prepared_is_idempotent() {
        let store = StateStore::new();
        let w1 = workload("w1");
        let devices = grant("eth-phys0");
        let artifact = PreparedArtifact::from_allocation(&devices).unwrap();
        store.record_prepared(&w1, devices, artifact);

        assert!(store.clear_prepared(&w1));
        assert!(!store.clear_prepared(&w1));
        assert!(!store.clear_prepared(&workload("never-seen")));
        assert_eq!(store.phase(&w1), WorkloadPhase::Allocated);
    }

    #[test]
    fn test_attach_bookkeeping() {
        let store = StateStore::new();
        let w1 = workload("w1");
        let devices = grant("eth-phys0");
        let artifact = PreparedArtifact::from_allocation(&devices).unwrap();
        store.record_prepared(&w1, devices.clone(), artifact.clone());

        store.mark_attached(&w1, &name("eth-phys0"));
        assert_eq!(store.phase(&w1), WorkloadPhase::NetworkAttached);

        // A replayed prepare keeps what is already attached
        store.record_prepared(&w1, devices, artifact);
        let snap = store.read(&w1).unwrap();
        assert!(snap.attached.contains(&name("eth-phys0")));
        assert_eq!(snap.phase, WorkloadPhase::NetworkAttached);

        store.mark_detached(&w1, &name("eth-phys0"));
        store.mark_network_detached(&w1);
        let snap = store.read(&w1).unwrap();
        assert!(snap.attached.is_empty());
        assert_eq!(snap.phase, WorkloadPhase::NetworkDetached);
    }

    #[test]
    fn test_replayed_prepare_trims_attached() {
        let store = StateStore::new();
        let w1 = workload("w1");
        let mut devices = grant("eth-a");
        devices.extend(grant("eth-b"));
        let artifact = PreparedArtifact::from_allocation(&devices).unwrap();
        store.record_prepared(&w1, devices, artifact);
        store.mark_attached(&w1, &name("eth-a"));
        store.mark_attached(&w1, &name("eth-b"));

        let devices = grant("eth-b");
        let artifact = PreparedArtifact::from_allocation(&devices).unwrap();
        let dropped = store.record_prepared(&w1, devices, artifact);

        assert_eq!(dropped, vec![name("eth-a")]);
        let snap = store.read(&w1).unwrap();
        assert_eq!(snap.attached.into_iter().collect::<Vec<_>>(), vec![name("eth-b")]);
    }

    #[test]
    fn test_purge_removes_everything() {
        let store = StateStore::new();
        let w1 = workload("w1");
        let w2 = workload("w2");
        store.record_allocation(&w1, grant("eth-phys0"));
        store.record_allocation(&w2, grant("eth-phys1"));
        assert_eq!(store.len(), 2);

        assert!(store.purge(&w1));
        assert!(!store.purge(&w1));
        assert!(!store.contains(&w1));
        assert_eq!(store.phase(&w1), WorkloadPhase::Unknown);
        assert!(store.contains(&w2));

        store.purge(&w2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_bookkeeping_ignores_unknown_workloads() {
        let store = StateStore::new();
        let ghost = workload("ghost");

        store.mark_attached(&ghost, &name("eth0"));
        store.mark_detached(&ghost, &name("eth0"));
        store.mark_network_detached(&ghost);

        assert!(store.is_empty());
    }
}
