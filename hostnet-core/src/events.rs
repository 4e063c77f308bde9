//! Allocation and lifecycle events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{AllocatedDevice, NamespaceRef, WorkloadId};

/// Events delivered by the allocation and lifecycle sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    /// Devices were granted to a workload
    Allocated {
        /// Workload ID
        workload: WorkloadId,
        /// Granted devices
        devices: Vec<AllocatedDevice>,
    },

    /// The grant was released
    Released {
        /// Workload ID
        workload: WorkloadId,
    },

    /// The workload's network namespace exists
    NetworkReady {
        /// Workload ID
        workload: WorkloadId,
        /// Network namespace of the workload
        #[serde(default)]
        namespace: Option<NamespaceRef>,
    },

    /// The workload is being torn down
    Stopping {
        /// Workload ID
        workload: WorkloadId,
        /// Network namespace of the workload
        #[serde(default)]
        namespace: Option<NamespaceRef>,
    },

    /// The workload is gone
    Removed {
        /// Workload ID
        workload: WorkloadId,
    },
}

impl DriverEvent {
    /// Get the workload ID from any event
    #[must_use]
    pub const fn workload(&self) -> &WorkloadId {
        match self {
            Self::Allocated { workload, .. }
            | Self::Released { workload }
            | Self::NetworkReady { workload, .. }
            | Self::Stopping { workload, .. }
            | Self::Removed { workload } => workload,
        }
    }

    /// Short event name used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Allocated { .. } => "allocated",
            Self::Released { .. } => "released",
            Self::NetworkReady { .. } => "network_ready",
            Self::Stopping { .. } => "stopping",
            Self::Removed { .. } => "removed",
        }
    }

    /// Check if this event comes from the lifecycle stream
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::NetworkReady { .. } | Self::Stopping { .. } | Self::Removed { .. }
        )
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Allocated { workload, devices } => {
                tracing::info!(
                    workload = %workload,
                    devices = devices.len(),
                    event = "allocated",
                    "Devices allocated"
                );
            }
            Self::Released { workload } => {
                tracing::info!(workload = %workload, event = "released", "Allocation released");
            }
            Self::NetworkReady {
                workload,
                namespace,
            } => {
                tracing::info!(
                    workload = %workload,
                    namespace = ?namespace.as_ref().map(ToString::to_string),
                    event = "network_ready",
                    "Workload network ready"
                );
            }
            Self::Stopping {
                workload,
                namespace,
            } => {
                tracing::info!(
                    workload = %workload,
                    namespace = ?namespace.as_ref().map(ToString::to_string),
                    event = "stopping",
                    "Workload stopping"
                );
            }
            Self::Removed { workload } => {
                tracing::info!(workload = %workload, event = "removed", "Workload removed");
            }
        }
    }
}

impl fmt::Display for DriverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocated { workload, devices } => {
                write!(f, "Workload {workload} allocated {} device(s)", devices.len())
            }
            Self::Released { workload } => write!(f, "Workload {workload} released"),
            Self::NetworkReady { workload, .. } => write!(f, "Workload {workload} network ready"),
            Self::Stopping { workload, .. } => write!(f, "Workload {workload} stopping"),
            Self::Removed { workload } => write!(f, "Workload {workload} removed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceName;

    #[test]
    fn test_event_workload() {
        let id = WorkloadId::new("w1").unwrap();
        let event = DriverEvent::Removed {
            workload: id.clone(),
        };

        assert_eq!(event.workload(), &id);
        assert_eq!(event.name(), "removed");
        assert!(event.is_lifecycle());
    }

    #[test]
    fn test_allocation_is_not_lifecycle() {
        let event = DriverEvent::Allocated {
            workload: WorkloadId::new("w1").unwrap(),
            devices: vec![AllocatedDevice::new(
                DeviceName::new("eth1").unwrap(),
                "node",
                "nic",
            )],
        };
        assert!(!event.is_lifecycle());
        assert_eq!(event.to_string(), "Workload w1 allocated 1 device(s)");
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"type":"network_ready","workload":"w1","namespace":{"path":"/run/ns/w1"}}"#;
        let event: DriverEvent = serde_json::from_str(json).unwrap();

        match &event {
            DriverEvent::NetworkReady { namespace, .. } => {
                assert_eq!(namespace, &Some(NamespaceRef::path("/run/ns/w1")));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let back = serde_json::to_string(&event).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn test_missing_namespace_deserializes_as_none() {
        let event: DriverEvent =
            serde_json::from_str(r#"{"type":"stopping","workload":"w1"}"#).unwrap();
        assert!(matches!(
            event,
            DriverEvent::Stopping {
                namespace: None,
                ..
            }
        ));
    }
}
