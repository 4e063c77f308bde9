//! Hostnet Core - identifiers, device model, events and errors
//!
//! This crate provides the types shared by the relocation engine and the
//! lifecycle coordinator.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod types;

pub use config::{DriverConfig, RestartPolicy};
pub use device::{
    AllocatedDevice, Device, DeviceKind, HardwareAddr, LinkConfig, NetworkDeviceData,
    PreparedArtifact, PreparedDevice,
};
pub use error::{Error, Result};
pub use events::DriverEvent;
pub use types::{DeviceName, NamespaceRef, ProcessId, WorkloadId};
