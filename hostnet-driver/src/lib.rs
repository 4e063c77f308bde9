//! Hostnet Driver - lifecycle coordination for relocated host devices
//!
//! This crate ties the allocation and lifecycle event streams to the
//! relocation engine: a [`StateStore`] remembers what each workload was
//! granted, the [`Coordinator`] moves devices in and out of workload
//! namespaces, [`run_supervised`] keeps the lifecycle subscription alive
//! and the [`DevicePublisher`] advertises relocatable host devices.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod coordinator;
pub mod publisher;
pub mod relocator;
pub mod source;
pub mod store;
pub mod supervisor;

pub use coordinator::{Claim, Coordinator, DetachOutcome, DetachReport};
pub use publisher::{
    DevicePolicy, DevicePublisher, DeviceSink, DeviceSource, NetlinkDeviceSource,
    PublishedDevice, SnapshotSink,
};
pub use relocator::{FailOn, MockLink, MockRelocator, NetlinkRelocator, Relocator};
pub use source::{parse_event, JsonLinesSource};
pub use store::{StateStore, WorkloadPhase, WorkloadSnapshot};
pub use supervisor::{run_supervised, LifecycleSource};

// Re-export commonly used types
pub use hostnet_core::{DriverEvent, Error, Result};
