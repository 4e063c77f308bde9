//! Network namespace handling for device relocation
//!
//! This crate provides the kernel-facing half of hostnet:
//! - Namespace resolution from a path or process id
//! - Netlink sockets bound to a specific namespace
//! - Attach / detach of a host device into a workload namespace
//! - Enumeration of host links

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod enumerate;
pub mod handle;
pub mod relocate;
pub mod resolver;

pub use enumerate::{list_devices, to_device};
pub use handle::NetlinkHandle;
pub use relocate::{attach, detach};
pub use resolver::{NamespaceContext, HOST_NAMESPACE_PATH};
