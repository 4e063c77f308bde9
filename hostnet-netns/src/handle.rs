//! Netlink handles bound to a network namespace

use futures::TryStreamExt;
use hostnet_core::{Error, HardwareAddr, Result};
use ipnetwork::IpNetwork;
use netlink_packet_route::link::{LinkAttribute, LinkFlag, LinkMessage};
use rtnetlink::Handle;
use tokio::task::JoinHandle;

use crate::resolver::NamespaceContext;

/// How often a lookup is repeated when the kernel interrupts a dump
const DUMP_INTERRUPTED_RETRIES: usize = 3;

/// A route netlink socket and its background connection task
///
/// The socket belongs to the namespace it was created in. Dropping the
/// handle stops the connection task and closes the socket.
pub struct NetlinkHandle {
    handle: Handle,
    connection: JoinHandle<()>,
}

impl NetlinkHandle {
    /// Open a socket in the namespace of the calling thread
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns error if the socket cannot be created
    pub fn current() -> Result<Self> {
        let (connection, handle, _) = rtnetlink::new_connection()?;

        Ok(Self {
            handle,
            connection: tokio::spawn(connection),
        })
    }

    /// Open a socket inside `ns`
    ///
    /// The socket is created on a short-lived thread that joins the namespace
    /// and exits, so no runtime worker ever changes namespace.
    ///
    /// # Errors
    /// Returns error if the namespace cannot be entered or the socket cannot be created
    pub fn in_namespace(ns: &NamespaceContext) -> Result<Self> {
        let runtime = tokio::runtime::Handle::current();

        let (connection, handle) = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = runtime.enter();
                    ns.enter_current_thread()?;
                    let (connection, handle, _) = rtnetlink::new_connection()?;
                    Ok::<_, Error>((connection, handle))
                })
                .join()
        })
        .map_err(|_| Error::Namespace {
            message: format!(
                "Netlink setup thread for {} panicked",
                ns.path().display()
            ),
        })??;

        tracing::trace!(path = %ns.path().display(), "Opened netlink socket in namespace");

        Ok(Self {
            handle,
            connection: tokio::spawn(connection),
        })
    }

    /// Underlying rtnetlink handle
    #[must_use]
    pub const fn raw(&self) -> &Handle {
        &self.handle
    }

    /// Look up a link by name
    ///
    /// # Errors
    /// Returns `NotFound` if no such link exists in this namespace
    pub async fn link_by_name(&self, name: &str) -> Result<LinkMessage> {
        for attempt in 1..=DUMP_INTERRUPTED_RETRIES {
            let mut links = self
                .handle
                .link()
                .get()
                .match_name(name.to_string())
                .execute();

            match links.try_next().await {
                Ok(Some(link)) => return Ok(link),
                Ok(None) => return Err(Error::device_not_found(name)),
                Err(err) if errno(&err) == Some(libc::ENODEV) => {
                    return Err(Error::device_not_found(name));
                }
                Err(err) if is_dump_interrupted(&err) => {
                    tracing::debug!(device = name, attempt, "Link lookup interrupted, retrying");
                }
                Err(err) => return Err(rejected(format!("get link {name}"), &err)),
            }
        }

        Err(Error::device_not_found(name))
    }

    /// Dump every link in this namespace
    ///
    /// # Errors
    /// Returns `ProtocolRejected` if the dump fails
    pub async fn links(&self) -> Result<Vec<LinkMessage>> {
        for attempt in 1..=DUMP_INTERRUPTED_RETRIES {
            match self.handle.link().get().execute().try_collect::<Vec<_>>().await {
                Ok(links) => return Ok(links),
                Err(err) if is_dump_interrupted(&err) => {
                    tracing::debug!(attempt, "Link dump interrupted, retrying");
                }
                Err(err) => return Err(rejected("dump links", &err)),
            }
        }

        Err(Error::ProtocolRejected {
            operation: "dump links".to_string(),
            message: format!("interrupted {DUMP_INTERRUPTED_RETRIES} times"),
        })
    }

    /// Set a link administratively down
    ///
    /// # Errors
    /// Returns `ProtocolRejected` if the kernel refuses
    pub async fn set_down(&self, index: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .down()
            .execute()
            .await
            .map_err(|e| rejected(format!("set link {index} down"), &e))
    }

    /// Set a link administratively up
    ///
    /// # Errors
    /// Returns `ProtocolRejected` if the kernel refuses
    pub async fn set_up(&self, index: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .up()
            .execute()
            .await
            .map_err(|e| rejected(format!("set link {index} up"), &e))
    }

    /// Add an address to a link
    ///
    /// # Errors
    /// Returns the raw netlink error so callers can attribute it
    pub async fn add_address(
        &self,
        index: u32,
        address: IpNetwork,
    ) -> std::result::Result<(), rtnetlink::Error> {
        self.handle
            .address()
            .add(index, address.ip(), address.prefix())
            .execute()
            .await
    }
}

impl Drop for NetlinkHandle {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

impl std::fmt::Debug for NetlinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetlinkHandle").finish_non_exhaustive()
    }
}

/// Positive errno carried by a netlink error reply
pub(crate) fn errno(err: &rtnetlink::Error) -> Option<i32> {
    match err {
        rtnetlink::Error::NetlinkError(msg) => msg.code.map(|code| -code.get()),
        _ => None,
    }
}

/// The kernel reports an interrupted dump as `EINTR`; the request is safe to repeat
pub(crate) fn is_dump_interrupted(err: &rtnetlink::Error) -> bool {
    errno(err) == Some(libc::EINTR)
}

pub(crate) fn rejected(operation: impl Into<String>, err: &rtnetlink::Error) -> Error {
    Error::ProtocolRejected {
        operation: operation.into(),
        message: err.to_string(),
    }
}

/// Interface name of a link
pub(crate) fn link_name(link: &LinkMessage) -> Option<&str> {
    link.attributes.iter().find_map(|attr| match attr {
        LinkAttribute::IfName(name) => Some(name.as_str()),
        _ => None,
    })
}

/// Interface alias of a link, if set and non-empty
pub(crate) fn link_alias(link: &LinkMessage) -> Option<&str> {
    link.attributes.iter().find_map(|attr| match attr {
        LinkAttribute::IfAlias(alias) if !alias.is_empty() => Some(alias.as_str()),
        _ => None,
    })
}

pub(crate) fn link_address(link: &LinkMessage) -> Option<HardwareAddr> {
    link.attributes.iter().find_map(|attr| match attr {
        LinkAttribute::Address(bytes) if !bytes.is_empty() => {
            Some(HardwareAddr::from_bytes(bytes.clone()))
        }
        _ => None,
    })
}

pub(crate) fn link_mtu(link: &LinkMessage) -> Option<u32> {
    link.attributes.iter().find_map(|attr| match attr {
        LinkAttribute::Mtu(mtu) => Some(*mtu),
        _ => None,
    })
}

pub(crate) fn has_flag(link: &LinkMessage, flag: LinkFlag) -> bool {
    link.header.flags.contains(&flag)
}

/// Software links carry `IFLA_LINKINFO` with their kind
pub(crate) fn has_link_kind(link: &LinkMessage) -> bool {
    link.attributes
        .iter()
        .any(|attr| matches!(attr, LinkAttribute::LinkInfo(_)))
}
