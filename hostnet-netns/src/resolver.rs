//! Namespace reference resolution

use hostnet_core::{Error, NamespaceRef, Result};
use nix::sched::{setns, CloneFlags};
use std::fs::File;
use std::io::ErrorKind;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Network namespace of this process
pub const HOST_NAMESPACE_PATH: &str = "/proc/self/ns/net";

/// Open handle to a network namespace
///
/// The descriptor is closed when the context is dropped, so a context held
/// for the duration of one relocation is released on every exit path.
#[derive(Debug)]
pub struct NamespaceContext {
    file: File,
    path: PathBuf,
}

impl NamespaceContext {
    /// Resolve a namespace reference
    ///
    /// # Errors
    /// Returns `NotFound` if the namespace file does not exist
    pub fn open(ns: &NamespaceRef) -> Result<Self> {
        Self::open_path(ns.to_path())
    }

    /// Resolve the namespace this process lives in
    ///
    /// # Errors
    /// Returns error if `/proc` is unavailable
    pub fn host() -> Result<Self> {
        Self::open_path(HOST_NAMESPACE_PATH)
    }

    fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::namespace_not_found(path.display().to_string()),
            ErrorKind::PermissionDenied => Error::PermissionDenied {
                operation: format!("open namespace {}", path.display()),
            },
            _ => Error::Namespace {
                message: format!("Failed to open namespace {}: {e}", path.display()),
            },
        })?;

        tracing::trace!(path = %path.display(), "Opened namespace");

        Ok(Self { file, path })
    }

    /// Path the namespace was resolved from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw descriptor, as carried in `IFLA_NET_NS_FD`
    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Namespace inode; two contexts with the same inode name the same namespace
    ///
    /// # Errors
    /// Returns error if the descriptor cannot be inspected
    pub fn inode(&self) -> Result<u64> {
        Ok(self.file.metadata()?.ino())
    }

    /// Move the calling thread into this namespace
    ///
    /// Only call this on a thread that is discarded afterwards.
    ///
    /// # Errors
    /// Returns error if setns(2) fails
    pub fn enter_current_thread(&self) -> Result<()> {
        setns(&self.file, CloneFlags::CLONE_NEWNET).map_err(|e| {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to enter namespace"
            );
            Error::Namespace {
                message: format!("Failed to enter namespace {}: {e}", self.path.display()),
            }
        })
    }
}

impl AsFd for NamespaceContext {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}
