//! Error types for hostnet

use thiserror::Error;

/// Hostnet error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A referenced device or namespace does not exist
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up ("device", "namespace")
        kind: &'static str,
        /// Name or path that was looked up
        name: String,
    },

    /// Namespace could not be resolved or entered
    #[error("Namespace error: {message}")]
    Namespace {
        /// Error message
        message: String,
    },

    /// The kernel rejected a netlink request
    #[error("Netlink {operation} rejected: {message}")]
    ProtocolRejected {
        /// Operation that was attempted
        operation: String,
        /// Error reported by the kernel
        message: String,
    },

    /// An address could not be assigned; earlier addresses stay in place
    #[error("Failed to assign {address} on namespace {namespace}: {message}")]
    AddressAssignment {
        /// Offending address
        address: String,
        /// Target namespace
        namespace: String,
        /// Error reported by the kernel
        message: String,
    },

    /// The device moved but could not be brought up at its destination
    #[error("Device {device} moved to {destination} but could not be brought up: {message}")]
    EnableFailed {
        /// Name of the device at its destination
        device: String,
        /// Namespace the device now lives in
        destination: String,
        /// Error reported by the kernel
        message: String,
    },

    /// An operation was requested in a state that does not allow it
    #[error("Precondition violated: {message}")]
    Precondition {
        /// Error message
        message: String,
    },

    /// Permission denied
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Lifecycle subscription kept failing
    #[error("Lifecycle subscription failed to restart after {attempts} attempts")]
    RestartsExhausted {
        /// Number of consecutive failed attempts
        attempts: u32,
    },
}

impl Error {
    /// Shorthand for a missing device
    #[must_use]
    pub fn device_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "device",
            name: name.into(),
        }
    }

    /// Shorthand for a missing namespace
    #[must_use]
    pub fn namespace_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "namespace",
            name: name.into(),
        }
    }

    /// Check whether this is a not-found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check whether the device changed namespace before the failure
    ///
    /// Partial address assignment and enable failures happen after the move,
    /// so the device lives at its destination regardless.
    #[must_use]
    pub const fn device_moved(&self) -> bool {
        matches!(self, Self::AddressAssignment { .. } | Self::EnableFailed { .. })
    }

    /// Check whether this is a precondition violation
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}

/// Result type alias for hostnet operations
pub type Result<T> = std::result::Result<T, Error>;
