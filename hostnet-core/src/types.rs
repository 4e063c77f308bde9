//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Error, Result};

/// Workload identifier (the workload's UID)
///
/// This is the only key used to join allocation and lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct WorkloadId(String);

impl WorkloadId {
    /// Maximum length for workload IDs
    pub const MAX_LENGTH: usize = 128;

    /// Create a new `WorkloadId` with validation
    ///
    /// # Errors
    /// Returns error if ID is empty, too long, or contains whitespace or control characters
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Workload ID cannot be empty".to_string(),
            });
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidConfig {
                message: format!("Workload ID too long (max {} chars)", Self::MAX_LENGTH),
            });
        }

        if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidConfig {
                message: "Workload ID cannot contain whitespace or control characters".to_string(),
            });
        }

        Ok(())
    }

    /// Get the workload ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkloadId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for WorkloadId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<WorkloadId> for String {
    fn from(id: WorkloadId) -> Self {
        id.0
    }
}

/// Network interface name, validated against kernel rules
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceName(String);

impl DeviceName {
    /// Maximum interface name length (`IFNAMSIZ` minus the trailing NUL)
    pub const MAX_LENGTH: usize = 15;

    /// Create a new `DeviceName` with validation
    ///
    /// # Errors
    /// Returns error if the name would be rejected by the kernel
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidConfig {
                message: format!(
                    "Interface name {name:?} must be 1-{} bytes",
                    Self::MAX_LENGTH
                ),
            });
        }

        if name == "." || name == ".." {
            return Err(Error::InvalidConfig {
                message: format!("Interface name {name:?} is reserved"),
            });
        }

        if name
            .chars()
            .any(|c| c == '/' || c == ':' || c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidConfig {
                message: format!("Interface name {name:?} contains invalid characters"),
            });
        }

        Ok(Self(name))
    }

    /// Get the name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<DeviceName> for String {
    fn from(name: DeviceName) -> Self {
        name.0
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        nix::unistd::getpid().into()
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

/// Opaque reference to a network namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceRef {
    /// Bind-mounted namespace file, e.g. `/run/netns/w1`
    Path(PathBuf),
    /// Network namespace of a running process
    Process(ProcessId),
}

impl NamespaceRef {
    /// Reference a namespace by filesystem path
    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Reference the namespace of a process
    #[must_use]
    pub const fn process(pid: ProcessId) -> Self {
        Self::Process(pid)
    }

    /// Filesystem path of the namespace file
    #[must_use]
    pub fn to_path(&self) -> PathBuf {
        match self {
            Self::Path(path) => path.clone(),
            Self::Process(pid) => Path::new("/proc")
                .join(pid.to_string())
                .join("ns")
                .join("net"),
        }
    }
}

impl fmt::Display for NamespaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path().display())
    }
}

impl FromStr for NamespaceRef {
    type Err = Error;

    /// Parses either a path or a bare PID
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Namespace reference cannot be empty".to_string(),
            });
        }

        match s.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(Self::Process(ProcessId::from_raw(pid))),
            Ok(_) => Err(Error::InvalidConfig {
                message: format!("Invalid namespace PID: {s}"),
            }),
            Err(_) => Ok(Self::Path(PathBuf::from(s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_id_validation() {
        assert!(WorkloadId::new("6f1c3a52-8d1e-4f7b-9a0e-2b4c7d9e1f30").is_ok());
        assert!(WorkloadId::new("").is_err());
        assert!(WorkloadId::new("a".repeat(129)).is_err());
        assert!(WorkloadId::new("has space").is_err());
    }

    #[test]
    fn test_workload_id_serde() {
        let id = WorkloadId::new("w1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"w1\"");
        let deserialized: WorkloadId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);

        assert!(serde_json::from_str::<WorkloadId>("\"\"").is_err());
    }

    #[test]
    fn test_device_name_validation() {
        assert!(DeviceName::new("eth-phys0").is_ok());
        assert!(DeviceName::new("a".repeat(15)).is_ok());
        assert!(DeviceName::new("a".repeat(16)).is_err());
        assert!(DeviceName::new("").is_err());
        assert!(DeviceName::new("..").is_err());
        assert!(DeviceName::new("eth/0").is_err());
        assert!(DeviceName::new("eth 0").is_err());
    }

    #[test]
    fn test_namespace_ref_paths() {
        let ns = NamespaceRef::path("/run/ns/w1");
        assert_eq!(ns.to_path(), PathBuf::from("/run/ns/w1"));

        let ns = NamespaceRef::process(ProcessId::from_raw(42));
        assert_eq!(ns.to_path(), PathBuf::from("/proc/42/ns/net"));
        assert_eq!(ns.to_string(), "/proc/42/ns/net");
    }

    #[test]
    fn test_namespace_ref_from_str() {
        assert_eq!(
            "1234".parse::<NamespaceRef>().unwrap(),
            NamespaceRef::process(ProcessId::from_raw(1234))
        );
        assert_eq!(
            "/run/netns/blue".parse::<NamespaceRef>().unwrap(),
            NamespaceRef::path("/run/netns/blue")
        );
        assert!("".parse::<NamespaceRef>().is_err());
        assert!("-3".parse::<NamespaceRef>().is_err());
    }

    #[test]
    fn test_namespace_ref_serde() {
        let ns = NamespaceRef::path("/run/ns/w1");
        let json = serde_json::to_string(&ns).unwrap();
        assert_eq!(json, r#"{"path":"/run/ns/w1"}"#);

        let ns: NamespaceRef = serde_json::from_str(r#"{"process":77}"#).unwrap();
        assert_eq!(ns, NamespaceRef::process(ProcessId::from_raw(77)));
    }

    #[test]
    fn test_process_id() {
        let pid = ProcessId::from_raw(123);
        assert_eq!(pid.as_raw(), 123);
        assert!(ProcessId::current().as_raw() > 0);
    }
}
