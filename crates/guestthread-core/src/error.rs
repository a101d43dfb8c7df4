//! Error types for the guest thread lifecycle subsystem

use core::fmt;

/// Result type for lifecycle operations
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Errors that can occur while creating or managing a guest execution unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    /// Descriptor is missing a stack range or entry routine
    InvalidDescriptor,

    /// Runtime bring-up has not happened yet
    NotInitialized,

    /// Bring-up was already performed
    AlreadyInitialized,

    /// Requested backend is not available on this target
    UnsupportedBackend(&'static str),

    /// Coordinator registration failed during startup
    HandshakeFailed,

    /// Stack memory allocation/mapping failed
    Memory(MemoryError),

    /// Raw OS error from a host primitive (errno value)
    Os(i32),
}

impl ThreadError {
    /// Capture the calling thread's last OS error
    pub fn last_os() -> Self {
        ThreadError::Os(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::InvalidDescriptor => write!(f, "invalid guest thread descriptor"),
            ThreadError::NotInitialized => write!(f, "runtime not initialized"),
            ThreadError::AlreadyInitialized => write!(f, "runtime already initialized"),
            ThreadError::UnsupportedBackend(name) => {
                write!(f, "backend '{}' not available on this target", name)
            }
            ThreadError::HandshakeFailed => write!(f, "coordinator handshake failed"),
            ThreadError::Memory(e) => write!(f, "memory error: {}", e),
            ThreadError::Os(code) => write!(f, "os error: {}", code),
        }
    }
}

impl std::error::Error for ThreadError {}

/// Stack-memory related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect on the guard page failed
    ProtectionFailed,

    /// Stack bookkeeping table has no free entry
    RegionTableFull,

    /// Address does not fall inside any tracked stack region
    UnknownRegion,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "guard page protection failed"),
            MemoryError::RegionTableFull => write!(f, "stack region table full"),
            MemoryError::UnknownRegion => write!(f, "address not in a tracked stack region"),
        }
    }
}

impl From<MemoryError> for ThreadError {
    fn from(e: MemoryError) -> Self {
        ThreadError::Memory(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = ThreadError::InvalidDescriptor;
        assert_eq!(format!("{}", e), "invalid guest thread descriptor");

        let e = ThreadError::Memory(MemoryError::AllocationFailed);
        assert_eq!(format!("{}", e), "memory error: stack allocation failed");

        let e = ThreadError::Os(12);
        assert_eq!(format!("{}", e), "os error: 12");
    }

    #[test]
    fn test_error_conversion() {
        let mem_err = MemoryError::RegionTableFull;
        let err: ThreadError = mem_err.into();
        assert!(matches!(err, ThreadError::Memory(MemoryError::RegionTableFull)));
    }
}
