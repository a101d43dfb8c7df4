//! Runtime configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Environment variables (runtime)
//! 2. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use guestthread_runtime::config::RuntimeConfig;
//!
//! // Use defaults with env overrides
//! let config = RuntimeConfig::from_env();
//!
//! // Or customize programmatically
//! let config = RuntimeConfig::from_env()
//!     .stack_size(256 * 1024)
//!     .backend(BackendKind::Clone);
//! ```

pub mod defaults;

use crate::backend::BackendKind;
use guestthread_core::env::{env_get, env_get_opt};

/// Process-wide runtime configuration with builder pattern.
///
/// Use `from_env()` to start with compile-time defaults and apply
/// any environment variable overrides.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Usable stack size per guest unit
    pub stack_size: usize,
    /// Host backend strategy
    pub backend: BackendKind,
    /// Redirect the host C library's errno resolver through the shim
    pub errno_retrofit: bool,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `GTH_STACK_SIZE` - Usable stack size per unit, in bytes
    /// - `GTH_BACKEND` - Host backend: `pthread` or `clone`
    /// - `GTH_ERRNO_RETROFIT` - Patch the host errno resolver (0/1)
    /// - `GTH_DEBUG` - Enable debug logging (0/1)
    pub fn from_env() -> Self {
        let backend = env_get_opt::<BackendKind>("GTH_BACKEND").unwrap_or_default();
        Self {
            stack_size: env_get("GTH_STACK_SIZE", defaults::STACK_SIZE),
            backend,
            errno_retrofit: env_get(
                "GTH_ERRNO_RETROFIT",
                if defaults::ERRNO_RETROFIT { 1usize } else { 0 },
            ) != 0,
            debug_logging: env_get("GTH_DEBUG", if defaults::DEBUG_LOGGING { 1usize } else { 0 })
                != 0,
        }
    }

    /// Create config with explicit defaults (no env override).
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            stack_size: defaults::STACK_SIZE,
            backend: BackendKind::default(),
            errno_retrofit: defaults::ERRNO_RETROFIT,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.backend = kind;
        self
    }

    pub fn errno_retrofit(mut self, enable: bool) -> Self {
        self.errno_retrofit = enable;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_size < 64 * 1024 {
            return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
        }
        if self.stack_size % guestthread_core::constants::PAGE_SIZE != 0 {
            return Err(ConfigError::InvalidValue(
                "stack_size must be a multiple of the page size",
            ));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("guestthread Configuration:");
        eprintln!("  stack_size:      {}", self.stack_size);
        eprintln!("  backend:         {}", self.backend);
        eprintln!("  errno_retrofit:  {}", self.errno_retrofit);
        eprintln!("  debug_logging:   {}", self.debug_logging);
    }
}

/// Configuration error
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env() {
        let config = RuntimeConfig::from_env();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new()
            .stack_size(256 * 1024)
            .backend(BackendKind::Pthread)
            .errno_retrofit(true);

        assert_eq!(config.stack_size, 256 * 1024);
        assert_eq!(config.backend, BackendKind::Pthread);
        assert!(config.errno_retrofit);
    }

    #[test]
    fn test_validation() {
        let config = RuntimeConfig::new().stack_size(4096);
        assert!(config.validate().is_err());

        let config = RuntimeConfig::new().stack_size(128 * 1024 + 7);
        assert!(config.validate().is_err());
    }
}
