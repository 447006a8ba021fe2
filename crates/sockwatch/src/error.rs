// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by dispatcher operations.
//!
//! Only resource exhaustion and lifecycle misuse reach the caller. Poll
//! failures are logged by the background loop and never surface here, and a
//! transaction timeout is delivered to that transaction alone as its terminal
//! outcome.

/// Errors returned by sockwatch operations.
///
/// # Example
///
/// ```rust
/// use sockwatch::Error;
///
/// let err = Error::QueueFull { capacity: 4 };
/// assert_eq!(err.to_string(), "Deferred queue full (4 slots, 3 usable)");
/// assert!(err.is_resource_exhaustion());
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Deferred queue has no free slot (one slot is always kept empty).
    QueueFull {
        /// Total slots in the ring, including the reserved one.
        capacity: usize,
    },
    /// Allocation for a growable structure failed.
    OutOfMemory {
        /// Which structure tried to grow.
        what: &'static str,
        /// Element count that was requested.
        requested: usize,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Configuration rejected by [`DispatcherConfig::validate`](crate::DispatcherConfig::validate).
    InvalidConfig(String),
    /// The background thread could not be spawned.
    ThreadSpawn(std::io::Error),
    /// The dispatcher has been shut down.
    Stopped,

    // ========================================================================
    // Platform Errors
    // ========================================================================
    /// I/O error with underlying cause.
    Io(std::io::Error),
}

impl Error {
    /// True for the ResourceExhaustion class (queue full, growth failure).
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Error::QueueFull { .. } | Error::OutOfMemory { .. })
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::QueueFull { capacity } => write!(
                f,
                "Deferred queue full ({} slots, {} usable)",
                capacity,
                capacity.saturating_sub(1)
            ),
            Error::OutOfMemory { what, requested } => {
                write!(f, "Out of memory growing {} to {} entries", what, requested)
            }
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::ThreadSpawn(e) => write!(f, "Failed to spawn dispatcher thread: {}", e),
            Error::Stopped => write!(f, "Dispatcher stopped"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ThreadSpawn(e) | Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenient alias for results using the crate [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_messages() {
        let err = Error::OutOfMemory {
            what: "socket registry",
            requested: 8,
        };
        assert_eq!(
            err.to_string(),
            "Out of memory growing socket registry to 8 entries"
        );
        assert_eq!(Error::Stopped.to_string(), "Dispatcher stopped");
        assert_eq!(
            Error::InvalidConfig("queue_capacity must be >= 2".into()).to_string(),
            "Invalid configuration: queue_capacity must be >= 2"
        );
    }

    #[test]
    fn test_resource_exhaustion_class() {
        assert!(Error::QueueFull { capacity: 2 }.is_resource_exhaustion());
        assert!(Error::OutOfMemory {
            what: "deferred queue",
            requested: 1
        }
        .is_resource_exhaustion());
        assert!(!Error::Stopped.is_resource_exhaustion());
    }

    #[test]
    fn test_io_source_preserved() {
        let err: Error = std::io::Error::other("boom").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.source().is_some());
        assert!(Error::Stopped.source().is_none());
    }
}
