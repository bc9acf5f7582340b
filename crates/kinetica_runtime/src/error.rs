//! Service lifecycle errors

use std::fmt;
use std::io;

/// Errors returned by [`PhysicsService`](crate::PhysicsService) lifecycle calls
#[derive(Debug)]
pub enum ServiceError {
    /// `initialize` was called while the simulation thread is running
    AlreadyRunning,
    /// `halt` was called without a running simulation thread
    NotRunning,
    /// The simulation thread could not be spawned
    Spawn(io::Error),
    /// The simulation thread panicked; its world is lost
    ThreadPanicked,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::AlreadyRunning => write!(f, "physics service is already running"),
            ServiceError::NotRunning => write!(f, "physics service is not running"),
            ServiceError::Spawn(e) => write!(f, "failed to spawn physics thread: {}", e),
            ServiceError::ThreadPanicked => write!(f, "physics thread panicked"),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ServiceError {
    fn from(e: io::Error) -> Self {
        ServiceError::Spawn(e)
    }
}
