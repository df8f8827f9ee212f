use std::io;

use thiserror::Error;

use crate::types::{ChunkKey, MAX_VIEWPORT_SIZE};

/// Everything that can go wrong while serving a session's request.
///
/// None of these are fatal: each is reported back to the client as an
/// `error` message and the connection stays open.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Viewport size exceeds maximum allowed size of {}x{}", MAX_VIEWPORT_SIZE, MAX_VIEWPORT_SIZE)]
    ViewportTooLarge,
    #[error("Viewport coordinates exceed allowed limits")]
    CoordinatesOutOfRange,
    #[error("You are in cooldown period.\nPlease wait {} seconds.", seconds(*retry_ms))]
    InCooldown { retry_ms: u64 },
    #[error("Slow down! You exceeded the rate limit.\nWait {} seconds.", seconds(*retry_ms))]
    RateLimited { retry_ms: u64 },
    #[error("Grid storage is temporarily unavailable")]
    ChunkIo {
        key: ChunkKey,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Milliseconds the client should wait before trying again, if known.
    pub fn retry_ms(&self) -> Option<u64> {
        match self {
            Error::InCooldown { retry_ms } | Error::RateLimited { retry_ms } => Some(*retry_ms),
            _ => None,
        }
    }
}

fn seconds(ms: u64) -> u64 {
    (ms + 500) / 1000
}

impl From<(ChunkKey, io::Error)> for Error {
    fn from((key, source): (ChunkKey, io::Error)) -> Self {
        Self::ChunkIo { key, source }
    }
}
