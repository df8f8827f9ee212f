mod collections;
pub mod config;
pub mod error;
pub mod grid;
pub mod limiter;
pub mod network;
pub mod persist;
pub mod schedule;
pub mod types;
pub mod viewports;
pub mod world;

pub use config::Config;
pub use error::Error;
pub use network::Network;
pub use world::World;

mod prelude {
    pub(crate) use crate::collections::*;
    pub(crate) use crate::types::*;
    pub(crate) use crate::Error;
    pub(crate) use std::{io, time};
    pub(crate) use std::net::TcpStream;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A fresh, empty directory for one test.
    pub fn scratch_dir(name: &str) -> PathBuf {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("checkserv-{}-{name}-{n}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
