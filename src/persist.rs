//! Whole-file persistence: every save replaces the previous version atomically.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use serde::{de::DeserializeOwned, Serialize};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `bytes` beside `path` and renames over it, so a crash mid-write
/// leaves the old contents intact.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

/// Loads a JSON document, or writes out and returns the default if there is none yet.
pub fn load_json<T: Serialize + DeserializeOwned + Default>(path: &Path) -> io::Result<T> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let value = T::default();
            write_atomic(path, &to_json(&value)?)?;
            Ok(value)
        }
        Err(e) => Err(e),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Hands finished documents to a thread that writes them out, keeping the
/// event loop off the disk.
#[derive(Debug)]
pub struct Writer {
    queue: Option<mpsc::Sender<(PathBuf, Vec<u8>)>>,
    thread: Option<thread::JoinHandle<()>>,
}
impl Writer {
    pub fn spawn() -> io::Result<Self> {
        let (queue, jobs) = mpsc::channel::<(PathBuf, Vec<u8>)>();
        let thread = thread::Builder::new()
            .name("persist".into())
            .spawn(move || {
                for (path, bytes) in jobs {
                    match write_atomic(&path, &bytes) {
                        Ok(()) => log::trace!("saved {} ({} bytes)", path.display(), bytes.len()),
                        Err(e) => log::warn!("failed to save {}: {e}", path.display()),
                    }
                }
            })?;
        Ok(Self {
            queue: Some(queue),
            thread: Some(thread),
        })
    }
    pub fn submit(&self, path: PathBuf, bytes: Vec<u8>) {
        let sent = self.queue.as_ref().map(|q| q.send((path, bytes)));
        if !matches!(sent, Some(Ok(()))) {
            log::warn!("persist thread is gone, dropping a save");
        }
    }
    /// Waits for every submitted save to land.
    pub fn finish(&mut self) {
        drop(self.queue.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("persist thread panicked");
            }
        }
    }
}
impl Drop for Writer {
    fn drop(&mut self) {
        self.finish();
    }
}
