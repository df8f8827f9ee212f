use std::collections::{hash_map::Entry, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use crate::prelude::*;

pub struct Chunk {
    bits: Box<[u8; CHUNK_BYTES]>,
    dirty: bool,
}
impl Chunk {
    fn empty() -> Self {
        Self {
            bits: Box::new([0; CHUNK_BYTES]),
            dirty: false,
        }
    }
    fn from_bytes(bytes: Vec<u8>) -> io::Result<Self> {
        let len = bytes.len();
        let bits = bytes.into_boxed_slice().try_into().map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("chunk file is {len} bytes, expected {CHUNK_BYTES}"))
        })?;
        Ok(Self { bits, dirty: false })
    }
    fn get(&self, index: usize) -> bool {
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }
    fn toggle(&mut self, index: usize) -> bool {
        self.bits[index / 8] ^= 1 << (index % 8);
        self.dirty = true;
        self.get(index)
    }
    pub fn bytes(&self) -> &[u8] {
        &self.bits[..]
    }
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// The bit plane, paged in from `dir` one chunk at a time.
//
// Chunks live in memory only while a viewport covers them. Anything that
// isn't resident is either on disk or all zero, and the two look the same
// to readers.
pub struct Grid {
    dir: PathBuf,
    chunks: HashMap<ChunkKey, Chunk>,
    total_chunks: u64,
}
impl Grid {
    /// Opens (creating if needed) the chunk directory and counts what is already there.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let mut total_chunks = 0;
        for entry in fs::read_dir(&dir)? {
            let name = entry?.file_name();
            if name.to_str().and_then(ChunkKey::from_file_name).is_some() {
                total_chunks += 1;
            }
        }
        log::info!("discovered {total_chunks} chunks in {}", dir.display());
        Ok(Self {
            dir,
            chunks: HashMap::new(),
            total_chunks,
        })
    }
    /// Chunks known to exist, on disk or in memory.
    pub fn total_chunks(&self) -> u64 {
        self.total_chunks
    }
    pub fn resident(&self) -> usize {
        self.chunks.len()
    }
    pub fn chunk_at(&self, key: ChunkKey) -> Option<&Chunk> {
        self.chunks.get(&key)
    }
    fn chunk_path(&self, key: ChunkKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Resident chunk for `key`, loading it from disk or creating it empty.
    fn chunk(&mut self, key: ChunkKey) -> Result<&mut Chunk, Error> {
        let resident = self.chunks.len();
        match self.chunks.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.dir.join(key.file_name());
                let chunk = match fs::read(&path) {
                    Ok(bytes) => {
                        let chunk = Chunk::from_bytes(bytes).map_err(|e| Error::from((key, e)))?;
                        log::debug!("chunk [{key}] has been loaded ({} in memory)", resident + 1);
                        chunk
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        self.total_chunks += 1;
                        log::debug!("chunk [{key}] has been created ({} in memory)", resident + 1);
                        Chunk::empty()
                    }
                    Err(e) => return Err((key, e).into()),
                };
                Ok(entry.insert(chunk))
            }
        }
    }

    pub fn get_cell(&mut self, x: i64, y: i64) -> Result<bool, Error> {
        Ok(self.chunk(ChunkKey::containing(x, y))?.get(local_index(x, y)))
    }

    /// Flips one cell and returns its new value.
    pub fn toggle_cell(&mut self, x: i64, y: i64) -> Result<bool, Error> {
        Ok(self.chunk(ChunkKey::containing(x, y))?.toggle(local_index(x, y)))
    }

    /// Packs the viewport's cells row-major, LSB-first, the same layout chunks use.
    pub fn read_region(&mut self, viewport: &Viewport) -> Result<Vec<u8>, Error> {
        let width = viewport.width();
        let mut packed = vec![0u8; viewport.packed_len()];
        for row in 0..viewport.height() {
            let y = viewport.start_y() + row;
            let mut x = viewport.start_x();
            // walk the row one chunk-wide run at a time
            while x <= viewport.end_x() {
                let key = ChunkKey::containing(x, y);
                let run_end = ((key.x + 1) * CHUNK_SIZE - 1).min(viewport.end_x());
                let chunk = self.chunk(key)?;
                for cx in x..=run_end {
                    if chunk.get(local_index(cx, y)) {
                        let i = (row * width + (cx - viewport.start_x())) as usize;
                        packed[i / 8] |= 1 << (i % 8);
                    }
                }
                x = run_end + 1;
            }
        }
        Ok(packed)
    }

    pub fn dirty_keys(&self) -> Vec<ChunkKey> {
        self.chunks
            .iter()
            .filter(|(_, chunk)| chunk.dirty)
            .map(|(key, _)| *key)
            .collect()
    }
    pub fn resident_keys(&self) -> Vec<ChunkKey> {
        self.chunks.keys().copied().collect()
    }

    /// Writes one chunk out if it has unsaved changes. Returns whether anything was written.
    pub fn flush_chunk(&mut self, key: ChunkKey) -> Result<bool, Error> {
        let path = self.chunk_path(key);
        let Some(chunk) = self.chunks.get_mut(&key) else { return Ok(false) };
        if !chunk.dirty {
            return Ok(false);
        }
        crate::persist::write_atomic(&path, chunk.bytes()).map_err(|e| Error::from((key, e)))?;
        chunk.dirty = false;
        Ok(true)
    }

    /// Flushes every dirty chunk. Chunks that fail stay dirty for the next pass.
    pub fn flush_dirty(&mut self) -> usize {
        let mut flushed = 0;
        for key in self.dirty_keys() {
            match self.flush_chunk(key) {
                Ok(true) => flushed += 1,
                Ok(false) => {}
                Err(e) => log::warn!("failed to save chunk [{key}]: {:?}", e),
            }
        }
        flushed
    }

    /// Drops one chunk from memory, saving it first. A chunk that can't be
    /// saved stays resident.
    pub fn evict_chunk(&mut self, key: ChunkKey) -> Result<bool, Error> {
        self.flush_chunk(key)?;
        let evicted = self.chunks.remove(&key).is_some();
        if evicted {
            log::debug!("chunk [{key}] has been unloaded ({} in memory)", self.chunks.len());
        }
        Ok(evicted)
    }

    /// Unloads every resident chunk not named in `active`.
    pub fn evict(&mut self, active: &HashSet<ChunkKey>) -> usize {
        let mut evicted = 0;
        for key in self.resident_keys() {
            if active.contains(&key) {
                continue;
            }
            match self.evict_chunk(key) {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => log::warn!("keeping chunk [{key}] in memory, save failed: {:?}", e),
            }
        }
        evicted
    }
}
