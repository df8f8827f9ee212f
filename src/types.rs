use crate::Error;

/// Side length of a chunk, in cells.
pub const CHUNK_SIZE: i64 = 256;
/// Bytes backing one chunk: one bit per cell.
pub const CHUNK_BYTES: usize = ((CHUNK_SIZE * CHUNK_SIZE + 7) / 8) as usize;
pub const MAX_VIEWPORT_SIZE: i64 = CHUNK_SIZE * 4;

/// Largest integer the browser client can represent exactly (2^53 - 1).
pub const MAX_SAFE_INT: i64 = (1 << 53) - 1;
/// Bound that keeps `coordinate * CHUNK_SIZE` inside the safe range.
const MAX_CHUNK_SAFE: i64 = MAX_SAFE_INT / CHUNK_SIZE;

/// Handle issued to a connection when it is accepted.
pub type SessionId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub x: i64,
    pub y: i64,
}
impl ChunkKey {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
    /// The chunk holding cell `(x, y)`. Floors, so `(-1, -1)` lives in chunk `(-1, -1)`.
    pub fn containing(x: i64, y: i64) -> Self {
        Self {
            x: x.div_euclid(CHUNK_SIZE),
            y: y.div_euclid(CHUNK_SIZE),
        }
    }
    pub fn file_name(&self) -> String {
        format!("{},{}.chunk", self.x, self.y)
    }
    /// Inverse of [`ChunkKey::file_name`].
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (x, y) = name.strip_suffix(".chunk")?.split_once(',')?;
        Some(Self::new(x.parse().ok()?, y.parse().ok()?))
    }
}
impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Bit offset of a cell inside its chunk.
pub fn local_index(x: i64, y: i64) -> usize {
    (y.rem_euclid(CHUNK_SIZE) * CHUNK_SIZE + x.rem_euclid(CHUNK_SIZE)) as usize
}

/// Rejects cell coordinates the client could not have produced.
pub fn check_cell(x: i64, y: i64) -> Result<(), Error> {
    if (-MAX_SAFE_INT..=MAX_SAFE_INT).contains(&x) && (-MAX_SAFE_INT..=MAX_SAFE_INT).contains(&y) {
        Ok(())
    } else {
        Err(Error::CoordinatesOutOfRange)
    }
}

/// A validated, inclusive rectangle of cells.
///
/// Only [`Viewport::new`] builds one, so start never exceeds end and
/// neither side is longer than [`MAX_VIEWPORT_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    start_x: i64,
    start_y: i64,
    end_x: i64,
    end_y: i64,
}
impl Viewport {
    pub fn new(start_x: i64, start_y: i64, end_x: i64, end_y: i64) -> Result<Self, Error> {
        let width = end_x as i128 - start_x as i128 + 1;
        let height = end_y as i128 - start_y as i128 + 1;
        let max = MAX_VIEWPORT_SIZE as i128;
        if width > max || height > max {
            return Err(Error::ViewportTooLarge);
        }
        let safe = -MAX_SAFE_INT..=MAX_SAFE_INT;
        if ![start_x, start_y, end_x, end_y].iter().all(|c| safe.contains(c))
            || start_x < -MAX_CHUNK_SAFE
            || start_y < -MAX_CHUNK_SAFE
            || end_x > MAX_CHUNK_SAFE
            || end_y > MAX_CHUNK_SAFE
            || width < 1
            || height < 1
        {
            return Err(Error::CoordinatesOutOfRange);
        }
        Ok(Self { start_x, start_y, end_x, end_y })
    }
    pub fn start_x(&self) -> i64 {
        self.start_x
    }
    pub fn start_y(&self) -> i64 {
        self.start_y
    }
    pub fn end_x(&self) -> i64 {
        self.end_x
    }
    pub fn end_y(&self) -> i64 {
        self.end_y
    }
    pub fn width(&self) -> i64 {
        self.end_x - self.start_x + 1
    }
    pub fn height(&self) -> i64 {
        self.end_y - self.start_y + 1
    }
    /// Bytes needed to pack every cell of the viewport.
    pub fn packed_len(&self) -> usize {
        ((self.width() * self.height() + 7) / 8) as usize
    }
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.start_x && x <= self.end_x && y >= self.start_y && y <= self.end_y
    }
    pub fn intersects(&self, key: ChunkKey) -> bool {
        let (x0, y0) = (key.x * CHUNK_SIZE, key.y * CHUNK_SIZE);
        x0 <= self.end_x && x0 + CHUNK_SIZE > self.start_x && y0 <= self.end_y && y0 + CHUNK_SIZE > self.start_y
    }
    /// Every chunk whose tile overlaps the viewport.
    pub fn chunk_keys(&self) -> impl Iterator<Item = ChunkKey> {
        let first = ChunkKey::containing(self.start_x, self.start_y);
        let last = ChunkKey::containing(self.end_x, self.end_y);
        (first.y..=last.y).flat_map(move |y| (first.x..=last.x).map(move |x| ChunkKey::new(x, y)))
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_cells_floor_into_their_chunk() {
        assert_eq!(ChunkKey::containing(-1, -1), ChunkKey::new(-1, -1));
        assert_eq!(ChunkKey::containing(-256, 255), ChunkKey::new(-1, 0));
        assert_eq!(ChunkKey::containing(-257, 256), ChunkKey::new(-2, 1));
        assert_eq!(local_index(-1, -1), 255 * 256 + 255);
        assert_eq!(local_index(-256, 0), 0);
        assert_eq!(local_index(5, 5), 1285);
    }

    #[test]
    fn chunk_file_names() {
        let key = ChunkKey::new(-3, 12);
        assert_eq!(key.file_name(), "-3,12.chunk");
        assert_eq!(ChunkKey::from_file_name("-3,12.chunk"), Some(key));
        assert_eq!(ChunkKey::from_file_name("-3,12.chunk.tmp"), None);
        assert_eq!(ChunkKey::from_file_name("stats.json"), None);
    }

    #[test]
    fn viewport_size_is_capped() {
        assert!(Viewport::new(0, 0, 1023, 1023).is_ok());
        assert!(matches!(Viewport::new(0, 0, 1024, 0), Err(Error::ViewportTooLarge)));
        assert!(matches!(Viewport::new(0, 0, 0, 1024), Err(Error::ViewportTooLarge)));
        assert!(matches!(Viewport::new(i64::MIN, 0, i64::MAX, 0), Err(Error::ViewportTooLarge)));
    }

    #[test]
    fn viewport_rejects_unsafe_coordinates() {
        let edge = MAX_SAFE_INT / CHUNK_SIZE;
        assert!(Viewport::new(edge - 10, edge - 10, edge, edge).is_ok());
        assert!(matches!(Viewport::new(edge - 10, 0, edge + 1, 0), Err(Error::CoordinatesOutOfRange)));
        assert!(matches!(Viewport::new(-edge - 1, 0, -edge, 0), Err(Error::CoordinatesOutOfRange)));
        assert!(matches!(Viewport::new(10, 0, 9, 0), Err(Error::CoordinatesOutOfRange)));
    }

    #[test]
    fn viewport_chunk_keys_start_from_floored_origin() {
        // starts mid-chunk: the unrounded walk would skip the last column
        let viewport = Viewport::new(200, -10, 300, 10).unwrap();
        let keys: Vec<_> = viewport.chunk_keys().collect();
        assert_eq!(
            keys,
            vec![ChunkKey::new(0, -1), ChunkKey::new(1, -1), ChunkKey::new(0, 0), ChunkKey::new(1, 0)]
        );
        assert!(keys.iter().all(|k| viewport.intersects(*k)));
        assert!(!viewport.intersects(ChunkKey::new(2, 0)));
        assert!(!viewport.intersects(ChunkKey::new(0, 1)));
    }

    #[test]
    fn viewport_contains_is_inclusive() {
        let viewport = Viewport::new(0, 0, 20, 20).unwrap();
        assert!(viewport.contains(0, 0));
        assert!(viewport.contains(20, 20));
        assert!(viewport.contains(10, 10));
        assert!(!viewport.contains(21, 10));
        assert!(!viewport.contains(10, -1));
        assert_eq!(viewport.packed_len(), (21 * 21 + 7) / 8);
    }
}
