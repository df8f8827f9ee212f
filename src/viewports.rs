use std::collections::{HashMap, HashSet};

use crate::network::{Bounds, Outbox, Response};
use crate::prelude::*;

/// The rectangle each live session is looking at.
///
/// Fan-out is a linear scan over every registration.
#[derive(Debug, Default)]
pub struct Viewports {
    by_session: HashMap<SessionId, Viewport>,
}
impl Viewports {
    pub fn new() -> Self {
        Self::default()
    }
    /// Validates `bounds` and makes it the session's viewport. On error the
    /// previous registration is untouched.
    pub fn set(&mut self, session: SessionId, bounds: Bounds) -> Result<Viewport, Error> {
        let viewport = Viewport::new(bounds.start_x, bounds.start_y, bounds.end_x, bounds.end_y)?;
        self.by_session.insert(session, viewport);
        Ok(viewport)
    }
    pub fn get(&self, session: SessionId) -> Option<&Viewport> {
        self.by_session.get(&session)
    }
    pub fn clear(&mut self, session: SessionId) -> Option<Viewport> {
        self.by_session.remove(&session)
    }
    pub fn active_chunk_keys(&self) -> HashSet<ChunkKey> {
        self.by_session.values().flat_map(|v| v.chunk_keys()).collect()
    }
    pub fn covers_chunk(&self, key: ChunkKey) -> bool {
        self.by_session.values().any(|v| v.intersects(key))
    }
    /// Sessions whose viewport contains the cell.
    pub fn covering(&self, x: i64, y: i64) -> impl Iterator<Item = SessionId> + '_ {
        self.by_session
            .iter()
            .filter(move |(_, viewport)| viewport.contains(x, y))
            .map(|(session, _)| *session)
    }
    pub fn broadcast(&self, x: i64, y: i64, value: bool, outbox: &mut impl Outbox) {
        for session in self.covering(x, y) {
            outbox.submit(session, Response::Cell { x, y, value });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(start_x: i64, start_y: i64, end_x: i64, end_y: i64) -> Bounds {
        Bounds { start_x, start_y, end_x, end_y }
    }

    #[test]
    fn broadcast_reaches_only_covering_sessions() {
        let mut viewports = Viewports::new();
        viewports.set(1, bounds(0, 0, 20, 20)).unwrap();
        viewports.set(2, bounds(100, 100, 120, 120)).unwrap();
        viewports.set(3, bounds(10, 10, 10, 10)).unwrap();

        let mut sent: Vec<(SessionId, Response)> = vec![];
        viewports.broadcast(10, 10, true, &mut sent);
        sent.sort_by_key(|(session, _)| *session);
        assert_eq!(
            sent,
            vec![
                (1, Response::Cell { x: 10, y: 10, value: true }),
                (3, Response::Cell { x: 10, y: 10, value: true }),
            ]
        );
    }

    #[test]
    fn bad_viewport_keeps_the_old_one() {
        let mut viewports = Viewports::new();
        let first = viewports.set(7, bounds(0, 0, 99, 99)).unwrap();
        assert!(matches!(viewports.set(7, bounds(0, 0, 5000, 10)), Err(Error::ViewportTooLarge)));
        assert!(matches!(viewports.set(7, bounds(5, 0, 4, 10)), Err(Error::CoordinatesOutOfRange)));
        assert_eq!(viewports.get(7), Some(&first));

        assert!(viewports.set(8, bounds(0, 0, 5000, 10)).is_err());
        assert_eq!(viewports.get(8), None);
    }

    #[test]
    fn active_keys_cover_every_intersecting_chunk() {
        let mut viewports = Viewports::new();
        viewports.set(1, bounds(-10, -10, 10, 10)).unwrap();
        viewports.set(2, bounds(250, 0, 260, 5)).unwrap();
        let keys = viewports.active_chunk_keys();
        let expected: HashSet<_> = [(-1, -1), (0, -1), (-1, 0), (0, 0), (1, 0)]
            .into_iter()
            .map(|(x, y)| ChunkKey::new(x, y))
            .collect();
        assert_eq!(keys, expected);
        assert!(viewports.covers_chunk(ChunkKey::new(1, 0)));
        assert!(!viewports.covers_chunk(ChunkKey::new(1, 1)));

        viewports.clear(2);
        assert!(!viewports.covers_chunk(ChunkKey::new(1, 0)));
        viewports.clear(1);
        assert!(viewports.active_chunk_keys().is_empty());
    }
}
