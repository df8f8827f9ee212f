use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::grid::Grid;
use crate::limiter::{Identities, Limits};
use crate::network::{Bounds, Outbox, Response, StatsReport};
use crate::persist::{self, Writer};
use crate::prelude::*;
use crate::schedule::Job;
use crate::viewports::Viewports;

/// Totals persisted to `stats.json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub global_click_count: u64,
    pub total_chunks: u64,
    pub unique_users: u64,
}

#[derive(Debug)]
struct Session {
    origin: String,
}

/// One chunk's worth of background work, queued by a flush or eviction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chore {
    Flush(ChunkKey),
    Evict(ChunkKey),
}

// The world is the single owner of every piece of shared state. The event
// loop hands it one message at a time, so a toggle and the broadcast it
// causes always complete before anything else touches the grid.
pub struct World {
    grid: Grid,
    viewports: Viewports,
    identities: Identities,
    stats: Stats,
    sessions: HashMap<SessionId, Session>,
    limits: Limits,
    chores: VecDeque<Chore>,

    stats_file: PathBuf,
    users_file: PathBuf,
    writer: Writer,
}

impl World {
    pub fn open(config: &Config) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let mut stats: Stats = persist::load_json(&config.stats_file())?;
        let grid = Grid::open(config.map_dir())?;
        let identities: Identities = persist::load_json(&config.users_file())?;
        stats.total_chunks = grid.total_chunks();
        stats.unique_users = identities.len() as u64;
        log::info!("loaded {} identities, stats {:?}", identities.len(), stats);
        Ok(Self {
            grid,
            viewports: Viewports::new(),
            identities,
            stats,
            sessions: HashMap::new(),
            limits: config.limits,
            chores: VecDeque::new(),
            stats_file: config.stats_file(),
            users_file: config.users_file(),
            writer: Writer::spawn()?,
        })
    }

    pub fn stats(&self) -> Stats {
        Stats {
            total_chunks: self.grid.total_chunks(),
            ..self.stats
        }
    }
    pub fn active_connections(&self) -> usize {
        self.sessions.len()
    }
    pub fn grid(&self) -> &Grid {
        &self.grid
    }
    pub fn viewports(&self) -> &Viewports {
        &self.viewports
    }
    pub fn identities(&self) -> &Identities {
        &self.identities
    }

    pub fn login(&mut self, session: SessionId, origin: &str, now: u64, outbox: &mut impl Outbox) {
        let (identity, created) = self.identities.resolve(origin, now);
        identity.sessions += 1;
        if created {
            self.stats.unique_users += 1;
        }
        self.sessions.insert(session, Session { origin: origin.to_owned() });
        log::info!("session {session} opened for '{origin}' ({} active)", self.sessions.len());
        outbox.submit(session, Response::Stats(self.report_for(origin)));
    }

    pub fn logout(&mut self, session: SessionId) {
        self.viewports.clear(session);
        if let Some(Session { origin }) = self.sessions.remove(&session) {
            log::info!("session {session} closed for '{origin}' ({} active)", self.sessions.len());
        }
    }

    pub(crate) fn origin_of(&self, session: SessionId) -> Option<String> {
        self.sessions.get(&session).map(|s| s.origin.clone())
    }

    pub(crate) fn admit(&mut self, origin: &str, now: u64) -> Result<(), Error> {
        let (identity, _) = self.identities.resolve(origin, now);
        self.limits.admit(identity, now)
    }

    pub(crate) fn get_grid(&mut self, session: SessionId, bounds: Bounds, outbox: &mut impl Outbox) -> Result<(), Error> {
        let viewport = self.viewports.set(session, bounds)?;
        let bits = self.grid.read_region(&viewport)?;
        outbox.submit(session, Response::GridData { viewport, bits });
        Ok(())
    }

    pub(crate) fn toggle(&mut self, origin: &str, x: i64, y: i64, outbox: &mut impl Outbox) -> Result<(), Error> {
        check_cell(x, y)?;
        let value = self.grid.toggle_cell(x, y)?;
        self.viewports.broadcast(x, y, value, outbox);
        if let Some(identity) = self.identities.get_mut(origin) {
            identity.clicks += 1;
        }
        self.stats.global_click_count += 1;
        Ok(())
    }

    fn report_for(&self, origin: &str) -> StatsReport {
        StatsReport {
            total_chunks: self.grid.total_chunks(),
            global_click_count: self.stats.global_click_count,
            active_connections: self.sessions.len(),
            clicks: self.identities.get(origin).map(|i| i.clicks),
        }
    }

    pub fn push_stats(&self, outbox: &mut impl Outbox) {
        for (session, Session { origin }) in &self.sessions {
            outbox.submit(*session, Response::Stats(self.report_for(origin)));
        }
    }

    pub fn run_job(&mut self, job: Job, outbox: &mut impl Outbox) {
        match job {
            Job::FlushChunks => {
                let dirty = self.grid.dirty_keys();
                log::debug!("queueing {} dirty chunks for saving", dirty.len());
                self.chores.extend(dirty.into_iter().map(Chore::Flush));
            }
            Job::EvictChunks => {
                let active = self.viewports.active_chunk_keys();
                let idle: Vec<_> = self.grid.resident_keys().into_iter().filter(|k| !active.contains(k)).collect();
                log::debug!("queueing {} idle chunks for unloading", idle.len());
                self.chores.extend(idle.into_iter().map(Chore::Evict));
            }
            Job::SaveStats => match persist::to_json(&self.stats()) {
                Ok(bytes) => self.writer.submit(self.stats_file.clone(), bytes),
                Err(e) => log::warn!("failed to encode stats: {e}"),
            },
            Job::SaveIdentities => match persist::to_json(&self.identities) {
                Ok(bytes) => self.writer.submit(self.users_file.clone(), bytes),
                Err(e) => log::warn!("failed to encode identities: {e}"),
            },
            Job::PushStats => self.push_stats(outbox),
        }
    }

    pub fn has_background_work(&self) -> bool {
        !self.chores.is_empty()
    }

    /// Saves or unloads at most one chunk.
    pub fn background_step(&mut self) {
        let Some(chore) = self.chores.pop_front() else { return };
        let result = match chore {
            Chore::Flush(key) => self.grid.flush_chunk(key).map(drop),
            // someone may have scrolled back over it since the pass was queued
            Chore::Evict(key) if self.viewports.covers_chunk(key) => Ok(()),
            Chore::Evict(key) => self.grid.evict_chunk(key).map(drop),
        };
        if let Err(e) = result {
            log::warn!("{chore:?} failed, retrying next pass: {:?}", e);
        }
    }

    /// Flushes everything to disk. The world keeps working afterwards, but
    /// periodic saves stop.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.chores.clear();
        let flushed = self.grid.flush_dirty();
        self.writer.finish();
        persist::write_atomic(&self.stats_file, &persist::to_json(&self.stats())?)?;
        persist::write_atomic(&self.users_file, &persist::to_json(&self.identities)?)?;
        let unsaved = self.grid.dirty_keys().len();
        log::info!("saved {flushed} chunks, {} identities, stats {:?}", self.identities.len(), self.stats());
        if unsaved > 0 {
            return Err(io::Error::new(io::ErrorKind::Other, format!("{unsaved} chunks could not be saved")));
        }
        Ok(())
    }
}
