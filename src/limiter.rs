use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Admission-control knobs. The defaults are what the public server runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub window_ms: u64,
    pub max_requests: usize,
    pub initial_cooldown_ms: u64,
    /// Each consecutive cooldown lasts this many times longer.
    pub increment_factor: u64,
    /// Escalation is forgiven after `cooldown * reset_factor` of good behaviour.
    pub reset_factor: u64,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            window_ms: 2000,
            max_requests: 10,
            initial_cooldown_ms: 3000,
            increment_factor: 2,
            reset_factor: 2,
        }
    }
}

/// Bookkeeping for one origin address, kept across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub created: u64,
    pub last_activity: u64,
    pub sessions: u64,
    pub messages: u64,
    pub clicks: u64,
    pub cooldown_until: u64,
    pub cooldown_count: u32,
    pub last_cooldown: u64,
    pub requests: VecDeque<u64>,
}
impl Identity {
    pub fn new(now: u64) -> Self {
        Self {
            created: now,
            last_activity: now,
            ..Self::default()
        }
    }
    pub fn in_cooldown(&self, now: u64) -> bool {
        now < self.cooldown_until
    }
}

impl Limits {
    pub fn cooldown_ms(&self, level: u32) -> u64 {
        self.initial_cooldown_ms
            .saturating_mul(self.increment_factor.saturating_pow(level))
    }

    /// Runs one inbound message through the identity's window and cooldown state.
    pub fn admit(&self, identity: &mut Identity, now: u64) -> Result<(), Error> {
        identity.last_activity = now;
        identity.messages += 1;

        while identity
            .requests
            .front()
            .is_some_and(|&t| t.saturating_add(self.window_ms) <= now)
        {
            identity.requests.pop_front();
        }

        let cooldown = self.cooldown_ms(identity.cooldown_count);
        if identity.last_cooldown != 0
            && now.saturating_sub(identity.last_cooldown) > cooldown.saturating_mul(self.reset_factor)
        {
            identity.cooldown_count = 0;
        }

        if identity.in_cooldown(now) {
            return Err(Error::InCooldown {
                retry_ms: identity.cooldown_until - now,
            });
        }

        identity.requests.push_back(now);
        if identity.requests.len() > self.max_requests {
            let cooldown = self.cooldown_ms(identity.cooldown_count);
            identity.cooldown_count += 1;
            identity.last_cooldown = now;
            identity.cooldown_until = now.saturating_add(cooldown);
            return Err(Error::RateLimited { retry_ms: cooldown });
        }
        Ok(())
    }
}

/// Every identity ever seen, keyed by origin address.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identities {
    records: HashMap<String, Identity>,
}
impl Identities {
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn get(&self, origin: &str) -> Option<&Identity> {
        self.records.get(origin)
    }
    pub fn get_mut(&mut self, origin: &str) -> Option<&mut Identity> {
        self.records.get_mut(origin)
    }
    /// Looks up `origin`, creating its record if this is its first visit.
    /// The flag is true when a record was created.
    pub fn resolve(&mut self, origin: &str, now: u64) -> (&mut Identity, bool) {
        let created = !self.records.contains_key(origin);
        let identity = self
            .records
            .entry(origin.to_owned())
            .or_insert_with(|| Identity::new(now));
        (identity, created)
    }
}
