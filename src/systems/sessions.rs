//! Combat sessions between pairs of hostile units.
//!
//! A session is opened the first time two units detect each other and
//! refreshed on every later detection. It expires once contact has been lost
//! for longer than the inactivity timeout.

use crate::components::UnitId;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Canonical session key: `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub low: UnitId,
    pub high: UnitId,
}

impl SessionKey {
    pub fn new(a: UnitId, b: UnitId) -> Self {
        let (low, high) = crate::spatial::canonical_pair(a, b);
        Self { low, high }
    }

    pub fn involves(&self, id: UnitId) -> bool {
        self.low == id || self.high == id
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "combat_{}_{}", self.low.0, self.high.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSession {
    pub key: SessionKey,
    pub participants: BTreeSet<UnitId>,
    pub started_at: f32,
    /// Time of the most recent detection between the participants.
    pub last_activity: f32,
}

impl CombatSession {
    fn open(key: SessionKey, now: f32) -> Self {
        Self {
            key,
            participants: BTreeSet::from([key.low, key.high]),
            started_at: now,
            last_activity: now,
        }
    }

    /// Participants other than `id`.
    pub fn opponents_of(&self, id: UnitId) -> impl Iterator<Item = UnitId> + '_ {
        self.participants.iter().copied().filter(move |&other| other != id)
    }

    pub fn is_inactive(&self, now: f32, timeout: f32) -> bool {
        now - self.last_activity > timeout
    }
}

/// Every live session, ordered by key.
#[derive(Resource, Debug, Clone, Default)]
pub struct SessionTable {
    sessions: BTreeMap<SessionKey, CombatSession>,
}

impl SessionTable {
    /// Open or refresh the session between `a` and `b`.
    /// Returns true when a new session was opened.
    pub fn touch(&mut self, a: UnitId, b: UnitId, now: f32) -> bool {
        let key = SessionKey::new(a, b);
        match self.sessions.get_mut(&key) {
            Some(session) => {
                session.last_activity = now;
                false
            }
            None => {
                self.sessions.insert(key, CombatSession::open(key, now));
                true
            }
        }
    }

    /// Drop sessions idle for longer than `timeout`, returning their keys.
    pub fn expire(&mut self, now: f32, timeout: f32) -> Vec<SessionKey> {
        let expired: Vec<SessionKey> = self
            .sessions
            .values()
            .filter(|session| session.is_inactive(now, timeout))
            .map(|session| session.key)
            .collect();
        for key in &expired {
            self.sessions.remove(key);
        }
        expired
    }

    /// Remove `id` from every session. Sessions left with nobody to fight are
    /// deleted; returns how many were.
    pub fn purge(&mut self, id: UnitId) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            session.participants.remove(&id);
            session.participants.len() >= 2
        });
        before - self.sessions.len()
    }

    pub fn get(&self, a: UnitId, b: UnitId) -> Option<&CombatSession> {
        self.sessions.get(&SessionKey::new(a, b))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CombatSession> + '_ {
        self.sessions.values()
    }

    /// Opponents each participant shares a session with.
    pub fn opponents(&self) -> BTreeMap<UnitId, BTreeSet<UnitId>> {
        let mut opponents: BTreeMap<UnitId, BTreeSet<UnitId>> = BTreeMap::new();
        for session in self.sessions.values() {
            for &id in &session.participants {
                opponents.entry(id).or_default().extend(session.opponents_of(id));
            }
        }
        opponents
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_opens_then_refreshes() {
        let mut table = SessionTable::default();
        assert!(table.touch(UnitId(5), UnitId(2), 1.0));
        assert!(!table.touch(UnitId(2), UnitId(5), 1.5));
        assert_eq!(table.len(), 1);

        let session = table.get(UnitId(5), UnitId(2)).unwrap();
        assert_eq!(session.key.to_string(), "combat_2_5");
        assert_eq!(session.started_at, 1.0);
        assert_eq!(session.last_activity, 1.5);
    }

    #[test]
    fn test_expire_is_strictly_after_timeout() {
        let mut table = SessionTable::default();
        table.touch(UnitId(1), UnitId(2), 0.0);
        table.touch(UnitId(3), UnitId(4), 2.0);
        assert!(table.expire(5.0, 5.0).is_empty());

        let expired = table.expire(5.5, 5.0);
        assert_eq!(expired, vec![SessionKey::new(UnitId(1), UnitId(2))]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_purge_drops_sessions_without_opponents() {
        let mut table = SessionTable::default();
        table.touch(UnitId(1), UnitId(2), 0.0);
        table.touch(UnitId(1), UnitId(3), 0.0);
        table.touch(UnitId(2), UnitId(3), 0.0);
        assert_eq!(table.purge(UnitId(1)), 2);
        assert_eq!(table.len(), 1);
        assert!(table.iter().all(|s| !s.key.involves(UnitId(1))));
    }

    #[test]
    fn test_opponents_union_sessions() {
        let mut table = SessionTable::default();
        table.touch(UnitId(1), UnitId(2), 0.0);
        table.touch(UnitId(1), UnitId(3), 0.0);
        let opponents = table.opponents();
        assert_eq!(opponents[&UnitId(1)], BTreeSet::from([UnitId(2), UnitId(3)]));
        assert_eq!(opponents[&UnitId(3)], BTreeSet::from([UnitId(1)]));
    }
}
