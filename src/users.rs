use crate::{
    programs::{LikeStatus, UserProfile},
    storage::write_atomic,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub status: LikeStatus,
    pub at: DateTime<Utc>,
}

/// Everything the ranking side knows about one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub profile: UserProfile,

    #[serde(default)]
    pub preference: Option<Vec<f32>>,

    /// program id -> time bookmarked
    #[serde(default)]
    pub bookmarks: BTreeMap<u64, DateTime<Utc>>,

    #[serde(default)]
    pub reactions: BTreeMap<u64, Reaction>,
}

impl UserRecord {
    pub fn is_bookmarked(&self, program_id: u64) -> bool {
        self.bookmarks.contains_key(&program_id)
    }

    pub fn reaction(&self, program_id: u64) -> Option<LikeStatus> {
        self.reactions.get(&program_id).map(|r| r.status)
    }

    /// Bookmarked ids, most recent first.
    pub fn recent_bookmarks(&self, limit: usize) -> Vec<u64> {
        most_recent(self.bookmarks.iter().map(|(id, at)| (*id, *at)), limit)
    }

    /// Ids with the given reaction, most recent first.
    pub fn recent_reactions(&self, status: LikeStatus, limit: usize) -> Vec<u64> {
        most_recent(
            self.reactions
                .iter()
                .filter(|(_, r)| r.status == status)
                .map(|(id, r)| (*id, r.at)),
            limit,
        )
    }
}

fn most_recent(items: impl Iterator<Item = (u64, DateTime<Utc>)>, limit: usize) -> Vec<u64> {
    let mut items: Vec<_> = items.collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    items.into_iter().take(limit).map(|(id, _)| id).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("user store unavailable")]
    Unavailable,

    #[error("failed to persist users: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode users: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-user profiles, preference vectors, bookmarks and reactions.
///
/// Every mutation is idempotent and, when backed by a file, persisted
/// before the call returns.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, UserRecord>>,
    path: Option<PathBuf>,
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let users = if path.is_file() {
            let data = std::fs::read(path)?;
            serde_json::from_slice(&data)
                .map_err(|e| anyhow::anyhow!("{} is malformed: {e}", path.display()))?
        } else {
            log::info!("Creating new user store at {}", path.display());
            HashMap::new()
        };

        Ok(Self {
            users: RwLock::new(users),
            path: Some(path.to_path_buf()),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, UserRecord>>, UserStoreError> {
        self.users.read().map_err(|_| UserStoreError::Unavailable)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, UserRecord>>, UserStoreError> {
        self.users.write().map_err(|_| UserStoreError::Unavailable)
    }

    fn persist(&self, users: &HashMap<String, UserRecord>) -> Result<(), UserStoreError> {
        if let Some(path) = &self.path {
            let data = serde_json::to_vec(users)?;
            write_atomic(path, &data)?;
        }
        Ok(())
    }

    /// Apply `f` to a copy of the user's record and commit it when it
    /// reports a change. A failed write leaves the previous record in place.
    fn update<F>(&self, user: &str, f: F) -> Result<bool, UserStoreError>
    where
        F: FnOnce(&mut UserRecord) -> bool,
    {
        let mut users = self.write()?;

        let previous = users.get(user).cloned();
        let mut record = previous.clone().unwrap_or_default();
        if !f(&mut record) {
            return Ok(false);
        }

        users.insert(user.to_string(), record);
        if let Err(err) = self.persist(&users) {
            match previous {
                Some(previous) => users.insert(user.to_string(), previous),
                None => users.remove(user),
            };
            return Err(err);
        }

        Ok(true)
    }

    /// Snapshot of a user's record. Unknown users get an empty record.
    pub fn get(&self, user: &str) -> Result<UserRecord, UserStoreError> {
        Ok(self.read()?.get(user).cloned().unwrap_or_default())
    }

    pub fn set_profile(&self, user: &str, profile: UserProfile) -> Result<bool, UserStoreError> {
        self.update(user, |record| {
            let changed = record.profile != profile;
            record.profile = profile;
            changed
        })
    }

    pub fn set_preference(&self, user: &str, preference: Vec<f32>) -> Result<bool, UserStoreError> {
        self.update(user, |record| {
            let preference = Some(preference);
            let changed = record.preference != preference;
            record.preference = preference;
            changed
        })
    }

    pub fn set_bookmark(&self, user: &str, program_id: u64, on: bool, at: DateTime<Utc>) -> Result<bool, UserStoreError> {
        self.update(user, |record| {
            if on {
                if record.bookmarks.contains_key(&program_id) {
                    return false;
                }
                record.bookmarks.insert(program_id, at);
                true
            } else {
                record.bookmarks.remove(&program_id).is_some()
            }
        })
    }

    /// `on` sets the reaction, replacing the opposite one. Off only clears
    /// a reaction of the same kind.
    pub fn set_reaction(
        &self,
        user: &str,
        program_id: u64,
        status: LikeStatus,
        on: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, UserStoreError> {
        self.update(user, |record| {
            let current = record.reaction(program_id);
            if on {
                if current == Some(status) {
                    return false;
                }
                record.reactions.insert(program_id, Reaction { status, at });
                true
            } else if current == Some(status) {
                record.reactions.remove(&program_id);
                true
            } else {
                false
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_bookmarks_are_idempotent() {
        let store = UserStore::in_memory();

        assert!(store.set_bookmark("u", 1, true, at(10)).unwrap());
        assert!(!store.set_bookmark("u", 1, true, at(20)).unwrap());
        assert_eq!(store.get("u").unwrap().bookmarks[&1], at(10));

        assert!(store.set_bookmark("u", 1, false, at(30)).unwrap());
        assert!(!store.set_bookmark("u", 1, false, at(40)).unwrap());
        assert!(store.get("u").unwrap().bookmarks.is_empty());
    }

    #[test]
    fn test_reactions_replace_and_clear() {
        let store = UserStore::in_memory();

        store.set_reaction("u", 1, LikeStatus::Like, true, at(1)).unwrap();
        assert_eq!(store.get("u").unwrap().reaction(1), Some(LikeStatus::Like));

        // dislike replaces like
        store.set_reaction("u", 1, LikeStatus::Dislike, true, at(2)).unwrap();
        assert_eq!(store.get("u").unwrap().reaction(1), Some(LikeStatus::Dislike));

        // removing a like leaves the dislike alone
        assert!(!store.set_reaction("u", 1, LikeStatus::Like, false, at(3)).unwrap());
        assert_eq!(store.get("u").unwrap().reaction(1), Some(LikeStatus::Dislike));

        assert!(store.set_reaction("u", 1, LikeStatus::Dislike, false, at(4)).unwrap());
        assert_eq!(store.get("u").unwrap().reaction(1), None);
    }

    #[test]
    fn test_recent_ordering_and_limit() {
        let store = UserStore::in_memory();
        for id in 1..=5 {
            store.set_bookmark("u", id, true, at(id as i64 * 10)).unwrap();
            store.set_reaction("u", id, LikeStatus::Like, true, at(100 - id as i64)).unwrap();
        }
        store.set_reaction("u", 9, LikeStatus::Dislike, true, at(500)).unwrap();

        let record = store.get("u").unwrap();
        assert_eq!(record.recent_bookmarks(3), vec![5, 4, 3]);
        assert_eq!(record.recent_reactions(LikeStatus::Like, 2), vec![1, 2]);
        assert_eq!(record.recent_reactions(LikeStatus::Dislike, 10), vec![9]);
    }

    #[test]
    fn test_unknown_user_is_empty() {
        let store = UserStore::in_memory();
        assert_eq!(store.get("nobody").unwrap(), UserRecord::default());
    }

    #[test]
    fn test_failed_write_keeps_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let store = UserStore::load(&path).unwrap();
        store.set_bookmark("alice", 3, true, at(5)).unwrap();

        // a directory in place of the file makes the rename fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.set_bookmark("alice", 3, false, at(6)).is_err());
        assert!(store.set_reaction("alice", 3, LikeStatus::Like, true, at(7)).is_err());
        assert!(store.set_bookmark("bob", 1, true, at(8)).is_err());

        let alice = store.get("alice").unwrap();
        assert!(alice.is_bookmarked(3));
        assert_eq!(alice.reaction(3), None);
        assert_eq!(store.get("bob").unwrap(), UserRecord::default());

        // unchanged records never touch the file
        assert!(!store.set_bookmark("alice", 3, true, at(9)).unwrap());
    }

    #[test]
    fn test_persisted_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let store = UserStore::load(&path).unwrap();
        store.set_bookmark("alice", 3, true, at(5)).unwrap();
        store.set_preference("alice", vec![0.6, 0.8]).unwrap();
        store.set_reaction("bob", 4, LikeStatus::Dislike, true, at(6)).unwrap();
        drop(store);

        let store = UserStore::load(&path).unwrap();
        let alice = store.get("alice").unwrap();
        assert!(alice.is_bookmarked(3));
        assert_eq!(alice.preference, Some(vec![0.6, 0.8]));
        assert_eq!(store.get("bob").unwrap().reaction(4), Some(LikeStatus::Dislike));
    }
}
