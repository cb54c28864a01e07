use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use super::FeedEntry;
use crate::programs::Category;

type Key = (String, Option<Category>);

struct Cached {
    entries: Arc<Vec<FeedEntry>>,
    created: Instant,
}

#[derive(Default)]
struct Feeds {
    entries: HashMap<Key, Cached>,
    /// Bumped by every invalidation of the user.
    generations: HashMap<String, u64>,
}

impl Feeds {
    fn generation(&self, user: &str) -> u64 {
        self.generations.get(user).copied().unwrap_or_default()
    }
}

/// Ordered personalized feeds per `(user, category)`, kept for a fixed TTL.
///
/// Pages of one feed are slices of the same cached ordering until the
/// entry expires or the user's reactions change.
pub struct FeedCache {
    ttl: Duration,
    feeds: Mutex<Feeds>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            feeds: Mutex::new(Feeds::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Feeds> {
        self.feeds.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached feed, or build and store a fresh one.
    ///
    /// The lock is not held while building. A feed whose user was
    /// invalidated during the build is returned but not stored.
    pub fn get_or_build<E, F>(&self, user: &str, category: Option<Category>, build: F) -> Result<Arc<Vec<FeedEntry>>, E>
    where
        F: FnOnce() -> Result<Vec<FeedEntry>, E>,
    {
        let key = (user.to_string(), category);

        let generation = {
            let feeds = self.lock();
            if let Some(cached) = feeds.entries.get(&key) {
                if cached.created.elapsed() < self.ttl {
                    return Ok(cached.entries.clone());
                }
            }
            feeds.generation(user)
        };

        let entries = Arc::new(build()?);

        let mut feeds = self.lock();
        if feeds.generation(user) != generation {
            log::debug!("feed of {user} changed while building, not caching");
            return Ok(entries);
        }

        let ttl = self.ttl;
        feeds.entries.retain(|_, cached| cached.created.elapsed() < ttl);
        feeds.entries.insert(
            key,
            Cached {
                entries: entries.clone(),
                created: Instant::now(),
            },
        );

        Ok(entries)
    }

    /// Drop every cached feed of `user`, including one being built.
    pub fn invalidate(&self, user: &str) {
        let mut feeds = self.lock();
        feeds.entries.retain(|(owner, _), _| owner != user);
        *feeds.generations.entry(user.to_string()).or_default() += 1;
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn entries(ids: &[u64]) -> Vec<FeedEntry> {
        ids.iter()
            .map(|id| FeedEntry {
                id: *id,
                like_contribution: 0,
                bookmark_contribution: 0,
            })
            .collect()
    }

    #[test]
    fn test_cached_until_invalidated() {
        let cache = FeedCache::new(Duration::from_secs(3600));
        let builds = Cell::new(0);
        let build = || -> Result<_, ()> {
            builds.set(builds.get() + 1);
            Ok(entries(&[1, 2]))
        };

        cache.get_or_build("u", None, build).unwrap();
        cache.get_or_build("u", None, build).unwrap();
        assert_eq!(builds.get(), 1);

        // other category and other user are separate entries
        cache.get_or_build("u", Some(Category::Cash), build).unwrap();
        cache.get_or_build("v", None, build).unwrap();
        assert_eq!(builds.get(), 3);

        cache.invalidate("u");
        cache.get_or_build("u", None, build).unwrap();
        cache.get_or_build("v", None, build).unwrap();
        assert_eq!(builds.get(), 4);
    }

    #[test]
    fn test_expired_entries_rebuilt() {
        let cache = FeedCache::new(Duration::ZERO);
        let first = cache.get_or_build("u", None, || Ok::<_, ()>(entries(&[1]))).unwrap();
        let second = cache.get_or_build("u", None, || Ok::<_, ()>(entries(&[2]))).unwrap();

        assert_eq!(first[0].id, 1);
        assert_eq!(second[0].id, 2);
    }

    #[test]
    fn test_invalidated_during_build_not_stored() {
        let cache = FeedCache::new(Duration::from_secs(3600));

        let built = cache
            .get_or_build("u", None, || {
                cache.invalidate("u");
                Ok::<_, ()>(entries(&[1]))
            })
            .unwrap();
        assert_eq!(built[0].id, 1);
        assert_eq!(cache.len(), 0);

        let fresh = cache.get_or_build("u", None, || Ok::<_, ()>(entries(&[2]))).unwrap();
        assert_eq!(fresh[0].id, 2);
        assert_eq!(cache.len(), 1);

        // another user's invalidation does not block storing
        cache
            .get_or_build("v", None, || {
                cache.invalidate("u");
                Ok::<_, ()>(entries(&[3]))
            })
            .unwrap();
        assert_eq!(cache.len(), 1);
        let hit = cache.get_or_build("v", None, || Ok::<_, ()>(entries(&[4]))).unwrap();
        assert_eq!(hit[0].id, 3);
    }

    #[test]
    fn test_expired_entries_pruned_on_insert() {
        let cache = FeedCache::new(Duration::ZERO);

        cache.get_or_build("u", None, || Ok::<_, ()>(entries(&[1]))).unwrap();
        cache.get_or_build("v", Some(Category::Cash), || Ok::<_, ()>(entries(&[2]))).unwrap();
        cache.get_or_build("w", None, || Ok::<_, ()>(entries(&[3]))).unwrap();

        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_build_error_not_cached() {
        let cache = FeedCache::new(Duration::from_secs(60));
        let result = cache.get_or_build("u", None, || Err::<Vec<FeedEntry>, _>("boom"));
        assert_eq!(result, Err("boom"));

        let ok = cache.get_or_build("u", None, || Ok::<_, &str>(entries(&[7]))).unwrap();
        assert_eq!(ok[0].id, 7);
    }
}
