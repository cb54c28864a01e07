//! Client feed state: pages accumulated into one list, with loads that
//! never overwrite newer state and a single error slot for the screen.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::sync::watch;

use super::{
    api::ProgramApi,
    errors::ApiError,
    mutation::{MutationKey, Snapshot},
};
use crate::{
    config::ClientConfig,
    programs::{BookmarkSort, Category, LikeStatus, Page, ProgramView, SortMode},
};

/// What the feed lists.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedFilter {
    Programs {
        category: Option<Category>,
    },
    Search {
        query: String,
        category: Option<Category>,
        sort: SortMode,
    },
    Bookmarks {
        sort: BookmarkSort,
    },
}

impl Default for FeedFilter {
    fn default() -> Self {
        FeedFilter::Programs { category: None }
    }
}

impl FeedFilter {
    pub fn category(&self) -> Option<Category> {
        match self {
            FeedFilter::Programs { category } | FeedFilter::Search { category, .. } => *category,
            FeedFilter::Bookmarks { .. } => None,
        }
    }

    pub fn is_bookmarks(&self) -> bool {
        matches!(self, FeedFilter::Bookmarks { .. })
    }

    pub async fn fetch<A: ProgramApi>(&self, api: &A, page: u32, size: u32) -> Result<Page<ProgramView>, ApiError> {
        match self {
            FeedFilter::Programs { category } => api.list_programs(*category, page, size).await,
            FeedFilter::Search { query, category, sort } => api.search(query, *category, *sort, page, size).await,
            FeedFilter::Bookmarks { sort } => api.user_bookmarks(*sort, page, size).await,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Paginating,
    Refreshing,
}

#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub items: Vec<ProgramView>,
    pub current_page: u32,
    pub is_last_page: bool,
    pub filter: FeedFilter,
    pub bookmarked_ids: HashSet<u64>,
    pub reactions: HashMap<u64, LikeStatus>,
    pub phase: Phase,
    pub general_error: Option<ApiError>,
    /// Bumped by every first-page load; older responses are discarded.
    pub generation: u64,
    pub disposed: bool,
    pub(crate) pending: HashMap<MutationKey, Snapshot>,
    /// Orders toggles so a rollback can tell which one came later.
    pub(crate) mutation_seq: u64,
}

impl FeedState {
    pub fn selected_category(&self) -> Option<Category> {
        self.filter.category()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading | Phase::Refreshing)
    }

    pub fn is_paginating(&self) -> bool {
        self.phase == Phase::Paginating
    }

    pub fn is_loading_mutation(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &MutationKey> {
        self.pending.keys()
    }

    /// Take bookmark and reaction state from server items, except where a
    /// local toggle is still in flight.
    fn seed(&mut self, items: &[ProgramView]) {
        use super::mutation::MutationKind;

        for item in items {
            let id = item.id();

            if !self.pending.contains_key(&(id, MutationKind::Bookmark)) {
                if item.is_bookmarked {
                    self.bookmarked_ids.insert(id);
                } else {
                    self.bookmarked_ids.remove(&id);
                }
            }

            let reacting = self.pending.contains_key(&(id, MutationKind::Like))
                || self.pending.contains_key(&(id, MutationKind::Dislike));
            if !reacting {
                match item.like_status {
                    Some(status) => self.reactions.insert(id, status),
                    None => self.reactions.remove(&id),
                };
            }
        }
    }
}

/// How a load call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Applied,
    Failed(ApiError),
    /// Guard rejected the call, nothing was requested.
    Skipped,
    /// A newer load started while this one was in flight.
    Superseded,
    Cancelled,
}

/// Owns one screen's [`FeedState`].
///
/// The state mutex is only held between awaits, never across one.
pub struct FeedController<A> {
    pub(crate) api: A,
    pub(crate) state: Mutex<FeedState>,
    page_size: u32,
    timeout: Duration,
    cancel: watch::Sender<bool>,
}

impl<A: ProgramApi> FeedController<A> {
    pub fn new(api: A, filter: FeedFilter, config: &ClientConfig) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            api,
            state: Mutex::new(FeedState {
                filter,
                ..Default::default()
            }),
            page_size: config.page_size,
            timeout: Duration::from_secs(config.request_timeout_secs),
            cancel,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> FeedState {
        self.lock().clone()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run `call` bounded by the request timeout, giving up early on dispose.
    pub(crate) async fn guarded<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let mut cancelled = self.cancel.subscribe();
        if *cancelled.borrow() {
            return Err(ApiError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancelled.wait_for(|c| *c) => Err(ApiError::Cancelled),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(result) => result,
                Err(_) => Err(ApiError::Network(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                ))),
            },
        }
    }

    pub async fn load_first_page(&self) -> LoadOutcome {
        self.first_page(Phase::Loading).await
    }

    /// Re-issue the first page whatever the current phase, keeping the filter.
    pub async fn refresh(&self) -> LoadOutcome {
        self.first_page(Phase::Refreshing).await
    }

    pub async fn on_filter_changed(&self, filter: FeedFilter) -> LoadOutcome {
        {
            let mut state = self.lock();
            if state.disposed {
                return LoadOutcome::Cancelled;
            }
            state.filter = filter;
        }
        self.first_page(Phase::Loading).await
    }

    async fn first_page(&self, phase: Phase) -> LoadOutcome {
        let (generation, filter) = {
            let mut state = self.lock();
            if state.disposed {
                return LoadOutcome::Cancelled;
            }
            state.generation += 1;
            state.phase = phase;
            state.general_error = None;
            (state.generation, state.filter.clone())
        };

        let result = self.guarded(filter.fetch(&self.api, 0, self.page_size)).await;

        let mut state = self.lock();
        if state.disposed {
            return LoadOutcome::Cancelled;
        }
        if state.generation != generation {
            log::debug!("discarding first page of superseded load {generation}");
            return LoadOutcome::Superseded;
        }

        state.phase = Phase::Idle;
        match result {
            Ok(page) => {
                state.seed(&page.content);
                state.items = page.content;
                state.current_page = 0;
                state.is_last_page = page.is_last;
                LoadOutcome::Applied
            }
            Err(err) => {
                if phase == Phase::Loading {
                    // nothing to paginate from until a first page lands
                    state.items.clear();
                    state.current_page = 0;
                    state.is_last_page = true;
                }
                log::warn!("first page load failed: {err}");
                state.general_error = Some(err.clone());
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Append the next page. No-op on the last page or while any load is running.
    pub async fn load_next_page(&self) -> LoadOutcome {
        let (generation, filter, next) = {
            let mut state = self.lock();
            if state.disposed {
                return LoadOutcome::Cancelled;
            }
            if state.is_last_page || state.phase != Phase::Idle {
                return LoadOutcome::Skipped;
            }
            state.phase = Phase::Paginating;
            state.general_error = None;
            (state.generation, state.filter.clone(), state.current_page + 1)
        };

        let result = self.guarded(filter.fetch(&self.api, next, self.page_size)).await;

        let mut state = self.lock();
        if state.disposed {
            return LoadOutcome::Cancelled;
        }
        if state.generation != generation {
            return LoadOutcome::Superseded;
        }

        state.phase = Phase::Idle;
        match result {
            Ok(page) => {
                state.seed(&page.content);

                let known: HashSet<u64> = state.items.iter().map(ProgramView::id).collect();
                let fresh = page.content.into_iter().filter(|item| !known.contains(&item.id()));
                state.items.extend(fresh);

                state.current_page = next;
                state.is_last_page = page.is_last;
                LoadOutcome::Applied
            }
            Err(err) => {
                log::warn!("page {next} load failed: {err}");
                state.general_error = Some(err.clone());
                LoadOutcome::Failed(err)
            }
        }
    }

    pub fn clear_error(&self) {
        self.lock().general_error = None;
    }

    /// Tear the screen down: cancels every request of this controller.
    /// Late results are dropped.
    pub fn dispose(&self) {
        {
            let mut state = self.lock();
            state.disposed = true;
            state.phase = Phase::Idle;
            state.pending.clear();
        }
        self.cancel.send_replace(true);
    }
}
