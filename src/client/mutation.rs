//! Optimistic bookmark and reaction toggles with per-entity rollback.

use super::{api::ProgramApi, errors::ApiError, feed::FeedController};
use crate::programs::{LikeStatus, ProgramView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Bookmark,
    Like,
    Dislike,
}

impl MutationKind {
    /// The reaction kind sharing this kind's slot, if any.
    fn opposite(self) -> Option<Self> {
        match self {
            MutationKind::Like => Some(MutationKind::Dislike),
            MutationKind::Dislike => Some(MutationKind::Like),
            MutationKind::Bookmark => None,
        }
    }
}

pub type MutationKey = (u64, MutationKind);

/// Pre-mutation slice of one entity, restored if the request fails.
#[derive(Debug, Clone)]
pub struct Snapshot {
    bookmarked: bool,
    reaction: Option<LikeStatus>,
    /// item taken out of a bookmarks feed, with its index
    removed: Option<(usize, ProgramView)>,
    generation: u64,
    seq: u64,
}

#[derive(Debug, Clone, Copy)]
enum Request {
    Bookmark(bool),
    Reaction(LikeStatus, bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    Applied,
    /// Same toggle already in flight, nothing was sent.
    InFlight,
    RolledBack(ApiError),
    Cancelled,
}

impl<A: ProgramApi> FeedController<A> {
    /// Flip bookmark / like / dislike of `id` now, then confirm with the server.
    pub async fn toggle(&self, id: u64, kind: MutationKind) -> ToggleOutcome {
        let key = (id, kind);

        let request = {
            let mut state = self.lock();
            if state.disposed {
                return ToggleOutcome::Cancelled;
            }
            if state.pending.contains_key(&key) {
                return ToggleOutcome::InFlight;
            }

            state.mutation_seq += 1;
            let mut snapshot = Snapshot {
                bookmarked: state.bookmarked_ids.contains(&id),
                reaction: state.reactions.get(&id).copied(),
                removed: None,
                generation: state.generation,
                seq: state.mutation_seq,
            };

            let request = match kind {
                MutationKind::Bookmark => {
                    let on = !snapshot.bookmarked;
                    if on {
                        state.bookmarked_ids.insert(id);
                    } else {
                        state.bookmarked_ids.remove(&id);
                        if state.filter.is_bookmarks() {
                            if let Some(idx) = state.items.iter().position(|item| item.id() == id) {
                                snapshot.removed = Some((idx, state.items.remove(idx)));
                            }
                        }
                    }
                    Request::Bookmark(on)
                }
                MutationKind::Like | MutationKind::Dislike => {
                    let status = match kind {
                        MutationKind::Like => LikeStatus::Like,
                        _ => LikeStatus::Dislike,
                    };
                    let on = snapshot.reaction != Some(status);
                    if on {
                        state.reactions.insert(id, status);
                    } else {
                        state.reactions.remove(&id);
                    }
                    Request::Reaction(status, on)
                }
            };

            state.pending.insert(key, snapshot);
            request
        };

        let result = self
            .guarded(async {
                match request {
                    Request::Bookmark(on) => self.api.set_bookmark(id, on).await,
                    Request::Reaction(status, on) => self.api.set_reaction(id, status, on).await,
                }
            })
            .await;

        let mut state = self.lock();
        if state.disposed {
            return ToggleOutcome::Cancelled;
        }
        let Some(snapshot) = state.pending.remove(&key) else {
            return ToggleOutcome::Cancelled;
        };

        match result {
            Ok(()) => ToggleOutcome::Applied,
            Err(err) => {
                log::warn!("{kind:?} of program {id} failed, rolling back: {err}");

                match kind {
                    MutationKind::Bookmark => {
                        if snapshot.bookmarked {
                            state.bookmarked_ids.insert(id);
                        } else {
                            state.bookmarked_ids.remove(&id);
                        }

                        if let Some((idx, item)) = snapshot.removed {
                            let same_list = state.generation == snapshot.generation;
                            let present = state.items.iter().any(|i| i.id() == id);
                            if same_list && !present {
                                let idx = idx.min(state.items.len());
                                state.items.insert(idx, item);
                            }
                        }
                    }
                    MutationKind::Like | MutationKind::Dislike => {
                        // A later toggle on the same reaction slot took our
                        // applied value as its base; it inherits ours instead.
                        let handed_down = match kind
                            .opposite()
                            .and_then(|other| state.pending.get_mut(&(id, other)))
                        {
                            Some(later) if later.seq > snapshot.seq => {
                                later.reaction = snapshot.reaction;
                                true
                            }
                            _ => false,
                        };

                        if !handed_down {
                            match snapshot.reaction {
                                Some(status) => state.reactions.insert(id, status),
                                None => state.reactions.remove(&id),
                            };
                        }
                    }
                }

                state.general_error = Some(err.clone());
                ToggleOutcome::RolledBack(err)
            }
        }
    }
}
