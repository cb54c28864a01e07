//! Client core: the Program API seam, paging of server results into a
//! feed, and optimistic mutations on that feed.

pub mod api;
pub mod errors;
pub mod feed;
pub mod local;
pub mod mutation;

pub use api::{ProgramApi, RemoteApi};
pub use errors::ApiError;
pub use feed::{FeedController, FeedFilter, FeedState, LoadOutcome, Phase};
pub use local::LocalApi;
pub use mutation::{MutationKind, ToggleOutcome};
