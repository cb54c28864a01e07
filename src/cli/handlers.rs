use anyhow::{bail, Result};
use serde::Serialize;

use super::Command;
use crate::{
    client::{FeedController, FeedFilter, LoadOutcome, ProgramApi},
    config::ClientConfig,
    programs::ProgramView,
};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Load `pages` pages of `filter` the way a screen would, then return the list.
async fn collect_feed<A: ProgramApi>(
    api: A,
    filter: FeedFilter,
    config: &ClientConfig,
    pages: u32,
    size: Option<u32>,
) -> Result<Vec<ProgramView>> {
    let config = ClientConfig {
        page_size: size.unwrap_or(config.page_size),
        ..config.clone()
    };
    let feed = FeedController::new(api, filter, &config);

    if let LoadOutcome::Failed(err) = feed.load_first_page().await {
        return Err(err.into());
    }

    for _ in 1..pages {
        match feed.load_next_page().await {
            LoadOutcome::Applied => {}
            LoadOutcome::Skipped => break,
            LoadOutcome::Failed(err) => return Err(err.into()),
            other => bail!("feed load stopped: {other:?}"),
        }
    }

    Ok(feed.snapshot().items)
}

/// Run a client command against `api`, local or remote.
pub async fn run<A: ProgramApi>(api: A, config: &ClientConfig, command: Command) -> Result<()> {
    match command {
        Command::Programs { category, pages, size } => {
            let items = collect_feed(api, FeedFilter::Programs { category }, config, pages, size).await?;
            print_json(&items)
        }

        Command::Search {
            query,
            category,
            sort,
            pages,
            size,
        } => {
            let filter = FeedFilter::Search { query, category, sort };
            let items = collect_feed(api, filter, config, pages, size).await?;
            print_json(&items)
        }

        Command::Bookmarks { sort, pages, size } => {
            let items = collect_feed(api, FeedFilter::Bookmarks { sort }, config, pages, size).await?;
            print_json(&items)
        }

        Command::Show { id } => print_json(&api.get_program(id).await?),

        Command::Categories {} => print_json(&api.categories().await?),

        Command::Examples {} => print_json(&api.examples().await?),

        Command::Bookmark { id, remove } => {
            api.set_bookmark(id, !remove).await?;
            print_json(&api.get_program(id).await?)
        }

        Command::React { id, status, remove } => {
            api.set_reaction(id, status, !remove).await?;
            print_json(&api.get_program(id).await?)
        }

        Command::Prefer { ratings } => {
            api.submit_preferences(&ratings).await?;
            println!("{} ratings submitted", ratings.len());
            Ok(())
        }

        Command::Daemon {} | Command::Vectors { .. } => bail!("not a client command"),
    }
}
