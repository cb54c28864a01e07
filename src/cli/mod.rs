use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::programs::{BookmarkSort, Category, LikeStatus, Rating, SortMode};

mod handlers;

pub use handlers::run;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start wf as a service.
    Daemon {},

    /// Personalized program feed
    Programs {
        /// Category code, e.g. CASH or HEALTH
        #[clap(short, long)]
        category: Option<Category>,

        /// Number of pages to load
        #[clap(short, long, default_value = "1")]
        pages: u32,

        /// Page size. Defaults to client.page_size
        #[clap(short, long)]
        size: Option<u32>,
    },

    /// Search programs by text
    Search {
        /// Search text, matched against title, preview, summary and details
        #[clap(default_value = "")]
        query: String,

        #[clap(short, long)]
        category: Option<Category>,

        /// RANK or LATEST
        #[clap(long, default_value = "LATEST")]
        sort: SortMode,

        #[clap(short, long, default_value = "1")]
        pages: u32,

        #[clap(short, long)]
        size: Option<u32>,
    },

    /// Show one program
    Show { id: u64 },

    /// List program categories
    Categories {},

    /// List onboarding example programs
    Examples {},

    /// List bookmarked programs
    Bookmarks {
        /// LATEST or DEADLINE
        #[clap(long, default_value = "LATEST")]
        sort: BookmarkSort,

        #[clap(short, long, default_value = "1")]
        pages: u32,

        #[clap(short, long)]
        size: Option<u32>,
    },

    /// Bookmark a program
    Bookmark {
        id: u64,

        /// Remove the bookmark instead
        #[clap(short, long, default_value = "false")]
        remove: bool,
    },

    /// Like or dislike a program
    React {
        id: u64,

        /// LIKE or DISLIKE
        status: LikeStatus,

        /// Clear the reaction instead
        #[clap(short, long, default_value = "false")]
        remove: bool,
    },

    /// Rate example programs (1 to 5) to build the preference vector
    Prefer {
        /// Ratings as id=score, one per example program
        #[clap(value_parser = parse_rating, required = true)]
        ratings: Vec<Rating>,
    },

    /// Manage the embedding file
    Vectors {
        #[clap(subcommand)]
        action: VectorsArgs,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum VectorsArgs {
    /// Convert {"id", "embedding"} JSON lines into vectors.bin
    Import { path: PathBuf },
}

fn parse_rating(value: &str) -> Result<Rating, String> {
    let (id, score) = value
        .split_once('=')
        .ok_or_else(|| format!("expected id=score, got {value:?}"))?;

    let id = id.trim().parse::<u64>().map_err(|e| format!("bad id {id:?}: {e}"))?;
    let score = score
        .trim()
        .parse::<u8>()
        .map_err(|e| format!("bad score {score:?}: {e}"))?;

    Ok(Rating { id, score })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating("12=5"), Ok(Rating { id: 12, score: 5 }));
        assert_eq!(parse_rating(" 3 = 1 "), Ok(Rating { id: 3, score: 1 }));
        assert!(parse_rating("12").is_err());
        assert!(parse_rating("x=1").is_err());
        assert!(parse_rating("1=300").is_err());
    }

    #[test]
    fn test_parse_programs_command() {
        let args = Args::try_parse_from(["wf", "programs", "-c", "cash", "--pages", "2"]).unwrap();
        match args.command {
            Command::Programs { category, pages, size } => {
                assert_eq!(category, Some(Category::Cash));
                assert_eq!(pages, 2);
                assert_eq!(size, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_react_and_prefer() {
        let args = Args::try_parse_from(["wf", "react", "7", "dislike", "--remove"]).unwrap();
        assert!(matches!(
            args.command,
            Command::React {
                id: 7,
                status: LikeStatus::Dislike,
                remove: true
            }
        ));

        let args = Args::try_parse_from(["wf", "prefer", "1=5", "2=1"]).unwrap();
        match args.command {
            Command::Prefer { ratings } => assert_eq!(ratings.len(), 2),
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Args::try_parse_from(["wf", "programs", "-c", "NOPE"]).is_err());
    }
}
