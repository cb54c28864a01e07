//! Unpersonalized listings: text search, recency and bookmark listings.

pub mod lexical;

use std::{cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, Utc};

use crate::{
    catalog::ProgramCatalog,
    programs::{BookmarkSort, Category, InvalidPageRequest, Page, PageRequest, Program, SortMode},
};

pub use lexical::{Relevance, TextQuery};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    #[error("invalid category: {0:?}")]
    InvalidCategory(String),

    #[error(transparent)]
    InvalidPageRequest(#[from] InvalidPageRequest),
}

/// Newest first, ties by higher id.
pub fn by_recency(a: &Program, b: &Program) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

/// Empty or missing means all categories.
pub fn parse_category(raw: Option<&str>) -> Result<Option<Category>, SearchError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(code) => Category::from_code(code)
            .map(Some)
            .ok_or_else(|| SearchError::InvalidCategory(code.to_string())),
    }
}

#[derive(Debug, Clone)]
pub struct SearchQueryProcessor {
    catalog: ProgramCatalog,
    max_page_size: u32,
}

impl SearchQueryProcessor {
    pub fn new(catalog: ProgramCatalog, max_page_size: u32) -> Self {
        Self {
            catalog,
            max_page_size,
        }
    }

    pub fn page_request(&self, page: i64, size: i64) -> Result<PageRequest, SearchError> {
        Ok(PageRequest::validated(page, size, self.max_page_size)?)
    }

    /// Text search over the catalog.
    pub fn search(
        &self,
        query: &str,
        category: Option<&str>,
        sort: SortMode,
        page: i64,
        size: i64,
    ) -> Result<Page<Program>, SearchError> {
        let category = parse_category(category)?;
        let request = self.page_request(page, size)?;
        let query = TextQuery::new(query);

        let mut matches: Vec<(&Program, Relevance)> = self
            .catalog
            .all()
            .iter()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .filter_map(|p| query.relevance(p).map(|r| (p, r)))
            .collect();

        match sort {
            SortMode::Latest => matches.sort_by(|a, b| by_recency(a.0, b.0)),
            SortMode::Rank => matches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| by_recency(a.0, b.0))),
        }

        log::debug!(
            "search {:?} category={category:?} sort={sort}: {} matches",
            query,
            matches.len()
        );

        Ok(Page::paginate(
            matches.into_iter().map(|(p, _)| p.clone()),
            request,
        ))
    }

    /// A user's bookmarks. Ids missing from the catalog are skipped.
    pub fn bookmarks(
        &self,
        bookmarks: &BTreeMap<u64, DateTime<Utc>>,
        sort: BookmarkSort,
        request: PageRequest,
    ) -> Page<Program> {
        let mut marked: Vec<(&Program, DateTime<Utc>)> = bookmarks
            .iter()
            .filter_map(|(id, at)| self.catalog.get(*id).map(|p| (p, *at)))
            .collect();

        match sort {
            BookmarkSort::Latest => {
                marked.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.id.cmp(&a.0.id)));
            }
            BookmarkSort::Deadline => marked.sort_by(|a, b| {
                deadline_order(a.0.apply_end_at, b.0.apply_end_at).then(a.0.id.cmp(&b.0.id))
            }),
        }

        Page::paginate(marked.into_iter().map(|(p, _)| p.clone()), request)
    }
}

/// Earliest deadline first, open-ended last.
fn deadline_order(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
