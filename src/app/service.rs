use crate::{
    app::errors::AppError,
    catalog::ProgramCatalog,
    config::Config,
    embedding::{aggregate, EmbeddingStore},
    programs::{
        BookmarkSort, CategoryEntry, Category, LikeStatus, Page, Program, ProgramView, Rating, SortMode,
        UserProfile,
    },
    ranking::{FeedCache, FeedComposer, RankingEngine},
    search::{parse_category, SearchQueryProcessor},
    users::{UserRecord, UserStore},
};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Server core: every operation the daemon and the local CLI expose,
/// on behalf of one user id.
pub struct ProgramService {
    catalog: ProgramCatalog,
    engine: RankingEngine,
    search: SearchQueryProcessor,
    composer: FeedComposer,
    cache: FeedCache,
    users: UserStore,
}

impl ProgramService {
    pub fn new(config: &Config, catalog: ProgramCatalog, store: Arc<dyn EmbeddingStore>, users: UserStore) -> Self {
        Self {
            engine: RankingEngine::new(catalog.clone(), store),
            search: SearchQueryProcessor::new(catalog.clone(), config.search.max_page_size),
            composer: FeedComposer::new(&config.ranking),
            cache: FeedCache::new(Duration::from_secs(config.ranking.feed_cache_ttl_secs)),
            catalog,
            users,
        }
    }

    fn view(record: &UserRecord, program: Program) -> ProgramView {
        let id = program.id;
        ProgramView::new(program, record.is_bookmarked(id), record.reaction(id))
    }

    fn views(record: &UserRecord, page: Page<Program>) -> Page<ProgramView> {
        page.map(|program| Self::view(record, program))
    }

    fn existing(&self, id: u64) -> Result<&Program, AppError> {
        self.catalog.get(id).ok_or(AppError::NotFound)
    }

    /// Personalized feed, optionally restricted to one category.
    pub fn get_programs(
        &self,
        user: &str,
        category: Option<&str>,
        page: i64,
        size: i64,
    ) -> Result<Page<ProgramView>, AppError> {
        let category = parse_category(category)?;
        let request = self.search.page_request(page, size)?;
        let record = self.users.get(user)?;

        let entries = self
            .cache
            .get_or_build(user, category, || self.composer.build(&self.engine, &record, category))?;

        let page = Page::paginate(entries.iter().copied(), request);
        let page_entries = page.content.clone();

        let mut views = page.filter_map(|entry| {
            self.catalog
                .get(entry.id)
                .map(|program| Self::view(&record, program.clone()))
        });
        self.composer.explain(&page_entries, &mut views.content);

        Ok(views)
    }

    pub fn get_program(&self, user: &str, id: u64) -> Result<ProgramView, AppError> {
        let program = self.existing(id)?.clone();
        Ok(Self::view(&self.users.get(user)?, program))
    }

    pub fn categories(&self) -> Vec<CategoryEntry> {
        Category::all().map(CategoryEntry::from).collect()
    }

    pub fn examples(&self, user: &str) -> Result<Vec<ProgramView>, AppError> {
        let record = self.users.get(user)?;
        Ok(self
            .catalog
            .examples()
            .map(|program| Self::view(&record, program.clone()))
            .collect())
    }

    pub fn example(&self, user: &str, id: u64) -> Result<ProgramView, AppError> {
        if !self.catalog.is_example(id) {
            return Err(AppError::NotFound);
        }
        self.get_program(user, id)
    }

    pub fn search(
        &self,
        user: &str,
        query: &str,
        category: Option<&str>,
        sort: SortMode,
        page: i64,
        size: i64,
    ) -> Result<Page<ProgramView>, AppError> {
        let programs = self.search.search(query, category, sort, page, size)?;
        Ok(Self::views(&self.users.get(user)?, programs))
    }

    pub fn user_bookmarks(
        &self,
        user: &str,
        sort: BookmarkSort,
        page: i64,
        size: i64,
    ) -> Result<Page<ProgramView>, AppError> {
        let request = self.search.page_request(page, size)?;
        let record = self.users.get(user)?;
        let programs = self.search.bookmarks(&record.bookmarks, sort, request);
        Ok(Self::views(&record, programs))
    }

    /// Idempotent: bookmarking twice or removing a missing bookmark succeeds.
    pub fn set_bookmark(&self, user: &str, id: u64, on: bool) -> Result<(), AppError> {
        self.existing(id)?;

        if self.users.set_bookmark(user, id, on, Utc::now())? {
            log::debug!("user {user} bookmark {id} -> {on}");
            self.cache.invalidate(user);
        }
        Ok(())
    }

    /// Idempotent. Setting a reaction replaces the opposite one.
    pub fn set_reaction(&self, user: &str, id: u64, status: LikeStatus, on: bool) -> Result<(), AppError> {
        self.existing(id)?;

        if self.users.set_reaction(user, id, status, on, Utc::now())? {
            log::debug!("user {user} {status} {id} -> {on}");
            self.cache.invalidate(user);
        }
        Ok(())
    }

    /// Eligibility facts pushed by the profile service.
    pub fn set_profile(&self, user: &str, profile: UserProfile) -> Result<(), AppError> {
        if self.users.set_profile(user, profile)? {
            self.cache.invalidate(user);
        }
        Ok(())
    }

    /// Turn onboarding ratings into the user's preference vector.
    pub fn submit_preferences(&self, user: &str, ratings: &[Rating]) -> Result<(), AppError> {
        let store = self.engine.store();

        let mut examples = HashMap::with_capacity(self.catalog.example_ids().len());
        for id in self.catalog.example_ids() {
            examples.insert(*id, store.embedding(*id)?);
        }

        let preference = aggregate(ratings, &examples, store.dimensions())?;
        self.users.set_preference(user, preference)?;
        self.cache.invalidate(user);

        log::info!("stored preference vector for user {user} from {} ratings", ratings.len());
        Ok(())
    }
}
