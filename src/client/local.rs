use std::sync::Arc;

use super::{api::ProgramApi, errors::ApiError};
use crate::{
    app::service::ProgramService,
    programs::{BookmarkSort, Category, CategoryEntry, LikeStatus, Page, ProgramView, Rating, SortMode},
};

/// [`ProgramApi`] served by an in-process [`ProgramService`] as one user.
#[derive(Clone)]
pub struct LocalApi {
    service: Arc<ProgramService>,
    user: String,
}

impl LocalApi {
    pub fn new(service: Arc<ProgramService>, user: &str) -> Self {
        Self {
            service,
            user: user.to_string(),
        }
    }
}

fn category_code(category: Option<Category>) -> Option<&'static str> {
    category.map(Category::code)
}

impl ProgramApi for LocalApi {
    async fn list_programs(
        &self,
        category: Option<Category>,
        page: u32,
        size: u32,
    ) -> Result<Page<ProgramView>, ApiError> {
        Ok(self
            .service
            .get_programs(&self.user, category_code(category), page.into(), size.into())?)
    }

    async fn search(
        &self,
        query: &str,
        category: Option<Category>,
        sort: SortMode,
        page: u32,
        size: u32,
    ) -> Result<Page<ProgramView>, ApiError> {
        Ok(self.service.search(
            &self.user,
            query,
            category_code(category),
            sort,
            page.into(),
            size.into(),
        )?)
    }

    async fn user_bookmarks(&self, sort: BookmarkSort, page: u32, size: u32) -> Result<Page<ProgramView>, ApiError> {
        Ok(self
            .service
            .user_bookmarks(&self.user, sort, page.into(), size.into())?)
    }

    async fn get_program(&self, id: u64) -> Result<ProgramView, ApiError> {
        Ok(self.service.get_program(&self.user, id)?)
    }

    async fn categories(&self) -> Result<Vec<CategoryEntry>, ApiError> {
        Ok(self.service.categories())
    }

    async fn examples(&self) -> Result<Vec<ProgramView>, ApiError> {
        Ok(self.service.examples(&self.user)?)
    }

    async fn set_bookmark(&self, id: u64, on: bool) -> Result<(), ApiError> {
        Ok(self.service.set_bookmark(&self.user, id, on)?)
    }

    async fn set_reaction(&self, id: u64, status: LikeStatus, on: bool) -> Result<(), ApiError> {
        Ok(self.service.set_reaction(&self.user, id, status, on)?)
    }

    async fn submit_preferences(&self, ratings: &[Rating]) -> Result<(), ApiError> {
        Ok(self.service.submit_preferences(&self.user, ratings)?)
    }
}
