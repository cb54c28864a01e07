use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use super::errors::ApiError;
use crate::{
    app::errors::ErrorEnvelope,
    programs::{BookmarkSort, Category, CategoryEntry, LikeStatus, Page, ProgramView, Rating, SortMode},
};

/// Everything a client can ask of the server, on behalf of the signed-in user.
#[allow(async_fn_in_trait)]
pub trait ProgramApi {
    /// Personalized feed.
    async fn list_programs(&self, category: Option<Category>, page: u32, size: u32)
        -> Result<Page<ProgramView>, ApiError>;

    async fn search(
        &self,
        query: &str,
        category: Option<Category>,
        sort: SortMode,
        page: u32,
        size: u32,
    ) -> Result<Page<ProgramView>, ApiError>;

    async fn user_bookmarks(&self, sort: BookmarkSort, page: u32, size: u32) -> Result<Page<ProgramView>, ApiError>;

    async fn get_program(&self, id: u64) -> Result<ProgramView, ApiError>;

    async fn categories(&self) -> Result<Vec<CategoryEntry>, ApiError>;

    async fn examples(&self) -> Result<Vec<ProgramView>, ApiError>;

    async fn set_bookmark(&self, id: u64, on: bool) -> Result<(), ApiError>;

    async fn set_reaction(&self, id: u64, status: LikeStatus, on: bool) -> Result<(), ApiError>;

    async fn submit_preferences(&self, ratings: &[Rating]) -> Result<(), ApiError>;
}

/// [`ProgramApi`] over HTTP against a running daemon.
pub struct RemoteApi {
    base: Url,
    client: reqwest::Client,
    token: Option<String>,
}

impl RemoteApi {
    pub fn new(addr: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        // a trailing slash keeps any path prefix when joining
        let base = if addr.ends_with('/') {
            Url::parse(addr)?
        } else {
            Url::parse(&format!("{addr}/"))?
        };

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { base, client, token })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ApiError::Network(format!("invalid url {path:?}: {e}")))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn request(&self, method: Method, path: &str, query: &[(&str, String)]) -> Result<RequestBuilder, ApiError> {
        let url = self.url(path, query)?;
        log::info!("{method} {url}");

        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let response = self.request(Method::GET, path, query)?.send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn toggle(&self, path: &str, on: bool) -> Result<(), ApiError> {
        let method = if on { Method::POST } else { Method::DELETE };
        let response = self.request(method, path, &[])?.send().await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|envelope| envelope.message)
        .map_err(|err| {
            log::error!("{err}. tried to parse: {text:?}");
            err
        })
        .ok();

    Err(ApiError::from_status(status.as_u16(), message))
}

fn paging(page: u32, size: u32) -> [(&'static str, String); 2] {
    [("page", page.to_string()), ("size", size.to_string())]
}

impl ProgramApi for RemoteApi {
    async fn list_programs(
        &self,
        category: Option<Category>,
        page: u32,
        size: u32,
    ) -> Result<Page<ProgramView>, ApiError> {
        let mut query = paging(page, size).to_vec();
        if let Some(category) = category {
            query.push(("category", category.code().to_string()));
        }
        self.fetch("programs", &query).await
    }

    async fn search(
        &self,
        query: &str,
        category: Option<Category>,
        sort: SortMode,
        page: u32,
        size: u32,
    ) -> Result<Page<ProgramView>, ApiError> {
        let path = match sort {
            SortMode::Rank => "programs/search/rank",
            SortMode::Latest => "programs/search/latest",
        };

        let mut params = paging(page, size).to_vec();
        params.push(("query", query.to_string()));
        if let Some(category) = category {
            params.push(("category", category.code().to_string()));
        }
        self.fetch(path, &params).await
    }

    async fn user_bookmarks(&self, sort: BookmarkSort, page: u32, size: u32) -> Result<Page<ProgramView>, ApiError> {
        let mut query = paging(page, size).to_vec();
        query.push(("sort", sort.code().to_string()));
        self.fetch("users/me/bookmarks", &query).await
    }

    async fn get_program(&self, id: u64) -> Result<ProgramView, ApiError> {
        self.fetch(&format!("programs/{id}"), &[]).await
    }

    async fn categories(&self) -> Result<Vec<CategoryEntry>, ApiError> {
        self.fetch("programs/categories", &[]).await
    }

    async fn examples(&self) -> Result<Vec<ProgramView>, ApiError> {
        self.fetch("programs/examples", &[]).await
    }

    async fn set_bookmark(&self, id: u64, on: bool) -> Result<(), ApiError> {
        self.toggle(&format!("programs/{id}/bookmark"), on).await
    }

    async fn set_reaction(&self, id: u64, status: LikeStatus, on: bool) -> Result<(), ApiError> {
        let action = match status {
            LikeStatus::Like => "like",
            LikeStatus::Dislike => "dislike",
        };
        self.toggle(&format!("programs/{id}/{action}"), on).await
    }

    async fn submit_preferences(&self, ratings: &[Rating]) -> Result<(), ApiError> {
        let response = self
            .request(Method::PUT, "users/me/preferences", &[])?
            .json(ratings)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let api = RemoteApi::new("http://localhost:8080", None, Duration::from_secs(1)).unwrap();
        let url = api
            .url("programs/search/rank", &[("query", "주거 지원".to_string()), ("page", "0".to_string())])
            .unwrap();
        assert_eq!(url.path(), "/programs/search/rank");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("query".to_string(), "주거 지원".to_string()),
                ("page".to_string(), "0".to_string())
            ]
        );

        let prefixed = RemoteApi::new("http://host/api", None, Duration::from_secs(1)).unwrap();
        assert_eq!(prefixed.url("programs/7", &[]).unwrap().path(), "/api/programs/7");
    }
}
