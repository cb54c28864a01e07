use crate::{embedding::Similarity, storage::BackendLocal};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Embedding model whose vectors the deployment ships in vectors.bin
const DEFAULT_MODEL: &str = "bge-m3";
const DEFAULT_DIMENSIONS: usize = 1024;

const DEFAULT_RECENT_REACTION_LIMIT: usize = 10;
const DEFAULT_REASON_RATIO: f32 = 0.1;
const DEFAULT_FEED_CACHE_TTL_SECS: u64 = 3600;

const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 20;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Bearer token -> user id. Tokens are issued elsewhere.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            tokens: HashMap::new(),
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

/// Weights of the personalized feed's ranking vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedWeights {
    #[serde(default = "default_user_weight")]
    pub user: f32,
    #[serde(default = "default_likes_weight")]
    pub likes: f32,
    #[serde(default = "default_bookmarks_weight")]
    pub bookmarks: f32,
    #[serde(default = "default_see_less_weight")]
    pub see_less: f32,
}

impl Default for FeedWeights {
    fn default() -> Self {
        Self {
            user: default_user_weight(),
            likes: default_likes_weight(),
            bookmarks: default_bookmarks_weight(),
            see_less: default_see_less_weight(),
        }
    }
}

fn default_user_weight() -> f32 {
    0.3
}

fn default_likes_weight() -> f32 {
    0.2
}

fn default_bookmarks_weight() -> f32 {
    0.2
}

fn default_see_less_weight() -> f32 {
    0.3
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default)]
    pub similarity: Similarity,

    #[serde(default)]
    pub weights: FeedWeights,

    /// How many of the most recent likes, bookmarks and dislikes feed the ranking vector
    #[serde(default = "default_recent_reaction_limit")]
    pub recent_reaction_limit: usize,

    /// Share of a page that may carry a recommendation reason
    #[serde(default = "default_reason_ratio")]
    pub reason_ratio: f32,

    #[serde(default = "default_feed_cache_ttl_secs")]
    pub feed_cache_ttl_secs: u64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            dimensions: default_dimensions(),
            similarity: Similarity::default(),
            weights: FeedWeights::default(),
            recent_reaction_limit: default_recent_reaction_limit(),
            reason_ratio: default_reason_ratio(),
            feed_cache_ttl_secs: default_feed_cache_ttl_secs(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_recent_reaction_limit() -> usize {
    DEFAULT_RECENT_REACTION_LIMIT
}

fn default_reason_ratio() -> f32 {
    DEFAULT_REASON_RATIO
}

fn default_feed_cache_ttl_secs() -> u64 {
    DEFAULT_FEED_CACHE_TTL_SECS
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            default_page_size: default_page_size(),
        }
    }
}

fn default_max_page_size() -> u32 {
    DEFAULT_MAX_PAGE_SIZE
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let ranking = &self.ranking;

        if ranking.dimensions == 0 || ranking.dimensions > u16::MAX as usize {
            bail!(
                "ranking.dimensions must be between 1 and {}, got {}",
                u16::MAX,
                ranking.dimensions
            );
        }

        if ranking.model.trim().is_empty() {
            bail!("ranking.model must not be empty");
        }

        let weights = ranking.weights;
        for (name, value) in [
            ("user", weights.user),
            ("likes", weights.likes),
            ("bookmarks", weights.bookmarks),
            ("see_less", weights.see_less),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("ranking.weights.{name} must be a finite non-negative number, got {value}");
            }
        }

        if !(0.0..=1.0).contains(&ranking.reason_ratio) {
            bail!(
                "ranking.reason_ratio must be between 0.0 and 1.0, got {}",
                ranking.reason_ratio
            );
        }

        if ranking.recent_reaction_limit == 0 {
            bail!("ranking.recent_reaction_limit must be greater than 0");
        }

        let search = &self.search;
        if search.max_page_size == 0 {
            bail!("search.max_page_size must be greater than 0");
        }

        if search.default_page_size == 0 || search.default_page_size > search.max_page_size {
            bail!(
                "search.default_page_size must be between 1 and search.max_page_size ({}), got {}",
                search.max_page_size,
                search.default_page_size
            );
        }

        if self.client.page_size == 0 || self.client.page_size > search.max_page_size {
            bail!(
                "client.page_size must be between 1 and search.max_page_size ({}), got {}",
                search.max_page_size,
                self.client.page_size
            );
        }

        if self.client.request_timeout_secs == 0 {
            bail!("client.request_timeout_secs must be greater than 0");
        }

        for (token, user) in &self.server.tokens {
            if token.trim().is_empty() || user.trim().is_empty() {
                bail!("server.tokens entries must have a non-empty token and user id");
            }
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        let store = BackendLocal::new(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            log::info!("writing default {CONFIG_FILE} to {}", base_path.display());
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)
            .context("config file is not valid utf8")?;
        let config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save(&store)?;
        }

        Ok(config)
    }

    fn save(&self, store: &BackendLocal) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }
}
