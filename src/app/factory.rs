use crate::{
    app::service::ProgramService,
    catalog::ProgramCatalog,
    client::RemoteApi,
    config::Config,
    embedding::{model_id_hash, storage::read_jsonl, EmbeddingStore, MemoryStore, VectorIndex, VectorStorage},
    users::UserStore,
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::{
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

/// Builds the service and its data files from a base directory.
pub struct AppFactory;

impl AppFactory {
    pub fn get_paths() -> Result<AppPaths> {
        let paths = AppPaths::new(Self::get_base_path()?);

        std::fs::create_dir_all(&paths.base_path).context("Failed to create application base directory")?;

        Ok(paths)
    }

    fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var("WF_BASE_PATH") {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("Could not determine home directory")?
            .context("Home directory path is empty")?;
        Ok(home.join(".local/share/wf"))
    }

    pub fn create_config(paths: &AppPaths) -> Result<Config> {
        Config::load_with(&paths.base_path)
    }

    /// Embeddings from vectors.bin, or an empty store when none were imported yet.
    pub fn create_store(paths: &AppPaths, config: &Config) -> Result<Arc<dyn EmbeddingStore>> {
        let dimensions = config.ranking.dimensions;
        let similarity = config.ranking.similarity;
        let storage = VectorStorage::new(paths.vectors_path.clone());

        if !storage.exists() {
            log::warn!(
                "{} not found, ranking falls back to recency until vectors are imported",
                storage.path().display()
            );
            return Ok(Arc::new(MemoryStore::empty(dimensions, similarity)));
        }

        let index = storage
            .load(&model_id_hash(&config.ranking.model), dimensions)
            .with_context(|| format!("Failed to load {}", storage.path().display()))?;
        log::info!("loaded {} embeddings ({} dims)", index.len(), dimensions);

        Ok(Arc::new(MemoryStore::new(index, similarity)))
    }

    pub fn create_service(paths: &AppPaths, config: &Config) -> Result<ProgramService> {
        let catalog = ProgramCatalog::load(&paths.programs_path)?;
        log::info!("loaded {} programs", catalog.len());

        let store = Self::create_store(paths, config)?;
        let users = UserStore::load(&paths.users_path)?;

        Ok(ProgramService::new(config, catalog, store, users))
    }

    /// Convert `{"id", "embedding"}` lines into vectors.bin. Returns the entry count.
    pub fn import_vectors(paths: &AppPaths, config: &Config, jsonl: &Path) -> Result<usize> {
        let dimensions = config.ranking.dimensions;
        let file = std::fs::File::open(jsonl).with_context(|| format!("Failed to open {}", jsonl.display()))?;
        let entries = read_jsonl(BufReader::new(file), dimensions)?;

        let mut index = VectorIndex::with_capacity(dimensions, entries.len());
        index.bulk_load(entries)?;

        VectorStorage::new(paths.vectors_path.clone()).save(&index, &model_id_hash(&config.ranking.model))?;
        log::info!("wrote {} embeddings to {}", index.len(), paths.vectors_path.display());

        Ok(index.len())
    }

    /// Remote client when WF_ADDR is set.
    pub fn create_remote(config: &Config) -> Result<Option<RemoteApi>> {
        let Ok(addr) = std::env::var("WF_ADDR") else {
            return Ok(None);
        };
        log::info!("Using remote backend: {}", addr);

        let timeout = Duration::from_secs(config.client.request_timeout_secs);
        Ok(Some(RemoteApi::new(&addr, Self::parse_bearer_token(), timeout)?))
    }

    fn parse_bearer_token() -> Option<String> {
        std::env::var("WF_AUTH_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// User the local CLI acts as.
    pub fn local_user() -> String {
        std::env::var("WF_USER")
            .ok()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "local".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: PathBuf,
    pub programs_path: PathBuf,
    pub vectors_path: PathBuf,
    pub users_path: PathBuf,
}

impl AppPaths {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            programs_path: base_path.join("programs.csv"),
            vectors_path: base_path.join("vectors.bin"),
            users_path: base_path.join("users.json"),
            base_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_paths() {
        let paths = AppPaths::new(PathBuf::from("/test/base"));

        assert_eq!(paths.base_path, PathBuf::from("/test/base"));
        assert_eq!(paths.programs_path, PathBuf::from("/test/base/programs.csv"));
        assert_eq!(paths.vectors_path, PathBuf::from("/test/base/vectors.bin"));
        assert_eq!(paths.users_path, PathBuf::from("/test/base/users.json"));
    }

    #[test]
    fn test_import_then_load_store() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path().to_path_buf());
        let mut config = Config::default();
        config.ranking.dimensions = 3;

        let jsonl = dir.path().join("vectors.jsonl");
        let mut file = std::fs::File::create(&jsonl).unwrap();
        writeln!(file, r#"{{"id": 1, "embedding": [1.0, 0.0, 0.0]}}"#).unwrap();
        writeln!(file, r#"{{"id": 2, "embedding": [0.0, 1.0, 0.0]}}"#).unwrap();
        drop(file);

        assert_eq!(AppFactory::import_vectors(&paths, &config, &jsonl).unwrap(), 2);

        let store = AppFactory::create_store(&paths, &config).unwrap();
        assert_eq!(store.dimensions(), 3);
        assert_eq!(store.embedding(2).unwrap(), Some(vec![0.0, 1.0, 0.0]));
        assert_eq!(store.embedding(3).unwrap(), None);
    }

    #[test]
    fn test_missing_vectors_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path().to_path_buf());

        let store = AppFactory::create_store(&paths, &Config::default()).unwrap();
        assert_eq!(store.embedding(1).unwrap(), None);
    }

    #[test]
    fn test_service_from_empty_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path().to_path_buf());
        let config = Config::default();

        let service = AppFactory::create_service(&paths, &config).unwrap();
        let page = service.get_programs("local", None, 0, 10).unwrap();

        assert!(page.content.is_empty());
        assert!(paths.programs_path.exists());
    }
}
