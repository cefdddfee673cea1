//! Resource lookup for one server: cache, search paths and URI map.
//!
//! Every [`Server`](crate::Server) owns one [`ResourceContext`]. It is handed
//! to the resolver and, as an [`AssetResolver`], to the description loader,
//! so two servers in one process never see each other's paths or caches.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use sim_world::{AssetResolver, description_file_in};
use tracing::debug;

use crate::config::ServerConfig;

/// Environment variable holding extra search paths, in the platform's
/// path-list syntax.
pub const RESOURCE_PATH_ENV: &str = "SIM_RESOURCE_PATH";

/// Worlds shipped with this crate, searched last.
pub const WORLD_INSTALL_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/worlds");

/// Maps references and URIs to local files.
///
/// Both lookups must be idempotent and safe to call from any thread.
pub trait ResourceCache: Send + Sync {
    /// Look up a plain reference such as `models/rover`.
    fn fetch_reference(&self, reference: &str) -> Option<PathBuf>;

    /// Look up a full URI such as `https://host/models/rover`.
    fn fetch_uri(&self, uri: &str) -> Option<PathBuf>;
}

/// A cache directory laid out as `<root>/<scheme>/<host>/<path>`.
///
/// Nothing is downloaded: a remote URI resolves only if its file is
/// already present under the root. `file://` URIs map straight to the
/// local filesystem.
#[derive(Debug, Clone)]
pub struct LocalResourceCache {
    root: PathBuf,
}

impl LocalResourceCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `uri` is stored inside the cache, whether or not it exists.
    #[must_use]
    pub fn cache_path(&self, uri: &str) -> Option<PathBuf> {
        let (scheme, rest) = split_uri(uri)?;
        let rest = rest
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_matches('/');
        if rest.is_empty() {
            return None;
        }
        Some(self.root.join(scheme).join(rest))
    }
}

impl ResourceCache for LocalResourceCache {
    fn fetch_reference(&self, reference: &str) -> Option<PathBuf> {
        let path = self.root.join(reference.trim_start_matches('/'));
        path.exists().then_some(path)
    }

    fn fetch_uri(&self, uri: &str) -> Option<PathBuf> {
        if let Some(local) = uri.strip_prefix("file://") {
            let path = PathBuf::from(local);
            return path.exists().then_some(path);
        }
        self.cache_path(uri).filter(|p| p.exists())
    }
}

fn split_uri(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// Search paths, cache and URI bookkeeping for one server.
pub struct ResourceContext {
    cache: Option<Arc<dyn ResourceCache>>,
    search_paths: RwLock<Vec<PathBuf>>,
    uri_map: DashMap<PathBuf, String>,
}

impl ResourceContext {
    /// A context searching exactly `paths`, in order.
    #[must_use]
    pub fn new(cache: Option<Arc<dyn ResourceCache>>, paths: Vec<PathBuf>) -> Self {
        let ctx = Self {
            cache,
            search_paths: RwLock::new(Vec::new()),
            uri_map: DashMap::new(),
        };
        ctx.add_search_paths(paths);
        ctx
    }

    /// The context a server builds at construction: configured paths, then
    /// `SIM_RESOURCE_PATH`, then [`WORLD_INSTALL_DIR`].
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let cache = config
            .resource_cache
            .as_ref()
            .map(|dir| Arc::new(LocalResourceCache::new(dir)) as Arc<dyn ResourceCache>);

        let mut paths = config.resource_paths.clone();
        if let Some(env_paths) = std::env::var_os(RESOURCE_PATH_ENV) {
            paths.extend(std::env::split_paths(&env_paths).filter(|p| !p.as_os_str().is_empty()));
        }
        paths.push(PathBuf::from(WORLD_INSTALL_DIR));

        let ctx = Self::new(cache, paths);
        debug!(paths = ?ctx.search_paths(), "resource search paths");
        ctx
    }

    #[must_use]
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Append paths not already present. Returns the full list.
    pub fn add_search_paths<I>(&self, paths: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut current = self
            .search_paths
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for path in paths {
            if !current.contains(&path) {
                current.push(path);
            }
        }
        current.clone()
    }

    /// Resolve a reference or URI to a local file.
    ///
    /// URIs go to the cache, except `model://name`, which is searched in
    /// the search paths. Plain references are tried as a path, then in
    /// every search path, then in the cache. A directory resolves to the
    /// first description file inside it.
    #[must_use]
    pub fn find_file(&self, reference: &str) -> Option<PathBuf> {
        let found = match split_uri(reference) {
            Some(("model", name)) => self.find_in_search_paths(name),
            Some(_) => self.cache.as_ref().and_then(|c| c.fetch_uri(reference)),
            None => {
                let direct = PathBuf::from(reference);
                if direct.exists() {
                    Some(direct)
                } else {
                    self.find_in_search_paths(reference)
                        .or_else(|| self.cache.as_ref().and_then(|c| c.fetch_reference(reference)))
                }
            }
        }?;

        let file = if found.is_dir() {
            description_file_in(&found)?
        } else {
            found
        };

        if split_uri(reference).is_some() {
            self.uri_map.insert(file.clone(), reference.to_string());
        }
        debug!(reference, path = %file.display(), "resolved resource");
        Some(file)
    }

    /// Resolve a world file path given in a config or on the command line.
    #[must_use]
    pub fn resolve_world_file(&self, path: &Path) -> Option<PathBuf> {
        self.find_file(&path.to_string_lossy())
    }

    /// Local path → original URI for every URI resolved so far.
    #[must_use]
    pub fn uri_map(&self) -> Vec<(PathBuf, String)> {
        self.uri_map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    #[must_use]
    pub fn uri_for_path(&self, path: &Path) -> Option<String> {
        self.uri_map.get(path).map(|uri| uri.value().clone())
    }

    fn find_in_search_paths(&self, relative: &str) -> Option<PathBuf> {
        let relative = relative.trim_start_matches('/');
        self.search_paths()
            .into_iter()
            .map(|dir| dir.join(relative))
            .find(|candidate| candidate.exists())
    }
}

impl AssetResolver for ResourceContext {
    fn find(&self, uri: &str) -> Option<PathBuf> {
        self.find_file(uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cache_layout() {
        let cache = LocalResourceCache::new("/cache");
        assert_eq!(
            cache.cache_path("https://assets.example.org/models/rover?v=2"),
            Some(PathBuf::from("/cache/https/assets.example.org/models/rover"))
        );
        assert_eq!(cache.cache_path("not a uri"), None);
        assert_eq!(cache.cache_path("https://"), None);
    }

    #[test]
    fn test_cache_only_serves_present_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalResourceCache::new(dir.path());
        let uri = "https://assets.example.org/models/rover";
        assert!(cache.fetch_uri(uri).is_none());

        let stored = cache.cache_path(uri).unwrap();
        fs::create_dir_all(&stored).unwrap();
        assert_eq!(cache.fetch_uri(uri), Some(stored));
    }

    #[test]
    fn test_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("w.json");
        fs::write(&file, "{}").unwrap();
        let cache = LocalResourceCache::new("/unused");
        let uri = format!("file://{}", file.display());
        assert_eq!(cache.fetch_uri(&uri), Some(file));
    }

    #[test]
    fn test_search_paths_are_deduplicated_in_order() {
        let ctx = ResourceContext::new(None, vec!["/a".into(), "/b".into(), "/a".into()]);
        assert_eq!(ctx.search_paths(), vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        let all = ctx.add_search_paths(vec!["/c".into(), "/b".into()]);
        assert_eq!(all, vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/c")]);
    }

    #[test]
    fn test_find_in_search_paths_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("rover");
        fs::create_dir(&model).unwrap();
        fs::write(model.join("rover.json"), r#"{"name": "rover"}"#).unwrap();

        let ctx = ResourceContext::new(None, vec![dir.path().to_path_buf()]);
        assert_eq!(ctx.find_file("rover"), Some(model.join("rover.json")));
        assert_eq!(ctx.find_file("model://rover"), Some(model.join("rover.json")));
        assert!(ctx.find_file("missing").is_none());
    }

    #[test]
    fn test_uri_map_records_remote_lookups() {
        let cache_dir = tempfile::tempdir().unwrap();
        let cache = LocalResourceCache::new(cache_dir.path());
        let uri = "https://assets.example.org/lamp.json";
        let stored = cache.cache_path(uri).unwrap();
        fs::create_dir_all(stored.parent().unwrap()).unwrap();
        fs::write(&stored, r#"{"name": "lamp"}"#).unwrap();

        let cache: Arc<dyn ResourceCache> = Arc::new(cache);
        let ctx = ResourceContext::new(Some(cache), Vec::new());
        assert_eq!(ctx.find_file(uri), Some(stored.clone()));
        assert_eq!(ctx.uri_for_path(&stored), Some(uri.to_string()));
        assert_eq!(ctx.uri_map().len(), 1);
    }

    #[test]
    fn test_installed_worlds_are_searched() {
        let ctx = ResourceContext::from_config(&ServerConfig::new());
        assert!(ctx.search_paths().contains(&PathBuf::from(WORLD_INSTALL_DIR)));
        assert_eq!(
            ctx.find_file("shapes.json"),
            Some(Path::new(WORLD_INSTALL_DIR).join("shapes.json"))
        );
    }
}
