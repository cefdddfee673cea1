//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sim_world::{PluginDescription, WorldDescription};
use tracing::warn;

/// Where a server's worlds come from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum WorldSource {
    /// An already parsed description.
    Description(WorldDescription),
    /// Description text, with the file it was read from if known.
    Text { text: String, path: Option<PathBuf> },
    /// A description file, looked up in the resource cache and search paths.
    File(PathBuf),
    /// No source: a single empty world called `default`.
    #[default]
    None,
}

/// Configuration for a [`Server`](crate::Server). Fixed once the server is
/// constructed.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub source: WorldSource,
    /// Local directory holding fetched remote resources.
    pub resource_cache: Option<PathBuf>,
    /// Resolve file sources on a background thread while runners are built.
    pub download_in_parallel: bool,
    /// Attach a `log_record` system to every world.
    pub use_log_record: bool,
    /// Directory for log records; overrides a path declared in the world.
    pub log_record_path: Option<PathBuf>,
    /// Overrides the pacing every world derives from its physics settings.
    pub update_period: Option<Duration>,
    /// Systems attached to every world after the world's own.
    pub plugins: Vec<PluginDescription>,
    /// Searched before `SIM_RESOURCE_PATH` and the installed worlds.
    pub resource_paths: Vec<PathBuf>,
}

impl ServerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_source(mut self, source: WorldSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn with_description(self, description: WorldDescription) -> Self {
        self.with_source(WorldSource::Description(description))
    }

    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_source(WorldSource::Text {
            text: text.into(),
            path: None,
        })
    }

    /// Description text that was read from `path`.
    #[must_use]
    pub fn with_text_from(self, text: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.with_source(WorldSource::Text {
            text: text.into(),
            path: Some(path.into()),
        })
    }

    #[must_use]
    pub fn with_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_source(WorldSource::File(path.into()))
    }

    #[must_use]
    pub fn with_resource_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_cache = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_download_in_parallel(mut self, enabled: bool) -> Self {
        self.download_in_parallel = enabled;
        self
    }

    /// Record every world, optionally into `path`.
    #[must_use]
    pub fn with_log_record(mut self, path: Option<PathBuf>) -> Self {
        self.use_log_record = true;
        self.log_record_path = path;
        self
    }

    #[must_use]
    pub fn with_update_period(mut self, period: Duration) -> Self {
        self.update_period = Some(period);
        self
    }

    /// Pace every world at `hz` steps per second. Rates that are not
    /// positive, or whose period does not fit a `Duration`, are ignored.
    #[must_use]
    pub fn with_update_rate(self, hz: f64) -> Self {
        if !(hz.is_finite() && hz > 0.0) {
            return self;
        }
        match Duration::try_from_secs_f64(1.0 / hz) {
            Ok(period) => self.with_update_period(period),
            Err(e) => {
                warn!(hz, error = %e, "ignoring update rate");
                self
            }
        }
    }

    #[must_use]
    pub fn with_plugin(mut self, plugin: PluginDescription) -> Self {
        self.plugins.push(plugin);
        self
    }

    #[must_use]
    pub fn with_resource_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.resource_paths.push(path.into());
        self
    }

    /// The file source path, if the source is a file.
    #[must_use]
    pub fn source_file(&self) -> Option<&Path> {
        match &self.source {
            WorldSource::File(path) => Some(path),
            _ => None,
        }
    }

    /// Directory log records go to when none is configured anywhere.
    #[must_use]
    pub fn default_log_record_path() -> PathBuf {
        std::env::temp_dir().join("sim_server").join("log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::new();
        assert_eq!(config.source, WorldSource::None);
        assert!(!config.download_in_parallel);
        assert!(!config.use_log_record);
        assert!(config.update_period.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .with_file("worlds/shapes.json")
            .with_download_in_parallel(true)
            .with_log_record(Some(PathBuf::from("/tmp/rec")))
            .with_update_rate(500.0)
            .with_plugin(PluginDescription::new("velocity_integrator"))
            .with_resource_path("/opt/models");

        assert_eq!(config.source_file(), Some(Path::new("worlds/shapes.json")));
        assert!(config.use_log_record);
        assert_eq!(config.update_period, Some(Duration::from_millis(2)));
        assert_eq!(config.plugins.len(), 1);
        assert_eq!(config.resource_paths, vec![PathBuf::from("/opt/models")]);
    }

    #[test]
    fn test_invalid_update_rate_is_ignored() {
        assert!(ServerConfig::new().with_update_rate(0.0).update_period.is_none());
        assert!(ServerConfig::new().with_update_rate(-5.0).update_period.is_none());
        assert!(ServerConfig::new().with_update_rate(f64::NAN).update_period.is_none());
        assert!(ServerConfig::new().with_update_rate(1e-300).update_period.is_none());
    }
}
