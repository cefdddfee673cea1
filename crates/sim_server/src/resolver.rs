//! World source → validated description.

use std::path::PathBuf;

use sim_world::{
    AssetResolver, DescriptionError, WorldDescription, load_file, load_str, load_str_in, validate,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::WorldSource;
use crate::resources::ResourceContext;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to find world '{}'", .0.display())]
    NotFound(PathBuf),
    #[error("invalid world description ({} errors)", .0.len())]
    Description(Vec<DescriptionError>),
}

impl ResolveError {
    /// The individual problems, in the order they were found.
    #[must_use]
    pub fn errors(&self) -> Vec<DescriptionError> {
        match self {
            Self::NotFound(path) => vec![DescriptionError::WorldNotFound(
                path.display().to_string(),
            )],
            Self::Description(errors) => errors.clone(),
        }
    }

    /// Log every problem at `error` level.
    pub fn log(&self) {
        for error in self.errors() {
            tracing::error!(%error, "world resolution failed");
        }
    }
}

/// Turn a world source into a validated description.
///
/// Includes are looked up through `resources`; every URI resolved along
/// the way lands in its URI map.
///
/// # Errors
///
/// [`ResolveError::NotFound`] if a file source cannot be located,
/// [`ResolveError::Description`] with every problem the loader reported
/// otherwise.
pub fn resolve(
    source: &WorldSource,
    resources: &ResourceContext,
) -> Result<WorldDescription, ResolveError> {
    let assets: &dyn AssetResolver = resources;
    match source {
        WorldSource::Description(description) => {
            debug!(worlds = description.world_count(), "using provided description");
            let errors = validate(description);
            if errors.is_empty() {
                Ok(description.clone())
            } else {
                Err(ResolveError::Description(errors))
            }
        }
        WorldSource::Text { text, path } => {
            match path {
                Some(path) => info!(path = %path.display(), "loading description text"),
                None => info!("loading description text with no backing file"),
            }
            let base = path.as_deref().and_then(|p| p.parent());
            let loaded = match base {
                Some(dir) => load_str_in(text, dir, Some(assets)),
                None => load_str(text, Some(assets)),
            };
            loaded.map_err(ResolveError::Description)
        }
        WorldSource::File(path) => {
            let file = resources
                .resolve_world_file(path)
                .ok_or_else(|| ResolveError::NotFound(path.clone()))?;
            info!(path = %file.display(), "loading world file");
            load_file(&file, Some(assets)).map_err(ResolveError::Description)
        }
        WorldSource::None => {
            info!("no world source configured, using an empty default world");
            Ok(WorldDescription::default_world())
        }
    }
}
