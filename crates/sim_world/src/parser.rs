/// Loading world descriptions from text and files.
///
/// Loading happens in three passes: JSON deserialization, include expansion
/// and validation. Every pass collects all the problems it can find before
/// giving up, so callers get a complete ordered error list.
use crate::description::{EntityDescription, WorldDescription};
use crate::error::DescriptionError;
use crate::validate::validate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Maps an include URI to a local file or directory.
///
/// Implementations must be callable from any thread; the server loads
/// descriptions both on the caller's thread and on a background thread.
pub trait AssetResolver: Send + Sync {
    fn find(&self, uri: &str) -> Option<PathBuf>;
}

/// Parse and validate a description held in memory.
///
/// Includes are looked up through `resolver`. Without a resolver every
/// include is reported as unresolved.
pub fn load_str(
    text: &str,
    resolver: Option<&dyn AssetResolver>,
) -> Result<WorldDescription, Vec<DescriptionError>> {
    load(text, None, resolver)
}

/// Like [`load_str`], but relative include URIs are tried against
/// `base_dir` before falling back to `resolver`.
pub fn load_str_in(
    text: &str,
    base_dir: &Path,
    resolver: Option<&dyn AssetResolver>,
) -> Result<WorldDescription, Vec<DescriptionError>> {
    load(text, Some(base_dir), resolver)
}

/// Read, parse and validate a description file.
pub fn load_file(
    path: &Path,
    resolver: Option<&dyn AssetResolver>,
) -> Result<WorldDescription, Vec<DescriptionError>> {
    let text = read(path).map_err(|e| vec![e])?;
    load(&text, path.parent(), resolver)
}

/// Read only the world names from a description file.
///
/// Entities, includes and plugins are skipped without being interpreted,
/// which keeps this cheap enough to run before the full load.
pub fn world_names_from_file(path: &Path) -> Result<Vec<String>, DescriptionError> {
    #[derive(Deserialize)]
    struct NameOnly {
        #[serde(default)]
        name: String,
    }
    #[derive(Deserialize)]
    struct NamesOnly {
        #[serde(default)]
        worlds: Vec<NameOnly>,
    }

    let text = read(path)?;
    let names: NamesOnly = serde_json::from_str(&text).map_err(|e| DescriptionError::syntax(&e))?;
    Ok(names.worlds.into_iter().map(|w| w.name).collect())
}

/// The first `*.json` file in `dir`, by file name.
#[must_use]
pub fn description_file_in(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files.into_iter().next()
}

fn read(path: &Path) -> Result<String, DescriptionError> {
    std::fs::read_to_string(path).map_err(|e| DescriptionError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn load(
    text: &str,
    base_dir: Option<&Path>,
    resolver: Option<&dyn AssetResolver>,
) -> Result<WorldDescription, Vec<DescriptionError>> {
    let mut desc: WorldDescription =
        serde_json::from_str(text).map_err(|e| vec![DescriptionError::syntax(&e)])?;

    let mut errors = Vec::new();
    for world in &mut desc.worlds {
        for include in &world.includes {
            match expand_include(&include.uri, base_dir, resolver) {
                Ok(mut entity) => {
                    if let Some(name) = &include.name {
                        entity.name = name.clone();
                    }
                    for (key, value) in &include.components {
                        entity.components.insert(key.clone(), value.clone());
                    }
                    tracing::debug!(world = %world.name, uri = %include.uri, entity = %entity.name, "expanded include");
                    world.entities.push(entity);
                }
                Err(e) => errors.push(e),
            }
        }
    }

    errors.extend(validate(&desc));
    if errors.is_empty() {
        Ok(desc)
    } else {
        Err(errors)
    }
}

fn expand_include(
    uri: &str,
    base_dir: Option<&Path>,
    resolver: Option<&dyn AssetResolver>,
) -> Result<EntityDescription, DescriptionError> {
    let local = base_dir
        .map(|dir| dir.join(uri))
        .filter(|p| p.exists())
        .or_else(|| resolver.and_then(|r| r.find(uri)))
        .ok_or_else(|| DescriptionError::UnresolvedInclude {
            uri: uri.to_string(),
        })?;

    let file = if local.is_dir() {
        description_file_in(&local).ok_or_else(|| DescriptionError::InvalidInclude {
            uri: uri.to_string(),
            message: format!("no description file in '{}'", local.display()),
        })?
    } else {
        local
    };

    let text = read(&file)?;
    serde_json::from_str(&text).map_err(|e| DescriptionError::InvalidInclude {
        uri: uri.to_string(),
        message: e.to_string(),
    })
}
