//! Loaders for crux configuration files.
//!
//! - `.crux/config.toml`: global settings
//! - `crux.json`: component descriptors, with optional external schema files
//! - pipeline definitions in JSON or YAML

use crate::config::error::{ConfigError, ConfigResult};
use crux_protocol::config_models::CruxConfig;
use crux_protocol::descriptor_models::{Descriptor, DescriptorFile, Schema, SchemaSource};
use crux_protocol::pipeline_models::PipelineDefinition;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Name of the descriptor file inside a component directory.
pub const DESCRIPTOR_FILE_NAME: &str = "crux.json";

/// Loads global configuration from `.crux/config.toml` under `root`.
///
/// # Arguments
///
/// * `root` - Directory containing the `.crux/` folder
///
/// # Returns
///
/// A `CruxConfig`. If the directory or the file is missing, the default
/// configuration is returned rather than an error.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or is not
/// valid TOML.
///
/// # Example
///
/// ```rust,no_run
/// use crux_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Daemon binds {}", config.daemon.bind);
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<CruxConfig> {
    let config_path = root.join(".crux").join("config.toml");

    if !config_path.exists() {
        return Ok(CruxConfig::default());
    }

    let content = read(&config_path)?;
    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: config_path,
        source,
    })
}

/// Resolve a component path to its descriptor file.
///
/// A directory maps to the `crux.json` inside it; anything else is taken to
/// be the descriptor file itself.
pub fn descriptor_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DESCRIPTOR_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

/// Read a descriptor file as written on disk, without resolving schema files
/// or checking for a startup command.
pub fn read_descriptor_file(file: &Path) -> ConfigResult<DescriptorFile> {
    let content = read(file)?;
    serde_json::from_str(&content).map_err(|source| ConfigError::JsonParse {
        path: file.to_path_buf(),
        source,
    })
}

/// Loads a fully resolved component descriptor.
///
/// Schema entries given as file names are read relative to the descriptor's
/// directory.
///
/// # Arguments
///
/// * `path` - Component directory or descriptor file
///
/// # Errors
///
/// Returns `ConfigError` if any file cannot be read or parsed, or if the
/// descriptor has no startup command.
pub fn load_descriptor(path: &Path) -> ConfigResult<Descriptor> {
    let file = descriptor_path(path);
    let raw = read_descriptor_file(&file)?;
    let base = file.parent().unwrap_or_else(|| Path::new("."));

    let startup = match raw.startup {
        Some(startup) if !startup.trim().is_empty() => startup,
        _ => {
            return Err(ConfigError::InvalidConfig {
                path: file,
                reason: "no startup command specified".to_string(),
            })
        }
    };

    Ok(Descriptor {
        name: raw.name,
        version: raw.version,
        startup,
        inputs: resolve_schema(raw.inputs, base)?,
        outputs: resolve_schema(raw.outputs, base)?,
        parameters: resolve_schema(raw.parameters, base)?,
    })
}

fn resolve_schema(source: SchemaSource, base: &Path) -> ConfigResult<Schema> {
    match source {
        SchemaSource::Inline(schema) => Ok(schema),
        SchemaSource::File(relative) => {
            let path = base.join(relative);
            let content = read(&path)?;
            serde_json::from_str(&content).map_err(|source| ConfigError::JsonParse { path, source })
        }
    }
}

/// Loads a pipeline definition from a JSON or YAML file.
///
/// The format is chosen by extension: `.yaml`/`.yml` parse as YAML,
/// everything else as JSON.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, or if a step
/// references a component the definition does not load.
pub fn load_pipeline(path: &Path) -> ConfigResult<PipelineDefinition> {
    let content = read(path)?;

    let definition: PipelineDefinition = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => parse_yaml(path, &content)?,
        _ => serde_json::from_str(&content).map_err(|source| ConfigError::JsonParse {
            path: path.to_path_buf(),
            source,
        })?,
    };

    definition
        .validate()
        .map_err(|e| ConfigError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    Ok(definition)
}

fn parse_yaml<T: DeserializeOwned>(path: &Path, content: &str) -> ConfigResult<T> {
    serde_yaml::from_str(content).map_err(|source| ConfigError::YamlParse {
        path: path.to_path_buf(),
        source,
    })
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}
