//! Tree aggregation: consolidate one section of every scope artifact.
//!
//! Scopes are keyed by their folder path relative to the tree root, `.` for
//! the root itself. The root comes first, then sub-scopes depth-first with
//! siblings in name order.

use crate::config::{ConfigError, ARTIFACT_FILE};
use indexmap::IndexMap;
use log::{debug, info};
use serde_yaml::{Mapping, Value};
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Section consolidated when none is requested
pub const DEFAULT_SECTION: &str = "ansible";

/// Scope key -> extracted section
pub type Aggregate = IndexMap<String, Value>;

/// Every artifact below `root`, in aggregation order
pub fn artifact_paths(root: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let walker = WalkDir::new(root).sort_by(|a, b| {
        a.file_type()
            .is_dir()
            .cmp(&b.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && entry.file_name() == ARTIFACT_FILE {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Aggregation key of the scope holding `artifact`
pub fn scope_key(root: &Path, artifact: &Path) -> String {
    let folder = artifact.parent().unwrap_or(root);
    match folder.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => folder.display().to_string(),
    }
}

/// Collect `section` from every artifact under `root`; `null` where absent
pub fn aggregate(root: &Path, section: &str) -> Result<Aggregate, ConfigError> {
    aggregate_artifacts(root, &artifact_paths(root)?, section)
}

/// Collect `section` from the given artifacts, keyed relative to `root`
pub fn aggregate_artifacts(
    root: &Path,
    artifacts: &[PathBuf],
    section: &str,
) -> Result<Aggregate, ConfigError> {
    let mut consolidated = Aggregate::new();

    for path in artifacts {
        let path = path.clone();
        let file = File::open(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let document: Value = serde_yaml::from_reader(file).map_err(|e| ConfigError::Artifact {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let extracted = match &document {
            Value::Mapping(values) => values.get(section).cloned().unwrap_or(Value::Null),
            Value::Null => Value::Null,
            _ => {
                return Err(ConfigError::Artifact {
                    path,
                    reason: "top level is not a mapping".to_string(),
                })
            }
        };

        let key = scope_key(root, &path);
        debug!("Aggregated {} of scope {}", section, key);
        consolidated.insert(key, extracted);
    }

    info!("Aggregated section {} from {} scopes", section, consolidated.len());
    Ok(consolidated)
}

/// Write `{section: consolidated}` to `output`
pub fn write_aggregate(output: &Path, section: &str, consolidated: &Aggregate) -> Result<(), ConfigError> {
    let mut document = Mapping::new();
    let scopes: Mapping = consolidated
        .iter()
        .map(|(scope, value)| (Value::String(scope.clone()), value.clone()))
        .collect();
    document.insert(Value::String(section.to_string()), Value::Mapping(scopes));

    let file = File::create(output).map_err(|source| ConfigError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    serde_yaml::to_writer(file, &document).map_err(|e| ConfigError::Artifact {
        path: output.to_path_buf(),
        reason: e.to_string(),
    })
}
