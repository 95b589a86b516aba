//! Configuration directory loading and merging.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::ConfigError;

/// File extensions recognized as YAML config files.
pub const YAML_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// The merged configuration of one directory, keyed by namespace.
///
/// Namespace names are case-insensitive: they are stored lowercased and
/// lookups are lowercased too.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    namespaces: BTreeMap<String, Value>,
    sources: BTreeMap<String, PathBuf>,
}

impl ConfigTree {
    /// Returns the subtree of a namespace.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.namespaces.get(&normalize_name(name))
    }

    /// Returns the file that declared a namespace.
    pub fn source(&self, name: &str) -> Option<&Path> {
        self.sources.get(&normalize_name(name)).map(PathBuf::as_path)
    }

    /// Returns every namespace name in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.namespaces.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    /// Builds a single YAML mapping holding every namespace.
    pub fn to_value(&self) -> Value {
        let mapping: Mapping = self
            .namespaces
            .iter()
            .map(|(name, value)| (Value::String(name.clone()), value.clone()))
            .collect();
        Value::Mapping(mapping)
    }

    /// Adds every top-level key of one parsed file.
    fn merge_file(&mut self, path: &Path, document: Value) -> Result<(), ConfigError> {
        let mapping = match document {
            // An empty file declares nothing.
            Value::Null => return Ok(()),
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(ConfigError::FileRead {
                    path: path.to_path_buf(),
                    message: format!("expected a mapping at top level, found {}", kind_of(&other)),
                })
            }
        };

        for (key, value) in mapping {
            let name = match key {
                Value::String(name) => normalize_name(&name),
                other => {
                    return Err(ConfigError::FileRead {
                        path: path.to_path_buf(),
                        message: format!("top-level key must be a string, found {}", kind_of(&other)),
                    })
                }
            };

            if let Some(first) = self.sources.get(&name) {
                return Err(ConfigError::DuplicateKey {
                    key: name,
                    path: path.to_path_buf(),
                    first: first.clone(),
                });
            }

            if !value.is_mapping() {
                return Err(ConfigError::FileRead {
                    path: path.to_path_buf(),
                    message: format!(
                        "cannot read namespace '{}': expected a mapping, found {}",
                        name,
                        kind_of(&value)
                    ),
                });
            }

            self.sources.insert(name.clone(), path.to_path_buf());
            self.namespaces.insert(name, value);
        }

        Ok(())
    }
}

/// Folds a namespace name to the form it is stored under.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

/// Returns true if the path has a recognized YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| YAML_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Loads every YAML file directly inside `dir` and merges their top-level
/// keys into one tree.
///
/// Subdirectories and non-YAML files are skipped. Files are merged in
/// file-name order, so a duplicate key always reports the same file for a
/// given directory.
pub fn load_all(dir: &Path) -> Result<ConfigTree, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::DirectoryRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() || !is_yaml_file(&path) {
            continue;
        }
        files.push(path);
    }
    files.sort();

    let mut tree = ConfigTree::default();
    for path in &files {
        let document = parse_file(path)?;
        tree.merge_file(path, document)?;
    }

    tracing::debug!(dir = ?dir, files = files.len(), namespaces = tree.len(), "Loaded config directory");
    Ok(tree)
}

/// Reads and parses a single YAML file.
fn parse_file(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if content.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_yaml::from_str(&content).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_load_all_merges_disjoint_files() {
        let dir = TempDir::new().unwrap();
        write(&dir, "db.yaml", "database:\n  host: localhost\n  port: 5432\n");
        write(&dir, "cache.yml", "cache:\n  ttl: 30\nqueue:\n  size: 8\n");

        let tree = load_all(dir.path()).unwrap();

        assert_eq!(tree.names(), vec!["cache", "database", "queue"]);
        assert_eq!(tree.get("database").unwrap()["port"].as_u64(), Some(5432));
        assert_eq!(tree.source("cache").unwrap(), dir.path().join("cache.yml"));
    }

    #[test]
    fn test_load_all_rejects_duplicate_key_in_either_order() {
        for (first, second) in [("a.yaml", "b.yaml"), ("b.yaml", "a.yaml")] {
            let dir = TempDir::new().unwrap();
            write(&dir, first, "database:\n  host: one\n");
            write(&dir, second, "database:\n  host: two\n");

            let err = load_all(dir.path()).unwrap_err();
            assert!(err.is_duplicate_key(), "unexpected error: {err}");
            match err {
                ConfigError::DuplicateKey { key, path, first } => {
                    assert_eq!(key, "database");
                    assert_eq!(path, dir.path().join("b.yaml"));
                    assert_eq!(first, dir.path().join("a.yaml"));
                }
                other => panic!("expected DuplicateKey, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_load_all_keys_are_case_insensitive() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.yaml", "Database:\n  host: one\n");
        write(&dir, "b.yaml", "database:\n  host: two\n");

        match load_all(dir.path()).unwrap_err() {
            ConfigError::DuplicateKey { key, path, first } => {
                assert_eq!(key, "database");
                assert_eq!(path, dir.path().join("b.yaml"));
                assert_eq!(first, dir.path().join("a.yaml"));
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }

        fs::remove_file(dir.path().join("b.yaml")).unwrap();
        let tree = load_all(dir.path()).unwrap();
        assert_eq!(tree.names(), vec!["database"]);
        assert!(tree.get("DATABASE").is_some());
        assert_eq!(tree.source("Database").unwrap(), dir.path().join("a.yaml"));
    }

    #[test]
    fn test_load_all_empty_directory() {
        let dir = TempDir::new().unwrap();
        let tree = load_all(dir.path()).unwrap();
        assert!(tree.is_empty());
        assert!(tree.names().is_empty());
    }

    #[test]
    fn test_load_all_skips_other_files_and_subdirectories() {
        let dir = TempDir::new().unwrap();
        write(&dir, "app.yaml", "app:\n  name: demo\n");
        write(&dir, "notes.txt", "not: yaml: at: all: [");
        write(&dir, "app.yaml.bak", "other:\n  x: 1\n");
        fs::create_dir(dir.path().join("nested.yaml")).unwrap();
        fs::write(dir.path().join("nested.yaml").join("inner.yaml"), "inner:\n  x: 1\n").unwrap();

        let tree = load_all(dir.path()).unwrap();
        assert_eq!(tree.names(), vec!["app"]);
    }

    #[test]
    fn test_load_all_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = load_all(&dir.path().join("missing")).unwrap_err();
        assert!(err.is_directory_read());
    }

    #[test]
    fn test_load_all_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        write(&dir, "broken.yaml", "service:\n  name: [unterminated\n");

        let err = load_all(dir.path()).unwrap_err();
        assert!(err.is_file_read());
    }

    #[test]
    fn test_load_all_rejects_scalar_namespace() {
        let dir = TempDir::new().unwrap();
        write(&dir, "flat.yaml", "debug: true\n");

        let err = load_all(dir.path()).unwrap_err();
        assert!(err.is_file_read());
        assert!(err.to_string().contains("debug"));
    }

    #[test]
    fn test_load_all_accepts_empty_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "empty.yaml", "");
        write(&dir, "app.yaml", "app:\n  name: demo\n");

        let tree = load_all(dir.path()).unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_load_all_is_repeatable() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.yaml", "a:\n  list: [1, 2, 3]\n");
        write(&dir, "b.yaml", "b:\n  nested:\n    deep: true\n");

        assert_eq!(load_all(dir.path()).unwrap(), load_all(dir.path()).unwrap());
    }
}
