//! Project root discovery.

use std::path::{Path, PathBuf};

/// File whose presence marks a project root.
pub const ROOT_MARKER: &str = "Cargo.toml";

/// Walks up from `start` and returns the first directory containing
/// `marker`. A relative `start` is resolved against the working directory.
pub fn find_root(start: &Path, marker: &str) -> Option<PathBuf> {
    let start = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(start)
    };

    start
        .ancestors()
        .find(|dir| dir.join(marker).exists())
        .map(Path::to_path_buf)
}

/// Returns the project root above `run_dir`, or `run_dir` itself when no
/// ancestor holds a [`ROOT_MARKER`].
pub fn project_root(run_dir: &Path) -> PathBuf {
    find_root(run_dir, ROOT_MARKER).unwrap_or_else(|| run_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_finds_marker_in_ancestor() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("project.marker"), "").unwrap();
        let nested = dir.path().join("src/bin/tool");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_root(&nested, "project.marker").unwrap(), dir.path());
        assert_eq!(find_root(dir.path(), "project.marker").unwrap(), dir.path());
    }

    #[test]
    fn test_missing_marker() {
        let dir = TempDir::new().unwrap();
        assert!(find_root(dir.path(), "no-such-marker-7f3a.toml").is_none());
    }

    #[test]
    fn test_project_root_prefers_nearest_manifest() {
        let dir = TempDir::new().unwrap();
        let member = dir.path().join("crates/member");
        fs::create_dir_all(member.join("src")).unwrap();
        fs::write(dir.path().join(ROOT_MARKER), "[workspace]\n").unwrap();
        fs::write(member.join(ROOT_MARKER), "[package]\n").unwrap();

        assert_eq!(project_root(&member.join("src")), member);
    }
}
