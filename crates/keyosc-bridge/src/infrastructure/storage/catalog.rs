//! Filesystem presentation catalog.
//!
//! Lists `*.key` entries of a directory.  Keynote documents are usually
//! package directories, older ones single files; both are accepted.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use keyosc_core::PresentationEntry;
use tracing::{debug, warn};

use crate::application::route_command::PresentationCatalog;

const PRESENTATION_EXTENSION: &str = "key";

/// [`PresentationCatalog`] over a local directory.
#[derive(Debug, Default)]
pub struct FsCatalog {
    root: RwLock<Option<PathBuf>>,
}

impl FsCatalog {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }
}

#[async_trait]
impl PresentationCatalog for FsCatalog {
    fn root(&self) -> Option<PathBuf> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_root(&self, root: PathBuf) {
        debug!(root = %root.display(), "catalog root changed");
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = Some(root);
    }

    async fn list(&self, dir: Option<PathBuf>) -> Vec<PresentationEntry> {
        let Some(dir) = dir.or_else(|| self.root()) else {
            debug!("no content path configured; nothing to list");
            return Vec::new();
        };
        match list_presentations(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to list presentations");
                Vec::new()
            }
        }
    }
}

fn is_presentation(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PRESENTATION_EXTENSION))
}

/// Reads `dir` and returns its presentations sorted by name.
pub async fn list_presentations(dir: &Path) -> std::io::Result<Vec<PresentationEntry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let path = entry.path();
        if !is_presentation(&path) {
            continue;
        }
        // Follows symlinks; a dangling link is skipped rather than failing the listing.
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() || m.is_dir() => m,
            Ok(_) => continue,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());

        entries.push(PresentationEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: path.to_string_lossy().into_owned(),
            size: metadata.len(),
            modified,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A fresh directory under the system temp dir, removed on drop.
    struct TempDir(PathBuf);

    impl TempDir {
        fn new(tag: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "keyosc-catalog-{tag}-{}",
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&path);
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        assert!(is_presentation(Path::new("/d/Deck.key")));
        assert!(is_presentation(Path::new("/d/Deck.KEY")));
        assert!(!is_presentation(Path::new("/d/Deck.key.bak")));
        assert!(!is_presentation(Path::new("/d/notes.txt")));
        assert!(!is_presentation(Path::new("/d/key")));
    }

    #[tokio::test]
    async fn test_lists_only_presentations_sorted_by_name() {
        // Arrange
        let dir = TempDir::new("sorted");
        std::fs::write(dir.0.join("b.key"), b"bb").unwrap();
        std::fs::write(dir.0.join("A.key"), b"a").unwrap();
        std::fs::write(dir.0.join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.0.join("Package.key")).unwrap();

        // Act
        let entries = list_presentations(&dir.0).await.unwrap();

        // Assert
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A.key", "Package.key", "b.key"]);
        assert_eq!(entries[2].size, 2);
        assert!(entries[0].path.ends_with("A.key"));
    }

    #[tokio::test]
    async fn test_unset_root_lists_nothing() {
        let catalog = FsCatalog::new(None);
        assert!(catalog.list(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let catalog = FsCatalog::new(Some(PathBuf::from("/nonexistent/keyosc/decks")));
        assert!(catalog.list(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_directory_overrides_root_without_changing_it() {
        let dir = TempDir::new("explicit");
        std::fs::write(dir.0.join("One.key"), b"1").unwrap();
        let catalog = FsCatalog::new(Some(PathBuf::from("/nonexistent")));

        let entries = catalog.list(Some(dir.0.clone())).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(catalog.root(), Some(PathBuf::from("/nonexistent")));
    }

    #[test]
    fn test_set_root_replaces_root() {
        let catalog = FsCatalog::default();
        catalog.set_root(PathBuf::from("/Decks"));
        assert_eq!(catalog.root(), Some(PathBuf::from("/Decks")));
    }
}
