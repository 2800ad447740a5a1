use super::{DetectionEvent, DetectionSource, SourceError};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File extensions counted as detections.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Scans an image dataset laid out as `<root>/<species>/**/<image>`.
///
/// The first existing directory from `candidates` is used. Every file with an
/// image extension is one detection, timestamped by its modification time.
pub struct DirectorySource {
    candidates: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// Returns the directory that would be scanned, if any candidate exists.
    pub fn resolve_root(&self) -> Option<PathBuf> {
        self.candidates.iter().find(|p| p.is_dir()).cloned()
    }
}

#[async_trait::async_trait]
impl DetectionSource for DirectorySource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn list_events(&self) -> Result<Vec<DetectionEvent>, SourceError> {
        let Some(root) = self.resolve_root() else {
            info!(candidates = ?self.candidates, "No dataset directory found");
            return Ok(Vec::new());
        };

        // Filesystem walk is blocking; keep it off the runtime threads
        let events = tokio::task::spawn_blocking(move || scan_root(&root)).await??;
        Ok(events)
    }
}

fn scan_root(root: &Path) -> Result<Vec<DetectionEvent>, SourceError> {
    let mut events = Vec::new();
    let entries = std::fs::read_dir(root).map_err(|e| io_err(root, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| io_err(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let species = entry.file_name().to_string_lossy().into_owned();
        let before = events.len();
        walk_species(&path, &species, &mut events)?;
        debug!(%species, images = events.len() - before, "Scanned species directory");
    }

    info!(root = %root.display(), events = events.len(), "Dataset scan complete");
    Ok(events)
}

fn walk_species(dir: &Path, species: &str, out: &mut Vec<DetectionEvent>) -> Result<(), SourceError> {
    for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            walk_species(&path, species, out)?;
        } else if is_image(&path) {
            out.push(DetectionEvent {
                species: species.to_string(),
                observed_at: modified_at(&path),
            });
        }
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn io_err(path: &Path, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_missing_root_yields_no_events() {
        let src = DirectorySource::new(vec![PathBuf::from("/definitely/not/here")]);
        let events = src.list_events().await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_scans_species_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let monarch = dir.path().join("MONARCH");
        fs::create_dir_all(monarch.join("batch1")).unwrap();
        fs::write(monarch.join("a.jpg"), b"x").unwrap();
        fs::write(monarch.join("batch1").join("b.PNG"), b"x").unwrap();
        fs::write(monarch.join("notes.txt"), b"ignored").unwrap();

        let admiral = dir.path().join("RED ADMIRAL");
        fs::create_dir_all(&admiral).unwrap();
        fs::write(admiral.join("c.jpeg"), b"x").unwrap();

        // Stray files at the root are not species
        fs::write(dir.path().join("stray.jpg"), b"x").unwrap();

        let src = DirectorySource::new(vec![
            PathBuf::from("/definitely/not/here"),
            dir.path().to_path_buf(),
        ]);
        let mut events = src.list_events().await.unwrap();
        events.sort_by(|a, b| a.species.cmp(&b.species));

        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().filter(|e| e.species == "MONARCH").count(), 2);
        assert_eq!(events[2].species, "RED ADMIRAL");
        assert!(events.iter().all(|e| e.observed_at.is_some()));
    }

    #[test]
    fn test_image_extension_matching() {
        assert!(is_image(Path::new("x/y.JPG")));
        assert!(is_image(Path::new("y.jpeg")));
        assert!(!is_image(Path::new("y.gif")));
        assert!(!is_image(Path::new("jpg")));
    }
}
