//! Resolving a file-or-directory argument into audio files

use super::is_audio_file;
use crate::error::{CoreError, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Canonical paths of the audio files at `target`.
///
/// A file is returned as-is (whatever its extension); a directory is searched
/// recursively. Results are sorted and unique.
pub fn scan_audio_files(target: &Path) -> Result<Vec<PathBuf>> {
    if target.is_file() {
        let path = target
            .canonicalize()
            .map_err(|e| CoreError::io(target, e))?;
        return Ok(vec![path]);
    }
    if !target.is_dir() {
        return Err(CoreError::configuration(format!(
            "path not found: {}",
            target.display()
        )));
    }

    let candidates: Vec<PathBuf> = WalkDir::new(target)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    let mut files: Vec<PathBuf> = candidates
        .par_iter()
        .filter_map(|path| match path.canonicalize() {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Cannot resolve {}: {}", path.display(), e);
                None
            }
        })
        .collect();
    files.sort();
    files.dedup();

    log::info!("Found {} audio file(s) under {}", files.len(), target.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("disc2")).unwrap();
        for name in ["b.mp3", "a.WAV", "disc2/c.flac", "cover.jpg", "disc2/notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let files = scan_audio_files(dir.path()).unwrap();
        let root = dir.path().canonicalize().unwrap();
        let relative: Vec<PathBuf> = files
            .iter()
            .map(|p| p.strip_prefix(&root).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.WAV"),
                PathBuf::from("b.mp3"),
                PathBuf::from("disc2/c.flac")
            ]
        );
    }

    #[test]
    fn test_single_file_and_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.ogg");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(scan_audio_files(&file).unwrap().len(), 1);

        let missing = scan_audio_files(&dir.path().join("nope"));
        assert!(matches!(missing, Err(CoreError::Configuration(_))));
    }
}
