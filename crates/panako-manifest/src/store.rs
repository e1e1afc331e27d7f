//! Append-only manifest store
//!
//! Membership is a set: duplicate lines in the backing file collapse on load.
//! Every mutation is flushed and synced before returning, so a crash midway
//! through a directory leaves exactly the files already processed recorded.

use crate::error::ManifestError;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    entries: BTreeSet<String>,
}

impl ManifestStore {
    /// Load the manifest at `path`. A missing file is an empty manifest.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => parse_entries(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(ManifestError::io(&path, e)),
        };
        log::debug!("Loaded {} manifest entries from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    /// Load the manifest, degrading to an empty one if it cannot be read.
    ///
    /// Duplicate detection is best effort, so an unreadable manifest only
    /// costs re-indexing work.
    pub fn load_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(store) => store,
            Err(e) => {
                log::warn!("{}; treating manifest as empty", e);
                Self {
                    path,
                    entries: BTreeSet::new(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains(path.trim())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Add `paths`, appending only the ones not already present.
    ///
    /// Returns how many entries were new.
    pub fn add_many<I, S>(&mut self, paths: I) -> Result<usize, ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fresh: Vec<String> = Vec::new();
        for path in paths {
            let path = path.as_ref().trim();
            if path.is_empty() || self.entries.contains(path) || fresh.iter().any(|f| f == path) {
                continue;
            }
            fresh.push(path.to_string());
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        // The set only learns about entries that reached the file.
        self.append(&fresh)?;
        let added = fresh.len();
        self.entries.extend(fresh);
        Ok(added)
    }

    pub fn add(&mut self, path: &str) -> Result<bool, ManifestError> {
        Ok(self.add_many([path])? == 1)
    }

    /// Remove `path`. Removing a path that is not present is a no-op.
    pub fn remove(&mut self, path: &str) -> Result<bool, ManifestError> {
        let path = path.trim();
        if !self.entries.remove(path) {
            return Ok(false);
        }
        if let Err(e) = self.compact() {
            self.entries.insert(path.to_string());
            return Err(e);
        }
        Ok(true)
    }

    /// Empty the manifest and delete its backing file.
    pub fn clear(&mut self) -> Result<(), ManifestError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ManifestError::io(&self.path, e)),
        }
        self.entries.clear();
        Ok(())
    }

    /// Union `paths` into the manifest without touching existing entries.
    ///
    /// Returns `(added, already_present)`.
    pub fn rebuild_from<I, S>(&mut self, paths: I) -> Result<(usize, usize), ManifestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates: BTreeSet<String> = paths
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let total = candidates.len();
        let added = self.add_many(&candidates)?;
        Ok((added, total - added))
    }

    /// Rewrite the backing file with one sorted line per entry.
    pub fn compact(&self) -> Result<(), ManifestError> {
        self.ensure_parent()?;
        let tmp = self.path.with_extension("txt.tmp");
        let result = (|| {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for entry in &self.entries {
                writeln!(writer, "{}", entry)?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();
        result.map_err(|e| ManifestError::io(&self.path, e))
    }

    fn append(&self, lines: &[String]) -> Result<(), ManifestError> {
        self.ensure_parent()?;
        let result = (|| {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            let mut writer = BufWriter::new(file);
            for line in lines {
                writeln!(writer, "{}", line)?;
            }
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()
        })();
        result.map_err(|e| ManifestError::io(&self.path, e))
    }

    fn ensure_parent(&self) -> Result<(), ManifestError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|e| ManifestError::io(&self.path, e))
            }
            _ => Ok(()),
        }
    }
}

fn parse_entries(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
