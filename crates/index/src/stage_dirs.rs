use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::maintainer::RebuildStage;
use crate::IndexError;

const MANIFEST_FILE: &str = "manifest.json";
const LOCK_FILE: &str = ".lock";

/// Committed and staging directory layout for one file-name prefix.
///
/// ```text
/// <cache>/index/<prefix>/{chem-comp,search-index,molecule-provider,manifest.json}
/// <cache>/staging/<prefix>/{.lock,chem-comp,search-index,molecule-provider}
/// ```
///
/// A stage writes into its staging directory and the result replaces the
/// committed copy only through [`StageDirs::commit`]. The committed tree is
/// loadable only while `manifest.json` exists; it is retired before the first
/// commit of a new generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDirs {
    index_root: PathBuf,
    staging_root: PathBuf,
}

impl StageDirs {
    pub fn new(cache_path: &Path, prefix: &str) -> Self {
        Self {
            index_root: cache_path.join("index").join(prefix),
            staging_root: cache_path.join("staging").join(prefix),
        }
    }

    pub fn index_root(&self) -> &Path {
        &self.index_root
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.index_root.join(MANIFEST_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.staging_root.join(LOCK_FILE)
    }

    /// Take the exclusive lock for this prefix, held until the returned file
    /// is dropped. Another holder, in this process or another, yields
    /// [`IndexError::Busy`].
    pub fn lock_exclusive(&self) -> Result<File, IndexError> {
        std::fs::create_dir_all(&self.staging_root)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(file),
            Err(err) if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                Err(IndexError::Busy)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove the manifest so the committed tree is not loaded until a new
    /// one is published.
    pub fn retire_manifest(&self) -> io::Result<()> {
        match std::fs::remove_file(self.manifest_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Committed artifact directory for `stage`, if it produces one.
    pub fn committed(&self, stage: RebuildStage) -> Option<PathBuf> {
        stage.artifact_dir().map(|dir| self.index_root.join(dir))
    }

    pub fn staging(&self, stage: RebuildStage) -> Option<PathBuf> {
        stage.artifact_dir().map(|dir| self.staging_root.join(dir))
    }

    /// Create an empty staging directory for `stage`, clearing leftovers from
    /// an interrupted run.
    pub fn prepare(&self, stage: RebuildStage) -> io::Result<Option<PathBuf>> {
        let Some(dir) = self.staging(stage) else {
            return Ok(None);
        };
        remove_dir_if_exists(&dir)?;
        std::fs::create_dir_all(&dir)?;
        Ok(Some(dir))
    }

    /// Replace the committed directory for `stage` with its staging output.
    pub fn commit(&self, stage: RebuildStage) -> io::Result<()> {
        let (Some(staged), Some(target)) = (self.staging(stage), self.committed(stage)) else {
            return Ok(());
        };
        std::fs::create_dir_all(&self.index_root)?;

        // rename() cannot replace a non-empty directory, so move the old copy
        // aside first.
        let retired = target.with_extension("old");
        remove_dir_if_exists(&retired)?;
        if target.exists() {
            std::fs::rename(&target, &retired)?;
        }
        if let Err(err) = std::fs::rename(&staged, &target) {
            if retired.exists() {
                let _ = std::fs::rename(&retired, &target);
            }
            return Err(err);
        }
        remove_dir_if_exists(&retired)
    }

    /// Drop the staging output for `stage`. The committed copy is untouched.
    pub fn discard(&self, stage: RebuildStage) -> io::Result<()> {
        match self.staging(stage) {
            Some(dir) => remove_dir_if_exists(&dir),
            None => Ok(()),
        }
    }

    /// Names of artifact directories missing from the committed tree.
    pub fn missing_committed(&self) -> Vec<&'static str> {
        RebuildStage::ORDERED
            .iter()
            .filter_map(|stage| {
                let dir = self.committed(*stage)?;
                (!dir.is_dir()).then(|| stage.as_str())
            })
            .collect()
    }
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
