use std::fs::{File, OpenOptions};
use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;
use crate::format::Format;

pub const ORIGINALS_DIR: &str = "uploads";
pub const CONVERTED_DIR: &str = "converted";
pub const WORK_DIR: &str = "work";

/// A file placed in the store, addressed by a path relative to the root
/// (`uploads/<name>` or `converted/<name>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size: u64,
}

/// A reserved, not yet written, converted output location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSlot {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Move a file from `src` to `dst`. Uses `rename` first and falls back to
/// copy + delete for cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Randomized artifact name; never derived from user input.
fn random_name(format: Format) -> String {
    format!("{}.{}", uuid::Uuid::new_v4().simple(), format.extension())
}

/// Resolves `relative` against nothing but its own segments and checks that
/// it names a file strictly inside `dir`. `..` segments are applied, so
/// `converted/../uploads/x` is rejected before the filesystem is touched.
fn contained(relative: &str, dir: &str) -> Result<PathBuf, StorageError> {
    let mut normalized: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if normalized.pop().is_none() {
                    return Err(StorageError::PathViolation);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(StorageError::PathViolation),
        }
    }

    match normalized.split_first() {
        Some((first, rest)) if *first == dir && !rest.is_empty() => {
            Ok(normalized.iter().collect())
        }
        _ => Err(StorageError::PathViolation),
    }
}

/// Filesystem layout for originals, converted outputs and per-attempt work
/// directories, all below one root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.root.join(ORIGINALS_DIR)
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.root.join(CONVERTED_DIR)
    }

    fn work_dir(&self) -> PathBuf {
        self.root.join(WORK_DIR)
    }

    /// Creates the three artifact directories if missing.
    pub fn ensure_layout(&self) -> Result<(), StorageError> {
        for dir in [self.originals_dir(), self.converted_dir(), self.work_dir()] {
            ensure_directory(&dir)?;
        }
        Ok(())
    }

    /// Copies `source` into `uploads/` under a fresh random name.
    ///
    /// The file is flushed to disk before this returns, so a record may
    /// reference it immediately.
    pub fn store_original(
        &self,
        source: &Path,
        format: Format,
    ) -> Result<StoredArtifact, StorageError> {
        let dir = self.originals_dir();
        ensure_directory(&dir)?;

        let mut input = File::open(source).map_err(|e| StorageError::NotFound(format!(
            "{} ({})",
            crate::sanitize::redact_path(source),
            e.kind()
        )))?;

        let name = random_name(format);
        let dest = dir.join(&name);
        let mut output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&dest)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::FileExists(dest.clone()),
                _ => StorageError::WriteFile {
                    path: dest.clone(),
                    source: e,
                },
            })?;

        let write = |e| StorageError::WriteFile {
            path: dest.clone(),
            source: e,
        };
        let size = std::io::copy(&mut input, &mut output).map_err(write)?;
        output.sync_all().map_err(write)?;

        Ok(StoredArtifact {
            relative_path: format!("{}/{}", ORIGINALS_DIR, name),
            absolute_path: dest,
            size,
        })
    }

    /// Absolute path of a stored original. Does not check existence.
    pub fn original_path(&self, relative: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(contained(relative, ORIGINALS_DIR)?))
    }

    /// Reserves a randomized name in `converted/` for `format`.
    pub fn allocate_output_path(&self, format: Format) -> OutputSlot {
        let name = random_name(format);
        OutputSlot {
            relative_path: format!("{}/{}", CONVERTED_DIR, name),
            absolute_path: self.converted_dir().join(name),
        }
    }

    /// Moves a verified work file into its output slot and flushes it.
    /// Returns the size measured at the destination.
    pub fn promote(&self, from: &Path, slot: &OutputSlot) -> Result<u64, StorageError> {
        ensure_directory(&self.converted_dir())?;
        move_file(from, &slot.absolute_path)?;

        let file = File::open(&slot.absolute_path)
            .map_err(|_| StorageError::NotFound(slot.relative_path.clone()))?;
        file.sync_all().map_err(|e| StorageError::WriteFile {
            path: slot.absolute_path.clone(),
            source: e,
        })?;
        let meta = file
            .metadata()
            .map_err(|_| StorageError::NotFound(slot.relative_path.clone()))?;
        Ok(meta.len())
    }

    /// Best-effort removal of a converted artifact that no record references.
    pub fn discard(&self, slot: &OutputSlot) {
        remove_quietly(&slot.absolute_path);
    }

    /// Best-effort removal of a result a record used to point at.
    ///
    /// Only paths inside `converted/` are touched; anything else is left
    /// alone and logged.
    pub fn discard_converted(&self, relative: &str) {
        match contained(relative, CONVERTED_DIR) {
            Ok(path) => remove_quietly(&self.root.join(path)),
            Err(_) => tracing::warn!("Refusing to discard an artifact outside converted/"),
        }
    }

    /// A fresh, private directory for one conversion attempt, removed on drop.
    pub fn create_work_dir(&self) -> Result<tempfile::TempDir, StorageError> {
        let base = self.work_dir();
        ensure_directory(&base)?;
        tempfile::Builder::new()
            .prefix("job-")
            .tempdir_in(&base)
            .map_err(|e| StorageError::CreateDirectory {
                path: base,
                source: e,
            })
    }

    /// Maps a stored relative path to an absolute path inside `converted/`.
    ///
    /// Lexical escapes are rejected first, regardless of what exists on
    /// disk. The surviving path is then canonicalized so that symlinks
    /// pointing out of the directory are rejected as well.
    pub fn resolve_for_download(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let candidate = self.root.join(contained(relative, CONVERTED_DIR)?);

        let resolved = candidate
            .canonicalize()
            .map_err(|_| StorageError::NotFound(relative.to_string()))?;
        let base = self
            .converted_dir()
            .canonicalize()
            .map_err(|_| StorageError::NotFound(relative.to_string()))?;

        if !resolved.starts_with(&base) || resolved == base {
            return Err(StorageError::PathViolation);
        }
        if !resolved.is_file() {
            return Err(StorageError::NotFound(relative.to_string()));
        }

        Ok(resolved)
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            artifact = %crate::sanitize::redact_path(path),
            error = %e,
            "Failed to discard unreferenced output"
        ),
    }
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}
