use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::model::FileRecord;
use crate::platform;

/// Directory names never descended into, compared case-insensitively.
const RESERVED_DIR_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".bzr",
    "_darcs",
    "$RECYCLE.BIN",
    "System Volume Information",
    ".Trash",
    ".Trashes",
    ".Spotlight-V100",
    ".fseventsd",
    "lost+found",
];

/// Include/exclude rules applied while walking.
///
/// A pattern is tested against the path relative to the root (always with `/`
/// separators) and against the bare file name, so both `*.jpg` and
/// `photos/**/*.jpg` behave as expected.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    skip_suffix: Option<String>,
    skip_dirs: Vec<PathBuf>,
}

impl FileFilter {
    pub fn new(include_globs: &[String], exclude_globs: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile(include_globs)?,
            exclude: compile(exclude_globs)?,
            skip_suffix: None,
            skip_dirs: Vec::new(),
        })
    }

    /// Never report files whose name ends with `suffix`.
    pub fn skip_suffix(mut self, suffix: &str) -> Self {
        self.skip_suffix = Some(suffix.to_string());
        self
    }

    /// Never descend into `dir`. Expected to be an absolute, normalized path.
    pub fn skip_dir(mut self, dir: PathBuf) -> Self {
        self.skip_dirs.push(dir);
        self
    }

    pub fn accepts(&self, relative: &str, file_name: &str) -> bool {
        if let Some(suffix) = &self.skip_suffix {
            if file_name.ends_with(suffix.as_str()) {
                return false;
            }
        }

        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches(relative) || p.matches(file_name));

        included
            && !self
                .exclude
                .iter()
                .any(|p| p.matches(relative) || p.matches(file_name))
    }

    fn prunes_dir(&self, path: &Path, relative: &str, dir_name: &str) -> bool {
        is_reserved_dir_name(dir_name)
            || self.skip_dirs.iter().any(|d| d == path)
            || self
                .exclude
                .iter()
                .any(|p| p.matches(relative) || p.matches(dir_name))
    }
}

fn compile(globs: &[String]) -> Result<Vec<Pattern>> {
    globs
        .iter()
        .map(|glob| Pattern::new(glob).map_err(Error::from))
        .collect()
}

pub fn is_reserved_dir_name(name: &str) -> bool {
    RESERVED_DIR_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Canonicalize the scan root. A root that does not exist or is not a
/// directory is a setup error.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(root).map_err(|_| Error::RootNotFound(root.to_path_buf()))?;
    if !resolved.is_dir() {
        return Err(Error::RootNotFound(root.to_path_buf()));
    }
    Ok(resolved)
}

/// Walk `root` and return every regular file the filter accepts, sorted by path.
///
/// Symlinks and reparse points are neither followed nor returned. Entries that
/// cannot be read are logged and skipped.
pub fn enumerate(root: &Path, filter: &FileFilter) -> Result<Vec<FileRecord>> {
    let root = resolve_root(root)?;
    let mut records = Vec::new();

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_pruned(&root, entry, filter));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                warn!("Skipping inaccessible path '{}': {}", path, err);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(
                    "Error getting metadata for {}: {}",
                    entry.path().display(),
                    err
                );
                continue;
            }
        };

        if platform::is_link_like(&metadata) {
            debug!("Skipping link {}", entry.path().display());
            continue;
        }

        let relative = relative_path(&root, entry.path());
        let file_name = entry.file_name().to_string_lossy();
        if !filter.accepts(&relative, &file_name) {
            continue;
        }

        match FileRecord::from_metadata(entry.path(), &metadata) {
            Ok(record) => records.push(record),
            Err(err) => warn!(
                "Error reading modification time for {}: {}",
                entry.path().display(),
                err
            ),
        }
    }

    records.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
    Ok(records)
}

fn is_pruned(root: &Path, entry: &DirEntry, filter: &FileFilter) -> bool {
    if entry.path_is_symlink() {
        return true;
    }
    if !entry.file_type().is_dir() {
        return false;
    }
    if let Ok(metadata) = entry.metadata() {
        if platform::is_link_like(&metadata) {
            return true;
        }
    }

    let relative = relative_path(root, entry.path());
    let dir_name = entry.file_name().to_string_lossy();
    filter.prunes_dir(entry.path(), &relative, &dir_name)
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn names(records: &[FileRecord], root: &Path) -> Vec<String> {
        let root = fs::canonicalize(root).unwrap();
        records
            .iter()
            .map(|r| relative_path(&root, &r.path))
            .collect()
    }

    #[test]
    fn test_enumerate_sorted_and_skips_reserved_dirs() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), "b/two.txt", "2");
        write(tmp.path(), "a/one.txt", "1");
        write(tmp.path(), "c.txt", "3");
        write(tmp.path(), ".git/objects/blob", "git");
        write(tmp.path(), "$RECYCLE.BIN/old.txt", "bin");

        let records = enumerate(tmp.path(), &FileFilter::default()).unwrap();
        assert_eq!(names(&records, tmp.path()), vec!["a/one.txt", "b/two.txt", "c.txt"]);
    }

    #[test]
    fn test_include_and_exclude_patterns() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), "photos/a.jpg", "a");
        write(tmp.path(), "photos/b.png", "b");
        write(tmp.path(), "photos/cache/c.jpg", "c");
        write(tmp.path(), "notes.txt", "n");

        let filter = FileFilter::new(
            &["*.jpg".to_string(), "*.png".to_string()],
            &["**/cache/**".to_string(), "*.png".to_string()],
        )
        .unwrap();
        let records = enumerate(tmp.path(), &filter).unwrap();
        assert_eq!(names(&records, tmp.path()), vec!["photos/a.jpg"]);
    }

    #[test]
    fn test_excluded_directory_is_pruned() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), "keep/a.txt", "a");
        write(tmp.path(), "build/out.txt", "b");

        let filter = FileFilter::new(&[], &["build".to_string()]).unwrap();
        let records = enumerate(tmp.path(), &filter).unwrap();
        assert_eq!(names(&records, tmp.path()), vec!["keep/a.txt"]);
    }

    #[test]
    fn test_skip_suffix_and_skip_dir() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), "a.txt", "a");
        write(tmp.path(), "a.txt.tomb", "tombstone");
        write(tmp.path(), "runs/ledger.csv", "ledger");

        let runs = fs::canonicalize(tmp.path().join("runs")).unwrap();
        let filter = FileFilter::default().skip_suffix(".tomb").skip_dir(runs);
        let records = enumerate(tmp.path(), &filter).unwrap();
        assert_eq!(names(&records, tmp.path()), vec!["a.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), "real/a.txt", "a");
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real/a.txt"), tmp.path().join("link.txt"))
            .unwrap();

        let records = enumerate(tmp.path(), &FileFilter::default()).unwrap();
        assert_eq!(names(&records, tmp.path()), vec!["real/a.txt"]);
    }

    #[test]
    fn test_records_capture_size() {
        let tmp = tempdir().unwrap();
        write(tmp.path(), "sized.bin", "12345");

        let records = enumerate(tmp.path(), &FileFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].size_bytes, 5);
        assert!(records[0].path.is_absolute());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let result = enumerate(Path::new("/path/that/does/not/exist"), &FileFilter::default());
        assert!(matches!(result, Err(Error::RootNotFound(_))));
    }

    #[test]
    fn test_reserved_names_are_case_insensitive() {
        assert!(is_reserved_dir_name(".GIT"));
        assert!(is_reserved_dir_name("system volume information"));
        assert!(!is_reserved_dir_name("gitignore"));
    }
}
