//! Duplicate grouping capability.
//!
//! A [`DuplicateGrouper`] turns a candidate list into groups of paths the
//! backend believes are byte-identical. Its answer is never trusted as-is:
//! [`resolve_live`] re-checks every reported path against the candidate set
//! and the live filesystem before anything reaches the keep policy.

pub mod content_hash;
pub mod external;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{GrouperConfig, GrouperKind};
use crate::error::{Error, Result};
use crate::model::{DuplicateGroup, FileRecord};
use crate::platform;

pub use content_hash::ContentHashGrouper;
pub use external::ExternalToolGrouper;

/// A group exactly as the backend reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedGroup {
    pub fingerprint: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct GroupingOutput {
    pub groups: Vec<ReportedGroup>,
    /// Raw output artifact left in the run directory, if the backend wrote one.
    pub raw_output: Option<PathBuf>,
}

pub trait DuplicateGrouper: Send + Sync {
    fn name(&self) -> &str;

    /// Group `files` by identical content. `work_dir` is the run directory and
    /// may be used for transfer files.
    fn group(&self, files: &[FileRecord], work_dir: &Path) -> Result<GroupingOutput>;
}

/// Build the backend selected by configuration.
pub fn from_config(config: &GrouperConfig) -> Result<Box<dyn DuplicateGrouper>> {
    match config.kind {
        GrouperKind::Builtin => Ok(Box::new(ContentHashGrouper::new())),
        GrouperKind::External => {
            let command = config.command.clone().ok_or_else(|| {
                Error::InvalidConfig("external grouper requires a command".to_string())
            })?;
            let mut grouper = ExternalToolGrouper::new(command, config.args.clone());
            if let Some(secs) = config.timeout_secs {
                grouper = grouper.with_timeout(std::time::Duration::from_secs(secs));
            }
            Ok(Box::new(grouper))
        }
    }
}

/// Re-resolve reported groups against the enumerated candidates and the live
/// filesystem.
///
/// A path is dropped when it was not among the candidates, has vanished, is no
/// longer a regular file, changed size or modification time since enumeration,
/// or already belongs to an earlier group. Groups left with fewer than two
/// members are discarded. The result is ordered by each group's first path.
pub fn resolve_live(reported: Vec<ReportedGroup>, candidates: &[FileRecord]) -> Vec<DuplicateGroup> {
    let index: HashMap<&Path, &FileRecord> = candidates
        .iter()
        .map(|record| (record.path.as_path(), record))
        .collect();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut groups = Vec::new();

    for group in reported {
        let mut members = Vec::with_capacity(group.paths.len());

        for reported_path in &group.paths {
            let Some(record) = resolve_member(reported_path, &index) else {
                continue;
            };
            if !claimed.insert(record.path.clone()) {
                warn!(
                    "'{}' reported in more than one group, keeping first assignment",
                    record.path.display()
                );
                continue;
            }
            members.push(record);
        }

        match DuplicateGroup::new(group.fingerprint.clone(), members) {
            Some(resolved) => groups.push(resolved),
            None => debug!(
                "Discarding group {}: fewer than two live members",
                group.fingerprint
            ),
        }
    }

    groups.sort_by(|a, b| a.members[0].path.as_os_str().cmp(b.members[0].path.as_os_str()));
    groups
}

fn resolve_member(reported: &Path, index: &HashMap<&Path, &FileRecord>) -> Option<FileRecord> {
    let path = match fs::canonicalize(reported) {
        Ok(path) => path,
        Err(err) => {
            warn!("Dropping '{}': {}", reported.display(), err);
            return None;
        }
    };

    let Some(enumerated) = index.get(path.as_path()) else {
        warn!(
            "Dropping '{}': not among the enumerated candidates",
            reported.display()
        );
        return None;
    };

    let metadata = match fs::symlink_metadata(&path) {
        Ok(metadata) => metadata,
        Err(err) => {
            warn!("Dropping '{}': {}", path.display(), err);
            return None;
        }
    };
    if !metadata.is_file() || platform::is_link_like(&metadata) {
        warn!("Dropping '{}': no longer a regular file", path.display());
        return None;
    }

    let live = match FileRecord::from_metadata(&path, &metadata) {
        Ok(live) => live,
        Err(err) => {
            warn!("Dropping '{}': {}", path.display(), err);
            return None;
        }
    };
    if live.size_bytes != enumerated.size_bytes || live.modified != enumerated.modified {
        warn!("Dropping '{}': changed since enumeration", path.display());
        return None;
    }

    Some(live)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{enumerate, FileFilter};
    use tempfile::tempdir;

    fn reported(fingerprint: &str, paths: &[&Path]) -> ReportedGroup {
        ReportedGroup {
            fingerprint: fingerprint.to_string(),
            paths: paths.iter().map(|p| p.to_path_buf()).collect(),
        }
    }

    #[test]
    fn test_resolve_live_drops_vanished_members() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        let c = tmp.path().join("c.txt");
        for p in [&a, &b, &c] {
            fs::write(p, "same").unwrap();
        }
        let candidates = enumerate(tmp.path(), &FileFilter::default()).unwrap();

        fs::remove_file(&c).unwrap();
        let groups = resolve_live(vec![reported("h1", &[&a, &b, &c])], &candidates);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 2);
    }

    #[test]
    fn test_resolve_live_discards_groups_below_two() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "same").unwrap();
        fs::write(&b, "same").unwrap();
        let candidates = enumerate(tmp.path(), &FileFilter::default()).unwrap();

        fs::remove_file(&b).unwrap();
        let groups = resolve_live(vec![reported("h1", &[&a, &b])], &candidates);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_resolve_live_drops_changed_and_foreign_paths() {
        let tmp = tempdir().unwrap();
        let scan_root = tmp.path().join("root");
        fs::create_dir_all(&scan_root).unwrap();
        let a = scan_root.join("a.txt");
        let b = scan_root.join("b.txt");
        let c = scan_root.join("c.txt");
        for p in [&a, &b, &c] {
            fs::write(p, "same").unwrap();
        }
        let outside = tmp.path().join("outside.txt");
        fs::write(&outside, "same").unwrap();

        let candidates = enumerate(&scan_root, &FileFilter::default()).unwrap();
        fs::write(&c, "same but longer").unwrap();

        let groups = resolve_live(vec![reported("h1", &[&a, &b, &c, &outside])], &candidates);
        assert_eq!(groups.len(), 1);
        let names: Vec<_> = groups[0]
            .members
            .iter()
            .map(|m| m.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_resolve_live_path_claimed_once() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a.txt");
        let b = tmp.path().join("b.txt");
        let c = tmp.path().join("c.txt");
        for p in [&a, &b, &c] {
            fs::write(p, "same").unwrap();
        }
        let candidates = enumerate(tmp.path(), &FileFilter::default()).unwrap();

        let groups = resolve_live(
            vec![reported("h1", &[&a, &b]), reported("h2", &[&b, &c])],
            &candidates,
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].fingerprint, "h1");
    }
}
