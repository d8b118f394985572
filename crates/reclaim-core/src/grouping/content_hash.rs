use dashmap::DashMap;
use rayon::prelude::*;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use twox_hash::XxHash64;

use super::{DuplicateGrouper, GroupingOutput, ReportedGroup};
use crate::error::Result;
use crate::model::FileRecord;

const PARTIAL_HASH_LENGTH: usize = 1024; // 1KB
const READ_BUFFER_LENGTH: usize = 64 * 1024;

/// In-process grouping backend.
///
/// Two-tier hashing strategy:
/// 1. Partial hash (first 1KB via XxHash64) to quickly eliminate non-matches
/// 2. Full content hash only on partial-hash collisions
///
/// Files are bucketed by size first, so the fingerprint `<size>-<hash>` never
/// spans two sizes. Empty files are ignored.
#[derive(Debug, Default)]
pub struct ContentHashGrouper;

impl ContentHashGrouper {
    pub fn new() -> Self {
        Self
    }
}

impl DuplicateGrouper for ContentHashGrouper {
    fn name(&self) -> &str {
        "builtin-xxhash64"
    }

    fn group(&self, files: &[FileRecord], _work_dir: &Path) -> Result<GroupingOutput> {
        let size_to_files: DashMap<u64, Vec<PathBuf>> = DashMap::new();
        for file in files.iter().filter(|f| f.size_bytes > 0) {
            size_to_files
                .entry(file.size_bytes)
                .or_default()
                .push(file.path.clone());
        }

        let confirmed = build_content_hash_map(size_to_files);

        let mut groups: Vec<ReportedGroup> = confirmed
            .into_iter()
            .map(|((size, hash), mut paths)| {
                paths.sort();
                ReportedGroup {
                    fingerprint: format!("{}-{:016x}", size, hash),
                    paths,
                }
            })
            .collect();
        groups.sort_by(|a, b| a.paths[0].cmp(&b.paths[0]));

        Ok(GroupingOutput {
            groups,
            raw_output: None,
        })
    }
}

/// Takes a map keyed on file size and returns `(size, content_hash) → paths`
/// for confirmed duplicates only. Unreadable files are logged and left out.
pub fn build_content_hash_map(
    size_to_file_map: DashMap<u64, Vec<PathBuf>>,
) -> DashMap<(u64, u64), Vec<PathBuf>> {
    let confirmed_duplicates: DashMap<(u64, u64), Vec<PathBuf>> = DashMap::new();

    let size_to_file_vec: Vec<(u64, Vec<PathBuf>)> = size_to_file_map
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .collect();

    size_to_file_vec.par_iter().for_each(|(size, files)| {
        let partial_hash_to_file_map: DashMap<u64, Vec<PathBuf>> = DashMap::new();
        let full_hash_to_file_map: DashMap<u64, Vec<PathBuf>> = DashMap::new();

        // First pass: partial hash to eliminate non-dupes quickly
        files
            .par_iter()
            .for_each(|file| populate(file, hash_portion, &partial_hash_to_file_map));

        // Second pass: full hash only on partial-hash collisions (>1 file)
        let partial_hash_to_file_vec: Vec<_> = partial_hash_to_file_map.into_iter().collect();
        partial_hash_to_file_vec
            .par_iter()
            .filter(|(_, files)| files.len() > 1)
            .for_each(|(_, files)| {
                files
                    .par_iter()
                    .for_each(|file| populate(file, hash_file, &full_hash_to_file_map));
            });

        for (hash, files) in full_hash_to_file_map.into_iter() {
            if files.len() > 1 {
                confirmed_duplicates.insert((*size, hash), files);
            }
        }
    });

    confirmed_duplicates
}

fn populate(
    file: &Path,
    hasher: fn(&Path) -> io::Result<u64>,
    hash_to_file_map: &DashMap<u64, Vec<PathBuf>>,
) {
    match hasher(file) {
        Ok(hash) => hash_to_file_map
            .entry(hash)
            .or_default()
            .push(file.to_path_buf()),
        Err(e) => tracing::error!("Error processing file '{}': {}", file.display(), e),
    }
}

fn hash_portion(file: &Path) -> io::Result<u64> {
    let f = File::open(file)?;
    let mut buffer = Vec::with_capacity(PARTIAL_HASH_LENGTH);
    f.take(PARTIAL_HASH_LENGTH as u64).read_to_end(&mut buffer)?;
    Ok(hash_data(&buffer))
}

/// Stream the whole file through XxHash64.
pub fn hash_file(file: &Path) -> io::Result<u64> {
    let mut reader = BufReader::with_capacity(READ_BUFFER_LENGTH, File::open(file)?);
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = vec![0u8; READ_BUFFER_LENGTH];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.write(&buffer[..read]);
    }
    Ok(hasher.finish())
}

pub fn hash_data(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}
