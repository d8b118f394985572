//! Keep/delete policy for a duplicate group.
//!
//! Members are ranked by a strict total order: larger size first, then newer
//! modification time, then ascending path. The head of that order is kept.
//! Every other member gets the reason it lost to the keeper, derived from the
//! same three keys, so a reported reason always matches the ranking.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::model::{DuplicateGroup, FileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    SmallerFile,
    OlderModifiedDate,
    AlphabeticalTiebreaker,
}

impl Reason {
    pub const ALL: [Reason; 3] = [
        Reason::SmallerFile,
        Reason::OlderModifiedDate,
        Reason::AlphabeticalTiebreaker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::SmallerFile => "smaller_file",
            Reason::OlderModifiedDate => "older_modified_date",
            Reason::AlphabeticalTiebreaker => "alphabetical_tiebreaker",
        }
    }

    pub fn parse(value: &str) -> Option<Reason> {
        Reason::ALL.into_iter().find(|r| r.as_str() == value)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub file: FileRecord,
    pub reason: Reason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepDecision {
    pub fingerprint: String,
    pub keeper: FileRecord,
    /// Losing members, in keep order.
    pub candidates: Vec<Candidate>,
}

/// `Less` means `a` is preferred over `b` as the file to keep.
pub fn keep_order(a: &FileRecord, b: &FileRecord) -> Ordering {
    b.size_bytes
        .cmp(&a.size_bytes)
        .then_with(|| b.modified.cmp(&a.modified))
        .then_with(|| a.path.as_os_str().cmp(b.path.as_os_str()))
}

/// Why `loser` ranks behind `keeper`.
pub fn classify(loser: &FileRecord, keeper: &FileRecord) -> Reason {
    if loser.size_bytes < keeper.size_bytes {
        Reason::SmallerFile
    } else if loser.size_bytes == keeper.size_bytes && loser.modified < keeper.modified {
        Reason::OlderModifiedDate
    } else {
        Reason::AlphabeticalTiebreaker
    }
}

pub fn resolve(group: &DuplicateGroup) -> KeepDecision {
    let mut ranked: Vec<&FileRecord> = group.members.iter().collect();
    ranked.sort_by(|a, b| keep_order(a, b));

    let keeper = ranked[0].clone();
    let candidates = ranked[1..]
        .iter()
        .map(|file| Candidate {
            reason: classify(file, &keeper),
            file: (*file).clone(),
        })
        .collect();

    KeepDecision {
        fingerprint: group.fingerprint.clone(),
        keeper,
        candidates,
    }
}
