use chrono::{DateTime, SecondsFormat, Utc};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Sidecar evidence that a deletion was attempted. Written and flushed before
/// the file it describes is removed, and never cleaned up afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TombstoneRecord {
    pub original_path: PathBuf,
    pub deleted_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub kept_path: PathBuf,
    pub reason: String,
    pub fingerprint: String,
}

/// `<original path><suffix>`, beside the original file.
pub fn sidecar_path(original: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(original.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

impl TombstoneRecord {
    pub fn render(&self) -> String {
        format!(
            "original_path: {}\ndeleted_at: {}\nsize_bytes: {}\nkept_path: {}\nreason: {}\nfingerprint: {}\n",
            self.original_path.display(),
            self.deleted_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.size_bytes,
            self.kept_path.display(),
            self.reason,
            self.fingerprint,
        )
    }

    /// Write the sidecar and sync it to disk. Returns the sidecar path.
    pub fn write(&self, suffix: &str) -> io::Result<PathBuf> {
        let path = sidecar_path(&self.original_path, suffix);
        let mut file = File::create(&path)?;
        file.write_all(self.render().as_bytes())?;
        file.sync_all()?;
        Ok(path)
    }

    /// Read back a rendered tombstone. Returns `None` if any field is missing.
    pub fn parse(text: &str) -> Option<Self> {
        let field = |key: &str| {
            text.lines()
                .find_map(|line| line.strip_prefix(key)?.strip_prefix(": "))
        };

        Some(Self {
            original_path: PathBuf::from(field("original_path")?),
            deleted_at: DateTime::parse_from_rfc3339(field("deleted_at")?)
                .ok()?
                .with_timezone(&Utc),
            size_bytes: field("size_bytes")?.parse().ok()?,
            kept_path: PathBuf::from(field("kept_path")?),
            reason: field("reason")?.to_string(),
            fingerprint: field("fingerprint")?.to_string(),
        })
    }
}
