//! Append-only log of terminal upload failures.
//!
//! One failure is one pipe-separated line:
//!
//! ```text
//! 2024-05-01T12:00:00Z | file=a.pdf | reason=backend status: failed | track_id=T1 | hash=9e10... | created_at=2024-05-01T11:59:58+00:00
//! ```
//!
//! Empty strings stand in for absent fields. The log rotates into up to
//! five numbered archives; the dedup queries scan the current file plus
//! every archive, so a failure stays deduplicated for as long as it stays
//! inside the rotation window.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::io::AsyncWriteExt;

use crate::error::{ErrorKind, Result};

const MAX_ARCHIVES: u32 = 5;

/// Rotated failure log with idempotency queries.
pub struct FailureLog {
    path: PathBuf,
    max_size_bytes: u64,
}

impl FailureLog {
    /// `max_size_kb` is the rotation threshold for the current file.
    pub fn new(path: impl Into<PathBuf>, max_size_kb: u64) -> Self {
        Self {
            path: path.into(),
            max_size_bytes: max_size_kb * 1024,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one terminal failure, rotating first if the current file has
    /// reached the size threshold.
    pub async fn log_failure(
        &self,
        file: &str,
        reason: &str,
        track_id: Option<&str>,
        hash: Option<&str>,
        created_at: Option<&str>,
    ) -> Result<()> {
        self.rotate_if_needed().await?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| ErrorKind::Serialize(e.to_string()))?;
        let line = format!(
            "{timestamp} | file={} | reason={} | track_id={} | hash={} | created_at={}\n",
            sanitize(file),
            sanitize(reason),
            sanitize(track_id.unwrap_or("")),
            sanitize(hash.unwrap_or("")),
            sanitize(created_at.unwrap_or("")),
        );
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(ErrorKind::Io)?;
        handle.write_all(line.as_bytes()).await.map_err(ErrorKind::Io)?;
        handle.flush().await.map_err(ErrorKind::Io)?;
        tracing::debug!(file, track_id = track_id.unwrap_or(""), "Failure logged");
        Ok(())
    }

    /// Whether a failure for `track_id` (and, when given, the same
    /// `created_at`) is already on record.
    ///
    /// Matches older than the rotation window (past archive `.5`) are
    /// invisible; such a failure gets one duplicate line and is
    /// deduplicated from then on.
    pub async fn is_already_logged(&self, track_id: &str, created_at: Option<&str>) -> Result<bool> {
        if track_id.is_empty() {
            return Ok(false);
        }
        self.scan(|line| {
            line_field(line, "track_id") == Some(track_id)
                && created_at.is_none_or(|wanted| line_field(line, "created_at") == Some(wanted))
        })
        .await
    }

    /// Whether this exact content (by `file` + `hash`) has already failed
    /// terminally. Used to suppress pointless re-uploads.
    pub async fn is_file_hash_failed(&self, file: &str, hash: &str) -> Result<bool> {
        self.scan(|line| line_field(line, "file") == Some(file) && line_field(line, "hash") == Some(hash))
            .await
    }

    async fn scan(&self, matches: impl Fn(&str) -> bool) -> Result<bool> {
        for path in self.scan_paths() {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => Err(ErrorKind::Io(e))?,
            };
            if content.lines().any(&matches) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn scan_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        std::iter::once(self.path.clone()).chain((1..=MAX_ARCHIVES).map(|i| self.archive_path(i)))
    }

    fn archive_path(&self, index: u32) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    async fn rotate_if_needed(&self) -> Result<()> {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => Err(ErrorKind::Io(e))?,
        };
        if size < self.max_size_bytes {
            return Ok(());
        }
        // log.5 falls off the end; everything else shifts up by one.
        let oldest = self.archive_path(MAX_ARCHIVES);
        match tokio::fs::remove_file(&oldest).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => Err(ErrorKind::Io(e))?,
        }
        for index in (1..MAX_ARCHIVES).rev() {
            let from = self.archive_path(index);
            let to = self.archive_path(index + 1);
            match tokio::fs::rename(&from, &to).await {
                Ok(()) => {},
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => Err(ErrorKind::Io(e))?,
            }
        }
        tokio::fs::rename(&self.path, self.archive_path(1))
            .await
            .map_err(ErrorKind::Io)?;
        tracing::info!(path = %self.path.display(), size, "Failure log rotated");
        Ok(())
    }
}

/// Keep one failure on one line and the pipe framing intact.
fn sanitize(value: &str) -> String {
    value.replace(['\n', '\r'], " ").replace('|', "/")
}

fn line_field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split(" | ")
        .find_map(|field| field.strip_prefix(key)?.strip_prefix('='))
}
