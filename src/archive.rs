//! Serialized ZIP sink for export payloads.
//!
//! The writer is the single owner of the archive handle; the export
//! executor funnels every settled task through one consumer that calls
//! [`ArchiveWriter::append`], so no locking is needed. Entries are
//! deflated at the lowest level — exports are dominated by already
//! compressed media, so heavier levels only cost CPU.
//!
//! A payload that fails mid-copy aborts its own entry and leaves the
//! container intact; only faults of the container itself (sink I/O,
//! malformed state) poison the archive.

use anyhow::anyhow;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::io::{Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::fetch::Payload;

/// Why an append failed, split by blast radius.
#[derive(Debug)]
pub enum AppendError {
    /// The payload could not be read or copied. The entry was dropped;
    /// the archive is still valid and accepts further appends.
    Payload(anyhow::Error),
    /// The container itself failed. The export cannot continue.
    Container(anyhow::Error),
}

impl std::fmt::Display for AppendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppendError::Payload(e) => write!(f, "payload copy failed: {}", e),
            AppendError::Container(e) => write!(f, "archive fault: {}", e),
        }
    }
}

impl std::error::Error for AppendError {}

pub struct ArchiveWriter<W: Write + Seek> {
    inner: ZipWriter<W>,
    entries: u64,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            inner: ZipWriter::new(sink),
            entries: 0,
        }
    }

    /// Write one payload under `archive_path` with the given entry
    /// timestamp.
    pub fn append(
        &mut self,
        payload: Payload,
        archive_path: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), AppendError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(1))
            .last_modified_time(zip_timestamp(timestamp));

        self.inner
            .start_file(archive_path, options)
            .map_err(|e| AppendError::Container(anyhow!(e)))?;

        if let Err(copy_err) = self.copy_payload(payload) {
            // Roll the half-written entry back out of the container.
            return match self.inner.abort_file() {
                Ok(()) => Err(AppendError::Payload(copy_err)),
                Err(abort_err) => Err(AppendError::Container(anyhow!(
                    "{} (while dropping entry: {})",
                    abort_err,
                    copy_err
                ))),
            };
        }

        self.entries += 1;
        Ok(())
    }

    fn copy_payload(&mut self, payload: Payload) -> anyhow::Result<()> {
        match payload {
            Payload::Bytes(bytes) => self.inner.write_all(&bytes)?,
            Payload::File(path) => {
                let mut file = std::fs::File::open(&path)?;
                std::io::copy(&mut file, &mut self.inner)?;
            }
        }
        Ok(())
    }

    /// Number of entries appended so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Write the central directory and hand the sink back.
    ///
    /// Must only be called after every append has been issued; the caller
    /// (the export pipeline's single consumer) guarantees this by draining
    /// its queue first.
    pub fn finalize(self) -> anyhow::Result<W> {
        Ok(self.inner.finish()?)
    }
}

/// Convert to the ZIP entry timestamp format, clamping out-of-range
/// dates (MS-DOS timestamps start at 1980) to the format's default.
fn zip_timestamp(ts: DateTime<Utc>) -> zip::DateTime {
    zip::DateTime::from_date_and_time(
        ts.year() as u16,
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
    )
    .unwrap_or_default()
}
