//! # Telemetry Logger
//!
//! Writes [`TelemetryRecord`]s as JSON Lines with file rotation.
//!
//! Each line is one JSON object: an RFC 3339 `timestamp` followed by the
//! record fields. A new file is started after `max_records_per_file` lines,
//! and only the newest `max_files_to_keep` files are retained.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::TelemetryRecord;
use crate::error::Result;

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    record: &'a TelemetryRecord,
}

/// Rotating JSONL writer for telemetry records.
#[derive(Debug)]
pub struct TelemetryLogger {
    dir: PathBuf,
    session_stamp: String,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_index: u32,
    files: VecDeque<PathBuf>,
}

impl TelemetryLogger {
    /// Creates the log directory if needed. No file is opened until the first record.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(
        dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Telemetry log directory: {}", dir.display());

        Ok(Self {
            dir,
            session_stamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            file_index: 0,
            files: VecDeque::new(),
        })
    }

    /// Appends one record, rotating files as needed.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written or the record cannot be serialized
    pub fn log(&mut self, record: &TelemetryRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = LogLine {
            timestamp: Utc::now().to_rfc3339(),
            record,
        };

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    /// Flushes buffered lines to disk.
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Path of the file currently being written, if any.
    #[must_use]
    pub fn current_file(&self) -> Option<&Path> {
        self.files.back().map(PathBuf::as_path)
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        self.file_index += 1;
        let path = self.dir.join(format!(
            "telemetry_{}_{:04}.jsonl",
            self.session_stamp, self.file_index
        ));
        let file = File::create(&path)?;
        debug!("Opened telemetry log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.files.push_back(path);

        while self.files.len() > self.max_files_to_keep {
            if let Some(oldest) = self.files.pop_front() {
                debug!("Removing old telemetry log {}", oldest.display());
                fs::remove_file(&oldest)?;
            }
        }
        Ok(())
    }
}
