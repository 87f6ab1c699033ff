//! JSON Lines event log writer.
//!
//! Append mode only:
//! - Each line is a complete JSON object
//! - A torn write only damages the last line
//! - Restarting the process continues the same day's file

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use pf_core::VenueClock;
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PersistenceResult};
use crate::event::EventRecord;

/// `{base}/{instrument}_{YYYY-MM-DD}.jsonl`
pub fn log_path(base_dir: &Path, instrument: &str, date: NaiveDate) -> PathBuf {
    base_dir.join(format!("{}_{}.jsonl", instrument, date.format("%Y-%m-%d")))
}

/// Active file for one venue day.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: NaiveDate,
    records_written: usize,
}

/// Per-instrument event log writer.
///
/// Records are buffered and flushed when the buffer fills, on `flush`, on
/// `close` and on drop. The target file rotates when the venue date of a
/// record differs from the open file's date.
pub struct EventLogWriter {
    base_dir: PathBuf,
    instrument: String,
    clock: VenueClock,
    buffer: Vec<EventRecord>,
    max_buffer_size: usize,
    active_writer: Option<ActiveWriter>,
}

impl EventLogWriter {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        instrument: &str,
        clock: VenueClock,
        max_buffer_size: usize,
    ) -> Self {
        let base_dir = base_dir.into();
        if let Err(e) = std::fs::create_dir_all(&base_dir) {
            warn!(?e, dir = %base_dir.display(), "Failed to create event log directory");
        }

        Self {
            base_dir,
            instrument: instrument.to_string(),
            clock,
            buffer: Vec::with_capacity(max_buffer_size.max(1)),
            max_buffer_size: max_buffer_size.max(1),
            active_writer: None,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file for a venue date.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        log_path(&self.base_dir, &self.instrument, date)
    }

    /// Buffer a record; flushes when the buffer is full.
    pub fn append(&mut self, record: EventRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        if self.buffer.len() >= self.max_buffer_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Buffer a record and flush immediately.
    pub fn append_now(&mut self, record: EventRecord) -> PersistenceResult<()> {
        self.buffer.push(record);
        self.flush()
    }

    fn close_active_writer(&mut self) {
        if let Some(mut active) = self.active_writer.take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush event log on close");
            }
            info!(
                instrument = %self.instrument,
                date = %active.date,
                records = active.records_written,
                "Closed event log"
            );
        }
    }

    fn ensure_open(&mut self, date: NaiveDate) -> PersistenceResult<()> {
        let rotate = self
            .active_writer
            .as_ref()
            .is_some_and(|w| w.date != date);
        if rotate {
            self.close_active_writer();
        }

        if self.active_writer.is_none() {
            let path = self.path_for(date);
            info!(path = %path.display(), "Opening event log (append mode)");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| PersistenceError::Open {
                    path: path.clone(),
                    source,
                })?;
            self.active_writer = Some(ActiveWriter {
                writer: BufWriter::new(file),
                date,
                records_written: 0,
            });
        }
        Ok(())
    }

    /// Write buffered records to their day files.
    pub fn flush(&mut self) -> PersistenceResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let records = std::mem::take(&mut self.buffer);
        let count = records.len();
        for record in &records {
            let date = self.clock.venue_date(record.timestamp);
            let line = serde_json::to_string(record)?;
            self.ensure_open(date)?;
            if let Some(active) = self.active_writer.as_mut() {
                writeln!(active.writer, "{line}")?;
                active.records_written += 1;
            }
        }

        if let Some(active) = self.active_writer.as_mut() {
            active.writer.flush()?;
        }

        debug!(instrument = %self.instrument, records = count, "Flushed event log");
        Ok(())
    }

    /// Flush pending records and close the file.
    pub fn close(&mut self) -> PersistenceResult<()> {
        self.flush()?;
        self.close_active_writer();
        Ok(())
    }
}

impl Drop for EventLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(?e, "Failed to flush event log on drop");
        }
        self.close_active_writer();
    }
}
