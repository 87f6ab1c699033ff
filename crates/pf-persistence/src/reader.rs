//! Tolerant event log reader.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::{PersistenceError, PersistenceResult};
use crate::event::EventRecord;
use crate::writer::log_path;

/// Read every parseable record from a log file, in file order.
///
/// A missing file is an empty log. Lines that fail to parse (a torn last
/// write, manual edits) are skipped with a warning.
pub fn read_events(path: &Path) -> PersistenceResult<Vec<EventRecord>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::Open {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(&line) {
            Ok(record) => events.push(record),
            Err(e) => {
                skipped += 1;
                warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %e,
                    "Skipping corrupt event log line"
                );
            }
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, kept = events.len(), "Event log had corrupt lines");
    }
    Ok(events)
}

/// Venue dates with a log file for `instrument` under `base_dir`, ascending.
///
/// A missing directory has no logs. Files that do not follow the
/// `{instrument}_{YYYY-MM-DD}.jsonl` naming are ignored.
pub fn log_dates(base_dir: &Path, instrument: &str) -> PersistenceResult<Vec<NaiveDate>> {
    let entries = match std::fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::Open {
                path: base_dir.to_path_buf(),
                source,
            })
        }
    };

    let prefix = format!("{instrument}_");
    let mut dates = Vec::new();
    for entry in entries {
        let name = entry?.file_name();
        let Some(date) = name
            .to_str()
            .and_then(|n| n.strip_prefix(&prefix))
            .and_then(|n| n.strip_suffix(".jsonl"))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };
        dates.push(date);
    }
    dates.sort_unstable();
    Ok(dates)
}

/// Every record for `instrument` up to and including `through`, oldest
/// day first.
pub fn read_history(
    base_dir: &Path,
    instrument: &str,
    through: NaiveDate,
) -> PersistenceResult<Vec<EventRecord>> {
    let mut events = Vec::new();
    let mut files = 0usize;
    for date in log_dates(base_dir, instrument)?
        .into_iter()
        .filter(|d| *d <= through)
    {
        events.extend(read_events(&log_path(base_dir, instrument, date))?);
        files += 1;
    }
    debug!(instrument, files, records = events.len(), "Read event log history");
    Ok(events)
}
