//! Per-event key/value telemetry, flushed to uniquely named text records.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(thiserror::Error, Debug)]
pub enum EventLogError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Ordered key/value log for one detection-to-scan cycle.
///
/// Fields keep insertion order; setting an existing key overwrites in
/// place. [`flush`](EventLogger::flush) writes `key: value` lines to a
/// timestamp-named `.txt` record, avoiding collisions with a numeric
/// suffix, then clears the fields for the next cycle.
#[derive(Debug)]
pub struct EventLogger {
    dir: PathBuf,
    fields: Vec<(String, String)>,
}

impl EventLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fields: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn set_field(&mut self, key: &str, value: impl Display) {
        let value = value.to_string();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key.to_owned(), value));
        }
    }

    /// Per-coordinate field: stored under `key` + `index`, so an event can
    /// carry an unbounded number of detection entries without a fixed
    /// schema.
    pub fn set_field_indexed(&mut self, key: &str, index: usize, value: impl Display) {
        self.set_field(&format!("{key}{index}"), value);
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Serialize all fields to a uniquely named record and clear them.
    pub fn flush(&mut self) -> Result<PathBuf, EventLogError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = unique_path(&self.dir, &format!("{}_log", wall_clock_name()));
        let mut body = String::new();
        for (key, value) in &self.fields {
            body.push_str(key);
            body.push_str(": ");
            body.push_str(value);
            body.push('\n');
        }
        std::fs::write(&path, body)?;
        log::debug!("event log flushed to {}", path.display());
        self.fields.clear();
        Ok(path)
    }
}

/// Wall-clock timestamp for record names, `HHhMMmSSsUUUUUUus`.
fn wall_clock_name() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let day_secs = now.as_secs() % 86_400;
    format!(
        "{:02}h{:02}m{:02}s{:06}us",
        day_secs / 3600,
        (day_secs % 3600) / 60,
        day_secs % 60,
        now.subsec_micros()
    )
}

/// Wall-clock timestamp for in-record fields, `SSsUUUUUUus`.
pub(crate) fn wall_clock_stamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:02}s{:06}us", now.as_secs() % 60, now.subsec_micros())
}

/// Append `_1`, `_2`, ... until the stem no longer collides.
fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let mut path = dir.join(format!("{stem}.txt"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{n}.txt"));
        n += 1;
    }
    path
}
