//! Append-only CSV log of every classified detection.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use lanewatch_models::TrafficEvent;

use crate::error::EngineResult;

pub const HEADER: &str = "Timestamp,TrackID,Lane,Direction,Speed(km/h),Violation";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// CSV event log. Rows are buffered until [`EventLog::flush`].
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl EventLog {
    /// Open `path` for appending, writing the header if the file is new or empty.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = BufWriter::new(file);
        if is_empty {
            writeln!(writer, "{HEADER}")?;
            writer.flush()?;
        }

        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer one row.
    pub fn append(&mut self, event: &TrafficEvent) -> EngineResult<()> {
        writeln!(
            self.writer,
            "{},{},{},{},{},{}",
            event.observed_at.format(TIMESTAMP_FORMAT),
            event.track_id,
            escape(&event.lane),
            escape(&event.direction),
            event.speed,
            if event.violation { "Yes" } else { "No" },
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> EngineResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Quote a field that contains the delimiter, a quote or a line break.
fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
