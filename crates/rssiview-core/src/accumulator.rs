use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// One parsed telemetry line. Keys keep their wire order.
pub type TelemetryRecord = Map<String, Value>;

/// Every record parsed this session, in arrival order. Append-only.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    records: Vec<TelemetryRecord>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TelemetryRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes all records as one pretty-printed JSON array. The file is
    /// written next to `path` and renamed into place, so readers never see a
    /// half-written array.
    pub fn save(&self, path: &Path) -> Result<usize> {
        let persist_err = |source: io::Error| Error::Persistence {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
        self.write_to(&mut tmp).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(path).map_err(|e| persist_err(e.error))?;

        Ok(self.records.len())
    }

    fn write_to<W: Write>(&self, out: W) -> io::Result<()> {
        let mut writer = BufWriter::new(out);
        let mut ser = serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
        self.records.serialize(&mut ser).map_err(io::Error::from)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Reads a file produced by [`Accumulator::save`].
    pub fn load(path: &Path) -> Result<Vec<TelemetryRecord>> {
        let persist_err = |source: io::Error| Error::Persistence {
            path: path.to_path_buf(),
            source,
        };
        let text = std::fs::read_to_string(path).map_err(persist_err)?;
        serde_json::from_str(&text).map_err(|e| persist_err(io::Error::from(e)))
    }
}
