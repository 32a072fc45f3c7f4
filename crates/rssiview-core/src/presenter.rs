//! Application state owned by the UI thread.
//!
//! The presenter holds the accumulator and the event log, starts and stops the
//! reader, and turns each received line into at most one indicator update.
//! It never touches the port itself: lines only arrive through the reader's
//! channel, drained by [`Presenter::poll`].

use log::info;
use std::path::Path;

use crate::accumulator::Accumulator;
use crate::error::Result;
use crate::logbuf::{EntryKind, LogStore};
use crate::pipeline::{Extraction, Indicator, LineOutcome, Pipeline, RSSI_KEY};
use crate::serial_reader::{ReaderEvent, SerialConfig, SerialReader};

pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

/// Upper bound on lines handled per poll so a chatty peer cannot starve the
/// UI thread. Leftovers wait for the next tick.
pub const MAX_EVENTS_PER_POLL: usize = 512;

/// What changed during one [`Presenter::poll`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PollSummary {
    /// Latest indicator produced this tick; earlier ones are coalesced away.
    pub indicator: Option<Indicator>,
    pub log_changed: bool,
    pub disconnected: bool,
}

pub struct Presenter {
    pipeline: Pipeline,
    records: Accumulator,
    log: LogStore,
    reader: Option<SerialReader>,
    indicator: Option<Indicator>,
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new(Pipeline::default(), DEFAULT_LOG_CAPACITY)
    }
}

impl Presenter {
    pub fn new(pipeline: Pipeline, log_capacity: usize) -> Self {
        Self {
            pipeline,
            records: Accumulator::new(),
            log: LogStore::new(log_capacity),
            reader: None,
            indicator: None,
        }
    }

    /// Opens `cfg` on a real serial port, replacing any running session.
    pub fn connect(&mut self, cfg: SerialConfig) {
        self.connect_with(cfg, SerialReader::start);
    }

    /// Like [`Presenter::connect`] with a custom reader factory. The previous
    /// reader is stopped and joined before the new one starts.
    pub fn connect_with<F>(&mut self, cfg: SerialConfig, start: F)
    where
        F: FnOnce(SerialConfig) -> SerialReader,
    {
        self.shutdown();
        let msg = format!("connection started: port={}, baud={}", cfg.port_name, cfg.baud_rate);
        info!("{msg}");
        self.reader = Some(start(cfg));
        self.log.push(EntryKind::Info, msg);
    }

    pub fn disconnect(&mut self) {
        if self.reader.is_some() {
            self.shutdown();
            self.log.push(EntryKind::Info, "disconnected");
        }
    }

    /// Stops the reader and waits for its thread to exit.
    pub fn shutdown(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.stop();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    pub fn connection(&self) -> Option<&SerialConfig> {
        self.reader.as_ref().map(SerialReader::config)
    }

    /// Drains pending reader events in arrival order.
    pub fn poll(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();
        let events: Vec<ReaderEvent> = match &self.reader {
            Some(reader) => reader.events().try_iter().take(MAX_EVENTS_PER_POLL).collect(),
            None => return summary,
        };

        for event in events {
            summary.log_changed = true;
            match event {
                ReaderEvent::Opened(port) => self.log.push(EntryKind::Info, format!("{port} opened")),
                ReaderEvent::Line(line) => {
                    if let Some(indicator) = self.handle_line(&line) {
                        summary.indicator = Some(indicator);
                    }
                }
                ReaderEvent::Error(msg) => self.log.push(EntryKind::Error, msg),
                ReaderEvent::Closed => {
                    self.shutdown();
                    self.log.push(EntryKind::Info, "connection closed");
                    summary.disconnected = true;
                    break;
                }
            }
        }
        summary
    }

    /// Processes one line and logs the result. Returns the indicator to draw,
    /// if the line carried a usable RSSI.
    pub fn handle_line(&mut self, line: &str) -> Option<Indicator> {
        let outcome = match self.pipeline.process(line, &mut self.records) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.log.push(EntryKind::Error, e.to_string());
                return None;
            }
        };

        if let Some(record) = self.records.records().last() {
            let text = serde_json::to_string(record).unwrap_or_else(|_| line.to_string());
            self.log.push(EntryKind::Record, text);
        }

        match outcome {
            LineOutcome::Rendered(indicator) => {
                self.indicator = Some(indicator.clone());
                Some(indicator)
            }
            LineOutcome::Unrendered(Extraction::NotNumeric(value)) => {
                self.log.push(EntryKind::Notice, format!("{RSSI_KEY} is not a number ({value}), display not updated"));
                None
            }
            LineOutcome::Unrendered(_) => {
                self.log.push(EntryKind::Notice, format!("no {RSSI_KEY} field, display not updated"));
                None
            }
        }
    }

    /// Whether a save has anything to write. Logs a notice when it does not,
    /// so the caller can skip asking for a destination.
    pub fn ready_to_save(&mut self) -> bool {
        if self.records.is_empty() {
            self.log.push(EntryKind::Notice, "nothing to save");
            return false;
        }
        true
    }

    /// Saves every record so far to `path`. An empty accumulator writes
    /// nothing and returns `Ok(0)`. On failure the records stay in memory.
    pub fn save(&mut self, path: &Path) -> Result<usize> {
        if self.records.is_empty() {
            self.log.push(EntryKind::Notice, "nothing to save");
            return Ok(0);
        }
        match self.records.save(path) {
            Ok(n) => {
                info!("saved {n} records to {}", path.display());
                self.log.push(EntryKind::Info, format!("saved {n} records to {}", path.display()));
                Ok(n)
            }
            Err(e) => {
                self.log.push(EntryKind::Error, e.to_string());
                Err(e)
            }
        }
    }

    pub fn records(&self) -> &Accumulator {
        &self.records
    }

    pub fn log(&self) -> &LogStore {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn indicator(&self) -> Option<&Indicator> {
        self.indicator.as_ref()
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
