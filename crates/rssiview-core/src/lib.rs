//! Core of the RSSI viewer: serial line reader, JSON telemetry pipeline,
//! record accumulator, event log and settings.

pub mod accumulator;
pub mod color;
pub mod error;
pub mod framing;
pub mod logbuf;
pub mod pipeline;
pub mod presenter;
pub mod serial_reader;
pub mod settings;

pub use accumulator::{Accumulator, TelemetryRecord};
pub use color::{ColorScale, Rgb};
pub use error::{Error, Result};
pub use logbuf::{EntryKind, LogEntry, LogStore};
pub use pipeline::{Extraction, Indicator, LineOutcome, Pipeline};
pub use presenter::{PollSummary, Presenter};
pub use serial_reader::{ByteSource, PortInfo, ReaderEvent, SerialConfig, SerialReader, BAUD_RATES};
pub use settings::Settings;
