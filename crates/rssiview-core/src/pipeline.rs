//! Per-line processing: shape check, JSON parse, record, RSSI extraction and
//! indicator geometry.
//!
//! Every step returns a value. A bad line yields an [`Error`] for the caller
//! to log and never disturbs the lines after it.

use log::{debug, warn};
use serde_json::{Number, Value};

use crate::accumulator::{Accumulator, TelemetryRecord};
use crate::color::{ColorScale, Rgb};
use crate::error::{Error, Result};

pub const RSSI_KEY: &str = "RSSI";

/// Lower edge of the color domain, in dBm; maps to `t = 0`.
pub const COLOR_FLOOR_DBM: f64 = -60.0;
/// Width of the color domain; `t` reaches 1 at -10 dBm.
pub const COLOR_SPAN_DBM: f64 = 50.0;

/// Visible vertical domain of the gauge, weakest signal at the top.
pub const VISIBLE_TOP_DBM: f64 = -60.0;
pub const VISIBLE_BOTTOM_DBM: f64 = -10.0;

/// Height of the indicator bar, in dBm.
pub const INDICATOR_HEIGHT_DBM: f64 = 0.8;

/// Gauge scale marks: reading and the rough distance to the access point it
/// corresponds to.
pub const GAUGE_TICKS: [(f64, &str); 6] = [
    (-10.0, "10 cm"),
    (-20.0, "50 cm"),
    (-30.0, "90 cm"),
    (-40.0, "110 cm"),
    (-50.0, "130 cm"),
    (-60.0, "150 cm"),
];

/// Vertical placement of `dbm` as a fraction of the gauge height from the top.
pub fn gauge_position(dbm: f64) -> f64 {
    ((dbm - VISIBLE_TOP_DBM) / (VISIBLE_BOTTOM_DBM - VISIBLE_TOP_DBM)).clamp(0.0, 1.0)
}

/// Cheap pre-filter for "looks like a JSON object". Not a validator.
pub fn check_shape(line: &str) -> Result<()> {
    if line.starts_with('{') && line.ends_with('}') {
        Ok(())
    } else {
        Err(Error::Format(line.to_string()))
    }
}

pub fn parse_record(line: &str) -> Result<TelemetryRecord> {
    check_shape(line)?;
    serde_json::from_str(line).map_err(|source| Error::Parse {
        line: line.to_string(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Present(Number),
    Missing,
    NotNumeric(Value),
}

pub fn extract_rssi(record: &TelemetryRecord) -> Extraction {
    match record.get(RSSI_KEY) {
        None => Extraction::Missing,
        Some(Value::Number(n)) if n.as_f64().is_some() => Extraction::Present(n.clone()),
        Some(other) => Extraction::NotNumeric(other.clone()),
    }
}

/// Maps dBm onto `[0, 1]` for the color lookup, clamping out-of-range readings.
pub fn normalize(dbm: f64) -> f64 {
    ((dbm - COLOR_FLOOR_DBM) / COLOR_SPAN_DBM).clamp(0.0, 1.0)
}

/// Everything the view needs to draw one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Indicator {
    pub dbm: f64,
    pub label: String,
    /// Normalized color input.
    pub t: f64,
    pub color: Rgb,
    /// Bar center as a fraction of the gauge height, measured from the top.
    pub position: f64,
    pub height: f64,
}

impl Indicator {
    pub fn new(rssi: &Number, scale: &ColorScale) -> Option<Self> {
        let dbm = rssi.as_f64()?;
        let t = normalize(dbm);
        Some(Self {
            dbm,
            label: format!("{rssi} dBm"),
            t,
            color: scale.at(t),
            position: gauge_position(dbm),
            height: INDICATOR_HEIGHT_DBM / (VISIBLE_BOTTOM_DBM - VISIBLE_TOP_DBM),
        })
    }

    /// Top edge of the bar, kept inside the gauge.
    pub fn top(&self) -> f64 {
        (self.position - self.height / 2.0).clamp(0.0, 1.0 - self.height)
    }
}

/// What happened to a line that made it into the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Rendered(Indicator),
    Unrendered(Extraction),
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    scale: ColorScale,
}

impl Pipeline {
    pub fn new(scale: ColorScale) -> Self {
        Self { scale }
    }

    /// Runs one line through validate → parse → append → extract → render.
    /// The record is appended before extraction, so a line without a usable
    /// RSSI is still recorded.
    pub fn process(&self, line: &str, records: &mut Accumulator) -> Result<LineOutcome> {
        let record = parse_record(line).inspect_err(|e| warn!("{e}"))?;
        let extraction = extract_rssi(&record);
        records.push(record);

        let indicator = match &extraction {
            Extraction::Present(n) => Indicator::new(n, &self.scale),
            _ => None,
        };
        let outcome = match indicator {
            Some(indicator) => LineOutcome::Rendered(indicator),
            None => LineOutcome::Unrendered(extraction),
        };
        debug!("record #{} -> {:?}", records.len(), outcome);
        Ok(outcome)
    }
}
