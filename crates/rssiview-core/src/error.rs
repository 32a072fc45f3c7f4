use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("serial port error: {0}")]
    Connection(#[from] serialport::Error),

    #[error("serial read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("invalid format, skipped: {0}")]
    Format(String),

    #[error("JSON parse error: {line} ({source})")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not save to {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, Error>;
