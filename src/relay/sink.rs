//! Append-only sinks for relayed audio and session summaries

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use super::error::RelayError;
use super::summary::{SessionSummary, CSV_HEADER};

/// Destination for the raw payload of every accepted data packet
pub trait AudioSink: Send {
    fn append(&mut self, payload: &[u8]) -> Result<(), RelayError>;
}

/// Destination for session summaries
pub trait SummarySink: Send {
    fn write_summary(&mut self, summary: &SessionSummary) -> Result<(), RelayError>;
}

/// Discards audio
#[derive(Debug, Default)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn append(&mut self, _payload: &[u8]) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Appends raw PCM payloads to a file
pub struct PcmFileSink {
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl PcmFileSink {
    /// Open `path` for appending, creating it if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| RelayError::SinkWrite {
                sink: path.display().to_string(),
                source,
            })?;

        info!("Appending relayed audio to {}", path.display());

        Ok(Self {
            path,
            file,
            bytes_written: 0,
        })
    }

    /// Bytes appended since the sink was opened
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl AudioSink for PcmFileSink {
    fn append(&mut self, payload: &[u8]) -> Result<(), RelayError> {
        self.file
            .write_all(payload)
            .map_err(|source| RelayError::SinkWrite {
                sink: self.path.display().to_string(),
                source,
            })?;
        self.bytes_written += payload.len() as u64;
        Ok(())
    }
}

/// Appends one CSV line per summary, writing the header into an empty file
#[derive(Debug, Clone)]
pub struct CsvSummarySink {
    path: PathBuf,
}

impl CsvSummarySink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_record(&self, record: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut text = String::new();
        if file.metadata()?.len() == 0 {
            text.push_str(CSV_HEADER);
            text.push('\n');
        }
        text.push_str(record);
        text.push('\n');

        file.write_all(text.as_bytes())
    }
}

impl SummarySink for CsvSummarySink {
    fn write_summary(&mut self, summary: &SessionSummary) -> Result<(), RelayError> {
        self.append_record(&summary.csv_record())
            .map_err(|source| RelayError::SinkWrite {
                sink: self.path.display().to_string(),
                source,
            })
    }
}
