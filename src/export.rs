//! Sequence-to-RTT export.
//!
//! Every answered probe is recorded by sequence number and written to a
//! tab-separated text file, one line per sequence in ascending order.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default export file name.
pub const DEFAULT_EXPORT_PATH: &str = "Sequence_RTTs.txt";

/// Errors raised while writing the export file.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The export file could not be created.
    #[error("cannot create file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing to the export file failed.
    #[error("failed writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sequence table keyed by sequence number.
///
/// Re-recording a sequence overwrites the previous RTT (last write wins).
#[derive(Debug, Clone, Default)]
pub struct SequenceExport {
    table: BTreeMap<u64, f64>,
}

impl SequenceExport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the RTT (milliseconds) for `sequence`.
    pub fn record(&mut self, sequence: u64, rtt_ms: f64) {
        self.table.insert(sequence, rtt_ms);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn get(&self, sequence: u64) -> Option<f64> {
        self.table.get(&sequence).copied()
    }

    /// Write the table in ascending sequence order to `out`.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for (sequence, rtt_ms) in &self.table {
            writeln!(out, "{sequence}\t{rtt_ms:.2}")?;
        }
        Ok(())
    }

    /// Truncate or create `path` and write the table to it.
    ///
    /// An empty table produces an empty file.
    pub fn flush(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| ExportError::Create {
            path: path.to_path_buf(),
            source,
        })?;

        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)
            .and_then(|()| writer.flush())
            .map_err(|source| ExportError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            entries = self.table.len(),
            "Sequence export written"
        );
        Ok(())
    }
}
