//! Result dataset
//!
//! **Append-only**: rows are written once, in grid order, and never edited,
//! reordered or removed. Each append is durable before it returns, so a sweep
//! interrupted after N points leaves a valid N-row dataset.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pose::ParameterPoint;
use crate::recognizer::RecognitionCounts;
use crate::{Error, Result};

/// Column names, in order.
pub const COLUMNS: [&str; 6] = ["stddev_t", "stddev_r", "orig_tp", "orig_fp", "noisy_tp", "noisy_fp"];

/// One completed grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Translation noise stddev
    pub stddev_t: f64,
    /// Rotation noise stddev
    pub stddev_r: f64,
    /// True positives against the original base
    pub orig_tp: u64,
    /// False positives against the original base
    pub orig_fp: u64,
    /// True positives against the noisy base
    pub noisy_tp: u64,
    /// False positives against the noisy base
    pub noisy_fp: u64,
}

impl ResultRow {
    /// Assemble a row from a point and both recognition results.
    #[must_use]
    pub const fn new(point: ParameterPoint, original: RecognitionCounts, noisy: RecognitionCounts) -> Self {
        Self {
            stddev_t: point.stddev_t(),
            stddev_r: point.stddev_r(),
            orig_tp: original.tp,
            orig_fp: original.fp,
            noisy_tp: noisy.tp,
            noisy_fp: noisy.fp,
        }
    }

    /// CSV line without trailing newline.
    #[must_use]
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.stddev_t, self.stddev_r, self.orig_tp, self.orig_fp, self.noisy_tp, self.noisy_fp
        )
    }

    /// Parse a CSV line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the line does not have six valid fields.
    pub fn from_csv(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let &[t, r, otp, ofp, ntp, nfp] = fields.as_slice() else {
            return Err(Error::Other(format!("expected 6 columns, got '{line}'")));
        };
        let float = |s: &str| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| Error::Other(format!("bad stddev '{s}' in '{line}'")))
        };
        let count = |s: &str| {
            s.parse::<u64>()
                .map_err(|e| Error::Other(format!("bad count '{s}' in '{line}': {e}")))
        };
        Ok(Self {
            stddev_t: float(t)?,
            stddev_r: float(r)?,
            orig_tp: count(otp)?,
            orig_fp: count(ofp)?,
            noisy_tp: count(ntp)?,
            noisy_fp: count(nfp)?,
        })
    }
}

/// Persistent, append-only row store.
pub trait ResultSink {
    /// Durably append one row.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the sweep.
    fn append(&mut self, row: ResultRow) -> Result<()>;

    /// All rows accumulated so far, including rows found on open.
    fn rows(&self) -> &[ResultRow];
}

/// In-memory sink, for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryResultSink {
    rows: Vec<ResultRow>,
}

impl MemoryResultSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for MemoryResultSink {
    fn append(&mut self, row: ResultRow) -> Result<()> {
        self.rows.push(row);
        Ok(())
    }

    fn rows(&self) -> &[ResultRow] {
        &self.rows
    }
}

/// CSV file sink with a header line.
///
/// Opening an existing file validates the header and loads its rows; new rows
/// are appended after them. Every append is flushed and `fsync`ed.
#[derive(Debug)]
pub struct CsvResultSink {
    path: PathBuf,
    file: File,
    rows: Vec<ResultRow>,
}

impl CsvResultSink {
    /// Open or create the dataset at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened or written, and
    /// [`Error::Other`] if an existing file has an unexpected header or a
    /// malformed row.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = if path.exists() {
            read_rows(&path)?
        } else {
            None
        };

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let rows = match rows {
            Some(rows) => {
                if !ends_with_newline(&path)? {
                    writeln!(file)?;
                    file.sync_data()?;
                }
                rows
            }
            None => {
                writeln!(file, "{}", COLUMNS.join(","))?;
                file.sync_data()?;
                Vec::new()
            }
        };
        Ok(Self { path, file, rows })
    }

    /// Dataset path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether the last byte of a non-empty file is `\n`.
fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// `None` for an empty file (header still to be written).
fn read_rows(path: &Path) -> Result<Option<Vec<ResultRow>>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();
    let Some(header) = lines.next().transpose()? else {
        return Ok(None);
    };
    if header.trim() != COLUMNS.join(",") {
        return Err(Error::Other(format!(
            "{} is not a result dataset (header '{header}')",
            path.display()
        )));
    }
    let mut rows = Vec::new();
    for line in lines {
        let line = line?;
        if !line.trim().is_empty() {
            rows.push(ResultRow::from_csv(&line)?);
        }
    }
    Ok(Some(rows))
}

impl ResultSink for CsvResultSink {
    fn append(&mut self, row: ResultRow) -> Result<()> {
        writeln!(self.file, "{}", row.to_csv())?;
        self.file.flush()?;
        self.file.sync_data()?;
        self.rows.push(row);
        Ok(())
    }

    fn rows(&self) -> &[ResultRow] {
        &self.rows
    }
}
