//! External recognition engine
//!
//! The recognizer consumes a training base and a test set and reports how
//! many detections were true positives and how many were false positives.
//! Everything it does internally is out of scope; this module only fixes the
//! invocation seam and the output contract.
//!
//! # Output contract
//!
//! The last non-empty line of the recognizer's standard output must be
//! either a JSON object `{"tp": 10, "fp": 2}` or two non-negative integers
//! separated by whitespace and/or a comma (`10 2`, `10,2`).

mod command;

pub use command::{CommandRecognizer, RecognizerConfig};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// True/false positive counts of one recognition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecognitionCounts {
    /// True positives
    pub tp: u64,
    /// False positives
    pub fp: u64,
}

impl RecognitionCounts {
    /// Create counts.
    #[must_use]
    pub const fn new(tp: u64, fp: u64) -> Self {
        Self { tp, fp }
    }
}

/// A recognition engine invocation.
///
/// Implementations block until the run completes or times out. Every failure
/// must be reported as [`Error::ExternalProcess`].
pub trait Recognizer {
    /// Run recognition of `test_set` against the training base at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalProcess`] on crash, timeout or unparseable output.
    fn recognize(&mut self, base: &Path, test_set: &Path) -> Result<RecognitionCounts>;
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn recognize(&mut self, base: &Path, test_set: &Path) -> Result<RecognitionCounts> {
        (**self).recognize(base, test_set)
    }
}

/// Parse recognizer standard output.
///
/// # Errors
///
/// Returns [`Error::ExternalProcess`] if the last non-empty line does not
/// follow the output contract.
pub fn parse_output(stdout: &str) -> Result<RecognitionCounts> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| Error::ExternalProcess("recognizer produced no output".into()))?;

    if line.starts_with('{') {
        return serde_json::from_str::<RecognitionCounts>(line).map_err(|e| {
            Error::ExternalProcess(format!("unparseable recognizer output '{line}': {e}"))
        });
    }

    let fields: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .collect();
    match fields.as_slice() {
        [tp, fp] => {
            let parse = |s: &str| {
                s.parse::<u64>().map_err(|e| {
                    Error::ExternalProcess(format!("unparseable recognizer output '{line}': {e}"))
                })
            };
            Ok(RecognitionCounts::new(parse(*tp)?, parse(*fp)?))
        }
        _ => Err(Error::ExternalProcess(format!(
            "unparseable recognizer output '{line}': expected 'TP FP'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_pair() {
        assert_eq!(parse_output("10 2").unwrap(), RecognitionCounts::new(10, 2));
        assert_eq!(parse_output("9,3\n").unwrap(), RecognitionCounts::new(9, 3));
        assert_eq!(parse_output(" 6 ,  5 ").unwrap(), RecognitionCounts::new(6, 5));
    }

    #[test]
    fn test_parse_uses_last_nonempty_line() {
        let out = "loading base...\nmatching 120 images\n7 1\n\n";
        assert_eq!(parse_output(out).unwrap(), RecognitionCounts::new(7, 1));
    }

    #[test]
    fn test_parse_json() {
        assert_eq!(
            parse_output("{\"tp\": 4, \"fp\": 0}").unwrap(),
            RecognitionCounts::new(4, 0)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "\n\n", "ERROR: not yet implemented.", "10", "1 2 3", "-1 2", "{\"tp\": 1}"] {
            let err = parse_output(bad).unwrap_err();
            assert!(matches!(err, Error::ExternalProcess(_)), "{bad:?}");
        }
    }
}
