//! # Posesweep: Pose-Noise Sensitivity Sweeps
//!
//! Posesweep measures how noise in stored 6-DoF pose estimates degrades an
//! object-recognition engine. It keeps two training bases, an immutable
//! original and a noisy working copy, and for every point of a
//! `(stddev_t, stddev_r)` grid it rewrites the noisy base's poses with
//! Gaussian noise, runs the external recognizer against both bases and
//! appends the raw true/false-positive counts to a CSV dataset.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: the noisy base is only reachable through a
//!   single-writer [`base::NoisyBase`] handle, and archive rewrites are staged
//!   then renamed so a reader never sees a half-written base
//! - **Jidoka**: bases are validated structurally before the first run;
//!   recoverable failures skip one point, fatal ones stop the line
//! - **Muda elimination**: the original-base recognition runs once and is
//!   cached by content fingerprint
//! - **Genchi Genbutsu**: the grid is sized from the real time budget and
//!   per-run cost
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use posesweep::base::Base;
//! use posesweep::grid::smoke_test_grid;
//! use posesweep::recognizer::{CommandRecognizer, RecognizerConfig};
//! use posesweep::runner::ExperimentRunner;
//! use posesweep::sink::CsvResultSink;
//!
//! let recognizer = CommandRecognizer::new(RecognizerConfig::new("./recognize"))?;
//! let mut runner = ExperimentRunner::new(
//!     Base::open("bases/original")?,
//!     Base::open("bases/noisy")?,
//!     "data/test",
//!     recognizer,
//!     CsvResultSink::open("results.csv")?,
//! )?
//! .with_seed(42);
//!
//! let report = runner.run(&smoke_test_grid())?;
//! println!("{} rows, {} skipped", report.completed.len(), report.skipped.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod archive;
pub mod base;
pub mod config;
pub mod error;
pub mod experiment;
pub mod grid;
pub mod noise;
pub mod pose;
pub mod recognizer;
pub mod runner;
pub mod sink;

pub use error::{Error, ErrorKind, Result};
