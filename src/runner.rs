//! Sweep orchestration
//!
//! ```text
//! INIT ─► for each point: MUTATE ─► RUN_ORIG ─► RUN_NOISY ─► COLLECT ─► DONE
//!                            │          │           │
//!                            └──────────┴───────────┴─► ERROR_SKIP (next point)
//!                                 any fatal error ─► FATAL
//! ```
//!
//! MUTATE and RUN_NOISY of one point form a critical section on the noisy
//! base. The runner owns the only [`NoisyBase`] handle and processes points
//! strictly in sequence, so nothing else can read or write the base in
//! between.
//!
//! The recognition result of the original base is cached, keyed by the
//! base's content fingerprint. The fingerprint is recomputed before every
//! RUN_ORIG; a changed base invalidates the cache and forces one rerun.
//!
//! Recoverable failures produce a [`PointOutcome::Skipped`] and the sweep
//! moves on; only fatal errors (dataset or manifest IO) escape as `Err`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::archive::ArchiveMutator;
use crate::base::{validate_pair, Base, BaseFingerprint, NoisyBase};
use crate::error::ErrorKind;
use crate::experiment::SweepManifest;
use crate::noise::{derive_seed, NoiseModel};
use crate::pose::ParameterPoint;
use crate::recognizer::{RecognitionCounts, Recognizer};
use crate::sink::{ResultRow, ResultSink};
use crate::{Error, Result};

/// Cooperative cancellation flag, checked between points.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runner state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    /// Not started.
    Init,
    /// Rewriting the noisy base.
    Mutate,
    /// Recognizing against the original base (possibly cached).
    RunOrig,
    /// Recognizing against the noisy base.
    RunNoisy,
    /// Writing the result row.
    Collect,
    /// Dropping the current point after a recoverable failure.
    ErrorSkip,
    /// Sweep finished or cancelled.
    Done,
    /// Sweep aborted.
    Fatal,
}

/// A point dropped after a recoverable failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPoint {
    /// Grid index
    pub index: usize,
    /// Noise parameters
    pub point: ParameterPoint,
    /// State the failure happened in
    pub stage: RunnerState,
    /// Error classification
    pub kind: ErrorKind,
    /// Error message
    pub message: String,
}

/// Result of processing one grid point.
#[derive(Debug, Clone, PartialEq)]
pub enum PointOutcome {
    /// Row was written.
    Completed(ResultRow),
    /// Point was dropped; no row was written.
    Skipped(SkippedPoint),
}

/// Summary of a sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Grid size
    pub grid_len: usize,
    /// Completed points with their grid index, in grid order
    pub completed: Vec<(usize, ResultRow)>,
    /// Skipped points, in grid order
    pub skipped: Vec<SkippedPoint>,
    /// Whether the sweep stopped early on cancellation
    pub cancelled: bool,
}

impl SweepReport {
    /// Indices of `grid` that were never attempted.
    ///
    /// Together with [`skipped`](Self::skipped) this accounts for every grid
    /// point missing from the dataset.
    #[must_use]
    pub fn reconcile(&self, grid: &[ParameterPoint]) -> Vec<usize> {
        let mut attempted = vec![false; grid.len().max(self.grid_len)];
        for (i, _) in &self.completed {
            attempted[*i] = true;
        }
        for s in &self.skipped {
            attempted[s.index] = true;
        }
        attempted
            .iter()
            .take(grid.len())
            .enumerate()
            .filter_map(|(i, done)| (!done).then_some(i))
            .collect()
    }

    /// Whether every grid point is accounted for as completed or skipped.
    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        self.completed.len() + self.skipped.len() == self.grid_len
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedRecognition {
    fingerprint: BaseFingerprint,
    counts: RecognitionCounts,
}

/// Drives the sweep over a parameter grid.
#[derive(Debug)]
pub struct ExperimentRunner<R, S> {
    original: Base,
    noisy: NoisyBase,
    test_set: PathBuf,
    recognizer: R,
    sink: S,
    mutator: ArchiveMutator,
    master_seed: u64,
    cache: Option<CachedRecognition>,
    cancel: CancellationToken,
    manifest_path: Option<PathBuf>,
    manifest_config: Option<serde_json::Value>,
    manifest: Option<SweepManifest>,
    state: RunnerState,
}

impl<R: Recognizer, S: ResultSink> ExperimentRunner<R, S> {
    /// Create a runner over two structurally identical bases.
    ///
    /// The master seed is drawn from entropy; override it with
    /// [`with_seed`](Self::with_seed).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the bases differ structurally or
    /// the test set does not exist.
    pub fn new(
        original: Base,
        noisy: Base,
        test_set: impl Into<PathBuf>,
        recognizer: R,
        sink: S,
    ) -> Result<Self> {
        let test_set = test_set.into();
        if !test_set.exists() {
            return Err(Error::Configuration(format!(
                "test set {} does not exist",
                test_set.display()
            )));
        }
        validate_pair(&original, &noisy)?;

        Ok(Self {
            original,
            noisy: NoisyBase::new(noisy),
            test_set,
            recognizer,
            sink,
            mutator: ArchiveMutator::new(),
            master_seed: rand::random(),
            cache: None,
            cancel: CancellationToken::new(),
            manifest_path: None,
            manifest_config: None,
            manifest: None,
            state: RunnerState::Init,
        })
    }

    /// Use a fixed master seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.master_seed = seed;
        self
    }

    /// Observe `token` between points.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Persist a [`SweepManifest`] to `path` after every point.
    #[must_use]
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    /// Record `config` in the manifest.
    #[must_use]
    pub fn with_manifest_config(mut self, config: serde_json::Value) -> Self {
        self.manifest_config = Some(config);
        self
    }

    /// Master seed point seeds derive from.
    #[must_use]
    pub const fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Current state machine position.
    #[must_use]
    pub const fn state(&self) -> RunnerState {
        self.state
    }

    /// Result sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Manifest of the last sweep, if one was requested.
    #[must_use]
    pub const fn manifest(&self) -> Option<&SweepManifest> {
        self.manifest.as_ref()
    }

    /// Consume the runner, returning recognizer and sink.
    pub fn into_parts(self) -> (R, S) {
        (self.recognizer, self.sink)
    }

    /// Run the sweep over `grid`, in order.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal failures: writing the dataset or the
    /// manifest, or an unclassified internal error. Rows appended before the
    /// failure remain valid.
    pub fn run(&mut self, grid: &[ParameterPoint]) -> Result<SweepReport> {
        info!(
            points = grid.len(),
            master_seed = self.master_seed,
            original = %self.original.root().display(),
            noisy = %self.noisy.root().display(),
            "starting pose noise sweep"
        );
        self.state = RunnerState::Init;
        self.cache = None;
        self.init_manifest(grid);

        let result = self.sweep(grid);
        self.state = if result.is_ok() {
            RunnerState::Done
        } else {
            RunnerState::Fatal
        };
        if let Err(e) = &result {
            error!(error = %e, "sweep aborted");
        }
        result
    }

    fn sweep(&mut self, grid: &[ParameterPoint]) -> Result<SweepReport> {
        let mut report = SweepReport {
            grid_len: grid.len(),
            ..SweepReport::default()
        };
        self.save_manifest()?;

        for (index, &point) in grid.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(index, remaining = grid.len() - index, "sweep cancelled between points");
                report.cancelled = true;
                break;
            }

            if let Some(record) = self.manifest.as_mut().and_then(|m| m.point_mut(index)) {
                record.start();
            }

            match self.run_point(index, point)? {
                PointOutcome::Completed(row) => {
                    info!(
                        index,
                        stddev_t = row.stddev_t,
                        stddev_r = row.stddev_r,
                        orig_tp = row.orig_tp,
                        orig_fp = row.orig_fp,
                        noisy_tp = row.noisy_tp,
                        noisy_fp = row.noisy_fp,
                        "point completed"
                    );
                    if let Some(record) = self.manifest.as_mut().and_then(|m| m.point_mut(index)) {
                        record.complete(row);
                    }
                    report.completed.push((index, row));
                }
                PointOutcome::Skipped(skipped) => {
                    warn!(
                        index,
                        stddev_t = point.stddev_t(),
                        stddev_r = point.stddev_r(),
                        stage = ?skipped.stage,
                        kind = %skipped.kind,
                        error = %skipped.message,
                        "point skipped"
                    );
                    if let Some(record) = self.manifest.as_mut().and_then(|m| m.point_mut(index)) {
                        record.skip(skipped.kind, skipped.message.clone());
                    }
                    report.skipped.push(skipped);
                }
            }
            self.save_manifest()?;
        }

        if report.cancelled {
            if let Some(manifest) = self.manifest.as_mut() {
                manifest.cancel_pending();
            }
            self.save_manifest()?;
        }

        info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            cancelled = report.cancelled,
            "sweep finished"
        );
        Ok(report)
    }

    /// Process one point: MUTATE, RUN_ORIG, RUN_NOISY, COLLECT.
    ///
    /// Recoverable failures come back as `Ok(PointOutcome::Skipped)`.
    ///
    /// # Errors
    ///
    /// Returns fatal errors only.
    pub fn run_point(&mut self, index: usize, point: ParameterPoint) -> Result<PointOutcome> {
        let seed = derive_seed(self.master_seed, index as u64);
        debug!(index, %point, seed, "processing point");

        self.state = RunnerState::Mutate;
        let mut noise = NoiseModel::seeded(seed);
        if let Err(e) = self
            .mutator
            .apply(&self.original, &mut self.noisy, point, &mut noise)
        {
            return self.skip(index, point, e);
        }

        self.state = RunnerState::RunOrig;
        let original = match self.original_counts() {
            Ok(counts) => counts,
            Err(e) => return self.skip(index, point, e),
        };

        self.state = RunnerState::RunNoisy;
        let noisy = match invoke_with_retry(
            &mut self.recognizer,
            self.noisy.root(),
            &self.test_set,
            &self.cancel,
        ) {
            Ok(counts) => counts,
            Err(e) => return self.skip(index, point, e),
        };

        self.state = RunnerState::Collect;
        let row = ResultRow::new(point, original, noisy);
        self.sink.append(row)?;
        Ok(PointOutcome::Completed(row))
    }

    fn skip(&mut self, index: usize, point: ParameterPoint, e: Error) -> Result<PointOutcome> {
        if !e.is_recoverable() {
            return Err(e);
        }
        let stage = self.state;
        self.state = RunnerState::ErrorSkip;
        Ok(PointOutcome::Skipped(SkippedPoint {
            index,
            point,
            stage,
            kind: e.kind(),
            message: e.to_string(),
        }))
    }

    fn original_counts(&mut self) -> Result<RecognitionCounts> {
        let fingerprint = self.original.fingerprint()?;
        match self.cache {
            Some(cached) if cached.fingerprint == fingerprint => {
                debug!(%fingerprint, "original base result cached");
                return Ok(cached.counts);
            }
            Some(_) => {
                warn!(%fingerprint, "original base changed, invalidating cached result");
                self.cache = None;
            }
            None => {}
        }

        let counts = invoke_with_retry(
            &mut self.recognizer,
            self.original.root(),
            &self.test_set,
            &self.cancel,
        )?;
        info!(tp = counts.tp, fp = counts.fp, "original base recognized");
        self.cache = Some(CachedRecognition {
            fingerprint,
            counts,
        });
        Ok(counts)
    }

    fn init_manifest(&mut self, grid: &[ParameterPoint]) {
        self.manifest = self.manifest_path.as_ref().map(|_| {
            let mut builder = SweepManifest::builder(
                format!("sweep-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ")),
                self.master_seed,
                grid,
            );
            match self.original.fingerprint() {
                Ok(fp) => builder = builder.original_fingerprint(fp),
                Err(e) => warn!(error = %e, "cannot fingerprint original base for manifest"),
            }
            if let Some(config) = self.manifest_config.clone() {
                builder = builder.config(config);
            }
            builder.build()
        });
    }

    fn save_manifest(&self) -> Result<()> {
        if let (Some(path), Some(manifest)) = (&self.manifest_path, &self.manifest) {
            manifest.save(path)?;
        }
        Ok(())
    }
}

/// Invoke the recognizer; an external-process failure is retried once with
/// identical inputs unless cancellation was requested in the meantime.
fn invoke_with_retry<R: Recognizer>(
    recognizer: &mut R,
    base: &Path,
    test_set: &Path,
    cancel: &CancellationToken,
) -> Result<RecognitionCounts> {
    match recognizer.recognize(base, test_set) {
        Err(e) if e.kind() == ErrorKind::ExternalProcess && !cancel.is_cancelled() => {
            warn!(base = %base.display(), error = %e, "recognizer failed, retrying once");
            recognizer.recognize(base, test_set)
        }
        other => other,
    }
}
