//! Pose rewriting of the noisy base
//!
//! Every archive of the noisy base is regenerated from the corresponding
//! original archive: header, framing and payload bytes are copied, and only
//! the pose slots receive `NoiseModel(original_pose)`. The noisy base's
//! current poses are never read, so repeated application for one point is
//! idempotent and points stay statistically independent.
//!
//! Commit is two-phase. All rewritten archives are first staged as hidden
//! sibling files and fsynced; only when every archive staged cleanly are they
//! renamed into place. A failure while staging leaves the noisy base untouched.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::FeatureArchive;
use crate::base::{Base, NoisyBase};
use crate::noise::NoiseModel;
use crate::pose::ParameterPoint;
use crate::{Error, Result};

const STAGING_SUFFIX: &str = ".posesweep-staged";

/// What one mutation pass touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationSummary {
    /// Archives rewritten
    pub archives: usize,
    /// Pose fields rewritten
    pub entries: usize,
    /// Seed of the noise model used
    pub seed: u64,
}

/// Rewrites the noisy base from the original base for one parameter point.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveMutator;

impl ArchiveMutator {
    /// Create a mutator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Rewrite every archive of `noisy` with perturbed poses of `original`.
    ///
    /// # Errors
    ///
    /// - [`Error::Archive`] if an archive cannot be opened, decoded, staged or
    ///   committed, or if entry counts differ between the bases
    /// - [`Error::NoiseApplication`] if an original pose is malformed
    pub fn apply(
        &self,
        original: &Base,
        noisy: &mut NoisyBase,
        point: ParameterPoint,
        noise: &mut NoiseModel,
    ) -> Result<MutationSummary> {
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(original.archives().len());

        let entries = match self.stage_all(original, noisy, point, noise, &mut staged) {
            Ok(entries) => entries,
            Err(e) => {
                discard(&staged);
                return Err(e);
            }
        };

        commit(&staged)?;

        debug!(
            archives = staged.len(),
            entries,
            stddev_t = point.stddev_t(),
            stddev_r = point.stddev_r(),
            "noisy base rewritten"
        );
        Ok(MutationSummary {
            archives: staged.len(),
            entries,
            seed: noise.seed(),
        })
    }

    fn stage_all(
        &self,
        original: &Base,
        noisy: &NoisyBase,
        point: ParameterPoint,
        noise: &mut NoiseModel,
        staged: &mut Vec<(PathBuf, PathBuf)>,
    ) -> Result<usize> {
        let mut total = 0;
        for rel in original.archives() {
            let source = original.archive_path(rel);
            let target = noisy.base().archive_path(rel);

            let mut archive = FeatureArchive::read(&source)?;
            let current = FeatureArchive::read(&target)?;
            if current.len() != archive.len() {
                return Err(Error::archive(
                    &target,
                    format!(
                        "entry count mismatch: original has {}, noisy has {}",
                        archive.len(),
                        current.len()
                    ),
                ));
            }

            for i in 0..archive.len() {
                let pose = noise.perturb(&archive.pose(i), point).map_err(|e| match e {
                    Error::NoiseApplication(msg) => Error::NoiseApplication(format!(
                        "{} entry {i}: {msg}",
                        source.display()
                    )),
                    other => other,
                })?;
                archive.set_pose(i, &pose);
            }
            total += archive.len();

            let bytes = archive.to_bytes().map_err(|e| Error::archive(&target, e.to_string()))?;
            let staging = staging_path(&target);
            write_synced(&staging, &bytes)
                .map_err(|e| Error::archive(&target, format!("cannot stage rewrite: {e}")))?;
            staged.push((staging, target));
        }
        Ok(total)
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}{STAGING_SUFFIX}"))
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn commit(staged: &[(PathBuf, PathBuf)]) -> Result<()> {
    for (i, (staging, target)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(staging, target) {
            discard(&staged[i..]);
            return Err(Error::archive(target, format!("cannot commit rewrite: {e}")));
        }
    }
    Ok(())
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (staging, _) in staged {
        if let Err(e) = fs::remove_file(staging) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %staging.display(), error = %e, "failed to remove staged archive");
            }
        }
    }
}
