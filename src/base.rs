//! Training bases
//!
//! A base is a directory tree produced by the training pipeline. The sweep
//! only touches its feature archives (`*.farc`, found recursively and ordered
//! by relative path); every other file is left alone.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::archive::FeatureArchive;
use crate::{Error, Result};

/// File extension of feature archives.
pub const ARCHIVE_EXTENSION: &str = "farc";

/// A pre-built training corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base {
    root: PathBuf,
    archives: Vec<PathBuf>,
}

impl Base {
    /// Open a base directory and list its archives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `root` is not a directory, cannot be
    /// listed, or contains no archives.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Configuration(format!(
                "training base {} does not exist or is not a directory",
                root.display()
            )));
        }

        let mut archives = Vec::new();
        collect_archives(&root, Path::new(""), &mut archives).map_err(|e| {
            Error::Configuration(format!("cannot list training base {}: {e}", root.display()))
        })?;
        archives.sort();

        if archives.is_empty() {
            return Err(Error::Configuration(format!(
                "training base {} contains no .{ARCHIVE_EXTENSION} archives (not built?)",
                root.display()
            )));
        }

        debug!(base = %root.display(), archives = archives.len(), "opened training base");
        Ok(Self { root, archives })
    }

    /// Base directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive paths relative to [`root`](Self::root), sorted.
    #[must_use]
    pub fn archives(&self) -> &[PathBuf] {
        &self.archives
    }

    /// Absolute path of a relative archive path.
    #[must_use]
    pub fn archive_path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Entry count of every archive, in archive order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Archive`] if any archive fails to decode.
    pub fn entry_counts(&self) -> Result<Vec<usize>> {
        self.archives
            .iter()
            .map(|rel| FeatureArchive::read(self.archive_path(rel)).map(|a| a.len()))
            .collect()
    }

    /// Content fingerprint: SHA-256 over each archive's relative path and bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Archive`] if an archive cannot be read.
    pub fn fingerprint(&self) -> Result<BaseFingerprint> {
        let mut hasher = Sha256::new();
        for rel in &self.archives {
            let path = self.archive_path(rel);
            let bytes =
                fs::read(&path).map_err(|e| Error::archive(&path, format!("cannot open: {e}")))?;
            let name = rel.to_string_lossy();
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(&bytes);
        }
        Ok(BaseFingerprint(hasher.finalize().into()))
    }
}

fn collect_archives(root: &Path, rel: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(root.join(rel))? {
        let entry = entry?;
        let name = entry.file_name();
        // Hidden files include staged rewrites.
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let child = rel.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_archives(root, &child, out)?;
        } else if file_type.is_file()
            && child.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION)
        {
            out.push(child);
        }
    }
    Ok(())
}

/// Require two bases to have the same archive set and entry counts.
///
/// # Errors
///
/// Returns [`Error::Configuration`] describing the first difference found, or
/// if either base has an unreadable archive.
pub fn validate_pair(original: &Base, noisy: &Base) -> Result<()> {
    // Aliases (`..`, `.`, symlinks) must not let the noisy base point at the original.
    let resolve = |base: &Base| {
        fs::canonicalize(base.root()).map_err(|e| {
            Error::Configuration(format!(
                "cannot resolve training base {}: {e}",
                base.root().display()
            ))
        })
    };
    if resolve(original)? == resolve(noisy)? {
        return Err(Error::Configuration(format!(
            "original and noisy base are the same directory: {} and {}",
            original.root().display(),
            noisy.root().display()
        )));
    }

    if original.archives() != noisy.archives() {
        let missing = original
            .archives()
            .iter()
            .find(|a| !noisy.archives().contains(a))
            .or_else(|| noisy.archives().iter().find(|a| !original.archives().contains(a)));
        return Err(Error::Configuration(format!(
            "archive sets differ ({} vs {} archives), first difference: {}",
            original.archives().len(),
            noisy.archives().len(),
            missing.map_or_else(|| "?".to_string(), |p| p.display().to_string())
        )));
    }

    let as_config = |e: Error| Error::Configuration(e.to_string());
    let original_counts = original.entry_counts().map_err(as_config)?;
    let noisy_counts = noisy.entry_counts().map_err(as_config)?;
    for ((rel, o), n) in original
        .archives()
        .iter()
        .zip(&original_counts)
        .zip(&noisy_counts)
    {
        if o != n {
            return Err(Error::Configuration(format!(
                "entry count mismatch in {}: original {o}, noisy {n}",
                rel.display()
            )));
        }
    }
    Ok(())
}

/// Exclusive handle to the mutable noisy base.
///
/// Not `Clone`: whoever holds it is the only writer. Mutation requires
/// `&mut NoisyBase`, so a rewrite and the recognition run that reads it cannot
/// interleave with another point's work.
#[derive(Debug)]
pub struct NoisyBase {
    base: Base,
}

impl NoisyBase {
    /// Take exclusive ownership of `base` as the working copy.
    #[must_use]
    pub const fn new(base: Base) -> Self {
        Self { base }
    }

    /// Read-only view of the underlying base.
    #[must_use]
    pub const fn base(&self) -> &Base {
        &self.base
    }

    /// Base directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.base.root()
    }
}

/// SHA-256 content fingerprint of a base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BaseFingerprint([u8; 32]);

impl BaseFingerprint {
    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BaseFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", hex::encode(self.0))
    }
}

impl Serialize for BaseFingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BaseFingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s
            .strip_prefix("sha256:")
            .ok_or_else(|| serde::de::Error::custom("fingerprint must start with sha256:"))?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(digits, &mut out)
            .map_err(|e| serde::de::Error::custom(format!("bad fingerprint '{s}': {e}")))?;
        Ok(Self(out))
    }
}
