//! Feature archive container
//!
//! A feature archive holds the per-object feature records of one training
//! view: a pose estimate plus an opaque descriptor payload per entry.
//!
//! ## Layout (little-endian)
//!
//! ```text
//! magic     "PFAR"
//! version   u8 (1)
//! codec     u8 (0 = none, 1 = lz4, 2 = zstd)
//! reserved  [u8; 2]              preserved verbatim
//! body      codec-encoded:
//!           u32 entry_count
//!           entry_count x { [f64; 6] pose, u32 payload_len, payload }
//! ```
//!
//! Decoding keeps the raw body and the offset of every pose slot. Rewriting
//! patches only those slots, so payload bytes, ordering and framing survive
//! untouched. Both codecs are deterministic, which makes a zero-noise rewrite
//! byte-identical to its source.

mod mutator;

pub use mutator::{ArchiveMutator, MutationSummary};

use std::fs;
use std::ops::Range;
use std::path::Path;

use crate::pose::PoseEstimate;
use crate::{Error, Result};

/// Magic bytes at the start of every archive.
pub const MAGIC: [u8; 4] = *b"PFAR";

/// Current container version.
pub const VERSION: u8 = 1;

/// Header length in bytes.
pub const HEADER_LEN: usize = 8;

/// Encoded size of one pose slot.
pub const POSE_LEN: usize = PoseEstimate::COMPONENTS * 8;

const ZSTD_LEVEL: i32 = 3;

/// Body codec of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// Uncompressed body
    #[default]
    None,
    /// LZ4 block with prepended size
    Lz4,
    /// ZSTD frame
    Zstd,
}

impl Codec {
    /// Get codec name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Header byte for this codec.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    /// Parse a header byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }

    fn encode(self, data: &[u8]) -> std::result::Result<Vec<u8>, String> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => {
                zstd::encode_all(data, ZSTD_LEVEL).map_err(|e| format!("ZSTD compression failed: {e}"))
            }
        }
    }

    fn decode(self, data: &[u8]) -> std::result::Result<Vec<u8>, String> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| format!("LZ4 decompression failed: {e}")),
            Self::Zstd => zstd::decode_all(data).map_err(|e| format!("ZSTD decompression failed: {e}")),
        }
    }
}

/// One archive record, owned.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEntry {
    /// Estimated object pose
    pub pose: PoseEstimate,
    /// Opaque descriptor payload
    pub payload: Vec<u8>,
}

impl FeatureEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(pose: PoseEstimate, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            pose,
            payload: payload.into(),
        }
    }
}

/// A decoded feature archive.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureArchive {
    header: [u8; HEADER_LEN],
    codec: Codec,
    body: Vec<u8>,
    pose_offsets: Vec<usize>,
    payloads: Vec<Range<usize>>,
}

impl FeatureArchive {
    /// Build a fresh archive from entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if an entry count or payload exceeds `u32::MAX`.
    pub fn build(codec: Codec, entries: &[FeatureEntry]) -> Result<Self> {
        let count = u32::try_from(entries.len())
            .map_err(|_| Error::Other(format!("too many entries: {}", entries.len())))?;

        let mut body = Vec::with_capacity(
            4 + entries
                .iter()
                .map(|e| POSE_LEN + 4 + e.payload.len())
                .sum::<usize>(),
        );
        body.extend_from_slice(&count.to_le_bytes());
        for entry in entries {
            for c in entry.pose.to_components() {
                body.extend_from_slice(&c.to_le_bytes());
            }
            let len = u32::try_from(entry.payload.len())
                .map_err(|_| Error::Other(format!("payload too large: {}", entry.payload.len())))?;
            body.extend_from_slice(&len.to_le_bytes());
            body.extend_from_slice(&entry.payload);
        }

        let mut header = [0u8; HEADER_LEN];
        header[..4].copy_from_slice(&MAGIC);
        header[4] = VERSION;
        header[5] = codec.to_byte();

        let (pose_offsets, payloads) = index_body(&body).map_err(Error::Other)?;
        Ok(Self {
            header,
            codec,
            body,
            pose_offsets,
            payloads,
        })
    }

    /// Read and decode an archive file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Archive`] if the file cannot be read or decoded.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::archive(path, format!("cannot open: {e}")))?;
        Self::decode(&bytes, path)
    }

    /// Decode archive bytes. `origin` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Archive`] on a bad header, codec failure, or a body
    /// whose entry table does not parse exactly.
    pub fn decode(bytes: &[u8], origin: &Path) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::archive(origin, "truncated header"));
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);

        if header[..4] != MAGIC {
            return Err(Error::archive(origin, "bad magic"));
        }
        if header[4] != VERSION {
            return Err(Error::archive(
                origin,
                format!("unsupported version {}", header[4]),
            ));
        }
        let codec = Codec::from_byte(header[5])
            .ok_or_else(|| Error::archive(origin, format!("unknown codec {}", header[5])))?;

        let body = codec
            .decode(&bytes[HEADER_LEN..])
            .map_err(|reason| Error::archive(origin, reason))?;
        let (pose_offsets, payloads) =
            index_body(&body).map_err(|reason| Error::archive(origin, reason))?;

        Ok(Self {
            header,
            codec,
            body,
            pose_offsets,
            payloads,
        })
    }

    /// Encode to container bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the codec fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encoded = self.codec.encode(&self.body).map_err(Error::Other)?;
        let mut out = Vec::with_capacity(HEADER_LEN + encoded.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&encoded);
        Ok(out)
    }

    /// Encode and write to `path` (not atomic; see [`ArchiveMutator`]).
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Body codec.
    #[must_use]
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pose_offsets.len()
    }

    /// Whether the archive has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pose_offsets.is_empty()
    }

    /// Pose of entry `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn pose(&self, index: usize) -> PoseEstimate {
        let off = self.pose_offsets[index];
        let mut c = [0.0f64; PoseEstimate::COMPONENTS];
        for (i, slot) in c.iter_mut().enumerate() {
            let start = off + i * 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&self.body[start..start + 8]);
            *slot = f64::from_le_bytes(raw);
        }
        PoseEstimate::from_components(c)
    }

    /// Overwrite the pose slot of entry `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn set_pose(&mut self, index: usize, pose: &PoseEstimate) {
        let off = self.pose_offsets[index];
        for (i, c) in pose.to_components().iter().enumerate() {
            let start = off + i * 8;
            self.body[start..start + 8].copy_from_slice(&c.to_le_bytes());
        }
    }

    /// Payload bytes of entry `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn payload(&self, index: usize) -> &[u8] {
        &self.body[self.payloads[index].clone()]
    }

    /// Owned copies of all entries, in order.
    #[must_use]
    pub fn entries(&self) -> Vec<FeatureEntry> {
        (0..self.len())
            .map(|i| FeatureEntry::new(self.pose(i), self.payload(i)))
            .collect()
    }
}

type BodyIndex = (Vec<usize>, Vec<Range<usize>>);

/// Locate every pose slot and payload in a decoded body.
fn index_body(body: &[u8]) -> std::result::Result<BodyIndex, String> {
    let count = read_u32(body, 0).ok_or("truncated entry count")? as usize;

    let mut pos = 4;
    // Every entry needs at least a pose and a length word.
    let mut pose_offsets = Vec::with_capacity(count.min(body.len() / (POSE_LEN + 4)));
    let mut payloads = Vec::with_capacity(pose_offsets.capacity());

    for i in 0..count {
        if body.len() < pos + POSE_LEN {
            return Err(format!("pose field of entry {i} is truncated"));
        }
        pose_offsets.push(pos);
        pos += POSE_LEN;

        let len = read_u32(body, pos)
            .ok_or_else(|| format!("payload length of entry {i} is truncated"))?
            as usize;
        pos += 4;
        let end = pos
            .checked_add(len)
            .filter(|end| *end <= body.len())
            .ok_or_else(|| format!("payload of entry {i} is truncated"))?;
        payloads.push(pos..end);
        pos = end;
    }

    if pos != body.len() {
        return Err(format!(
            "{} trailing bytes after {count} entries",
            body.len() - pos
        ));
    }
    Ok((pose_offsets, payloads))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = buf.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}
