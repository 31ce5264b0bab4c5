//! Memory-mapped `.nsds` file adapter
//!
//! `BinaryDataset` opens a session recording via [`memmap2`], validates its
//! header and trailing checksum, and eagerly parses every section into an
//! owned [`MemoryDataset`]. Queries are then served entirely from that owned
//! copy: reinterpreting the mapped bytes in place would require `unsafe`
//! alignment assumptions the file format does not guarantee, and sessions
//! are small enough (tens of MB) that the parse cost is paid once, at open.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{DatasetError, Result};
use crate::ids::{TargetId, TrialId};
use crate::memory::{BehaviorTrace, MemoryDataset, SpikeTrains};
use crate::schemas::{self, trial_record, FOOTER_SIZE, HEADER_SIZE, MAGIC};
use crate::traits::{Dataset, Kinematics, SpikeMatrix, Trial};

/// A `.nsds` recording opened via `mmap` and parsed into memory.
///
/// Implements [`Dataset`] by delegating every query to an internal
/// [`MemoryDataset`]; the mapping itself is retained only to keep the file
/// open and to prove queries never outlive it.
pub struct BinaryDataset {
    _mmap: Mmap,
    inner: MemoryDataset,
}

impl BinaryDataset {
    /// Open and fully parse an `.nsds` file at `path`.
    ///
    /// Returns [`DatasetError::NotFound`] if the file is missing,
    /// [`DatasetError::Malformed`] if the header, checksum, or any section
    /// length is inconsistent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| DatasetError::not_found(path.display().to_string()))?;
        let mmap = unsafe { Mmap::map(&file)? };
        let inner = parse(&mmap)?;
        log::info!(
            "opened dataset {:?}: {} channels, {:.1}s, {} trials",
            path,
            inner.num_channels(),
            inner.duration_seconds(),
            inner.trial_list().len()
        );
        Ok(Self { _mmap: mmap, inner })
    }
}

impl Dataset for BinaryDataset {
    fn num_channels(&self) -> u32 {
        self.inner.num_channels()
    }

    fn duration_seconds(&self) -> f64 {
        self.inner.duration_seconds()
    }

    fn behavior_rate(&self) -> f64 {
        self.inner.behavior_rate()
    }

    fn binned_spikes(&self, t0: f64, t1: f64, bin_ms: f64) -> SpikeMatrix {
        self.inner.binned_spikes(t0, t1, bin_ms)
    }

    fn kinematics(&self, t0: f64, t1: f64) -> Kinematics {
        self.inner.kinematics(t0, t1)
    }

    fn trial_list(&self) -> &[Trial] {
        self.inner.trial_list()
    }

    fn trial_at(&self, t: f64) -> Option<&Trial> {
        self.inner.trial_at(t)
    }

    fn trials_for_target(&self, target: TargetId) -> Vec<&Trial> {
        self.inner.trials_for_target(target)
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| DatasetError::malformed("unexpected end of file"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f64_array(&mut self, n: usize) -> Result<Vec<f64>> {
        (0..n).map(|_| self.f64()).collect()
    }
}

fn parse(data: &[u8]) -> Result<MemoryDataset> {
    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(DatasetError::malformed("file too small to contain a header"));
    }

    let body_len = data.len() - FOOTER_SIZE;
    let expected_crc = u32::from_le_bytes(data[body_len..].try_into().unwrap());
    let actual_crc = crc32fast::hash(&data[..body_len]);
    if expected_crc != actual_crc {
        return Err(DatasetError::malformed("checksum mismatch"));
    }

    let mut cursor = Cursor::new(&data[..body_len]);

    let magic = cursor.take(4)?;
    if magic != MAGIC {
        return Err(DatasetError::malformed("bad magic number"));
    }
    let version = cursor.u32()?;
    if version != schemas::FORMAT_VERSION {
        return Err(DatasetError::malformed(format!(
            "unsupported format version {version}"
        )));
    }

    let num_channels = cursor.u32()?;
    let duration_seconds = cursor.f64()?;
    let behavior_rate = cursor.f64()?;
    let num_behavior_samples = cursor.u64()? as usize;
    let num_trials = cursor.u32()?;

    let mut spike_counts = Vec::with_capacity(num_channels as usize);
    for _ in 0..num_channels {
        spike_counts.push(cursor.u32()? as usize);
    }
    let mut per_channel = Vec::with_capacity(num_channels as usize);
    for &count in &spike_counts {
        per_channel.push(cursor.f64_array(count)?);
    }
    let spikes = SpikeTrains::new(per_channel);

    let behavior = BehaviorTrace {
        t: cursor.f64_array(num_behavior_samples)?,
        x: cursor.f64_array(num_behavior_samples)?,
        y: cursor.f64_array(num_behavior_samples)?,
        vx: cursor.f64_array(num_behavior_samples)?,
        vy: cursor.f64_array(num_behavior_samples)?,
    };

    let mut trials = Vec::with_capacity(num_trials as usize);
    for _ in 0..num_trials {
        let _fixed_start = cursor.pos;
        let trial_id = cursor.u32()?;
        let t_start = cursor.f64()?;
        let t_stop = cursor.f64()?;
        let success = cursor.u8()? != 0;
        let targets = cursor.u32()?;
        let active = cursor.u32()?;
        let mut target_positions = Vec::with_capacity(targets as usize);
        for _ in 0..targets {
            let x = cursor.f64()?;
            let y = cursor.f64()?;
            target_positions.push((x, y));
        }
        let _ = trial_record::FIXED_SIZE;
        let _ = trial_record::TARGET_ENTRY_SIZE;
        trials.push(Trial {
            id: TrialId::new(trial_id),
            t_start,
            t_stop,
            success,
            num_targets: targets,
            active_target: TargetId::new(active),
            target_positions,
        });
    }

    if !trials.windows(2).all(|w| w[0].t_start <= w[1].t_start) {
        return Err(DatasetError::malformed("trials are not sorted by t_start"));
    }

    Ok(MemoryDataset::new(
        num_channels,
        duration_seconds,
        behavior_rate,
        spikes,
        behavior,
        trials,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn encode_toy_file() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&MAGIC);
        body.extend_from_slice(&schemas::FORMAT_VERSION.to_le_bytes());
        body.extend_from_slice(&2u32.to_le_bytes()); // num_channels
        body.extend_from_slice(&1.0f64.to_le_bytes()); // duration_seconds
        body.extend_from_slice(&10.0f64.to_le_bytes()); // behavior_rate
        body.extend_from_slice(&2u64.to_le_bytes()); // num_behavior_samples
        body.extend_from_slice(&1u32.to_le_bytes()); // num_trials

        // spike counts per channel
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&1u32.to_le_bytes());
        // channel 0 spike times
        body.extend_from_slice(&0.1f64.to_le_bytes());
        body.extend_from_slice(&0.2f64.to_le_bytes());
        // channel 1 spike times
        body.extend_from_slice(&0.15f64.to_le_bytes());

        // behavior arrays: t, x, y, vx, vy (2 samples each)
        for arr in [[0.0, 0.1], [1.0, 2.0], [-1.0, -2.0], [0.0, 1.0], [0.0, -1.0]] {
            for v in arr {
                body.extend_from_slice(&(v as f64).to_le_bytes());
            }
        }

        // one trial, two targets
        body.extend_from_slice(&0u32.to_le_bytes()); // trial_id
        body.extend_from_slice(&0.0f64.to_le_bytes()); // t_start
        body.extend_from_slice(&1.0f64.to_le_bytes()); // t_stop
        body.push(1u8); // success
        body.extend_from_slice(&2u32.to_le_bytes()); // num_targets
        body.extend_from_slice(&0u32.to_le_bytes()); // active_target
        body.extend_from_slice(&1.0f64.to_le_bytes());
        body.extend_from_slice(&0.0f64.to_le_bytes());
        body.extend_from_slice(&0.0f64.to_le_bytes());
        body.extend_from_slice(&1.0f64.to_le_bytes());

        let crc = crc32fast::hash(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        body
    }

    #[test]
    fn test_parse_roundtrips_toy_file() {
        let bytes = encode_toy_file();
        let ds = parse(&bytes).expect("well-formed file should parse");
        assert_eq!(ds.num_channels(), 2);
        assert_eq!(ds.trial_list().len(), 1);
        let m = ds.binned_spikes(0.0, 1.0, 1000.0);
        assert_eq!(m.row(0), &[2, 1]);
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let mut bytes = encode_toy_file();
        bytes[0] = b'X';
        // checksum now refers to stale body; recompute so the magic check
        // is what actually fails, not the checksum check
        let body_len = bytes.len() - FOOTER_SIZE;
        let crc = crc32fast::hash(&bytes[..body_len]);
        bytes[body_len..].copy_from_slice(&crc.to_le_bytes());
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, DatasetError::Malformed { .. }));
    }

    #[test]
    fn test_parse_rejects_checksum_mismatch() {
        let mut bytes = encode_toy_file();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, DatasetError::Malformed { .. }));
    }

    #[test]
    fn test_open_missing_file_is_not_found() {
        let err = BinaryDataset::open("/nonexistent/path/session.nsds").unwrap_err();
        assert!(matches!(err, DatasetError::NotFound { .. }));
    }

    #[test]
    fn test_open_reads_through_mmap() {
        let bytes = encode_toy_file();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        let ds = BinaryDataset::open(file.path()).expect("toy file should open");
        assert_eq!(ds.num_channels(), 2);
        assert_eq!(ds.duration_seconds(), 1.0);
    }
}
