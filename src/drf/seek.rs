//! Block-index seek and day-file spanning (§4.1).

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::drf::header::{BlockDescriptor, DrfFile};
use crate::error::{Result, SeismuxError};
use crate::time_fmt::UtcDate;

/// Outcome of scanning the block index for a target instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekResult {
    /// Target lies within (or just before) block `index`.
    Found {
        /// Resolved block index.
        index: usize,
    },
    /// Target is earlier than the first block; caller should open the
    /// previous day's file and retry.
    BeforeFirstBlock,
    /// Target is not covered by this file's index at all.
    NotFound,
}

/// Linear scan of the block index for `target` (unix seconds), per the
/// five-step algorithm in §4.1.
#[must_use]
pub fn seek(index: &[BlockDescriptor], target: i64) -> SeekResult {
    for (i, desc) in index.iter().enumerate() {
        let delta = target - desc.start_time;
        if i == 0 && delta < 0 {
            return SeekResult::BeforeFirstBlock;
        }
        if desc.start_time != 0 && delta.abs() <= 60 {
            return SeekResult::Found { index: i.saturating_sub(1) };
        }
    }
    SeekResult::NotFound
}

/// Day-file path for `date` under `record_dir`, per the fixed naming rule
/// `sys<N>.<YYYYMMDD>.dat`.
#[must_use]
pub fn day_file_path(record_dir: &Path, system_number: u32, date: UtcDate) -> std::path::PathBuf {
    record_dir.join(date.day_file_name(system_number))
}

/// Open the day file covering `target`, seeking to the block containing
/// it, spanning to the previous day's file on *before-first-block*
/// (§4.1). Returns the opened file and the resolved block index.
pub fn open_and_seek(
    record_dir: &Path,
    system_number: u32,
    expected_channels: usize,
    target: DateTime<Utc>,
) -> Result<(DrfFile, usize)> {
    let target_secs = target.timestamp();
    let mut date = UtcDate::from_unix_secs(target_secs);
    // Guard against pathological back-spanning forever.
    for _ in 0..2 {
        let path = day_file_path(record_dir, system_number, date);
        let file = DrfFile::open(&path, expected_channels)?;
        match seek(&file.header.index, target_secs) {
            SeekResult::Found { index } => return Ok((file, index)),
            SeekResult::BeforeFirstBlock => {
                date = date.previous();
                continue;
            }
            SeekResult::NotFound => {
                return Err(SeismuxError::format(format!(
                    "{}: start time not found in block index",
                    path.display()
                )))
            }
        }
    }
    Err(SeismuxError::format(
        "start time not found after spanning to the previous day",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_index(t0: i64, rate: u32, count: usize) -> Vec<BlockDescriptor> {
        (0..count)
            .map(|i| BlockDescriptor {
                start_time: t0 + (i as i64) * 60,
                file_offset: 0,
                block_size: 0,
                julian_day: 1,
            })
            .collect()
    }

    #[test]
    fn seek_mid_block() {
        let idx = synthetic_index(1_000_000, 50, 5);
        assert_eq!(seek(&idx, 1_000_000 + 30), SeekResult::Found { index: 0 });
    }

    #[test]
    fn seek_before_first_block() {
        let idx = synthetic_index(1_000_000, 50, 5);
        assert_eq!(seek(&idx, 1_000_000 - 1), SeekResult::BeforeFirstBlock);
    }

    #[test]
    fn seek_not_found_past_end() {
        let idx = synthetic_index(1_000_000, 50, 5);
        let last = idx.last().unwrap().start_time;
        assert_eq!(seek(&idx, last + 61), SeekResult::NotFound);
    }

    #[test]
    fn seek_backs_off_by_one_near_boundary() {
        let idx = synthetic_index(1_000_000, 50, 5);
        // Just inside block 2's first 60s window from block1's start+60.
        assert_eq!(seek(&idx, 1_000_120 + 5), SeekResult::Found { index: 1 });
    }

    #[test]
    fn day_file_path_format() {
        let d = UtcDate { year: 2026, month: 7, day: 30 };
        let p = day_file_path(Path::new("/data"), 2, d);
        assert_eq!(p, std::path::PathBuf::from("/data/sys2.20260730.dat"));
    }
}
