//! Progress-to-offset resolution for the percent-based resume path.
//!
//! Each file owns an equal share of the 0-100 scale regardless of its real
//! size; a 10-byte file and a 10 GB file each consume one share. Callers
//! must not assume proportionality to bytes. Both sides of the protocol
//! compute resume points with this exact algorithm, so it is preserved as
//! specified rather than made byte-proportional.

/// Fraction of a file's share past which it is treated as finished and the
/// resume point advances to the next file. Avoids re-requesting the last
/// few bytes of a file due to rounding.
const SKIP_AHEAD_THRESHOLD: f64 = 0.95;

/// A resume point within an ordered file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPoint {
    /// Index into the file list; equal to the file count when nothing is
    /// left to send.
    pub file_index: usize,
    /// Byte offset within that file.
    pub byte_offset: u64,
}

impl StartPoint {
    /// True when the point is past the last file.
    #[must_use]
    pub const fn is_exhausted(&self, file_count: usize) -> bool {
        self.file_index >= file_count
    }
}

/// Maps an overall progress percentage onto a `(file, offset)` resume point.
///
/// Edge cases: `progress_percent <= 0` starts from the beginning; an empty
/// list or `progress_percent >= 100` yields `(file_count, 0)`, meaning
/// nothing is left to send.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn resolve_start(sizes: &[u64], progress_percent: f64) -> StartPoint {
    if sizes.is_empty() || progress_percent >= 100.0 {
        return StartPoint {
            file_index: sizes.len(),
            byte_offset: 0,
        };
    }
    if progress_percent <= 0.0 {
        return StartPoint {
            file_index: 0,
            byte_offset: 0,
        };
    }

    let share = 100.0 / sizes.len() as f64;
    let file_index = ((progress_percent / share) as usize).min(sizes.len() - 1);

    // Fractional position inside this file's share, 0..1.
    let file_fraction = (progress_percent - file_index as f64 * share) / share;
    if file_fraction >= SKIP_AHEAD_THRESHOLD {
        return StartPoint {
            file_index: file_index + 1,
            byte_offset: 0,
        };
    }

    StartPoint {
        file_index,
        byte_offset: (sizes[file_index] as f64 * file_fraction) as u64,
    }
}
