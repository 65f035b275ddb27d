//! Region of interest requests and their normalization against file extents.

use crate::error::{Error, Result};

/// An inclusive index range with a step, `start..=stop` every `step` samples.
///
/// Negative indices count from the end of the axis, so the default range
/// `{ start: 0, stop: -1, step: 1 }` covers a whole axis. A range with
/// `start > stop` walks the axis backward.
///
/// # Examples
///
/// ```
/// use icsio::Range;
///
/// let mut r = Range::new(-1, 0, 2);
/// r.fix(10).unwrap();
/// assert_eq!((r.start, r.stop), (9, 1));
/// assert_eq!(r.size(), 5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: isize,
    pub stop: isize,
    pub step: usize,
}

impl Default for Range {
    fn default() -> Self {
        Self { start: 0, stop: -1, step: 1 }
    }
}

impl Range {
    pub fn new(start: isize, stop: isize, step: usize) -> Self {
        Self { start, stop, step }
    }

    /// A range selecting the single index `index`.
    pub fn single(index: isize) -> Self {
        Self { start: index, stop: index, step: 1 }
    }

    /// Resolves negative indices against `size`, checks the bounds and
    /// moves `stop` onto the step grid that starts at `start`.
    pub fn fix(&mut self, size: usize) -> Result<()> {
        self.step = self.step.max(1);
        self.start = resolve_index(self.start, size)?;
        self.stop = resolve_index(self.stop, size)?;
        let step = self.step as isize;
        if self.start <= self.stop {
            self.stop = self.start + ((self.stop - self.start) / step) * step;
        } else {
            self.stop = self.start - ((self.start - self.stop) / step) * step;
        }
        Ok(())
    }

    /// Number of indices in a fixed range.
    pub fn size(&self) -> usize {
        self.start.abs_diff(self.stop) / self.step.max(1) + 1
    }

    /// Lowest index of a fixed range.
    pub fn offset(&self) -> usize {
        self.start.min(self.stop).max(0) as usize
    }

    pub fn is_reversed(&self) -> bool {
        self.start > self.stop
    }

    /// Turns a reversed range into the forward range over the same indices.
    fn make_forward(&mut self) {
        if self.is_reversed() {
            std::mem::swap(&mut self.start, &mut self.stop);
        }
    }
}

fn resolve_index(index: isize, size: usize) -> Result<isize> {
    let resolved = if index < 0 { index + size as isize } else { index };
    if resolved < 0 || resolved >= size as isize {
        return Err(Error::IndexOutOfRange { index, size });
    }
    Ok(resolved)
}

/// A normalized region: forward ranges plus the axes to reverse afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub ranges: Vec<Range>,
    pub mirror: Vec<bool>,
}

impl Region {
    /// Normalizes a request against axis `sizes`.
    ///
    /// An empty request selects everything; a single range applies to all
    /// axes. Reversed ranges are made forward and flagged for mirroring.
    pub fn normalize(request: &[Range], sizes: &[usize]) -> Result<Self> {
        let mut ranges = broadcast(request, sizes.len())?;
        let mut mirror = vec![false; sizes.len()];
        for ((range, &size), flag) in ranges.iter_mut().zip(sizes).zip(mirror.iter_mut()) {
            range.fix(size)?;
            *flag = range.is_reversed();
            range.make_forward();
        }
        Ok(Self { ranges, mirror })
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.ranges.iter().map(Range::size).collect()
    }

    /// True if every axis is read in full, in which case mirroring is the
    /// only thing that can differ from the file layout.
    pub fn is_full(&self, sizes: &[usize]) -> bool {
        self.ranges
            .iter()
            .zip(sizes)
            .all(|(r, &size)| r.start == 0 && r.step == 1 && r.size() == size)
    }
}

fn broadcast(request: &[Range], n: usize) -> Result<Vec<Range>> {
    match request.len() {
        0 => Ok(vec![Range::default(); n]),
        1 => Ok(vec![request[0]; n]),
        len if len == n => Ok(request.to_vec()),
        len => Err(Error::ArraySizeMismatch { expected: n, found: len }),
    }
}

/// Normalizes the requested channel range against `tensor_elements`.
/// A reversed channel range is made forward; channels are never mirrored.
pub fn normalize_channels(request: Option<Range>, tensor_elements: usize) -> Result<Range> {
    let mut range = request.unwrap_or_default();
    range.fix(tensor_elements.max(1))?;
    range.make_forward();
    Ok(range)
}

/// Builds one range per axis from an origin, a size and a spacing array.
///
/// Each array may be empty (origin 0, the rest of the axis, spacing 1),
/// hold one value for all axes, or one value per axis.
pub fn ranges_from_region(origin: &[usize], sizes: &[usize], spacing: &[usize], file_sizes: &[usize]) -> Result<Vec<Range>> {
    let n = file_sizes.len();
    let origin = expand(origin, n, 0)?;
    let spacing: Vec<usize> = expand(spacing, n, 1)?.into_iter().map(|s| s.max(1)).collect();
    let sizes = if sizes.is_empty() {
        file_sizes
            .iter()
            .zip(&origin)
            .zip(&spacing)
            .map(|((&fs, &o), &sp)| fs.saturating_sub(o).div_ceil(sp))
            .collect()
    } else {
        expand(sizes, n, 0)?
    };
    origin
        .iter()
        .zip(&sizes)
        .zip(&spacing)
        .zip(file_sizes)
        .map(|(((&o, &sz), &sp), &fs)| {
            if sz == 0 {
                return Err(Error::IndexOutOfRange { index: o as isize, size: fs });
            }
            let stop = (sz - 1)
                .checked_mul(sp)
                .and_then(|extent| extent.checked_add(o))
                .filter(|&stop| stop <= isize::MAX as usize)
                .ok_or(Error::IndexOutOfRange { index: isize::MAX, size: fs })?;
            Ok(Range::new(o as isize, stop as isize, sp))
        })
        .collect()
}

fn expand(values: &[usize], n: usize, default: usize) -> Result<Vec<usize>> {
    match values.len() {
        0 => Ok(vec![default; n]),
        1 => Ok(vec![values[0]; n]),
        len if len == n => Ok(values.to_vec()),
        len => Err(Error::ArraySizeMismatch { expected: n, found: len }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_covers_axis() {
        let mut r = Range::default();
        r.fix(7).unwrap();
        assert_eq!(r, Range::new(0, 6, 1));
        assert_eq!(r.size(), 7);
    }

    #[test]
    fn test_stop_snaps_to_step_grid() {
        let mut r = Range::new(1, 8, 3);
        r.fix(10).unwrap();
        assert_eq!(r.stop, 7);
        assert_eq!(r.size(), 3);

        let mut r = Range::new(9, 0, 4);
        r.fix(10).unwrap();
        assert_eq!(r.stop, 1);
        assert_eq!(r.offset(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let mut r = Range::new(0, 10, 1);
        assert!(matches!(r.fix(10), Err(Error::IndexOutOfRange { index: 10, size: 10 })));
        let mut r = Range::new(-11, 0, 1);
        assert!(r.fix(10).is_err());
    }

    #[test]
    fn test_zero_step_is_one() {
        let mut r = Range::new(2, 4, 0);
        r.fix(5).unwrap();
        assert_eq!(r.step, 1);
        assert_eq!(r.size(), 3);
    }

    #[test]
    fn test_region_broadcast_and_mirror() {
        let region = Region::normalize(&[Range::new(-1, 0, 1)], &[4, 6]).unwrap();
        assert_eq!(region.ranges, vec![Range::new(0, 3, 1), Range::new(0, 5, 1)]);
        assert_eq!(region.mirror, vec![true, true]);
        assert!(region.is_full(&[4, 6]));

        let region = Region::normalize(&[Range::default(), Range::new(1, 5, 2)], &[4, 6]).unwrap();
        assert_eq!(region.sizes(), vec![4, 3]);
        assert!(!region.is_full(&[4, 6]));

        assert!(matches!(
            Region::normalize(&[Range::default(); 3], &[4, 6]),
            Err(Error::ArraySizeMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_reversed_channels_not_mirrored() {
        let r = normalize_channels(Some(Range::new(2, 0, 1)), 3).unwrap();
        assert_eq!(r, Range::new(0, 2, 1));
        let r = normalize_channels(None, 1).unwrap();
        assert_eq!(r.size(), 1);
    }

    #[test]
    fn test_ranges_from_region() {
        let ranges = ranges_from_region(&[2], &[], &[3], &[10, 12]).unwrap();
        assert_eq!(ranges, vec![Range::new(2, 8, 3), Range::new(2, 11, 3)]);

        let ranges = ranges_from_region(&[], &[4, 1], &[], &[10, 12]).unwrap();
        assert_eq!(ranges, vec![Range::new(0, 3, 1), Range::new(0, 0, 1)]);

        assert!(matches!(
            ranges_from_region(&[0, 0, 0], &[], &[], &[10, 12]),
            Err(Error::ArraySizeMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_ranges_from_region_overflow() {
        assert!(matches!(
            ranges_from_region(&[0], &[usize::MAX], &[2], &[10]),
            Err(Error::IndexOutOfRange { size: 10, .. })
        ));
        assert!(matches!(
            ranges_from_region(&[usize::MAX], &[2], &[1], &[10]),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            ranges_from_region(&[0], &[(isize::MAX as usize) / 2 + 2], &[2], &[10]),
            Err(Error::IndexOutOfRange { .. })
        ));
    }
}
