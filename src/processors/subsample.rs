//! Row subsampling mask.
//!
//! Only points that project onto one of `count` evenly spaced image rows are
//! kept, which thins a dense depth image down to a scan-line pattern.

use crate::config::SubsampleConfig;

/// Per-row keep flags for an image of fixed height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsampleMask {
    rows: Vec<bool>,
}

/// `count` values evenly spaced over `[start, stop]`, both ends included.
fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            let mut values: Vec<f64> = (0..count).map(|k| k as f64 * step + start).collect();
            values[count - 1] = stop;
            values
        }
    }
}

impl SubsampleMask {
    /// Mark `count` rows spread over `[margin, height - margin]`, truncating
    /// each to an integer row.
    pub fn new(height: u32, margin: u32, count: u32) -> Self {
        let mut rows = vec![false; height as usize];
        let stop = height.saturating_sub(margin);

        for value in linspace(margin as f64, stop as f64, count as usize) {
            let row = value as usize;
            if let Some(flag) = rows.get_mut(row) {
                *flag = true;
            }
        }

        Self { rows }
    }

    pub fn from_config(height: u32, config: &SubsampleConfig) -> Self {
        Self::new(height, config.subsample_margin, config.subsample_count)
    }

    /// Whether row `v` is sampled. Rows outside the image never are.
    #[inline]
    pub fn contains(&self, v: i64) -> bool {
        usize::try_from(v)
            .ok()
            .and_then(|row| self.rows.get(row).copied())
            .unwrap_or(false)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Indices of the sampled rows in ascending order.
    pub fn sampled_rows(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(row, &keep)| keep.then_some(row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mask_rows() {
        let mask = SubsampleMask::new(480, 50, 64);
        let rows = mask.sampled_rows();

        assert_eq!(mask.height(), 480);
        assert_eq!(rows.len(), 64);
        assert_eq!(rows.first(), Some(&50));
        assert_eq!(rows.last(), Some(&430));
        assert_eq!(&rows[..4], &[50, 56, 62, 68]);
    }

    #[test]
    fn test_rows_truncate_not_round() {
        let mask = SubsampleMask::new(480, 50, 64);
        // 50 + 58 * 380 / 63 = 399.84
        assert!(mask.contains(399));
        assert!(!mask.contains(400));
        assert!(mask.contains(405));
    }

    #[test]
    fn test_contains_outside_image() {
        let mask = SubsampleMask::new(480, 50, 64);
        assert!(!mask.contains(-1));
        assert!(!mask.contains(-430));
        assert!(!mask.contains(480));
        assert!(!mask.contains(10_000));
        assert!(!mask.contains(0));
        assert!(!mask.contains(479));
    }

    #[test]
    fn test_degenerate_counts() {
        assert!(SubsampleMask::new(100, 10, 0).sampled_rows().is_empty());
        assert_eq!(SubsampleMask::new(100, 10, 1).sampled_rows(), vec![10]);
        assert_eq!(SubsampleMask::new(100, 10, 2).sampled_rows(), vec![10, 90]);
    }

    #[test]
    fn test_from_config() {
        let mask = SubsampleMask::from_config(480, &SubsampleConfig::default());
        assert_eq!(mask, SubsampleMask::new(480, 50, 64));
    }
}
