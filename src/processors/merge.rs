//! Cross-rig merge of augmented frames.

use log::warn;
use thiserror::Error;

use crate::config::CountMismatchPolicy;
use crate::core::cloud::AugmentedPoint;

use super::augment::RigWindow;

/// Errors that can occur while merging rig windows.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MergeError {
    #[error("no rigs to merge")]
    NoRigs,

    #[error(
        "frame {index}: rigs '{first_rig}' and '{second_rig}' are {delta_ns} ns apart \
         (tolerance {tolerance_ns} ns)"
    )]
    Misaligned {
        index: usize,
        first_rig: String,
        second_rig: String,
        delta_ns: u64,
        tolerance_ns: u64,
    },

    #[error("rigs produced different frame counts: {counts}")]
    CountMismatch { counts: String },
}

pub type Result<T> = std::result::Result<T, MergeError>;

/// One output frame assembled from every rig.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedFrame {
    /// Stamp of the first rig's frame
    pub stamp_ns: u64,
    /// Points of every rig, concatenated in rig order
    pub points: Vec<AugmentedPoint>,
    pub rig_stamps: Vec<u64>,
    pub rig_point_counts: Vec<usize>,
}

/// Number of frames every rig can contribute.
pub fn common_frame_count(windows: &[RigWindow]) -> usize {
    windows.iter().map(RigWindow::len).min().unwrap_or(0)
}

fn describe_counts(windows: &[RigWindow]) -> String {
    windows
        .iter()
        .map(|w| format!("{}={}", w.rig, w.len()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Require every pair of rigs to agree on the stamp of frames `0..count`.
pub fn check_alignment(windows: &[RigWindow], count: usize, tolerance_ns: u64) -> Result<()> {
    for index in 0..count {
        for (a, first) in windows.iter().enumerate() {
            for second in &windows[a + 1..] {
                let delta_ns = first.frames[index]
                    .stamp_ns
                    .abs_diff(second.frames[index].stamp_ns);
                if delta_ns >= tolerance_ns {
                    return Err(MergeError::Misaligned {
                        index,
                        first_rig: first.rig.clone(),
                        second_rig: second.rig.clone(),
                        delta_ns,
                        tolerance_ns,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Merge one window of every rig into output frames.
///
/// Only the common frame range is merged. The whole range is checked before
/// any frame is built, so a misaligned window yields no frames at all.
pub fn merge_windows(
    windows: &[RigWindow],
    tolerance_ns: u64,
    policy: CountMismatchPolicy,
) -> Result<Vec<MergedFrame>> {
    if windows.is_empty() {
        return Err(MergeError::NoRigs);
    }

    let count = common_frame_count(windows);
    if windows.iter().any(|w| w.len() != count) {
        match policy {
            CountMismatchPolicy::Drop => {}
            CountMismatchPolicy::Warn => warn!(
                "Rig frame counts differ ({}); keeping the first {} frames",
                describe_counts(windows),
                count
            ),
            CountMismatchPolicy::Fail => {
                return Err(MergeError::CountMismatch {
                    counts: describe_counts(windows),
                })
            }
        }
    }

    check_alignment(windows, count, tolerance_ns)?;

    let merged = (0..count)
        .map(|index| {
            let frames: Vec<_> = windows.iter().map(|w| &w.frames[index]).collect();
            let total: usize = frames.iter().map(|f| f.points.len()).sum();

            let mut points = Vec::with_capacity(total);
            for frame in &frames {
                points.extend_from_slice(&frame.points);
            }

            MergedFrame {
                stamp_ns: frames[0].stamp_ns,
                points,
                rig_stamps: frames.iter().map(|f| f.stamp_ns).collect(),
                rig_point_counts: frames.iter().map(|f| f.points.len()).collect(),
            }
        })
        .collect();

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::augment::{AugmentedFrame, FrameStats};

    const MS: u64 = 1_000_000;

    fn window(rig: &str, stamps: &[u64], tag: u32) -> RigWindow {
        RigWindow {
            rig: rig.to_string(),
            frames: stamps
                .iter()
                .enumerate()
                .map(|(i, &stamp_ns)| AugmentedFrame {
                    stamp_ns,
                    points: vec![AugmentedPoint::new(i as f32, 0.0, 0.0, tag); i + 1],
                    stats: FrameStats::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_merge_concatenates_in_rig_order() {
        let windows = vec![
            window("front", &[0, 100 * MS, 200 * MS], 1),
            window("left", &[2 * MS, 102 * MS, 204 * MS], 2),
            window("right", &[5 * MS, 99 * MS, 199 * MS], 3),
        ];

        let merged = merge_windows(&windows, 10 * MS, CountMismatchPolicy::Warn).unwrap();
        assert_eq!(merged.len(), 3);

        for (index, frame) in merged.iter().enumerate() {
            assert_eq!(frame.stamp_ns, windows[0].frames[index].stamp_ns);
            let expected: Vec<AugmentedPoint> = windows
                .iter()
                .flat_map(|w| w.frames[index].points.clone())
                .collect();
            assert_eq!(frame.points, expected);
            assert_eq!(frame.rig_point_counts, vec![index + 1; 3]);
        }
        assert_eq!(merged[2].rig_stamps, vec![200 * MS, 204 * MS, 199 * MS]);
    }

    #[test]
    fn test_misalignment_is_fatal() {
        let windows = vec![
            window("front", &[0, 100 * MS], 1),
            window("left", &[0, 115 * MS], 2),
        ];

        let err = merge_windows(&windows, 10 * MS, CountMismatchPolicy::Warn).unwrap_err();
        assert_eq!(
            err,
            MergeError::Misaligned {
                index: 1,
                first_rig: "front".to_string(),
                second_rig: "left".to_string(),
                delta_ns: 15 * MS,
                tolerance_ns: 10 * MS,
            }
        );
    }

    #[test]
    fn test_tolerance_is_strict() {
        let exact = vec![window("a", &[0], 0), window("b", &[10 * MS], 0)];
        assert!(check_alignment(&exact, 1, 10 * MS).is_err());

        let inside = vec![window("a", &[10 * MS], 0), window("b", &[1], 0)];
        assert!(check_alignment(&inside, 1, 10 * MS).is_ok());
    }

    #[test]
    fn test_non_adjacent_pair_is_checked() {
        // front/left and left/right are within 10 ms, front/right is not.
        let windows = vec![
            window("front", &[0], 0),
            window("left", &[6 * MS], 0),
            window("right", &[12 * MS], 0),
        ];
        let err = merge_windows(&windows, 10 * MS, CountMismatchPolicy::Warn).unwrap_err();
        assert!(matches!(
            err,
            MergeError::Misaligned { ref first_rig, ref second_rig, .. }
                if first_rig == "front" && second_rig == "right"
        ));
    }

    #[test]
    fn test_count_mismatch_policies() {
        let windows = vec![
            window("front", &[0, 100 * MS, 200 * MS], 1),
            window("left", &[0, 100 * MS], 2),
        ];

        let dropped = merge_windows(&windows, 10 * MS, CountMismatchPolicy::Drop).unwrap();
        assert_eq!(dropped.len(), 2);

        let warned = merge_windows(&windows, 10 * MS, CountMismatchPolicy::Warn).unwrap();
        assert_eq!(warned, dropped);

        let failed = merge_windows(&windows, 10 * MS, CountMismatchPolicy::Fail).unwrap_err();
        assert_eq!(
            failed,
            MergeError::CountMismatch {
                counts: "front=3, left=2".to_string()
            }
        );
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(
            merge_windows(&[], 10 * MS, CountMismatchPolicy::Warn),
            Err(MergeError::NoRigs)
        );

        let windows = vec![window("front", &[], 0), window("left", &[0], 0)];
        assert_eq!(common_frame_count(&windows), 0);
        let merged = merge_windows(&windows, 10 * MS, CountMismatchPolicy::Drop).unwrap();
        assert!(merged.is_empty());
    }
}
