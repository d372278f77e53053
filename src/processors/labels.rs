//! Segmentation color to class id lookup.

use crate::config::LabelEntry;

const TABLE_SIZE: usize = 1 << 24;

/// Dense table over every 24-bit color. Unknown colors map to class 0.
///
/// Keys are the three bytes of a pixel in the order they are stored in the
/// image, so a `bgr8` pixel `[b, g, r]` is looked up as written.
pub struct SegmentationColorTable {
    ids: Box<[u8]>,
    classes: usize,
}

#[inline]
fn key(color: [u8; 3]) -> usize {
    ((color[0] as usize) << 16) | ((color[1] as usize) << 8) | color[2] as usize
}

impl SegmentationColorTable {
    /// Build from a palette. When two entries share a color the later wins.
    pub fn from_entries(entries: &[LabelEntry]) -> Self {
        let mut ids = vec![0u8; TABLE_SIZE].into_boxed_slice();
        for entry in entries {
            ids[key(entry.color)] = entry.id;
        }
        let classes = ids.iter().filter(|&&id| id != 0).count();
        Self { ids, classes }
    }

    #[inline]
    pub fn lookup(&self, color: [u8; 3]) -> u8 {
        self.ids[key(color)]
    }

    /// Number of colors that resolve to a nonzero class.
    pub fn len(&self) -> usize {
        self.classes
    }

    pub fn is_empty(&self) -> bool {
        self.classes == 0
    }
}

impl std::fmt::Debug for SegmentationColorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationColorTable")
            .field("classes", &self.classes)
            .finish()
    }
}
