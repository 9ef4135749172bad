//! Point-to-line hit-testing for the displayed page

use std::collections::{HashMap, HashSet};

use crate::geometry::{normalize_page, GeometryLimits, NormalizedBox, RejectedLine};
use crate::model::{LineUid, Page};

/// Normalized boxes of one page, smallest area first.
///
/// Overlapping detections are common near paragraph edges; scanning in
/// ascending area makes the most specific region win. The index is immutable:
/// build a new one whenever the page or its dimensions change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionIndex {
    boxes: Vec<NormalizedBox>,
    by_uid: HashMap<LineUid, usize>,
}

impl RegionIndex {
    /// Build an index from already-normalized boxes. Later duplicates of a
    /// uid are ignored.
    pub fn new(boxes: Vec<NormalizedBox>) -> Self {
        let mut unique: Vec<NormalizedBox> = Vec::with_capacity(boxes.len());
        let mut seen = HashSet::new();
        for b in boxes {
            if seen.insert(b.uid.clone()) {
                unique.push(b);
            }
        }

        // Stable, so equal areas keep reading order.
        unique.sort_by(|a, b| a.area.total_cmp(&b.area));

        let by_uid = unique
            .iter()
            .enumerate()
            .map(|(i, b)| (b.uid.clone(), i))
            .collect();

        Self {
            boxes: unique,
            by_uid,
        }
    }

    /// Normalize a page and index the surviving boxes. Rejections are
    /// returned alongside.
    pub fn build(page: &Page, limits: &GeometryLimits) -> (Self, Vec<RejectedLine>) {
        let normalized = normalize_page(page, limits);
        (Self::new(normalized.boxes), normalized.rejected)
    }

    /// The smallest region containing `(u, v)`, bounds inclusive.
    pub fn pick(&self, u: f64, v: f64) -> Option<&LineUid> {
        self.pick_box(u, v).map(|b| &b.uid)
    }

    pub fn pick_box(&self, u: f64, v: f64) -> Option<&NormalizedBox> {
        self.boxes.iter().find(|b| b.contains(u, v))
    }

    pub fn get(&self, uid: &LineUid) -> Option<&NormalizedBox> {
        self.by_uid.get(uid).map(|&i| &self.boxes[i])
    }

    pub fn boxes(&self) -> &[NormalizedBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}
