//! Line box normalization
//!
//! Converts per-line pixel boxes into unit-square page coordinates and filters
//! out boxes that cannot belong to a single text line. OCR output regularly
//! contains paragraph- or page-sized boxes labelled as lines; left in, they
//! would swallow every pointer event on the page.
//!
//! Every rejected line is logged and returned as a [`RejectedLine`]. The line
//! keeps rendering in the transcript pane, it is only excluded from
//! hit-testing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{LineUid, Page, RawBox};

/// Rejection thresholds, all in unit-square page coordinates.
///
/// The defaults were tuned against the transcription pipeline's typical
/// failure modes and may need recalibrating for another corpus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryLimits {
    /// Tallest box still accepted as one line
    pub max_line_height: f64,
    /// Largest area still accepted as one line
    pub max_line_area: f64,
    /// Boxes wider than this ...
    pub wide_width: f64,
    /// ... and taller than this are paragraph blocks
    pub wide_height: f64,
    /// Boxes wider than this ...
    pub near_full_width: f64,
    /// ... and taller than this cover the whole page
    pub near_full_height: f64,
    /// Any box exceeding this extent on either axis spans the page
    pub max_extent: f64,
}

impl Default for GeometryLimits {
    fn default() -> Self {
        Self {
            max_line_height: 0.20,
            max_line_area: 0.25,
            wide_width: 0.98,
            wide_height: 0.50,
            near_full_width: 0.95,
            near_full_height: 0.95,
            max_extent: 0.999,
        }
    }
}

/// Why a line was left out of the region index
#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("line has no bounding box")]
    MissingBox,

    #[error("non-finite coordinate")]
    NonFinite,

    #[error("invalid page size {width}x{height}")]
    InvalidPageSize { width: f64, height: f64 },

    #[error("degenerate box (w={w}, h={h})")]
    Degenerate { w: f64, h: f64 },

    #[error("box spans the page (w={w}, h={h})")]
    SpansPage { w: f64, h: f64 },

    #[error("box covers nearly the whole page (w={w}, h={h})")]
    NearFullPage { w: f64, h: f64 },

    #[error("box is a full-width block (w={w}, h={h})")]
    WideBlock { w: f64, h: f64 },

    #[error("box area {area} too large for a line")]
    TooLarge { area: f64 },

    #[error("box height {h} too tall for a line")]
    TooTall { h: f64 },

    #[error("duplicate uid")]
    DuplicateUid,
}

/// A line box in unit-square page coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub uid: LineUid,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub area: f64,
}

impl NormalizedBox {
    pub fn new(uid: LineUid, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            uid,
            x,
            y,
            w,
            h,
            area: w * h,
        }
    }

    /// Inclusive point containment
    pub fn contains(&self, u: f64, v: f64) -> bool {
        u >= self.x && u <= self.x + self.w && v >= self.y && v <= self.y + self.h
    }
}

/// A line excluded from hit-testing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedLine {
    pub uid: LineUid,
    #[serde(flatten)]
    pub reason: Rejection,
}

/// Result of normalizing one page
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPage {
    pub boxes: Vec<NormalizedBox>,
    pub rejected: Vec<RejectedLine>,
}

/// Normalize a single pixel box against the page size.
pub fn normalize_box(
    uid: LineUid,
    raw: &RawBox,
    page_width: f64,
    page_height: f64,
    limits: &GeometryLimits,
) -> Result<NormalizedBox, Rejection> {
    if !raw.is_finite() || !page_width.is_finite() || !page_height.is_finite() {
        return Err(Rejection::NonFinite);
    }
    if page_width <= 0.0 || page_height <= 0.0 {
        return Err(Rejection::InvalidPageSize {
            width: page_width,
            height: page_height,
        });
    }

    let mut x1 = (raw.x1 / page_width).clamp(0.0, 1.0);
    let mut x2 = (raw.x2 / page_width).clamp(0.0, 1.0);
    let mut y1 = (raw.y1 / page_height).clamp(0.0, 1.0);
    let mut y2 = (raw.y2 / page_height).clamp(0.0, 1.0);
    if x1 > x2 {
        std::mem::swap(&mut x1, &mut x2);
    }
    if y1 > y2 {
        std::mem::swap(&mut y1, &mut y2);
    }

    let w = x2 - x1;
    let h = y2 - y1;
    if w <= 0.0 || h <= 0.0 {
        return Err(Rejection::Degenerate { w, h });
    }

    check_limits(w, h, limits)?;
    Ok(NormalizedBox::new(uid, x1, y1, w, h))
}

// Most specific rule first so diagnostics name the strongest reason.
fn check_limits(w: f64, h: f64, limits: &GeometryLimits) -> Result<(), Rejection> {
    let area = w * h;
    if w > limits.max_extent || h > limits.max_extent {
        return Err(Rejection::SpansPage { w, h });
    }
    if w > limits.near_full_width && h > limits.near_full_height {
        return Err(Rejection::NearFullPage { w, h });
    }
    if w > limits.wide_width && h > limits.wide_height {
        return Err(Rejection::WideBlock { w, h });
    }
    if area > limits.max_line_area {
        return Err(Rejection::TooLarge { area });
    }
    if h > limits.max_line_height {
        return Err(Rejection::TooTall { h });
    }
    Ok(())
}

/// Normalize every line of a page, keeping at most one box per uid.
pub fn normalize_page(page: &Page, limits: &GeometryLimits) -> NormalizedPage {
    let mut out = NormalizedPage::default();
    let mut seen = HashSet::new();

    for line in page.lines() {
        let uid = line.uid();
        let result = match &line.line.bbox {
            Some(raw) => normalize_box(uid.clone(), raw, page.width, page.height, limits),
            None => Err(Rejection::MissingBox),
        };

        match result {
            Ok(b) if seen.insert(b.uid.clone()) => out.boxes.push(b),
            Ok(b) => {
                warn!(uid = %b.uid, "Duplicate line uid, keeping first box");
                out.rejected.push(RejectedLine {
                    uid: b.uid,
                    reason: Rejection::DuplicateUid,
                });
            }
            Err(reason) => {
                debug!(uid = %uid, %reason, "Line excluded from hit-testing");
                out.rejected.push(RejectedLine { uid, reason });
            }
        }
    }

    out
}
