//! Coordinate transformation between the rendered page container and the
//! unit-square page space used by the region index

use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedBox;

/// Rectangle in container pixels (top-left origin)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Convert container coordinates (pixels, e.g. from a pointer event) to
/// unit-square page coordinates.
///
/// Returns `None` when the container has no usable size yet (before first
/// layout). Points outside the container map outside `[0, 1]` and simply
/// miss every region.
pub fn dom_to_unit(
    dom_x: f64,
    dom_y: f64,
    container_width: f64,
    container_height: f64,
) -> Option<(f64, f64)> {
    if !(container_width > 0.0 && container_height > 0.0) {
        return None;
    }
    if !(dom_x.is_finite() && dom_y.is_finite()) {
        return None;
    }
    Some((dom_x / container_width, dom_y / container_height))
}

/// Convert unit-square page coordinates to container pixels
pub fn unit_to_dom(u: f64, v: f64, container_width: f64, container_height: f64) -> (f64, f64) {
    (u * container_width, v * container_height)
}

/// Place a normalized box over the rendered page, e.g. for the highlight
/// overlay.
pub fn box_to_dom(b: &NormalizedBox, container_width: f64, container_height: f64) -> DomRect {
    let (left, top) = unit_to_dom(b.x, b.y, container_width, container_height);
    DomRect {
        left,
        top,
        width: b.w * container_width,
        height: b.h * container_height,
    }
}
