//! Scroll targets for bringing the active line into view

use crate::coords::box_to_dom;
use crate::geometry::NormalizedBox;
use crate::render::ScrollPosition;

/// Offset that puts an item at the vertical centre of a viewport, clamped to
/// the scrollable range. Hosts use it for transcript lines on
/// [`crate::sync::Effect::ScrollTranscript`].
pub fn center_offset(
    item_top: f64,
    item_height: f64,
    viewport_height: f64,
    content_height: f64,
) -> f64 {
    let target = item_top + item_height / 2.0 - viewport_height / 2.0;
    let max = (content_height - viewport_height).max(0.0);
    target.clamp(0.0, max)
}

/// Page scroll that centres `region` in the page viewport
pub fn page_scroll(
    region: &NormalizedBox,
    page_width: f64,
    page_height: f64,
    viewport_width: f64,
    viewport_height: f64,
) -> ScrollPosition {
    let rect = box_to_dom(region, page_width, page_height);
    let max_left = (page_width - viewport_width).max(0.0);
    let max_top = (page_height - viewport_height).max(0.0);
    ScrollPosition {
        left: (rect.left + rect.width / 2.0 - viewport_width / 2.0).clamp(0.0, max_left),
        top: center_offset(rect.top, rect.height, viewport_height, page_height).min(max_top),
    }
}
