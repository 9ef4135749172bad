//! Page raster rendering
//!
//! Plans raster requests for a page at a target width, keeps at most one
//! render in flight per surface and preserves the scroll position across
//! re-renders. A render superseded by a newer request resolves to
//! [`RenderOutcome::Discarded`]; that is never an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RenderError;

/// Native page dimensions in the raster source's units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }
}

/// Everything a raster source needs to draw one page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterRequest {
    /// Page number (1-indexed)
    pub page: u32,
    /// Scale from native units to bitmap pixels
    pub scale: f64,
    /// Displayed size in CSS pixels
    pub css_width: f64,
    pub css_height: f64,
    /// Backing bitmap size in device pixels
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    pub device_pixel_ratio: f64,
}

impl RasterRequest {
    pub fn key(&self) -> RenderKey {
        RenderKey {
            page: self.page,
            target_width: self.css_width,
            device_pixel_ratio: self.device_pixel_ratio,
        }
    }
}

/// Reject page numbers outside `1..=page_count`.
pub fn check_page_range(page: u32, page_count: u32) -> Result<(), RenderError> {
    if page < 1 || page > page_count {
        return Err(RenderError::PageOutOfRange { page, page_count });
    }
    Ok(())
}

/// Size a raster so the page fills `viewport_width * zoom` CSS pixels on a
/// display with the given pixel density.
pub fn plan_raster(
    page: u32,
    native: PageSize,
    viewport_width: f64,
    zoom: f64,
    device_pixel_ratio: f64,
) -> Result<RasterRequest, RenderError> {
    if !(native.width > 0.0 && native.height > 0.0) {
        return Err(RenderError::InvalidTarget(format!(
            "page {} has size {}x{}",
            page, native.width, native.height
        )));
    }
    let css_width = viewport_width * zoom;
    if !(css_width.is_finite() && css_width > 0.0) {
        return Err(RenderError::InvalidTarget(format!(
            "target width {} (viewport {} x zoom {})",
            css_width, viewport_width, zoom
        )));
    }
    if !(device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0) {
        return Err(RenderError::InvalidTarget(format!(
            "device pixel ratio {}",
            device_pixel_ratio
        )));
    }

    let css_scale = css_width / native.width;
    let css_height = native.height * css_scale;
    Ok(RasterRequest {
        page,
        scale: css_scale * device_pixel_ratio,
        css_width,
        css_height,
        bitmap_width: (css_width * device_pixel_ratio).ceil().max(1.0) as u32,
        bitmap_height: (css_height * device_pixel_ratio).ceil().max(1.0) as u32,
        device_pixel_ratio,
    })
}

/// Cooperative cancellation flag shared with a raster source
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A finished raster
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub page: u32,
    pub width: u32,
    pub height: u32,
    /// RGBA, row major
    pub pixels: Vec<u8>,
}

/// Page raster collaborator (PDF.js in the browser, an image tiler on the
/// server).
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Number of pages in the loaded document
    fn page_count(&self) -> u32;

    async fn page_size(&self, page: u32) -> Result<PageSize, RenderError>;

    /// Draw a page. Sources should poll `cancel` and return
    /// [`RenderError::Cancelled`] once it is set.
    async fn render(
        &self,
        request: &RasterRequest,
        cancel: &CancelToken,
    ) -> Result<Raster, RenderError>;
}

/// Scroll offsets of the page viewport
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub left: f64,
    pub top: f64,
}

/// Scroll offset as a fraction of the scrollable content
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollAnchor {
    pub fx: f64,
    pub fy: f64,
}

impl ScrollAnchor {
    pub fn capture(scroll: ScrollPosition, content_width: f64, content_height: f64) -> Self {
        let fraction = |offset: f64, extent: f64| {
            if extent > 0.0 {
                (offset / extent).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        Self {
            fx: fraction(scroll.left, content_width),
            fy: fraction(scroll.top, content_height),
        }
    }

    pub fn restore(&self, content_width: f64, content_height: f64) -> ScrollPosition {
        ScrollPosition {
            left: self.fx * content_width,
            top: self.fy * content_height,
        }
    }
}

/// What triggered renders are compared on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderKey {
    pub page: u32,
    pub target_width: f64,
    pub device_pixel_ratio: f64,
}

/// A render started on a surface
#[derive(Debug, Clone)]
pub struct RenderJob {
    generation: u64,
    pub request: RasterRequest,
    pub cancel: CancelToken,
    anchor: ScrollAnchor,
}

impl RenderJob {
    pub fn key(&self) -> RenderKey {
        self.request.key()
    }
}

/// The raster currently shown on a surface
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub raster: Raster,
    pub css_width: f64,
    pub css_height: f64,
    /// Where to scroll once the new content is laid out. `None` when the
    /// content size did not change.
    pub scroll: Option<ScrollPosition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Rendered(RenderedPage),
    /// Superseded or cancelled; the result was dropped
    Discarded,
}

/// One page canvas and its in-flight render.
#[derive(Debug, Default)]
pub struct RenderSurface {
    generation: u64,
    in_flight: Option<(u64, CancelToken)>,
    key: Option<RenderKey>,
    current: Option<RenderedPage>,
}

impl RenderSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&RenderedPage> {
        self.current.as_ref()
    }

    pub fn is_rendering(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Only a page change, zoom change or viewport resize warrants a new
    /// render. The key of a failed or discarded render is never recorded.
    pub fn needs_render(&self, key: &RenderKey) -> bool {
        self.key.as_ref() != Some(key)
    }

    /// Drop the shown raster and cancel any in-flight render, e.g. when the
    /// page changes underneath the surface.
    pub fn reset(&mut self) {
        if let Some((generation, token)) = self.in_flight.take() {
            debug!(generation, "Cancelling render for replaced page");
            token.cancel();
        }
        self.key = None;
        self.current = None;
    }

    /// Start a render, cancelling whatever was in flight.
    pub fn begin(&mut self, request: RasterRequest, scroll: ScrollPosition) -> RenderJob {
        if let Some((generation, token)) = self.in_flight.take() {
            debug!(generation, "Cancelling superseded render");
            token.cancel();
        }

        self.generation += 1;
        let cancel = CancelToken::new();
        self.in_flight = Some((self.generation, cancel.clone()));

        let anchor = match &self.current {
            Some(page) => ScrollAnchor::capture(scroll, page.css_width, page.css_height),
            None => ScrollAnchor::default(),
        };

        RenderJob {
            generation: self.generation,
            request,
            cancel,
            anchor,
        }
    }

    /// Apply a completed render. Stale or cancelled results are discarded;
    /// any other failure is returned to the caller.
    pub fn finish(
        &mut self,
        job: RenderJob,
        result: Result<Raster, RenderError>,
    ) -> Result<RenderOutcome, RenderError> {
        let is_current = matches!(self.in_flight, Some((g, _)) if g == job.generation);
        if !is_current || job.cancel.is_cancelled() {
            debug!(generation = job.generation, "Discarding stale render");
            return Ok(RenderOutcome::Discarded);
        }
        self.in_flight = None;

        let raster = match result {
            Ok(raster) => raster,
            Err(RenderError::Cancelled) => return Ok(RenderOutcome::Discarded),
            Err(err) => return Err(err),
        };

        let (css_width, css_height) = (job.request.css_width, job.request.css_height);
        let size_changed = match &self.current {
            Some(prev) => prev.css_width != css_width || prev.css_height != css_height,
            None => false,
        };
        let rendered = RenderedPage {
            raster,
            css_width,
            css_height,
            scroll: size_changed.then(|| job.anchor.restore(css_width, css_height)),
        };
        self.key = Some(job.key());
        self.current = Some(rendered.clone());
        Ok(RenderOutcome::Rendered(rendered))
    }

    /// Validate, plan and run a render against `source`.
    pub async fn render<S: RasterSource + ?Sized>(
        &mut self,
        source: &S,
        page: u32,
        viewport_width: f64,
        zoom: f64,
        device_pixel_ratio: f64,
        scroll: ScrollPosition,
    ) -> Result<RenderOutcome, RenderError> {
        check_page_range(page, source.page_count())?;
        let native = source.page_size(page).await?;
        let request = plan_raster(page, native, viewport_width, zoom, device_pixel_ratio)?;

        let job = self.begin(request, scroll);
        let result = source.render(&job.request, &job.cancel).await;
        self.finish(job, result)
    }
}
