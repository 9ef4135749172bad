//! Highlight synchronization between the rendered page and the transcript
//!
//! [`HighlightSync`] owns the single active line and where that activation
//! came from. Both panes feed events in through the methods below and render
//! whatever [`Effect`]s come back; neither pane writes the other's state
//! directly. Keeping the origin in the state is what stops a page-driven
//! transcript scroll from bouncing back as a transcript-driven page scroll.

use std::collections::HashMap;

use serde::Serialize;
use tracing::trace;

use crate::geometry::NormalizedBox;
use crate::index::RegionIndex;
use crate::model::LineUid;

/// Which pane activated the current line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightSource {
    Page,
    Transcript,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HighlightState {
    pub active: Option<LineUid>,
    pub source: Option<HighlightSource>,
}

impl HighlightState {
    fn new(active: LineUid, source: HighlightSource) -> Self {
        Self {
            active: Some(active),
            source: Some(source),
        }
    }
}

/// Side effects the UI layer must apply after a transition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Move the page highlight overlay; `None` hides it
    Highlight { region: Option<NormalizedBox> },
    /// Smoothly scroll the transcript so this line sits at the vertical centre
    ScrollTranscript { uid: LineUid },
    /// Scroll the rendered page so this region is visible
    ScrollPage { region: NormalizedBox },
    /// Open the suggestion panel for a line
    RevealSuggestions { uid: LineUid },
    /// The suggestion list for a line was collapsed or expanded
    SuggestionsToggled { uid: LineUid, collapsed: bool },
}

/// Keeps only the latest pointer position until the next animation frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerCoalescer {
    pending: Option<(f64, f64)>,
}

impl PointerCoalescer {
    pub fn push(&mut self, u: f64, v: f64) {
        self.pending = Some((u, v));
    }

    pub fn take(&mut self) -> Option<(f64, f64)> {
        self.pending.take()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// State machine behind the bidirectional highlight.
#[derive(Debug, Clone, Default)]
pub struct HighlightSync {
    state: HighlightState,
    pointer: PointerCoalescer,
    /// Line last selected by a click on the page
    pinned: Option<LineUid>,
    collapsed: HashMap<LineUid, bool>,
}

impl HighlightSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &HighlightState {
        &self.state
    }

    pub fn active(&self) -> Option<&LineUid> {
        self.state.active.as_ref()
    }

    /// Suggestion panels start collapsed until a click expands them.
    pub fn is_collapsed(&self, uid: &LineUid) -> bool {
        self.collapsed.get(uid).copied().unwrap_or(true)
    }

    /// A pointer move is waiting to be evaluated; schedule a frame.
    pub fn frame_pending(&self) -> bool {
        self.pointer.is_pending()
    }

    /// Record a pointer move. Nothing is evaluated until
    /// [`HighlightSync::animation_frame`].
    pub fn pointer_moved(&mut self, u: f64, v: f64) {
        self.pointer.push(u, v);
    }

    /// Evaluate the latest pointer position, if any arrived since the last
    /// frame.
    pub fn animation_frame(&mut self, index: &RegionIndex) -> Vec<Effect> {
        let Some((u, v)) = self.pointer.take() else {
            return Vec::new();
        };
        match index.pick(u, v) {
            Some(uid) => {
                let uid = uid.clone();
                self.transition(HighlightState::new(uid, HighlightSource::Page), index)
            }
            None => Vec::new(),
        }
    }

    pub fn pointer_left(&mut self) -> Vec<Effect> {
        self.pointer.clear();
        if self.state == HighlightState::default() {
            return Vec::new();
        }
        self.state = HighlightState::default();
        vec![Effect::Highlight { region: None }]
    }

    /// Click on the rendered page. A second click on the pinned line
    /// collapses its suggestions; a click on any other line expands them.
    pub fn page_clicked(&mut self, u: f64, v: f64, index: &RegionIndex) -> Vec<Effect> {
        self.pointer.clear();
        let Some(uid) = index.pick(u, v).cloned() else {
            return Vec::new();
        };

        let mut effects =
            self.transition(HighlightState::new(uid.clone(), HighlightSource::Page), index);

        // Compare with the last clicked line, not the active one: the
        // pointer hovers a line active before it clicks, and that first
        // click must expand.
        let collapsed = if self.pinned.as_ref() == Some(&uid) {
            !self.is_collapsed(&uid)
        } else {
            false
        };
        self.pinned = Some(uid.clone());
        self.collapsed.insert(uid.clone(), collapsed);

        effects.push(Effect::RevealSuggestions { uid: uid.clone() });
        effects.push(Effect::SuggestionsToggled { uid, collapsed });
        effects
    }

    /// Hover on a transcript line. No geometric query is needed.
    pub fn transcript_hovered(&mut self, uid: &LineUid, index: &RegionIndex) -> Vec<Effect> {
        self.transition(
            HighlightState::new(uid.clone(), HighlightSource::Transcript),
            index,
        )
    }

    pub fn transcript_clicked(&mut self, uid: &LineUid, index: &RegionIndex) -> Vec<Effect> {
        self.transcript_hovered(uid, index)
    }

    /// Forget everything tied to the previous page.
    pub fn reset(&mut self) -> Vec<Effect> {
        let had_highlight = self.state.active.is_some();
        *self = Self::default();
        if had_highlight {
            vec![Effect::Highlight { region: None }]
        } else {
            Vec::new()
        }
    }

    fn transition(&mut self, next: HighlightState, index: &RegionIndex) -> Vec<Effect> {
        if self.state == next {
            return Vec::new();
        }
        trace!(from = ?self.state, to = ?next, "Highlight transition");
        self.state = next;

        let (Some(uid), Some(source)) = (&self.state.active, self.state.source) else {
            return vec![Effect::Highlight { region: None }];
        };
        let region = index.get(uid).cloned();

        let mut effects = vec![Effect::Highlight {
            region: region.clone(),
        }];
        match source {
            HighlightSource::Page => effects.push(Effect::ScrollTranscript { uid: uid.clone() }),
            HighlightSource::Transcript => {
                // Lines without a usable box have nothing to scroll to.
                if let Some(region) = region {
                    effects.push(Effect::ScrollPage { region });
                }
            }
        }
        effects
    }
}
