//! Viewer session
//!
//! [`ViewerSession`] is the single owner of cross-component state: the open
//! document, the displayed page and its region index, the highlight state
//! machine, the render surface, the fetched suggestions and the per-line
//! preferences. Everything else in the crate is either pure or owns one
//! concern; the session wires them together and is the only place their
//! state changes.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ViewerConfig;
use crate::dispatch::{LatestRequest, Ticket};
use crate::error::{DocumentError, RenderError, StoreError, SubmitError};
use crate::geometry::{NormalizedBox, RejectedLine};
use crate::index::RegionIndex;
use crate::model::{Document, LineUid, Page, PageKey, PageLine};
use crate::render::{
    check_page_range, plan_raster, PageSize, Raster, RasterSource, RenderJob, RenderOutcome,
    RenderSurface, ScrollPosition,
};
use crate::scroll::page_scroll;
use crate::store::{DocumentStore, IdentityProvider, SuggestionStore};
use crate::submit::{validate_suggestion, validate_vote};
use crate::suggestions::{
    leaderboard, rank_by_line_with, LeaderboardRow, RankedLine, SortMode, Suggestion, VoteBook,
};
use crate::sync::{Effect, HighlightState, HighlightSync};

pub struct ViewerSession {
    config: ViewerConfig,
    document: Option<Document>,
    page_key: Option<PageKey>,
    index: RegionIndex,
    rejected: Vec<RejectedLine>,
    highlight: HighlightSync,
    surface: RenderSurface,
    zoom: f64,
    suggestions: Vec<Suggestion>,
    fetches: LatestRequest<PageKey>,
    sort_modes: HashMap<LineUid, SortMode>,
    show_all: HashSet<LineUid>,
}

impl Default for ViewerSession {
    fn default() -> Self {
        Self::new(ViewerConfig::default())
    }
}

impl ViewerSession {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            document: None,
            page_key: None,
            index: RegionIndex::default(),
            rejected: Vec::new(),
            highlight: HighlightSync::new(),
            surface: RenderSurface::new(),
            zoom: 1.0,
            suggestions: Vec::new(),
            fetches: LatestRequest::new(),
            sort_modes: HashMap::new(),
            show_all: HashSet::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Document and page navigation
    // ------------------------------------------------------------------

    /// Fetch a document and open it.
    pub async fn load_document<D: DocumentStore + ?Sized>(
        &mut self,
        store: &D,
        document_id: &str,
    ) -> Result<Vec<Effect>, DocumentError> {
        let document = store.fetch(document_id).await?;
        self.open(document)
    }

    /// Open a document on its first page: the lowest numbered page, or the
    /// first key when no page carries a number.
    pub fn open(&mut self, document: Document) -> Result<Vec<Effect>, DocumentError> {
        let first = document.ordered_page_keys().first().map(|k| (*k).clone());
        info!(
            document = %document.id,
            pages = document.pages.len(),
            "Opened document"
        );
        self.document = Some(document);
        self.page_key = None;

        match first {
            Some(key) => self.select_page_key(&key),
            None => Ok(self.clear_page()),
        }
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn page_key(&self) -> Option<&PageKey> {
        self.page_key.as_ref()
    }

    /// Page number of the displayed page, if its key carries one
    pub fn ordinal(&self) -> Option<u32> {
        self.page_key.as_ref().and_then(PageKey::ordinal)
    }

    pub fn page(&self) -> Option<&Page> {
        let key = self.page_key.as_ref()?;
        self.document.as_ref()?.pages.get(key)
    }

    /// Lines of the displayed page in transcript order
    pub fn transcript(&self) -> Vec<PageLine<'_>> {
        self.page().map(|p| p.lines().collect()).unwrap_or_default()
    }

    pub fn select_page(&mut self, ordinal: u32) -> Result<Vec<Effect>, DocumentError> {
        let document = self.document.as_ref().ok_or(DocumentError::NotLoaded)?;
        let (key, _) = document.page_by_ordinal(ordinal)?;
        let key = key.clone();
        self.select_page_key(&key)
    }

    /// Display a page. The region index is rebuilt and everything tied to
    /// the previous page is dropped, including pending suggestion fetches.
    pub fn select_page_key(&mut self, key: &PageKey) -> Result<Vec<Effect>, DocumentError> {
        let document = self.document.as_ref().ok_or(DocumentError::NotLoaded)?;
        let page = document.page(key)?;
        let (index, rejected) = RegionIndex::build(page, &self.config.geometry);

        info!(
            page = %key,
            lines = page.line_count(),
            indexed = index.len(),
            rejected = rejected.len(),
            "Selected page"
        );

        let effects = self.clear_page();
        self.page_key = Some(key.clone());
        self.index = index;
        self.rejected = rejected;
        Ok(effects)
    }

    /// Move to the next numbered page. `Ok(None)` on the last page.
    pub fn next_page(&mut self) -> Result<Option<Vec<Effect>>, DocumentError> {
        self.step_page(Document::next_ordinal)
    }

    /// Move to the previous numbered page. `Ok(None)` on the first page.
    pub fn prev_page(&mut self) -> Result<Option<Vec<Effect>>, DocumentError> {
        self.step_page(Document::prev_ordinal)
    }

    fn step_page(
        &mut self,
        step: fn(&Document, u32) -> Option<u32>,
    ) -> Result<Option<Vec<Effect>>, DocumentError> {
        let document = self.document.as_ref().ok_or(DocumentError::NotLoaded)?;
        let current = match self.ordinal() {
            Some(n) => n,
            None => {
                let key = self.page_key.as_ref().map(ToString::to_string);
                return Err(DocumentError::InvalidPageKey(key.unwrap_or_default()));
            }
        };
        match step(document, current) {
            Some(ordinal) => self.select_page(ordinal).map(Some),
            None => Ok(None),
        }
    }

    fn clear_page(&mut self) -> Vec<Effect> {
        self.page_key = None;
        self.index = RegionIndex::default();
        self.rejected.clear();
        self.suggestions.clear();
        self.fetches.invalidate();
        self.sort_modes.clear();
        self.show_all.clear();
        self.surface.reset();
        self.highlight.reset()
    }

    pub fn index(&self) -> &RegionIndex {
        &self.index
    }

    /// Lines of the displayed page left out of hit-testing
    pub fn rejected(&self) -> &[RejectedLine] {
        &self.rejected
    }

    // ------------------------------------------------------------------
    // Highlight
    // ------------------------------------------------------------------

    pub fn highlight(&self) -> &HighlightState {
        self.highlight.state()
    }

    pub fn pointer_moved(&mut self, u: f64, v: f64) {
        self.highlight.pointer_moved(u, v);
    }

    /// Whether a pointer move is waiting for the next animation frame
    pub fn needs_animation_frame(&self) -> bool {
        self.highlight.frame_pending()
    }

    pub fn animation_frame(&mut self) -> Vec<Effect> {
        self.highlight.animation_frame(&self.index)
    }

    pub fn pointer_left(&mut self) -> Vec<Effect> {
        self.highlight.pointer_left()
    }

    pub fn page_clicked(&mut self, u: f64, v: f64) -> Vec<Effect> {
        self.highlight.page_clicked(u, v, &self.index)
    }

    pub fn transcript_hovered(&mut self, uid: &LineUid) -> Vec<Effect> {
        self.highlight.transcript_hovered(uid, &self.index)
    }

    pub fn transcript_clicked(&mut self, uid: &LineUid) -> Vec<Effect> {
        self.highlight.transcript_clicked(uid, &self.index)
    }

    pub fn is_collapsed(&self, uid: &LineUid) -> bool {
        self.highlight.is_collapsed(uid)
    }

    /// Page viewport scroll that centres `region` in the current raster.
    /// `None` before the first render.
    pub fn page_scroll_target(
        &self,
        region: &NormalizedBox,
        viewport_width: f64,
        viewport_height: f64,
    ) -> Option<ScrollPosition> {
        let rendered = self.surface.current()?;
        Some(page_scroll(
            region,
            rendered.css_width,
            rendered.css_height,
            viewport_width,
            viewport_height,
        ))
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Set the zoom factor, clamped to the configured range. Returns the
    /// value applied.
    pub fn set_zoom(&mut self, zoom: f64) -> f64 {
        self.zoom = self.config.render.clamp_zoom(zoom);
        self.zoom
    }

    /// Page number the displayed page is rasterized as
    pub fn render_page(&self) -> Result<u32, RenderError> {
        if self.document.is_none() {
            return Err(RenderError::NoDocument);
        }
        let key = self
            .page_key
            .as_ref()
            .ok_or_else(|| RenderError::InvalidTarget("no page selected".to_string()))?;
        Ok(key.require_ordinal()?)
    }

    /// Start rendering the displayed page at the current zoom. Returns
    /// `Ok(None)` when the surface already shows this page at this size.
    ///
    /// The session stays usable while the caller produces the raster; hand
    /// the result to [`ViewerSession::finish_render`]. Starting another
    /// render or changing page in between cancels this job.
    pub fn begin_render(
        &mut self,
        page_count: u32,
        native: PageSize,
        viewport_width: f64,
        scroll: ScrollPosition,
    ) -> Result<Option<RenderJob>, RenderError> {
        let page = self.render_page()?;
        check_page_range(page, page_count)?;
        let request = plan_raster(
            page,
            native,
            viewport_width,
            self.zoom,
            self.config.render.device_pixel_ratio,
        )?;

        if self.surface.current().is_some() && !self.surface.needs_render(&request.key()) {
            debug!(page, "Render skipped, surface is up to date");
            return Ok(None);
        }
        Ok(Some(self.surface.begin(request, scroll)))
    }

    /// Apply the result of a job from [`ViewerSession::begin_render`].
    /// Superseded jobs resolve to [`RenderOutcome::Discarded`].
    pub fn finish_render(
        &mut self,
        job: RenderJob,
        result: Result<Raster, RenderError>,
    ) -> Result<RenderOutcome, RenderError> {
        self.surface.finish(job, result)
    }

    /// Render the displayed page against `source` in one call.
    pub async fn render<S: RasterSource + ?Sized>(
        &mut self,
        source: &S,
        viewport_width: f64,
        scroll: ScrollPosition,
    ) -> Result<Option<RenderOutcome>, RenderError> {
        let page = self.render_page()?;
        let page_count = source.page_count();
        check_page_range(page, page_count)?;
        let native = source.page_size(page).await?;

        let Some(job) = self.begin_render(page_count, native, viewport_width, scroll)? else {
            return Ok(None);
        };
        let result = source.render(&job.request, &job.cancel).await;
        self.finish_render(job, result).map(Some)
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    // ------------------------------------------------------------------
    // Suggestions
    // ------------------------------------------------------------------

    /// Start a suggestion fetch for the displayed page. Any earlier fetch
    /// still in flight becomes stale.
    pub fn begin_suggestion_fetch(&mut self) -> Option<Ticket<PageKey>> {
        let key = self.page_key.clone()?;
        Some(self.fetches.dispatch(key))
    }

    /// Apply the result of a suggestion fetch. Returns `false` when the
    /// ticket is stale and the result was dropped. A failed fetch leaves an
    /// empty list.
    pub fn apply_suggestions(
        &mut self,
        ticket: &Ticket<PageKey>,
        result: Result<Vec<Suggestion>, StoreError>,
    ) -> bool {
        if !self.fetches.complete(ticket) {
            debug!(page = %ticket.key, "Dropping stale suggestion response");
            return false;
        }
        self.suggestions = match result {
            Ok(suggestions) => suggestions,
            Err(err) => {
                warn!(page = %ticket.key, error = %err, "Failed to load suggestions");
                Vec::new()
            }
        };
        true
    }

    /// Fetch and apply suggestions for the displayed page.
    pub async fn refresh_suggestions<S: SuggestionStore + ?Sized>(&mut self, store: &S) -> bool {
        let Some(document_id) = self.document.as_ref().map(|d| d.id.clone()) else {
            return false;
        };
        let Some(ticket) = self.begin_suggestion_fetch() else {
            return false;
        };
        let result = store.list(&document_id, &ticket.key).await;
        self.apply_suggestions(&ticket, result)
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn sort_mode(&self, uid: &LineUid) -> SortMode {
        self.sort_modes
            .get(uid)
            .copied()
            .unwrap_or(self.config.suggestions.default_sort)
    }

    pub fn set_sort_mode(&mut self, uid: &LineUid, mode: SortMode) {
        self.sort_modes.insert(uid.clone(), mode);
    }

    /// Flip "show all" for a line. Returns the new setting.
    pub fn toggle_show_all(&mut self, uid: &LineUid) -> bool {
        if self.show_all.remove(uid) {
            false
        } else {
            self.show_all.insert(uid.clone());
            true
        }
    }

    pub fn is_showing_all(&self, uid: &LineUid) -> bool {
        self.show_all.contains(uid)
    }

    /// Ranked suggestions for one line in its current sort mode
    pub fn ranked(&self, uid: &LineUid) -> RankedLine {
        let entries = self
            .suggestions
            .iter()
            .filter(|s| &s.uid == uid)
            .cloned()
            .collect();
        RankedLine::new(uid.clone(), entries, self.sort_mode(uid))
    }

    /// Ranked suggestions for every line that has any
    pub fn ranked_lines(&self) -> BTreeMap<LineUid, RankedLine> {
        rank_by_line_with(&self.suggestions, |uid| self.sort_mode(uid))
    }

    /// The suggestions to list under a line: the configured cap, or all of
    /// them once "show all" is on.
    pub fn visible_suggestions(&self, uid: &LineUid) -> Vec<Suggestion> {
        let cap = if self.is_showing_all(uid) {
            usize::MAX
        } else {
            self.config.suggestions.visible_per_line
        };
        self.ranked(uid).visible(cap).to_vec()
    }

    /// Validate and store a correction for a line of the displayed page,
    /// then refresh the list.
    pub async fn submit_suggestion<S, I>(
        &mut self,
        store: &S,
        identity: &I,
        uid: &LineUid,
        text: &str,
        comment: Option<&str>,
    ) -> Result<Suggestion, SubmitError>
    where
        S: SuggestionStore + ?Sized,
        I: IdentityProvider + ?Sized,
    {
        let user = identity.current_user();
        let draft = {
            let document = self.document.as_ref().ok_or(SubmitError::NoPage)?;
            let key = self.page_key.as_ref().ok_or(SubmitError::NoPage)?;
            let page = document.pages.get(key).ok_or(SubmitError::NoPage)?;
            validate_suggestion(user.as_ref(), &document.id, key, page, uid, text, comment)?
        };

        let suggestion = draft.into_suggestion(Utc::now());
        store.insert(suggestion.clone()).await?;
        info!(id = %suggestion.id, uid = %uid, "Suggestion submitted");

        self.refresh_suggestions(store).await;
        Ok(suggestion)
    }

    /// Cast, change or withdraw (`0`) the signed-in user's vote, then
    /// refresh the list.
    pub async fn vote<S, I>(
        &mut self,
        store: &S,
        identity: &I,
        suggestion_id: Uuid,
        value: i32,
    ) -> Result<(), SubmitError>
    where
        S: SuggestionStore + ?Sized,
        I: IdentityProvider + ?Sized,
    {
        let vote = validate_vote(identity.current_user().as_ref(), suggestion_id, value)?;
        store.upsert_vote(vote).await?;
        self.refresh_suggestions(store).await;
        Ok(())
    }

    /// Leaderboard for the open document. Store failures yield an empty
    /// board; a failed profile lookup falls back to username snapshots.
    pub async fn leaderboard<S, I>(&self, store: &S, identity: &I) -> Vec<LeaderboardRow>
    where
        S: SuggestionStore + ?Sized,
        I: IdentityProvider + ?Sized,
    {
        let Some(document) = self.document.as_ref() else {
            return Vec::new();
        };

        let fetched = async {
            let suggestions = store.list_document(&document.id).await?;
            let votes: VoteBook = store.votes(&document.id).await?.into_iter().collect();
            Ok::<_, StoreError>((suggestions, votes))
        };
        let (suggestions, votes) = match fetched.await {
            Ok(data) => data,
            Err(err) => {
                warn!(document = %document.id, error = %err, "Failed to load leaderboard");
                return Vec::new();
            }
        };

        let mut authors: Vec<String> = suggestions.iter().map(|s| s.author_id.clone()).collect();
        authors.sort();
        authors.dedup();
        let profiles = identity.usernames(&authors).await.unwrap_or_else(|err| {
            warn!(error = %err, "Profile lookup failed, using username snapshots");
            HashMap::new()
        });

        leaderboard(
            &suggestions,
            &votes,
            &profiles,
            self.config.suggestions.leaderboard_options(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySuggestionStore, StaticIdentity};
    use crate::submit::CurrentUser;
    use crate::suggestions::fixtures::{at, suggestion};
    use crate::sync::HighlightSource;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "id": "doc-1",
        "title": "Parish register",
        "pages": {
            "doc_page_2": {
                "width": 1000, "height": 2000,
                "paragraphs": [{"lines": [
                    {"transcription": "second page", "bbox": [100, 100, 400, 140]}
                ]}]
            },
            "doc_page_1": {
                "width": 1000, "height": 2000,
                "paragraphs": [{"lines": [
                    {"transcription": "Baptisms 1791", "bbox": [100, 50, 300, 90]},
                    {"transcription": "John Smith", "bbox": [100, 100, 300, 140]},
                    {"transcription": "whole page", "bbox": [0, 0, 999, 1999]}
                ]}]
            }
        }
    }"#;

    fn session() -> ViewerSession {
        let mut session = ViewerSession::default();
        session.open(Document::from_json(DOC).unwrap()).unwrap();
        session
    }

    fn reader() -> CurrentUser {
        CurrentUser {
            id: "reader".into(),
            email: None,
            username: Some("Reader".into()),
        }
    }

    #[test]
    fn test_open_selects_first_numbered_page() {
        let session = session();
        assert_eq!(session.ordinal(), Some(1));
        assert_eq!(session.index().len(), 2);
        assert_eq!(session.rejected().len(), 1);
        assert_eq!(session.transcript().len(), 3);
    }

    #[test]
    fn test_navigation() {
        let mut session = session();
        assert!(session.prev_page().unwrap().is_none());
        assert!(session.next_page().unwrap().is_some());
        assert_eq!(session.ordinal(), Some(2));
        assert!(session.next_page().unwrap().is_none());
        assert!(matches!(
            session.select_page(9),
            Err(DocumentError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_navigation_without_document() {
        let mut session = ViewerSession::default();
        assert_eq!(session.select_page(1), Err(DocumentError::NotLoaded));
        assert_eq!(session.next_page(), Err(DocumentError::NotLoaded));
    }

    #[test]
    fn test_page_change_clears_highlight() {
        let mut session = session();
        session.pointer_moved(0.15, 0.035);
        let effects = session.animation_frame();
        assert!(!effects.is_empty());
        assert_eq!(session.highlight().source, Some(HighlightSource::Page));

        let effects = session.select_page(2).unwrap();
        assert_eq!(effects, vec![Effect::Highlight { region: None }]);
        assert_eq!(session.highlight(), &HighlightState::default());
    }

    #[test]
    fn test_stale_suggestions_are_dropped() {
        let mut session = session();
        let stale = session.begin_suggestion_fetch().unwrap();
        session.select_page(2).unwrap();
        let fresh = session.begin_suggestion_fetch().unwrap();

        let rows = vec![suggestion(1, "0-0", "a", 1, at(10, 0))];
        assert!(!session.apply_suggestions(&stale, Ok(rows.clone())));
        assert!(session.suggestions().is_empty());
        assert!(session.apply_suggestions(&fresh, Ok(rows)));
        assert_eq!(session.suggestions().len(), 1);
    }

    #[test]
    fn test_failed_fetch_resets_to_empty() {
        let mut session = session();
        let ticket = session.begin_suggestion_fetch().unwrap();
        session.apply_suggestions(&ticket, Ok(vec![suggestion(1, "0-0", "a", 0, at(9, 0))]));

        let ticket = session.begin_suggestion_fetch().unwrap();
        assert!(session.apply_suggestions(
            &ticket,
            Err(StoreError::Unavailable("offline".into()))
        ));
        assert!(session.suggestions().is_empty());
    }

    #[test]
    fn test_visible_cap_and_show_all() {
        let mut session = session();
        let uid = LineUid::from("0-0");
        let rows = (0..7)
            .map(|n| suggestion(n, "0-0", "a", n as i64, at(9, n as u32)))
            .collect();
        let ticket = session.begin_suggestion_fetch().unwrap();
        session.apply_suggestions(&ticket, Ok(rows));

        assert_eq!(session.visible_suggestions(&uid).len(), 5);
        assert_eq!(session.ranked(&uid).hidden_count(5), 2);
        assert!(session.toggle_show_all(&uid));
        assert_eq!(session.visible_suggestions(&uid).len(), 7);
        assert!(!session.toggle_show_all(&uid));

        assert_eq!(session.sort_mode(&uid), SortMode::Top);
        assert_eq!(session.visible_suggestions(&uid)[0].vote_count, 6);
        session.set_sort_mode(&uid, SortMode::Newest);
        assert_eq!(session.ranked_lines()[&uid].mode, SortMode::Newest);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut session = session();
        assert_eq!(session.set_zoom(100.0), 4.0);
        assert_eq!(session.set_zoom(0.5), 0.5);
        assert_eq!(session.zoom(), 0.5);
    }

    #[tokio::test]
    async fn test_signed_out_submit_makes_no_store_call() {
        let mut session = session();
        let store = MemorySuggestionStore::new();
        // An offline store would fail any call that got through
        store.set_offline(true);

        let err = session
            .submit_suggestion(
                &store,
                &StaticIdentity::signed_out(),
                &LineUid::from("0-0"),
                "Baptisms 1792",
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::NotSignedIn);
    }

    #[tokio::test]
    async fn test_submit_and_vote_refresh_list() {
        let mut session = session();
        let store = MemorySuggestionStore::new();
        let identity = StaticIdentity::signed_in(reader());
        let uid = LineUid::from("0-0");

        let created = session
            .submit_suggestion(&store, &identity, &uid, "Baptisms 1792", Some("ink blot"))
            .await
            .unwrap();
        assert_eq!(session.suggestions().len(), 1);

        session.vote(&store, &identity, created.id, 1).await.unwrap();
        assert_eq!(session.ranked(&uid).best().map(|s| s.vote_count), Some(1));

        let board = session.leaderboard(&store, &identity).await;
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].display_name, "Reader");
    }

    #[tokio::test]
    async fn test_leaderboard_store_failure_is_empty() {
        let session = session();
        let store = MemorySuggestionStore::new();
        store.set_offline(true);
        let board = session
            .leaderboard(&store, &StaticIdentity::signed_out())
            .await;
        assert!(board.is_empty());
    }
}
