//! End-to-end viewer flow against the in-memory collaborators

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use uuid::Uuid;

use folio_core::coords::dom_to_unit;
use folio_core::render::{
    CancelToken, PageSize, Raster, RasterRequest, RenderOutcome, ScrollPosition,
};
use folio_core::store::{
    MemoryDocumentStore, MemorySuggestionStore, StaticIdentity, SuggestionStore,
};
use folio_core::submit::CurrentUser;
use folio_core::{
    Document, DocumentError, Effect, HighlightSource, LineUid, PageKey, RasterSource, Rejection,
    RenderError, SortMode, SubmitError, Suggestion, ViewerConfig, ViewerSession, Vote, VoteBook,
};

const REGISTER: &str = r#"{
    "title": "Parish register 1791",
    "pages": {
        "register_page_1": {
            "width": 1000, "height": 2000,
            "paragraphs": [
                {"lines": [
                    {"transcription": "Baptisms 1791", "bbox": [100, 50, 300, 90]},
                    {"transcription": "January", "bbox": [100, 100, 250, 140]}
                ]},
                {"lines": [
                    {"transcription": "John son of William Smith", "bbox": [100, 200, 800, 240]},
                    {"transcription": "[margin note]"},
                    {"transcription": "scan border", "bbox": [0, 0, 999, 1999]}
                ]},
                {"lines": [
                    {"transcription": "column", "bbox": [80, 180, 900, 560]}
                ]}
            ]
        },
        "register_page_2": {
            "width": 1000, "height": 2000,
            "paragraphs": [{"lines": [
                {"transcription": "Burials 1791", "bbox": [100, 50, 300, 90]}
            ]}]
        },
        "register_cover": {
            "width": 1000, "height": 2000,
            "paragraphs": []
        }
    }
}"#;

/// Raster source with 500x1000 pages that draws blank bitmaps
struct BlankPages {
    pages: u32,
}

#[async_trait]
impl RasterSource for BlankPages {
    fn page_count(&self) -> u32 {
        self.pages
    }

    async fn page_size(&self, _page: u32) -> Result<PageSize, RenderError> {
        Ok(PageSize {
            width: 500.0,
            height: 1000.0,
        })
    }

    async fn render(
        &self,
        request: &RasterRequest,
        cancel: &CancelToken,
    ) -> Result<Raster, RenderError> {
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        Ok(Raster {
            page: request.page,
            width: request.bitmap_width,
            height: request.bitmap_height,
            pixels: Vec::new(),
        })
    }
}

/// Raster source whose worker always fails
struct BrokenPages;

#[async_trait]
impl RasterSource for BrokenPages {
    fn page_count(&self) -> u32 {
        2
    }

    async fn page_size(&self, _page: u32) -> Result<PageSize, RenderError> {
        Ok(PageSize {
            width: 500.0,
            height: 1000.0,
        })
    }

    async fn render(
        &self,
        _request: &RasterRequest,
        _cancel: &CancelToken,
    ) -> Result<Raster, RenderError> {
        Err(RenderError::Raster("worker crashed".to_string()))
    }
}

fn blank(request: &RasterRequest) -> Raster {
    Raster {
        page: request.page,
        width: request.bitmap_width,
        height: request.bitmap_height,
        pixels: Vec::new(),
    }
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, minute, 0).unwrap()
}

fn suggestion(n: u128, uid: &str, author: &str, created: DateTime<Utc>) -> Suggestion {
    Suggestion {
        id: Uuid::from_u128(n),
        document_id: "register".to_string(),
        page_key: PageKey::from("register_page_1"),
        uid: LineUid::from(uid),
        suggested_text: format!("reading {}", n),
        comment: None,
        author_id: author.to_string(),
        author_username: Some(format!("{} (old)", author)),
        created_at: created,
        vote_count: 0,
    }
}

fn upvote(n: u128, voter: &str) -> Vote {
    Vote {
        suggestion_id: Uuid::from_u128(n),
        voter_id: voter.to_string(),
        value: 1,
    }
}

async fn open_register() -> ViewerSession {
    let mut documents = MemoryDocumentStore::new();
    documents.insert("register", Document::from_json(REGISTER).unwrap());

    let mut session = ViewerSession::new(ViewerConfig::default());
    session.load_document(&documents, "register").await.unwrap();
    session
}

fn seeded_store() -> MemorySuggestionStore {
    let suggestions = vec![
        suggestion(1, "0-0", "alice", at(10, 0)),
        suggestion(2, "0-0", "bob", at(10, 5)),
        suggestion(3, "0-0", "alice", at(10, 10)),
    ];
    let votes: VoteBook = vec![
        upvote(1, "v1"),
        upvote(1, "v2"),
        upvote(1, "v3"),
        upvote(2, "v1"),
        upvote(2, "v2"),
        upvote(2, "v3"),
        upvote(3, "v1"),
        // Repeated vote replaces the earlier row
        upvote(3, "v1"),
        Vote {
            suggestion_id: Uuid::from_u128(2),
            voter_id: "v4".to_string(),
            value: -1,
        },
        Vote {
            suggestion_id: Uuid::from_u128(1),
            voter_id: "v4".to_string(),
            value: 0,
        },
    ]
    .into_iter()
    .collect();
    MemorySuggestionStore::with_data(suggestions, votes)
}

#[tokio::test]
async fn test_load_indexes_first_page() {
    let session = open_register().await;

    assert_eq!(session.page_key(), Some(&PageKey::from("register_page_1")));
    // Missing box and whole-page box are left out of hit-testing
    let rejected: Vec<&str> = session
        .rejected()
        .iter()
        .map(|r| r.uid.as_str())
        .collect();
    assert_eq!(rejected, vec!["1-1", "1-2"]);
    assert_eq!(session.index().len(), 4);
    // Lines without a usable box still appear in the transcript
    assert_eq!(session.transcript().len(), 6);
}

#[tokio::test]
async fn test_missing_document() {
    let documents = MemoryDocumentStore::new();
    let mut session = ViewerSession::default();
    let err = session
        .load_document(&documents, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::Fetch(_)));
}

#[tokio::test]
async fn test_pointer_highlights_smallest_line() {
    let mut session = open_register().await;

    // Pointer over the Smith entry, which also lies inside the column box
    let (u, v) = dom_to_unit(250.0, 110.0, 500.0, 1000.0).unwrap();
    session.pointer_moved(0.9, 0.9);
    session.pointer_moved(u, v);
    let effects = session.animation_frame();

    let smith = LineUid::from("1-0");
    assert_eq!(session.highlight().active.as_ref(), Some(&smith));
    assert_eq!(session.highlight().source, Some(HighlightSource::Page));
    assert!(effects.contains(&Effect::ScrollTranscript { uid: smith.clone() }));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::ScrollPage { .. })));

    // Same line again: no new effects
    session.pointer_moved(u + 0.001, v);
    assert!(session.animation_frame().is_empty());

    // Empty area keeps the highlight
    session.pointer_moved(0.99, 0.99);
    assert!(session.animation_frame().is_empty());
    assert_eq!(session.highlight().active.as_ref(), Some(&smith));

    assert_eq!(
        session.pointer_left(),
        vec![Effect::Highlight { region: None }]
    );
}

#[tokio::test]
async fn test_transcript_hover_scrolls_page_only_with_box() {
    let mut session = open_register().await;

    let effects = session.transcript_hovered(&LineUid::from("0-1"));
    assert_eq!(session.highlight().source, Some(HighlightSource::Transcript));
    assert!(effects
        .iter()
        .any(|e| matches!(e, Effect::ScrollPage { region } if region.uid.as_str() == "0-1")));
    assert!(!effects
        .iter()
        .any(|e| matches!(e, Effect::ScrollTranscript { .. })));

    // Line without a box: highlight cleared on the page, no page scroll
    let effects = session.transcript_clicked(&LineUid::from("1-1"));
    assert_eq!(effects, vec![Effect::Highlight { region: None }]);
}

#[tokio::test]
async fn test_second_click_collapses_suggestions() {
    let mut session = open_register().await;
    let smith = LineUid::from("1-0");
    assert!(session.is_collapsed(&smith));

    let first = session.page_clicked(0.5, 0.11);
    assert!(first.contains(&Effect::SuggestionsToggled {
        uid: smith.clone(),
        collapsed: false,
    }));
    assert!(first.contains(&Effect::RevealSuggestions { uid: smith.clone() }));

    let second = session.page_clicked(0.5, 0.11);
    assert!(second.contains(&Effect::SuggestionsToggled {
        uid: smith.clone(),
        collapsed: true,
    }));
    assert!(session.is_collapsed(&smith));
}

#[tokio::test]
async fn test_render_and_rerender_on_zoom() {
    let mut session = open_register().await;
    let source = BlankPages { pages: 2 };

    let outcome = session
        .render(&source, 800.0, ScrollPosition::default())
        .await
        .unwrap();
    let Some(RenderOutcome::Rendered(page)) = outcome else {
        panic!("expected a rendered page, got {:?}", outcome);
    };
    assert_eq!(page.css_width, 800.0);
    assert_eq!(page.css_height, 1600.0);
    assert_eq!(page.scroll, None);

    // Nothing changed
    assert_eq!(
        session
            .render(&source, 800.0, ScrollPosition::default())
            .await
            .unwrap(),
        None
    );

    session.set_zoom(2.0);
    let outcome = session
        .render(
            &source,
            800.0,
            ScrollPosition {
                left: 0.0,
                top: 400.0,
            },
        )
        .await
        .unwrap();
    let Some(RenderOutcome::Rendered(page)) = outcome else {
        panic!("expected a rendered page, got {:?}", outcome);
    };
    let scroll = page.scroll.unwrap();
    assert!((scroll.top - 800.0).abs() < 1e-9);

    let smith = session
        .index()
        .get(&LineUid::from("1-0"))
        .cloned()
        .unwrap();
    assert!(session.page_scroll_target(&smith, 800.0, 600.0).is_some());
}

#[tokio::test]
async fn test_render_unnumbered_page_fails() {
    let mut session = open_register().await;
    session
        .select_page_key(&PageKey::from("register_cover"))
        .unwrap();
    let err = session
        .render(&BlankPages { pages: 2 }, 800.0, ScrollPosition::default())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::Document(DocumentError::InvalidPageKey("register_cover".to_string()))
    );

    let err = ViewerSession::default()
        .render(&BlankPages { pages: 2 }, 800.0, ScrollPosition::default())
        .await
        .unwrap_err();
    assert_eq!(err, RenderError::NoDocument);
}

#[tokio::test]
async fn test_failed_render_is_retried_on_new_page() {
    let mut session = open_register().await;
    let source = BlankPages { pages: 2 };
    session
        .render(&source, 800.0, ScrollPosition::default())
        .await
        .unwrap();

    session.select_page(2).unwrap();
    assert!(session.surface().current().is_none());

    let err = session
        .render(&BrokenPages, 800.0, ScrollPosition::default())
        .await
        .unwrap_err();
    assert_eq!(err, RenderError::Raster("worker crashed".to_string()));

    let outcome = session
        .render(&source, 800.0, ScrollPosition::default())
        .await
        .unwrap();
    let Some(RenderOutcome::Rendered(page)) = outcome else {
        panic!("expected a rendered page, got {:?}", outcome);
    };
    assert_eq!(page.raster.page, 2);
    assert_eq!(session.surface().current().unwrap().raster.page, 2);
}

#[tokio::test]
async fn test_late_render_for_previous_page_is_discarded() {
    let mut session = open_register().await;
    let native = PageSize {
        width: 500.0,
        height: 1000.0,
    };

    let first = session
        .begin_render(2, native, 800.0, ScrollPosition::default())
        .unwrap()
        .unwrap();
    assert_eq!(first.request.page, 1);

    // Hit-testing keeps working while the raster is produced
    session.pointer_moved(0.2, 0.035);
    assert!(session.needs_animation_frame());
    assert!(!session.animation_frame().is_empty());
    assert_eq!(session.highlight().active, Some(LineUid::from("0-0")));

    session.next_page().unwrap();
    assert!(first.cancel.is_cancelled());
    let second = session
        .begin_render(2, native, 800.0, ScrollPosition::default())
        .unwrap()
        .unwrap();
    assert_eq!(second.request.page, 2);

    let late = blank(&first.request);
    assert_eq!(
        session.finish_render(first, Ok(late)),
        Ok(RenderOutcome::Discarded)
    );
    assert!(session.surface().current().is_none());

    let fresh = blank(&second.request);
    let RenderOutcome::Rendered(page) = session.finish_render(second, Ok(fresh)).unwrap() else {
        panic!("expected a rendered page");
    };
    assert_eq!(page.raster.page, 2);
    assert!(session
        .begin_render(2, native, 800.0, ScrollPosition::default())
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_begin_render_checks_page_range() {
    let mut session = open_register().await;
    session.select_page(2).unwrap();
    let native = PageSize {
        width: 500.0,
        height: 1000.0,
    };
    let err = session
        .begin_render(1, native, 800.0, ScrollPosition::default())
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::PageOutOfRange {
            page: 2,
            page_count: 1
        }
    );
    assert!(!session.surface().is_rendering());
}

#[test]
fn test_malformed_line_geometry_is_excluded() {
    let document = Document::from_json(
        r#"{"pages": {"ledger_page_1": {
            "width": 1000, "height": 2000,
            "paragraphs": [{"lines": [
                {"transcription": "Baptisms 1791", "bbox": [100, 50, 300, 90]},
                {"transcription": "smudged", "bbox": [100, null, 300, 90]},
                {"transcription": "cropped", "bbox": [100, 200, 300]}
            ]}]
        }}}"#,
    )
    .unwrap();

    let mut session = ViewerSession::default();
    session.open(document).unwrap();

    assert_eq!(session.index().len(), 1);
    assert_eq!(session.index().pick(0.2, 0.035), Some(&LineUid::from("0-0")));
    let reasons: Vec<(&str, Rejection)> = session
        .rejected()
        .iter()
        .map(|r| (r.uid.as_str(), r.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![("0-1", Rejection::NonFinite), ("0-2", Rejection::NonFinite)]
    );
    assert_eq!(session.transcript().len(), 3);
}

#[tokio::test]
async fn test_ranking_and_leaderboard() {
    let mut session = open_register().await;
    let store = seeded_store();
    let identity = StaticIdentity {
        profiles: HashMap::from([("bob".to_string(), "Robert".to_string())]),
        ..StaticIdentity::signed_out()
    };

    assert!(session.refresh_suggestions(&store).await);
    let uid = LineUid::from("0-0");

    // 1: 3 votes at 10:00, 2: 3-1 = 2 net at 10:05, 3: 1 vote at 10:10
    let ranked: Vec<u128> = session
        .visible_suggestions(&uid)
        .iter()
        .map(|s| s.id.as_u128())
        .collect();
    assert_eq!(ranked, vec![1, 2, 3]);

    session.set_sort_mode(&uid, SortMode::Newest);
    let ranked: Vec<u128> = session
        .visible_suggestions(&uid)
        .iter()
        .map(|s| s.id.as_u128())
        .collect();
    assert_eq!(ranked, vec![3, 2, 1]);

    let board = session.leaderboard(&store, &identity).await;
    let rows: Vec<(&str, &str, u64)> = board
        .iter()
        .map(|r| (r.author_id.as_str(), r.display_name.as_str(), r.upvotes))
        .collect();
    // alice: 3 on #1 and 1 on #3; bob: 3 on #2, the downvote does not count
    assert_eq!(
        rows,
        vec![("alice", "alice (old)", 4), ("bob", "Robert", 3)]
    );
}

#[tokio::test]
async fn test_leaderboard_survives_profile_outage() {
    let session = open_register().await;
    let store = seeded_store();
    let identity = StaticIdentity {
        profiles_unavailable: true,
        ..StaticIdentity::signed_out()
    };
    let board = session.leaderboard(&store, &identity).await;
    assert_eq!(board[1].display_name, "bob (old)");
}

#[tokio::test]
async fn test_suggestion_failures_leave_viewer_usable() {
    let mut session = open_register().await;
    let store = seeded_store();
    session.refresh_suggestions(&store).await;
    assert_eq!(session.suggestions().len(), 3);

    store.set_offline(true);
    assert!(session.refresh_suggestions(&store).await);
    assert!(session.suggestions().is_empty());

    // Hit-testing is unaffected
    assert!(!session.page_clicked(0.15, 0.035).is_empty());
}

#[tokio::test]
async fn test_submission_gate() {
    let mut session = open_register().await;
    let store = MemorySuggestionStore::new();
    let identity = StaticIdentity::signed_in(CurrentUser {
        id: "0f8fad5b-d9cb-469f-a165-70867728950e".to_string(),
        email: Some("reader@example.org".to_string()),
        username: None,
    });
    let uid = LineUid::from("0-0");

    let err = session
        .submit_suggestion(&store, &identity, &uid, "Baptisms 1791", None)
        .await
        .unwrap_err();
    assert_eq!(err, SubmitError::UnchangedTranscription);

    let created = session
        .submit_suggestion(&store, &identity, &uid, "Baptisms 1792", None)
        .await
        .unwrap();
    assert_eq!(session.suggestions(), &[created.clone()][..]);

    let err = session
        .vote(&store, &identity, created.id, 5)
        .await
        .unwrap_err();
    assert_eq!(err, SubmitError::InvalidVote(5));

    session.vote(&store, &identity, created.id, 1).await.unwrap();
    session.vote(&store, &identity, created.id, 1).await.unwrap();
    assert_eq!(session.suggestions()[0].vote_count, 1);

    let board = session.leaderboard(&store, &identity).await;
    assert_eq!(board[0].display_name, "user-0f8fad5b");
}

#[tokio::test]
async fn test_navigation_drops_in_flight_fetch() {
    let mut session = open_register().await;
    let store = seeded_store();

    let ticket = session.begin_suggestion_fetch().unwrap();
    session.next_page().unwrap();
    assert_eq!(session.ordinal(), Some(2));

    let late = store.list("register", &ticket.key).await;
    assert!(!session.apply_suggestions(&ticket, late));
    assert!(session.suggestions().is_empty());
}
