//! Per-document reader session
//!
//! Orchestrates the engine components over one document view: load gating,
//! render sequencing, overlap policy, the bookmark lifecycle, and hover
//! dispatch. All view access goes through one mutex, so engine operations
//! are serialized per document the way a UI event loop would serialize
//! them.
//!
//! Rendering never starts before both the document content and the
//! annotation list have arrived (and the bookmark, for its own marker);
//! the content's text must not change once rendering begins. A re-render
//! always runs the full remove-then-apply sequence, which makes it
//! idempotent.
//!
//! Store collaborators are notified fire-and-forget after the local view
//! mutation completes; a store failure is logged and the local markers are
//! kept.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::anchor::{self, CharacterRange, Highlight};
use crate::annotations::{Annotation, AnnotationStore, Bookmark, BookmarkStore, StoreError};
use crate::bookmark::{render_bookmark, BookmarkError, BookmarkState};
use crate::error::{EngineError, Result};
use crate::hover::{self, PointerEvent};
use crate::marker::{self, MarkerError};
use crate::overlap::{self, OverlapPolicy};
use crate::view::{parse_document, DocumentView, Selection};

/// What became of a highlight request
#[derive(Debug, Clone)]
pub enum HighlightOutcome {
    /// A fresh annotation was created from the selection
    Created(Annotation),
    /// The selection merged into an existing annotation, which now carries
    /// the union span; `absorbed` lists annotations deleted by the merge
    Merged {
        annotation: Annotation,
        absorbed: Vec<Uuid>,
    },
    /// Overlap under the reject policy; the selection was collapsed and
    /// nothing was created
    Rejected { conflicting: Uuid },
    /// No usable selection; nothing to do
    NoSelection,
    /// The selection strayed outside the content root; collapsed and
    /// ignored
    OutOfScope,
}

#[derive(Default)]
struct SessionInner {
    view: Option<DocumentView>,
    annotations: Option<Vec<Annotation>>,
    bookmark: Option<Bookmark>,
    bookmark_fetched: bool,
    bookmark_state: BookmarkState,
}

/// One reader's session over one document
pub struct ReaderSession {
    document: String,
    policy: OverlapPolicy,
    annotation_store: Arc<dyn AnnotationStore>,
    bookmark_store: Arc<dyn BookmarkStore>,
    inner: Mutex<SessionInner>,
}

impl ReaderSession {
    pub fn new(
        document: &str,
        policy: OverlapPolicy,
        annotation_store: Arc<dyn AnnotationStore>,
        bookmark_store: Arc<dyn BookmarkStore>,
    ) -> Self {
        Self {
            document: document.to_string(),
            policy,
            annotation_store,
            bookmark_store,
            inner: Mutex::new(SessionInner::default()),
        }
    }

    /// The document this session reads
    pub fn document(&self) -> &str {
        &self.document
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Accept rendered content from the document provider
    pub fn set_content(&self, markup: &str) -> Result<()> {
        let view = parse_document(markup)?;
        let mut inner = self.inner.lock();
        inner.view = Some(view);
        self.render(&mut inner)
    }

    /// Accept the fetched annotation list
    pub fn set_annotations(&self, annotations: Vec<Annotation>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.annotations = Some(annotations);
        self.render(&mut inner)
    }

    /// Accept the fetched bookmark. `None` means the reader has none yet;
    /// one is synthesized at the current caret and persisted.
    pub fn set_bookmark(&self, bookmark: Option<Bookmark>) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.bookmark_fetched = true;
        inner.bookmark = bookmark;
        self.render(&mut inner)
    }

    /// Render whatever is ready. Idempotent: every marker is removed
    /// before it is applied, so re-running after any fetch is safe.
    fn render(&self, inner: &mut SessionInner) -> Result<()> {
        let SessionInner {
            view,
            annotations,
            bookmark,
            bookmark_fetched,
            bookmark_state,
        } = inner;

        if let (Some(view), Some(annotations)) = (view.as_mut(), annotations.as_ref()) {
            debug!(
                document = %self.document,
                count = annotations.len(),
                "rendering annotations"
            );
            for annotation in annotations {
                let id = annotation.marker_id();
                marker::remove_marker(view, &id);
                anchor::apply_range(view, &annotation.highlight)?;
                let fragments = marker::apply_marker(view, &id)?;
                if fragments.is_empty() {
                    debug_assert!(false, "stored annotation covers no rendered text");
                    return Err(MarkerError::EmptyMarkerResult.into());
                }
            }
            view.collapse_selection_to_end();
        }

        if *bookmark_fetched {
            if let Some(view) = view.as_mut() {
                if bookmark.is_none() {
                    // First read of this document: anchor a caret bookmark
                    // wherever the reader is (or the start)
                    let highlight = match view.selection() {
                        Some(_) => anchor::capture_caret(view)
                            .unwrap_or_else(|_| Highlight::collapsed(0)),
                        None => Highlight::collapsed(0),
                    };
                    let created = Bookmark::new(&self.document, highlight);
                    debug!(document = %self.document, "creating bookmark");
                    self.report_store_result(
                        "bookmark create",
                        self.bookmark_store.create(&created),
                    );
                    *bookmark = Some(created);
                }
                let stored = bookmark.as_ref().expect("bookmark ensured above");
                if stored.document == self.document {
                    *bookmark_state = BookmarkState::Rendering;
                    match render_bookmark(view, &stored.highlight) {
                        Ok(fragments) => {
                            debug!(fragments = fragments.len(), "bookmark rendered");
                            *bookmark_state = BookmarkState::Rendered;
                        }
                        Err(BookmarkError::EmptyDocument | BookmarkError::NotRenderable) => {
                            // Best effort: reading works without the marker
                            warn!(document = %self.document, "bookmark position not renderable");
                            *bookmark_state = BookmarkState::Rendered;
                        }
                        Err(other) => return Err(other.into()),
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Set the live selection from normalized offsets, standing in for the
    /// platform selection the surrounding UI hands over
    pub fn select(&self, range: CharacterRange) -> Result<()> {
        let mut inner = self.inner.lock();
        let view = inner.view.as_mut().ok_or(EngineError::NotLoaded)?;
        anchor::apply_range(view, &Highlight::new(range, false))?;
        Ok(())
    }

    /// Set the live selection from raw tree positions (e.g. a click the UI
    /// resolved against its own node handles)
    pub fn select_positions(&self, selection: Selection) -> Result<()> {
        let mut inner = self.inner.lock();
        let view = inner.view.as_mut().ok_or(EngineError::NotLoaded)?;
        view.set_selection(selection);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------

    /// Turn the live selection into an annotation under a fresh identifier
    pub fn highlight_selection(&self) -> Result<HighlightOutcome> {
        self.highlight_selection_as(Uuid::new_v4())
    }

    /// Turn the live selection into an annotation under a caller-chosen
    /// identifier. Pre-checks collapse and scope, then resolves overlap
    /// under the session policy.
    pub fn highlight_selection_as(&self, id: Uuid) -> Result<HighlightOutcome> {
        let mut inner = self.inner.lock();
        let SessionInner {
            view, annotations, ..
        } = &mut *inner;
        let view = view.as_mut().ok_or(EngineError::NotLoaded)?;
        let annotations = annotations.as_mut().ok_or(EngineError::NotLoaded)?;

        let Some(selection) = view.selection() else {
            return Ok(HighlightOutcome::NoSelection);
        };
        if selection.is_collapsed() {
            return Ok(HighlightOutcome::NoSelection);
        }
        if !anchor::is_selection_in_content_root(view) {
            view.collapse_selection_to_end();
            return Ok(HighlightOutcome::OutOfScope);
        }

        let candidate = match anchor::capture_range(view) {
            Ok(candidate) => candidate,
            // Structurally distinct endpoints can still collapse in text
            // space (e.g. both inside one collapsed whitespace run)
            Err(anchor::AnchorError::CollapsedSelection) => {
                view.collapse_selection_to_end();
                return Ok(HighlightOutcome::NoSelection);
            }
            Err(err) => return Err(err.into()),
        };

        let hit = overlap::find_overlap(&candidate, annotations).map(|a| (a.id, a.highlight));
        match hit {
            None => {
                let marker_id = id.to_string();
                let fragments = marker::apply_marker(view, &marker_id)?;
                if fragments.is_empty() {
                    // Selection over unrendered whitespace only; nothing
                    // visible to anchor to
                    debug!(document = %self.document, "selection covers no renderable text");
                    view.collapse_selection_to_end();
                    return Ok(HighlightOutcome::NoSelection);
                }
                view.collapse_selection_to_end();
                let annotation = Annotation::with_id(id, candidate);
                annotations.push(annotation.clone());
                self.report_store_result(
                    "annotation create",
                    self.annotation_store.create(&annotation),
                );
                debug!(annotation = %annotation.id, "annotation created");
                Ok(HighlightOutcome::Created(annotation))
            }
            Some((survivor_id, survivor_highlight)) => match self.policy {
                OverlapPolicy::Reject => {
                    view.collapse_selection_to_end();
                    debug!(conflicting = %survivor_id, "selection rejected on overlap");
                    Ok(HighlightOutcome::Rejected {
                        conflicting: survivor_id,
                    })
                }
                OverlapPolicy::Merge => {
                    // Union with the survivor, then keep absorbing anything
                    // the widening span reaches
                    let mut merged = overlap::merge_highlights(&candidate, &survivor_highlight);
                    let mut absorbed: Vec<Uuid> = Vec::new();
                    loop {
                        let next = annotations
                            .iter()
                            .find(|a| {
                                a.id != survivor_id
                                    && !absorbed.contains(&a.id)
                                    && overlap::ranges_overlap(
                                        &merged.character_range,
                                        &a.highlight.character_range,
                                    )
                            })
                            .map(|a| (a.id, a.highlight));
                        match next {
                            Some((next_id, next_highlight)) => {
                                merged = overlap::merge_highlights(&merged, &next_highlight);
                                absorbed.push(next_id);
                            }
                            None => break,
                        }
                    }
                    // The union keeps the survivor's drag direction
                    let merged = Highlight::new(merged.character_range, survivor_highlight.backward);

                    // An absorbed annotation's record is always deleted;
                    // leaving it would strand a duplicate range
                    for absorbed_id in &absorbed {
                        marker::remove_marker(view, &absorbed_id.to_string());
                        annotations.retain(|a| a.id != *absorbed_id);
                        self.report_store_result(
                            "annotation delete",
                            self.annotation_store.delete(*absorbed_id),
                        );
                    }

                    marker::remove_marker(view, &survivor_id.to_string());
                    anchor::apply_range(view, &merged)?;
                    let fragments = marker::apply_marker(view, &survivor_id.to_string())?;
                    if fragments.is_empty() {
                        debug_assert!(false, "merged span covers no rendered text");
                        return Err(MarkerError::EmptyMarkerResult.into());
                    }
                    view.collapse_selection_to_end();

                    let annotation = {
                        let survivor = annotations
                            .iter()
                            .find(|a| a.id == survivor_id)
                            .expect("survivor is in the list");
                        survivor.with_highlight(merged)
                    };
                    if let Some(slot) = annotations.iter_mut().find(|a| a.id == survivor_id) {
                        *slot = annotation.clone();
                    }
                    self.report_store_result(
                        "annotation update",
                        self.annotation_store.update(&annotation),
                    );
                    debug!(
                        annotation = %annotation.id,
                        absorbed = absorbed.len(),
                        "annotations merged"
                    );
                    Ok(HighlightOutcome::Merged {
                        annotation,
                        absorbed,
                    })
                }
            },
        }
    }

    /// Delete an annotation: its markers, its record, and (fire-and-forget)
    /// its stored copy. Returns whether a record was removed.
    pub fn delete_annotation(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock();
        let SessionInner {
            view, annotations, ..
        } = &mut *inner;
        let view = view.as_mut().ok_or(EngineError::NotLoaded)?;
        let annotations = annotations.as_mut().ok_or(EngineError::NotLoaded)?;

        marker::remove_marker(view, &id.to_string());
        let before = annotations.len();
        annotations.retain(|a| a.id != id);
        let removed = annotations.len() != before;
        if removed {
            self.report_store_result("annotation delete", self.annotation_store.delete(id));
        }
        Ok(removed)
    }

    /// Current annotation records, in render order
    pub fn annotations(&self) -> Vec<Annotation> {
        self.inner.lock().annotations.clone().unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Bookmark
    // ------------------------------------------------------------------

    /// Re-capture the live caret as the reading position, persist it, and
    /// move the rendered bookmark there
    pub fn save_bookmark(&self) -> Result<Bookmark> {
        let mut inner = self.inner.lock();
        let SessionInner {
            view,
            bookmark,
            bookmark_fetched,
            bookmark_state,
            ..
        } = &mut *inner;
        let view = view.as_mut().ok_or(EngineError::NotLoaded)?;

        if !anchor::is_selection_in_content_root(view) {
            return Err(anchor::AnchorError::OutOfScope.into());
        }
        let highlight = anchor::capture_caret(view)?;

        let updated = match bookmark.as_ref() {
            Some(existing) => {
                let updated = existing.with_highlight(highlight);
                self.report_store_result("bookmark update", self.bookmark_store.update(&updated));
                updated
            }
            None => {
                let created = Bookmark::new(&self.document, highlight);
                self.report_store_result("bookmark create", self.bookmark_store.create(&created));
                created
            }
        };
        *bookmark = Some(updated.clone());
        *bookmark_fetched = true;

        // A bookmark click also ends any hover state
        hover::sync_hover(view, &PointerEvent::cleared(), |_| {});

        *bookmark_state = BookmarkState::Rendering;
        match render_bookmark(view, &updated.highlight) {
            Ok(_) => *bookmark_state = BookmarkState::Rendered,
            Err(BookmarkError::EmptyDocument | BookmarkError::NotRenderable) => {
                warn!(document = %self.document, "bookmark position not renderable");
                *bookmark_state = BookmarkState::Rendered;
            }
            Err(other) => return Err(other.into()),
        }
        Ok(updated)
    }

    /// The current bookmark record, if any
    pub fn bookmark(&self) -> Option<Bookmark> {
        self.inner.lock().bookmark.clone()
    }

    pub fn bookmark_state(&self) -> BookmarkState {
        self.inner.lock().bookmark_state
    }

    // ------------------------------------------------------------------
    // Hover
    // ------------------------------------------------------------------

    /// Synchronize hover presentation for a pointer event. `on_focus`
    /// receives the hovered identifier (the UI surfaces the associated
    /// comment).
    pub fn hover(
        &self,
        event: &PointerEvent,
        on_focus: impl FnMut(&str),
    ) -> Result<Option<String>> {
        let mut inner = self.inner.lock();
        let view = inner.view.as_mut().ok_or(EngineError::NotLoaded)?;
        Ok(hover::sync_hover(view, event, on_focus))
    }

    // ------------------------------------------------------------------
    // View access
    // ------------------------------------------------------------------

    /// Read-only access to the view, for UI-side queries
    pub fn with_view<R>(&self, f: impl FnOnce(&DocumentView) -> R) -> Result<R> {
        let inner = self.inner.lock();
        let view = inner.view.as_ref().ok_or(EngineError::NotLoaded)?;
        Ok(f(view))
    }

    /// Current markup of the whole view
    pub fn markup(&self) -> Result<String> {
        self.with_view(|view| view.to_markup(view.root()))
    }

    /// The content root's normalized text
    pub fn normalized_text(&self) -> Result<String> {
        self.with_view(|view| crate::view::TextMap::build(view).text().to_string())
    }

    fn report_store_result(&self, operation: &str, result: std::result::Result<(), StoreError>) {
        if let Err(err) = result {
            // Local markers are kept; the store catches up later
            warn!(
                document = %self.document,
                error = %err,
                "{operation} failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{MemoryAnnotationStore, MemoryBookmarkStore};
    use crate::bookmark::BOOKMARK_ID;
    use crate::hover::FOCUSED_CLASS;
    use crate::marker::fragments_for;

    const ARTICLE: &str = r#"<div id="article"><div id="content-highlightable"><p>Hello world, this is a test.</p></div></div>"#;

    struct Fixture {
        session: ReaderSession,
        annotation_store: Arc<MemoryAnnotationStore>,
        bookmark_store: Arc<MemoryBookmarkStore>,
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn fixture(policy: OverlapPolicy) -> Fixture {
        init_tracing();
        let annotation_store = Arc::new(MemoryAnnotationStore::new());
        let bookmark_store = Arc::new(MemoryBookmarkStore::new());
        let session = ReaderSession::new(
            "guide/intro",
            policy,
            annotation_store.clone(),
            bookmark_store.clone(),
        );
        Fixture {
            session,
            annotation_store,
            bookmark_store,
        }
    }

    fn loaded(policy: OverlapPolicy) -> Fixture {
        let f = fixture(policy);
        f.session.set_content(ARTICLE).unwrap();
        f.session.set_annotations(Vec::new()).unwrap();
        f
    }

    fn marked_text(session: &ReaderSession, id: &str) -> String {
        session
            .with_view(|view| {
                fragments_for(view, id)
                    .into_iter()
                    .flat_map(|f| view.descendants(f))
                    .filter_map(|n| view.text(n).map(|t| t.to_string()))
                    .collect()
            })
            .unwrap()
    }

    #[test]
    fn test_create_two_disjoint_annotations() {
        let f = loaded(OverlapPolicy::Merge);

        f.session.select(CharacterRange::new(6, 11)).unwrap();
        let first = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(annotation) => annotation,
            other => panic!("expected creation, got {other:?}"),
        };
        assert_eq!(first.highlight.character_range, CharacterRange::new(6, 11));
        assert_eq!(marked_text(&f.session, &first.marker_id()), "world");

        f.session.select(CharacterRange::new(0, 5)).unwrap();
        let second = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(annotation) => annotation,
            other => panic!("expected creation, got {other:?}"),
        };

        assert_eq!(f.session.annotations().len(), 2);
        assert_eq!(f.annotation_store.len(), 2);
        assert_eq!(marked_text(&f.session, &second.marker_id()), "Hello");
    }

    #[test]
    fn test_overlapping_selection_merges_and_rewraps() {
        let f = loaded(OverlapPolicy::Merge);

        f.session.select(CharacterRange::new(6, 11)).unwrap();
        let first = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(annotation) => annotation,
            other => panic!("expected creation, got {other:?}"),
        };

        // Overlaps "world" at 8: union becomes [6,15)
        f.session.select(CharacterRange::new(8, 15)).unwrap();
        let outcome = f.session.highlight_selection().unwrap();
        let HighlightOutcome::Merged {
            annotation,
            absorbed,
        } = outcome
        else {
            panic!("expected merge, got {outcome:?}");
        };

        assert_eq!(annotation.id, first.id);
        assert!(absorbed.is_empty());
        assert_eq!(annotation.highlight.character_range, CharacterRange::new(6, 15));
        assert_eq!(marked_text(&f.session, &first.marker_id()), "world, th");
        assert_eq!(f.session.annotations().len(), 1);
        assert_eq!(
            f.annotation_store
                .get(first.id)
                .unwrap()
                .highlight
                .character_range,
            CharacterRange::new(6, 15)
        );
    }

    #[test]
    fn test_chained_merge_absorbs_and_deletes() {
        let f = loaded(OverlapPolicy::Merge);

        f.session.select(CharacterRange::new(0, 4)).unwrap();
        let first = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(a) => a,
            other => panic!("unexpected {other:?}"),
        };
        f.session.select(CharacterRange::new(10, 14)).unwrap();
        let second = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(a) => a,
            other => panic!("unexpected {other:?}"),
        };

        // Bridges both: union reaches [0,14)
        f.session.select(CharacterRange::new(3, 11)).unwrap();
        let outcome = f.session.highlight_selection().unwrap();
        let HighlightOutcome::Merged {
            annotation,
            absorbed,
        } = outcome
        else {
            panic!("expected merge, got {outcome:?}");
        };

        assert_eq!(annotation.id, first.id);
        assert_eq!(absorbed, vec![second.id]);
        assert_eq!(annotation.highlight.character_range, CharacterRange::new(0, 14));

        // The absorbed record is gone everywhere
        assert_eq!(f.session.annotations().len(), 1);
        assert!(f.annotation_store.get(second.id).is_none());
        assert!(marked_text(&f.session, &second.marker_id()).is_empty());

        // Non-overlap invariant: nothing overlaps anything else
        let annotations = f.session.annotations();
        for (i, a) in annotations.iter().enumerate() {
            for b in annotations.iter().skip(i + 1) {
                assert!(!overlap::ranges_overlap(
                    &a.highlight.character_range,
                    &b.highlight.character_range
                ));
            }
        }
    }

    #[test]
    fn test_reject_policy_discards_candidate() {
        let f = loaded(OverlapPolicy::Reject);

        f.session.select(CharacterRange::new(6, 11)).unwrap();
        let first = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(a) => a,
            other => panic!("unexpected {other:?}"),
        };

        f.session.select(CharacterRange::new(8, 15)).unwrap();
        let outcome = f.session.highlight_selection().unwrap();
        let HighlightOutcome::Rejected { conflicting } = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };

        assert_eq!(conflicting, first.id);
        assert_eq!(f.session.annotations().len(), 1);
        assert_eq!(f.annotation_store.len(), 1);
        // The selection was collapsed
        let selection = f.session.with_view(|v| v.selection()).unwrap().unwrap();
        assert!(selection.is_collapsed());
    }

    #[test]
    fn test_collapsed_selection_is_a_noop() {
        let f = loaded(OverlapPolicy::Merge);
        f.session.select(CharacterRange::collapsed(7)).unwrap();

        assert!(matches!(
            f.session.highlight_selection().unwrap(),
            HighlightOutcome::NoSelection
        ));
        assert!(f.session.annotations().is_empty());
    }

    #[test]
    fn test_out_of_scope_selection_is_collapsed_and_ignored() {
        let f = fixture(OverlapPolicy::Merge);
        f.session
            .set_content(
                r#"<div id="nav">menu</div><div id="content-highlightable"><p>text</p></div>"#,
            )
            .unwrap();
        f.session.set_annotations(Vec::new()).unwrap();

        let selection = f
            .session
            .with_view(|view| {
                let nav = view.element_by_id("nav").unwrap();
                let nav_text = view.children(nav)[0];
                Selection::new(
                    crate::view::Position::new(nav_text, 0),
                    crate::view::Position::new(nav_text, 4),
                )
            })
            .unwrap();
        f.session.select_positions(selection).unwrap();

        assert!(matches!(
            f.session.highlight_selection().unwrap(),
            HighlightOutcome::OutOfScope
        ));
        assert!(f.session.annotations().is_empty());
        let selection = f.session.with_view(|v| v.selection()).unwrap().unwrap();
        assert!(selection.is_collapsed());
    }

    #[test]
    fn test_delete_annotation_removes_markers_and_record() {
        let f = loaded(OverlapPolicy::Merge);
        f.session.select(CharacterRange::new(6, 11)).unwrap();
        let annotation = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(a) => a,
            other => panic!("unexpected {other:?}"),
        };

        assert!(f.session.delete_annotation(annotation.id).unwrap());
        assert!(f.session.annotations().is_empty());
        assert!(f.annotation_store.is_empty());
        assert!(marked_text(&f.session, &annotation.marker_id()).is_empty());

        // Deleting again is a no-op
        assert!(!f.session.delete_annotation(annotation.id).unwrap());
    }

    #[test]
    fn test_rendering_waits_for_both_fetches() {
        let f = fixture(OverlapPolicy::Merge);
        let annotation = Annotation::new(Highlight::new(CharacterRange::new(6, 11), false));

        // Annotations first: nothing to render onto yet
        f.session
            .set_annotations(vec![annotation.clone()])
            .unwrap();
        assert!(f.session.markup().is_err());

        // Content arrives: render happens now
        f.session.set_content(ARTICLE).unwrap();
        assert_eq!(marked_text(&f.session, &annotation.marker_id()), "world");
    }

    #[test]
    fn test_rerender_is_idempotent() {
        let f = loaded(OverlapPolicy::Merge);
        f.session.select(CharacterRange::new(6, 11)).unwrap();
        let annotation = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(a) => a,
            other => panic!("unexpected {other:?}"),
        };

        let annotations = f.session.annotations();
        f.session.set_annotations(annotations.clone()).unwrap();
        f.session.set_annotations(annotations).unwrap();

        let count = f
            .session
            .with_view(|view| fragments_for(view, &annotation.marker_id()).len())
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(marked_text(&f.session, &annotation.marker_id()), "world");
    }

    #[test]
    fn test_first_read_creates_bookmark_lazily() {
        let f = loaded(OverlapPolicy::Merge);
        assert!(f.session.bookmark().is_none());

        f.session.set_bookmark(None).unwrap();

        let bookmark = f.session.bookmark().expect("bookmark synthesized");
        assert!(bookmark.highlight.is_collapsed());
        assert_eq!(bookmark.document, "guide/intro");
        assert!(f.bookmark_store.get().is_some());
        assert_eq!(f.session.bookmark_state(), BookmarkState::Rendered);
        // The caret bookmark renders as a visible word marker
        assert!(!marked_text(&f.session, BOOKMARK_ID).is_empty());
    }

    #[test]
    fn test_stored_bookmark_renders_on_load() {
        let f = loaded(OverlapPolicy::Merge);
        let stored = Bookmark::new("guide/intro", Highlight::collapsed(8));
        f.session.set_bookmark(Some(stored)).unwrap();

        assert_eq!(marked_text(&f.session, BOOKMARK_ID), "world, ");
    }

    #[test]
    fn test_bookmark_for_other_section_does_not_render() {
        let f = loaded(OverlapPolicy::Merge);
        let stored = Bookmark::new("guide/other", Highlight::collapsed(8));
        f.session.set_bookmark(Some(stored)).unwrap();

        assert!(marked_text(&f.session, BOOKMARK_ID).is_empty());
    }

    #[test]
    fn test_save_bookmark_recaptures_live_caret() {
        let f = loaded(OverlapPolicy::Merge);
        f.session.set_bookmark(None).unwrap();

        f.session.select(CharacterRange::collapsed(14)).unwrap();
        let saved = f.session.save_bookmark().unwrap();

        assert_eq!(saved.highlight.character_range, CharacterRange::collapsed(14));
        assert_eq!(
            f.bookmark_store.get().unwrap().highlight.character_range,
            CharacterRange::collapsed(14)
        );
        // Marker moved onto the word at the caret ("this")
        assert_eq!(marked_text(&f.session, BOOKMARK_ID), "this ");
    }

    #[test]
    fn test_end_of_document_bookmark_renders_final_character() {
        let f = loaded(OverlapPolicy::Merge);
        let length = f.session.normalized_text().unwrap().chars().count();

        let stored = Bookmark::new("guide/intro", Highlight::collapsed(length));
        f.session.set_bookmark(Some(stored)).unwrap();

        assert_eq!(marked_text(&f.session, BOOKMARK_ID), ".");
    }

    #[test]
    fn test_hover_synchronizes_fragments_through_session() {
        let f = fixture(OverlapPolicy::Merge);
        f.session
            .set_content(
                r#"<div id="content-highlightable"><p>This is <i>less important</i> than that</p></div>"#,
            )
            .unwrap();
        f.session.set_annotations(Vec::new()).unwrap();

        f.session.select(CharacterRange::new(5, 12)).unwrap();
        let annotation = match f.session.highlight_selection().unwrap() {
            HighlightOutcome::Created(a) => a,
            other => panic!("unexpected {other:?}"),
        };

        let fragments = f
            .session
            .with_view(|view| fragments_for(view, &annotation.marker_id()))
            .unwrap();
        assert!(fragments.len() > 1);

        let mut focused_id = None;
        f.session
            .hover(&PointerEvent::over(fragments[1]), |id| {
                focused_id = Some(id.to_string())
            })
            .unwrap();
        assert_eq!(focused_id.as_deref(), Some(annotation.marker_id().as_str()));

        let all_focused = f
            .session
            .with_view(|view| {
                fragments_for(view, &annotation.marker_id())
                    .iter()
                    .all(|&fragment| view.has_class(fragment, FOCUSED_CLASS))
            })
            .unwrap();
        assert!(all_focused);
    }

    #[test]
    fn test_operations_before_load_fail_cleanly() {
        let f = fixture(OverlapPolicy::Merge);
        assert!(matches!(
            f.session.highlight_selection(),
            Err(EngineError::NotLoaded)
        ));
        assert!(matches!(
            f.session.save_bookmark(),
            Err(EngineError::NotLoaded)
        ));
        assert!(matches!(
            f.session.select(CharacterRange::new(0, 1)),
            Err(EngineError::NotLoaded)
        ));
    }
}
