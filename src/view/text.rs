//! Normalized text and coordinate mapping
//!
//! "Normalized text" is the content root's visible text with whitespace
//! collapsed the way a renderer collapses it: runs of whitespace become a
//! single space, whitespace at block edges drops, and a boundary between
//! two rendered blocks contributes a single newline. Offsets into this
//! text are the canonical coordinate space for ranges: they are stable
//! across structurally different but visually identical markup, which is
//! what lets a stored range survive re-rendering.
//!
//! [`TextMap`] is built from a view on demand and converts both ways
//! between tree positions (node + offset) and normalized offsets.

use std::collections::HashMap;
use thiserror::Error;

use super::tree::{DocumentView, NodeId, Position, TreeOrder};

/// Coordinate mapping errors
#[derive(Debug, Error)]
pub enum TextMapError {
    /// The position's node is not inside the content root
    #[error("Position is outside the content root")]
    OutOfScope,

    /// A normalized offset beyond the text length
    #[error("Offset {offset} is beyond the normalized text (length {length})")]
    OffsetOutOfBounds { offset: usize, length: usize },
}

/// Elements that establish block boundaries in rendered output
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "dd",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "td",
    "th",
    "tr",
    "ul",
];

fn is_block(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    /// Characters map one-to-one
    Literal,
    /// Whitespace run collapsed to a single space
    Space,
    /// Whitespace with no rendered output
    Skipped,
    /// Synthesized block separator, zero raw characters
    Separator,
}

/// Correspondence between a run of raw characters in one text node and a
/// run of normalized characters
#[derive(Debug, Clone)]
struct Segment {
    node: NodeId,
    /// Character offset into the node's raw content
    raw_start: usize,
    raw_len: usize,
    norm_start: usize,
    norm_len: usize,
    kind: SegmentKind,
    /// Pre-order index of `node`, for boundary searches
    order_key: usize,
}

/// Mapping between the content root's tree positions and offsets into its
/// normalized text. Valid until the next structural mutation; rebuilt on
/// demand because node structure is never stable across renders.
pub struct TextMap {
    text: String,
    length: usize,
    segments: Vec<Segment>,
    /// Indices into `segments` per text node, ordered by raw offset
    node_segments: HashMap<NodeId, Vec<usize>>,
    /// Indices of segments with rendered output, ordered by norm offset
    rendered: Vec<usize>,
    order: TreeOrder,
    root: NodeId,
}

impl TextMap {
    /// Build the map for the view's content root
    pub fn build(view: &DocumentView) -> Self {
        let root = view.content_root();
        let mut builder = Builder {
            view,
            text: String::new(),
            length: 0,
            segments: Vec::new(),
            pending_ws: Vec::new(),
            pending_block: false,
            started: false,
        };
        builder.walk(root, false);
        builder.finish();

        let order = TreeOrder::new(view, root);
        let mut segments = builder.segments;
        for segment in &mut segments {
            segment.order_key = order.index(segment.node).unwrap_or(usize::MAX);
        }
        let mut node_segments: HashMap<NodeId, Vec<usize>> = HashMap::new();
        let mut rendered = Vec::new();
        for (i, segment) in segments.iter().enumerate() {
            node_segments.entry(segment.node).or_default().push(i);
            if segment.norm_len > 0 {
                rendered.push(i);
            }
        }

        Self {
            text: builder.text,
            length: builder.length,
            segments,
            node_segments,
            rendered,
            order,
            root,
        }
    }

    /// The normalized text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Normalized length in characters
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether a node lies inside the content root
    pub fn in_scope(&self, node: NodeId) -> bool {
        self.order.contains(node)
    }

    /// Map a tree position to its normalized offset.
    ///
    /// Positions inside a collapsed whitespace run resolve to the run's
    /// single normalized index (the run start maps before the collapsed
    /// space, anything deeper maps after it). Element positions resolve to
    /// the first rendered offset at or after the boundary they name.
    pub fn to_normalized_offset(
        &self,
        view: &DocumentView,
        position: Position,
    ) -> Result<usize, TextMapError> {
        if !self.order.contains(position.node) {
            return Err(TextMapError::OutOfScope);
        }

        if !view.is_text(position.node) {
            return Ok(self.boundary_offset(view, position));
        }

        let Some(indices) = self.node_segments.get(&position.node) else {
            // Empty text node: resolve like an element boundary
            let key = (self.order.index(position.node).unwrap_or(usize::MAX), 0);
            return Ok(self.first_rendered_at_or_after(key));
        };

        let p = position.offset;
        for &i in indices {
            let segment = &self.segments[i];
            if segment.raw_len == 0 {
                continue;
            }
            if p < segment.raw_start {
                return Ok(segment.norm_start);
            }
            if p < segment.raw_start + segment.raw_len {
                return Ok(match segment.kind {
                    SegmentKind::Literal => segment.norm_start + (p - segment.raw_start),
                    _ if p == segment.raw_start => segment.norm_start,
                    _ => segment.norm_start + segment.norm_len,
                });
            }
        }

        // Position at or past the node's end: after its last rendered run
        let last = indices
            .iter()
            .rev()
            .find(|&&i| self.segments[i].raw_len > 0)
            .or_else(|| indices.last());
        match last {
            Some(&i) => {
                let segment = &self.segments[i];
                Ok(segment.norm_start + segment.norm_len)
            }
            None => Ok(self.length),
        }
    }

    /// Map a normalized offset to a concrete tree position. Offsets that
    /// land on a collapsed space or a block separator resolve to the
    /// boundary before the following rendered run.
    pub fn to_tree_position(&self, offset: usize) -> Result<Position, TextMapError> {
        if offset > self.length {
            return Err(TextMapError::OffsetOutOfBounds {
                offset,
                length: self.length,
            });
        }

        if offset == self.length {
            return Ok(match self.rendered.last() {
                Some(&i) => {
                    let segment = &self.segments[i];
                    Position::new(segment.node, segment.raw_start + segment.raw_len)
                }
                // Document renders no text at all
                None => Position::new(self.root, 0),
            });
        }

        let at = self
            .rendered
            .partition_point(|&i| self.segments[i].norm_start <= offset);
        debug_assert!(at > 0, "rendered segments cover the normalized text");
        let segment = &self.segments[self.rendered[at - 1]];
        debug_assert!(offset < segment.norm_start + segment.norm_len);
        Ok(match segment.kind {
            SegmentKind::Literal => Position::new(
                segment.node,
                segment.raw_start + (offset - segment.norm_start),
            ),
            // Collapsed space: the boundary before the run
            SegmentKind::Space | SegmentKind::Skipped => {
                Position::new(segment.node, segment.raw_start)
            }
            // A separator owns no raw characters; resolve to the end of
            // the preceding rendered run so ranges spanning only the
            // separator keep distinct endpoints on either side of it
            SegmentKind::Separator => match at.checked_sub(2).map(|i| &self.segments[self.rendered[i]]) {
                Some(previous) => Position::new(
                    previous.node,
                    previous.raw_start + previous.raw_len,
                ),
                None => Position::new(self.root, 0),
            },
        })
    }

    /// Normalized offset for an element-boundary position
    fn boundary_offset(&self, view: &DocumentView, position: Position) -> usize {
        let children = view.children(position.node);
        let key = if position.offset < children.len() {
            (
                self.order.index(children[position.offset]).unwrap_or(usize::MAX),
                0,
            )
        } else {
            (self.order.exit_index(position.node).unwrap_or(usize::MAX), 0)
        };
        self.first_rendered_at_or_after(key)
    }

    fn first_rendered_at_or_after(&self, key: (usize, usize)) -> usize {
        for segment in &self.segments {
            if (segment.order_key, segment.raw_start) >= key {
                return segment.norm_start;
            }
        }
        self.length
    }
}

struct Builder<'a> {
    view: &'a DocumentView,
    text: String,
    length: usize,
    segments: Vec<Segment>,
    /// Whitespace chunks (node, raw_start, raw_len) seen since the last
    /// rendered character
    pending_ws: Vec<(NodeId, usize, usize)>,
    pending_block: bool,
    started: bool,
}

impl Builder<'_> {
    fn walk(&mut self, node: NodeId, preserve: bool) {
        if let Some(content) = self.view.text(node) {
            let content = content.to_string();
            if preserve {
                self.visit_text_preserved(node, &content);
            } else {
                self.visit_text(node, &content);
            }
            return;
        }

        let tag = self.view.tag(node).unwrap_or("");
        if tag == "br" {
            if self.started {
                self.pending_block = true;
            }
            return;
        }
        let block = is_block(tag);
        if block && self.started {
            self.pending_block = true;
        }
        let preserve = preserve || tag == "pre";
        for &child in self.view.children(node) {
            self.walk(child, preserve);
        }
        if block && self.started {
            self.pending_block = true;
        }
    }

    fn visit_text(&mut self, node: NodeId, content: &str) {
        let chars: Vec<char> = content.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i].is_whitespace() {
                let start = i;
                while i < chars.len() && chars[i].is_whitespace() {
                    i += 1;
                }
                self.pending_ws.push((node, start, i - start));
            } else {
                let start = i;
                while i < chars.len() && !chars[i].is_whitespace() {
                    i += 1;
                }
                self.flush_pending(node, start);
                self.started = true;
                let run_len = i - start;
                self.segments.push(Segment {
                    node,
                    raw_start: start,
                    raw_len: run_len,
                    norm_start: self.length,
                    norm_len: run_len,
                    kind: SegmentKind::Literal,
                    order_key: 0,
                });
                self.text.extend(chars[start..i].iter());
                self.length += run_len;
            }
        }
    }

    /// Inside `pre`, every character renders literally
    fn visit_text_preserved(&mut self, node: NodeId, content: &str) {
        let char_len = content.chars().count();
        if char_len == 0 {
            return;
        }
        self.flush_pending(node, 0);
        self.started = true;
        self.segments.push(Segment {
            node,
            raw_start: 0,
            raw_len: char_len,
            norm_start: self.length,
            norm_len: char_len,
            kind: SegmentKind::Literal,
            order_key: 0,
        });
        self.text.push_str(content);
        self.length += char_len;
    }

    /// Resolve accumulated whitespace and block state against the next
    /// rendered run, which begins at `(next_node, next_raw)`
    fn flush_pending(&mut self, next_node: NodeId, next_raw: usize) {
        if !self.started {
            // Nothing rendered yet: leading whitespace drops
            let norm = self.length;
            for (node, raw_start, raw_len) in self.pending_ws.drain(..) {
                self.segments.push(Segment {
                    node,
                    raw_start,
                    raw_len,
                    norm_start: norm,
                    norm_len: 0,
                    kind: SegmentKind::Skipped,
                    order_key: 0,
                });
            }
            self.pending_block = false;
            return;
        }

        if self.pending_block {
            // Whitespace adjoining a block boundary drops entirely
            let norm = self.length;
            for (node, raw_start, raw_len) in self.pending_ws.drain(..) {
                self.segments.push(Segment {
                    node,
                    raw_start,
                    raw_len,
                    norm_start: norm,
                    norm_len: 0,
                    kind: SegmentKind::Skipped,
                    order_key: 0,
                });
            }
            self.segments.push(Segment {
                node: next_node,
                raw_start: next_raw,
                raw_len: 0,
                norm_start: self.length,
                norm_len: 1,
                kind: SegmentKind::Separator,
                order_key: 0,
            });
            self.text.push('\n');
            self.length += 1;
            self.pending_block = false;
        } else if !self.pending_ws.is_empty() {
            let mut chunks = self.pending_ws.drain(..);
            let (node, raw_start, raw_len) = chunks.next().unwrap();
            let space_at = self.length;
            let mut rest = Vec::new();
            for chunk in chunks {
                rest.push(chunk);
            }
            self.segments.push(Segment {
                node,
                raw_start,
                raw_len,
                norm_start: space_at,
                norm_len: 1,
                kind: SegmentKind::Space,
                order_key: 0,
            });
            self.text.push(' ');
            self.length += 1;
            for (node, raw_start, raw_len) in rest {
                self.segments.push(Segment {
                    node,
                    raw_start,
                    raw_len,
                    norm_start: self.length,
                    norm_len: 0,
                    kind: SegmentKind::Skipped,
                    order_key: 0,
                });
            }
        }
    }

    /// Trailing whitespace never renders
    fn finish(&mut self) {
        let norm = self.length;
        for (node, raw_start, raw_len) in self.pending_ws.drain(..) {
            self.segments.push(Segment {
                node,
                raw_start,
                raw_len,
                norm_start: norm,
                norm_len: 0,
                kind: SegmentKind::Skipped,
                order_key: 0,
            });
        }
    }
}
