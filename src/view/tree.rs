//! Arena-backed node tree with a class index and a current selection
//!
//! Nodes are either elements (tag, attributes, classes, children) or text.
//! The tree supports the small set of structural operations the marker
//! layer needs: splitting text nodes at a character offset, wrapping runs
//! of siblings, unwrapping an element in place, and merging adjacent text
//! nodes back together.
//!
//! Class membership is indexed so that queries by class cost O(k) in the
//! number of carriers rather than a full tree scan.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Handle to a node in a [`DocumentView`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Node payload
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Element with tag, attributes, classes, and children
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        classes: Vec<String>,
        children: Vec<NodeId>,
    },
    /// Text content
    Text(String),
}

/// A single tree node
#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// One endpoint of a selection
///
/// For text nodes `offset` counts characters into the node's content; for
/// elements it is a child index, marking the boundary before that child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub node: NodeId,
    pub offset: usize,
}

impl Position {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// The view's current selection: anchor is where the drag started, focus
/// where it currently ends. `focus` before `anchor` in document order is a
/// backward selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: Position,
    pub focus: Position,
}

impl Selection {
    pub fn new(anchor: Position, focus: Position) -> Self {
        Self { anchor, focus }
    }

    pub fn caret(position: Position) -> Self {
        Self {
            anchor: position,
            focus: position,
        }
    }

    /// Structural collapse check (same node, same offset)
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// The rendered document: node tree, designated content root, and the
/// single current selection
#[derive(Debug, Clone)]
pub struct DocumentView {
    nodes: Vec<Node>,
    root: NodeId,
    content_root: NodeId,
    selection: Option<Selection>,
    class_index: HashMap<String, BTreeSet<NodeId>>,
}

impl DocumentView {
    /// Create a view whose root is a fresh element with the given tag.
    /// The content root starts out as the root itself.
    pub fn new(root_tag: &str) -> Self {
        let root = Node {
            parent: None,
            kind: NodeKind::Element {
                tag: root_tag.to_string(),
                attributes: BTreeMap::new(),
                classes: Vec::new(),
                children: Vec::new(),
            },
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            content_root: NodeId(0),
            selection: None,
            class_index: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The subtree whose text is subject to annotation. Exactly one per view.
    pub fn content_root(&self) -> NodeId {
        self.content_root
    }

    pub fn set_content_root(&mut self, node: NodeId) {
        self.content_root = node;
    }

    // ------------------------------------------------------------------
    // Node construction and structure
    // ------------------------------------------------------------------

    /// Create a detached element node
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(Node {
            parent: None,
            kind: NodeKind::Element {
                tag: tag.to_string(),
                attributes: BTreeMap::new(),
                classes: Vec::new(),
                children: Vec::new(),
            },
        })
    }

    /// Create a detached text node
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push_node(Node {
            parent: None,
            kind: NodeKind::Text(content.to_string()),
        })
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Element { .. })
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Text(_))
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text(content) => Some(content),
            NodeKind::Element { .. } => None,
        }
    }

    /// Character length of a text node (0 for elements)
    pub fn text_len(&self, id: NodeId) -> usize {
        self.text(id).map(|t| t.chars().count()).unwrap_or(0)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Element { children, .. } => children,
            NodeKind::Text(_) => &[],
        }
    }

    fn children_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        match &mut self.node_mut(id).kind {
            NodeKind::Element { children, .. } => children,
            NodeKind::Text(_) => panic!("text node has no children"),
        }
    }

    /// Index of `child` among its parent's children
    pub fn child_index(&self, child: NodeId) -> Option<usize> {
        let parent = self.parent(child)?;
        self.children(parent).iter().position(|&c| c == child)
    }

    /// Append a detached node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_child(parent, self.children(parent).len(), child);
    }

    /// Insert a detached node among `parent`'s children at `index`
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(self.node(child).parent.is_none(), "node already attached");
        self.node_mut(child).parent = Some(parent);
        self.children_mut(parent).insert(index, child);
        self.index_subtree(child);
    }

    /// Detach a node (and its subtree) from the tree
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            self.children_mut(parent).retain(|&c| c != id);
        }
        self.node_mut(id).parent = None;
        self.unindex_subtree(id);
    }

    /// Whether `node` is reachable from the tree root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    /// Whether `node` lies in `ancestor`'s subtree (inclusive)
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == ancestor {
                return true;
            }
            match self.parent(current) {
                Some(p) => current = p,
                None => return false,
            }
        }
    }

    /// Pre-order traversal of `node`'s subtree, `node` included
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            result.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Attributes and classes
    // ------------------------------------------------------------------

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(|s| s.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attributes, .. } = &mut self.node_mut(id).kind {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn classes(&self, id: NodeId) -> &[String] {
        match &self.node(id).kind {
            NodeKind::Element { classes, .. } => classes,
            NodeKind::Text(_) => &[],
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).iter().any(|c| c == class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        if let NodeKind::Element { classes, .. } = &mut self.node_mut(id).kind {
            classes.push(class.to_string());
        } else {
            return;
        }
        if self.is_attached(id) {
            self.class_index
                .entry(class.to_string())
                .or_default()
                .insert(id);
        }
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        if let NodeKind::Element { classes, .. } = &mut self.node_mut(id).kind {
            classes.retain(|c| c != class);
        }
        if let Some(carriers) = self.class_index.get_mut(class) {
            carriers.remove(&id);
        }
    }

    /// All attached elements carrying `class`, in arena order.
    ///
    /// Backed by the class index; cost is O(k) in the number of carriers.
    pub fn elements_with_class(&self, class: &str) -> Vec<NodeId> {
        self.class_index
            .get(class)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// First element in document order with the given `id` attribute
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.attribute(n, "id") == Some(id))
    }

    fn index_subtree(&mut self, node: NodeId) {
        if !self.is_attached(node) {
            return;
        }
        for n in self.descendants(node) {
            for class in self.classes(n).to_vec() {
                self.class_index.entry(class).or_default().insert(n);
            }
        }
    }

    fn unindex_subtree(&mut self, node: NodeId) {
        for n in self.descendants(node) {
            for class in self.classes(n).to_vec() {
                if let Some(carriers) = self.class_index.get_mut(&class) {
                    carriers.remove(&n);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Text surgery
    // ------------------------------------------------------------------

    /// Split a text node at a character offset. The original node keeps
    /// `[0, offset)`; the returned node holds the rest and is inserted as
    /// the next sibling. `offset` must be strictly inside the content.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> NodeId {
        let content = self.text(id).expect("split_text on non-text node");
        let byte = byte_index(content, offset);
        debug_assert!(byte > 0 && byte < content.len(), "split at content edge");
        let tail = content[byte..].to_string();
        let head = content[..byte].to_string();
        if let NodeKind::Text(c) = &mut self.node_mut(id).kind {
            *c = head;
        }
        let new_node = self.create_text(&tail);
        let parent = self.parent(id).expect("split_text on detached node");
        let index = self.child_index(id).expect("child index");
        self.insert_child(parent, index + 1, new_node);
        new_node
    }

    /// Wrap `parent`'s children in `[start, end)` inside `wrapper`, which
    /// takes their place. `wrapper` must be a detached, childless element.
    pub fn wrap_children(&mut self, parent: NodeId, start: usize, end: usize, wrapper: NodeId) {
        debug_assert!(self.node(wrapper).parent.is_none(), "wrapper attached");
        let moved: Vec<NodeId> = self.children_mut(parent).drain(start..end).collect();
        for &child in &moved {
            self.node_mut(child).parent = Some(wrapper);
        }
        *self.children_mut(wrapper) = moved;
        self.node_mut(wrapper).parent = Some(parent);
        self.children_mut(parent).insert(start, wrapper);
        self.index_subtree(wrapper);
    }

    /// Replace an element by its children, preserving order, then detach
    /// it. The inverse of [`wrap_children`](Self::wrap_children).
    pub fn unwrap(&mut self, id: NodeId) {
        let parent = self.parent(id).expect("unwrap on detached node");
        let index = self.child_index(id).expect("child index");
        let moved: Vec<NodeId> = std::mem::take(self.children_mut(id));
        for &child in &moved {
            self.node_mut(child).parent = Some(parent);
        }
        let siblings = self.children_mut(parent);
        siblings.remove(index);
        for (i, &child) in moved.iter().enumerate() {
            siblings.insert(index + i, child);
        }
        self.node_mut(id).parent = None;
        for class in self.classes(id).to_vec() {
            if let Some(carriers) = self.class_index.get_mut(&class) {
                carriers.remove(&id);
            }
        }
    }

    /// Merge adjacent text children of `parent` and drop empty text nodes,
    /// so later structural walks see no artificial node boundaries.
    pub fn normalize(&mut self, parent: NodeId) {
        let children = self.children(parent).to_vec();
        let mut previous_text: Option<NodeId> = None;
        for child in children {
            match self.text(child).map(|s| s.to_string()) {
                Some(content) if content.is_empty() => {
                    self.detach(child);
                }
                Some(content) => {
                    if let Some(prev) = previous_text {
                        let merged = format!("{}{}", self.text(prev).unwrap(), content);
                        if let NodeKind::Text(c) = &mut self.node_mut(prev).kind {
                            *c = merged;
                        }
                        self.detach(child);
                    } else {
                        previous_text = Some(child);
                    }
                }
                None => {
                    previous_text = None;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = Some(selection);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Collapse the selection to its later endpoint in document order,
    /// mirroring what a reader sees after a highlight lands.
    pub fn collapse_selection_to_end(&mut self) {
        if let Some(selection) = self.selection {
            // A selection can go stale when structural surgery detaches
            // the nodes it pointed into; there is nothing left to keep
            if !self.is_attached(selection.anchor.node) || !self.is_attached(selection.focus.node)
            {
                self.selection = None;
                return;
            }
            let end = match self.compare_positions(selection.anchor, selection.focus) {
                Ordering::Greater => selection.anchor,
                _ => selection.focus,
            };
            self.selection = Some(Selection::caret(end));
        }
    }

    /// Document-order comparison of two positions
    pub fn compare_positions(&self, a: Position, b: Position) -> Ordering {
        let order = TreeOrder::new(self, self.root);
        order.position_key(self, a).cmp(&order.position_key(self, b))
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Serialize a subtree back to markup. Text is entity-escaped; class
    /// lists are emitted as a `class` attribute.
    pub fn to_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        match &self.node(node).kind {
            NodeKind::Text(content) => {
                out.push_str(&html_escape::encode_text(content));
            }
            NodeKind::Element {
                tag,
                attributes,
                classes,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                if !classes.is_empty() {
                    out.push_str(" class=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(
                        &classes.join(" "),
                    ));
                    out.push('"');
                }
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in children {
                        self.write_markup(child, out);
                    }
                    out.push_str("</");
                    out.push_str(tag);
                    out.push('>');
                }
            }
        }
    }
}

/// Pre-order numbering of a subtree, used to compare tree positions and to
/// decide subtree membership without repeated parent walks
pub(crate) struct TreeOrder {
    order: HashMap<NodeId, usize>,
    exit: HashMap<NodeId, usize>,
}

impl TreeOrder {
    pub fn new(view: &DocumentView, from: NodeId) -> Self {
        let mut order = HashMap::new();
        let mut exit = HashMap::new();
        let mut counter = 0usize;
        Self::number(view, from, &mut counter, &mut order, &mut exit);
        Self { order, exit }
    }

    fn number(
        view: &DocumentView,
        node: NodeId,
        counter: &mut usize,
        order: &mut HashMap<NodeId, usize>,
        exit: &mut HashMap<NodeId, usize>,
    ) {
        order.insert(node, *counter);
        *counter += 1;
        for &child in view.children(node) {
            Self::number(view, child, counter, order, exit);
        }
        exit.insert(node, *counter);
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.order.contains_key(&node)
    }

    pub fn index(&self, node: NodeId) -> Option<usize> {
        self.order.get(&node).copied()
    }

    /// One past the last pre-order index inside `node`'s subtree
    pub fn exit_index(&self, node: NodeId) -> Option<usize> {
        self.exit.get(&node).copied()
    }

    /// Sortable key for a position: text positions key on the node itself,
    /// element positions on the boundary before the indexed child (or the
    /// end of the subtree when the index is past the last child).
    pub fn position_key(&self, view: &DocumentView, position: Position) -> (usize, usize) {
        if view.is_text(position.node) {
            return (self.order[&position.node], position.offset);
        }
        let children = view.children(position.node);
        if position.offset < children.len() {
            (self.order[&children[position.offset]], 0)
        } else {
            (self.exit[&position.node], 0)
        }
    }
}

/// Byte index of the `char_offset`-th character of `s`
pub(crate) fn byte_index(s: &str, char_offset: usize) -> usize {
    s.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
