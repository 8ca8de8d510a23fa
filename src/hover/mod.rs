//! Hover synchronization across marker fragments
//!
//! One annotation renders as several marker fragments, and hovering any of
//! them should light up all of them. This is a pure event handler over the
//! view: no state is retained between events beyond what the view's
//! classes already hold. The previously focused fragments are found
//! through the dedicated focused class, the related fragments through the
//! hovered identifier's class, so both steps are class-index lookups
//! rather than tree scans.

use crate::marker::{identifier_class, ID_ATTRIBUTE};
use crate::view::{DocumentView, NodeId};

/// Shared presentation class carried by every fragment of the hovered
/// annotation
pub const FOCUSED_CLASS: &str = "hover-highlight";

/// A pointer event as the surrounding UI reports it
#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    /// The innermost element under the pointer, if any
    pub target: Option<NodeId>,
    /// Bitmask of currently pressed buttons; nonzero means a drag is in
    /// progress and hover state must not churn under it
    pub buttons: u8,
}

impl PointerEvent {
    /// Pointer moved over an element, no buttons down
    pub fn over(target: NodeId) -> Self {
        Self {
            target: Some(target),
            buttons: 0,
        }
    }

    /// Pointer left annotated content
    pub fn cleared() -> Self {
        Self {
            target: None,
            buttons: 0,
        }
    }
}

/// Resolve the hovered annotation and synchronize the focused class.
///
/// Clears the focused class from every element currently carrying it, then,
/// if the target carries an annotation identifier, adds the class to every
/// fragment sharing that identifier and reports it to `on_focus` (the
/// surrounding UI uses this to surface the associated comment). Returns
/// the hovered identifier, if any.
pub fn sync_hover(
    view: &mut DocumentView,
    event: &PointerEvent,
    mut on_focus: impl FnMut(&str),
) -> Option<String> {
    if event.buttons != 0 {
        return None;
    }

    // Snapshot before mutating: the query is backed by a live index
    let focused = view.elements_with_class(FOCUSED_CLASS);
    for element in focused {
        view.remove_class(element, FOCUSED_CLASS);
    }

    let identifier = event
        .target
        .and_then(|t| view.attribute(t, ID_ATTRIBUTE))
        .map(|id| id.to_string())?;

    let related = view.elements_with_class(&identifier_class(&identifier));
    for element in related {
        view.add_class(element, FOCUSED_CLASS);
    }
    on_focus(&identifier);
    Some(identifier)
}
