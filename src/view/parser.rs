//! Markup ingestion
//!
//! Builds a [`DocumentView`] from the document provider's rendered markup.
//! Content is expected to be well-formed XHTML-style markup (void elements
//! self-closed), which is what a rendering pipeline produces for reader
//! content. Incoming markup is sanitized first: script/style subtrees and
//! inline event handlers have no business inside annotatable content.

use lol_html::{element, rewrite_str, RewriteStrSettings};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::tree::DocumentView;

/// The `id` of the element whose subtree is annotatable. When the markup
/// carries no such element the whole document is treated as the content
/// root.
pub const CONTENT_ROOT_ID: &str = "content-highlightable";

/// Markup ingestion errors
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed markup: {0}")]
    Malformed(String),

    #[error("Unbalanced end tag: {0}")]
    UnbalancedEndTag(String),

    #[error("Sanitize failed: {0}")]
    Sanitize(String),
}

/// Strip scripts, styles, inline event handlers, and `javascript:` URLs
/// from provider markup before it is turned into a view
pub fn sanitize_markup(markup: &str) -> Result<String, ParseError> {
    rewrite_str(
        markup,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("script", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("style", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("*", |el| {
                    let handlers: Vec<String> = el
                        .attributes()
                        .iter()
                        .map(|a| a.name())
                        .filter(|name| name.starts_with("on"))
                        .collect();
                    for name in handlers {
                        el.remove_attribute(&name);
                    }
                    for attr in ["href", "src"] {
                        if let Some(value) = el.get_attribute(attr) {
                            if value.trim().to_lowercase().starts_with("javascript:") {
                                el.remove_attribute(attr);
                            }
                        }
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|e| ParseError::Sanitize(e.to_string()))
}

/// Sanitize and parse provider markup into a document view.
///
/// The markup is treated as a fragment: parsed nodes land under a
/// synthetic `body` root. The content root is the element carrying
/// [`CONTENT_ROOT_ID`], falling back to the root itself.
pub fn parse_document(markup: &str) -> Result<DocumentView, ParseError> {
    let sanitized = sanitize_markup(markup)?;
    let mut view = DocumentView::new("body");
    let mut stack = vec![view.root()];
    let mut reader = Reader::from_str(&sanitized);

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let element = append_element(&mut view, *stack.last().unwrap(), &start)?;
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                append_element(&mut view, *stack.last().unwrap(), &start)?;
            }
            Ok(Event::End(end)) => {
                if stack.len() <= 1 {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    return Err(ParseError::UnbalancedEndTag(name));
                }
                stack.pop();
            }
            Ok(Event::Text(text)) => {
                let content = text
                    .unescape()
                    .map_err(|e| ParseError::Malformed(e.to_string()))?;
                if !content.is_empty() {
                    let node = view.create_text(&content);
                    view.append_child(*stack.last().unwrap(), node);
                }
            }
            Ok(Event::CData(cdata)) => {
                let content = String::from_utf8_lossy(&cdata).into_owned();
                if !content.is_empty() {
                    let node = view.create_text(&content);
                    view.append_child(*stack.last().unwrap(), node);
                }
            }
            Ok(Event::Eof) => break,
            // Comments, processing instructions, doctypes carry no content
            Ok(_) => {}
            Err(e) => return Err(ParseError::Malformed(e.to_string())),
        }
    }

    if stack.len() > 1 {
        let unclosed = view.tag(*stack.last().unwrap()).unwrap_or("").to_string();
        return Err(ParseError::Malformed(format!("unclosed element <{}>", unclosed)));
    }

    if let Some(content_root) = view.element_by_id(CONTENT_ROOT_ID) {
        view.set_content_root(content_root);
    }
    Ok(view)
}

fn append_element(
    view: &mut DocumentView,
    parent: super::tree::NodeId,
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<super::tree::NodeId, ParseError> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let element = view.create_element(&tag);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| ParseError::Malformed(e.to_string()))?;
        let name = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| ParseError::Malformed(e.to_string()))?;
        if name == "class" {
            for class in value.split_whitespace() {
                view.add_class(element, class);
            }
        } else {
            view.set_attribute(element, &name, &value);
        }
    }
    view.append_child(parent, element);
    Ok(element)
}
