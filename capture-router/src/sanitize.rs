//! HTML snapshot cleaning.
//!
//! When an adapter keeps a formatted copy of a question or answer, it builds
//! a filtered clone of the subtree and serializes that, never the raw
//! markup. The clean pass strips script/style subtrees, event-handler and
//! framework-internal attributes, and visually hidden elements. This is a
//! conservative allow-nothing-dangerous transform, not a sanitizer: the
//! archive sanitizes again before rendering the fragment anywhere.

use crate::dom::{DomElement, DomNode};

/// Element tags removed wholesale.
const STRIPPED_TAGS: &[&str] = &["script", "style", "noscript"];

/// Attributes removed from every element: event handlers plus attributes
/// that reactive UI frameworks generate and churn between renders.
const STRIPPED_ATTRS: &[&str] = &[
    "onclick",
    "onerror",
    "onload",
    "onmouseover",
    "onmouseout",
    "onfocus",
    "onblur",
    "onchange",
    "onsubmit",
    "onreset",
    "data-test-id",
    "jslog",
    "data-ved",
    "data-hveid",
    "aria-describedby",
    "cdk-describedby-host",
];

/// Tags serialized without a closing tag.
const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "meta", "link", "wbr"];

/// Extract the cleaned inner HTML of an element. Returns `None` when the
/// cleaned fragment is empty, so callers can leave the snapshot field absent.
pub fn clean_inner_html(element: &DomElement) -> Option<String> {
    let cleaned = clean_element(element)?;
    let mut out = String::new();
    for child in &cleaned.children {
        serialize_node(child, &mut out);
    }
    let out = out.trim().to_string();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Build a filtered copy of an element subtree, or `None` if the element is
/// dropped entirely.
fn clean_element(element: &DomElement) -> Option<DomElement> {
    let tag = element.tag.to_ascii_lowercase();
    if STRIPPED_TAGS.contains(&tag.as_str()) {
        return None;
    }
    if is_hidden(element) {
        return None;
    }

    let mut cleaned = DomElement::new(&element.tag);
    cleaned.id = element.id.clone();
    cleaned.class_name = element.class_name.clone();

    for (name, value) in &element.attrs {
        if STRIPPED_ATTRS.contains(&name.as_str()) {
            continue;
        }
        if name.starts_with("_ng") || name.starts_with("ng-") {
            continue;
        }
        cleaned.attrs.insert(name.clone(), value.clone());
    }

    for child in &element.children {
        match child {
            DomNode::Text(text) => cleaned.children.push(DomNode::Text(text.clone())),
            DomNode::Element(el) => {
                if let Some(kept) = clean_element(el) {
                    cleaned.children.push(DomNode::Element(kept));
                }
            }
        }
    }

    Some(cleaned)
}

/// Matches the visually-hidden patterns: inline `display: none`, the
/// `hidden` attribute, or the cdk hidden-utility class.
fn is_hidden(element: &DomElement) -> bool {
    if element.attrs.contains_key("hidden") {
        return true;
    }
    if element.has_class("cdk-visually-hidden") {
        return true;
    }
    if let Some(style) = element.attr("style") {
        let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.contains("display:none") {
            return true;
        }
    }
    false
}

fn serialize_node(node: &DomNode, out: &mut String) {
    match node {
        DomNode::Text(text) => out.push_str(&escape_text(text)),
        DomNode::Element(el) => serialize_element(el, out),
    }
}

fn serialize_element(el: &DomElement, out: &mut String) {
    let tag = el.tag.to_ascii_lowercase();
    out.push('<');
    out.push_str(&tag);
    if !el.id.is_empty() {
        out.push_str(&format!(" id=\"{}\"", escape_attr(&el.id)));
    }
    if !el.class_name.is_empty() {
        out.push_str(&format!(" class=\"{}\"", escape_attr(&el.class_name)));
    }
    for (name, value) in &el.attrs {
        out.push_str(&format!(" {}=\"{}\"", name, escape_attr(value)));
    }
    if VOID_TAGS.contains(&tag.as_str()) {
        out.push_str(">");
        return;
    }
    out.push('>');
    for child in &el.children {
        serialize_node(child, out);
    }
    out.push_str(&format!("</{}>", tag));
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
