//! Snapshot tree representation of a rendered page.
//!
//! Adapters do not touch a live browser DOM; they scan an immutable snapshot
//! tree shipped by the page bridge as JSON. The tree carries only what the
//! extraction heuristics need: tag names, ids, class strings, attributes and
//! text. Queries mirror the small subset of selector behavior the adapters
//! rely on (id lookup, class-substring match, attribute-substring match).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// A node in the snapshot tree: either an element or a run of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomNode {
    Text(String),
    Element(DomElement),
}

impl DomNode {
    pub fn as_element(&self) -> Option<&DomElement> {
        match self {
            DomNode::Element(el) => Some(el),
            DomNode::Text(_) => None,
        }
    }
}

/// An element node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomElement {
    pub tag: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// The full class string, as `className` reads in a browser.
    #[serde(default, rename = "class", skip_serializing_if = "String::is_empty")]
    pub class_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DomNode>,
}

impl DomElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = class_name.to_string();
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_child(mut self, child: DomElement) -> Self {
        self.children.push(DomNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.children.push(DomNode::Text(text.to_string()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Substring match against the class string, the `[class*="..."]`
    /// selector the extraction heuristics lean on.
    pub fn class_contains(&self, needle: &str) -> bool {
        self.class_name.contains(needle)
    }

    /// Exact class membership, split on whitespace.
    pub fn has_class(&self, class: &str) -> bool {
        self.class_name.split_whitespace().any(|c| c == class)
    }

    /// Child elements, skipping text nodes.
    pub fn child_elements(&self) -> impl Iterator<Item = &DomElement> {
        self.children.iter().filter_map(DomNode::as_element)
    }

    /// All descendant elements in document order, not including `self`.
    pub fn descendants(&self) -> Vec<&DomElement> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    /// First descendant with the given id.
    pub fn element_by_id(&self, id: &str) -> Option<&DomElement> {
        self.query(&|el| el.id == id)
    }

    /// First descendant matching the predicate, document order.
    pub fn query(&self, pred: &dyn Fn(&DomElement) -> bool) -> Option<&DomElement> {
        for child in self.child_elements() {
            if pred(child) {
                return Some(child);
            }
            if let Some(found) = child.query(pred) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants matching the predicate, document order.
    pub fn query_all(&self, pred: &dyn Fn(&DomElement) -> bool) -> Vec<&DomElement> {
        self.descendants().into_iter().filter(|el| pred(el)).collect()
    }

    /// First descendant whose class string contains `needle`.
    pub fn find_class_containing(&self, needle: &str) -> Option<&DomElement> {
        self.query(&|el| el.class_contains(needle))
    }

    /// All descendants whose class string contains `needle`.
    pub fn find_all_class_containing(&self, needle: &str) -> Vec<&DomElement> {
        self.query_all(&|el| el.class_contains(needle))
    }

    /// Concatenated text of all descendant text nodes, `textContent` style,
    /// trimmed at the ends.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out.trim().to_string()
    }
}

fn collect_descendants<'a>(el: &'a DomElement, out: &mut Vec<&'a DomElement>) {
    for child in el.child_elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(text) => out.push_str(text),
            DomNode::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Document ready state, as reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    Loading,
    Complete,
}

impl Default for ReadyState {
    fn default() -> Self {
        ReadyState::Complete
    }
}

/// A snapshot of a rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ready_state: ReadyState,
    pub body: DomElement,
}

impl Page {
    /// Hostname of the page URL, empty if the URL does not parse.
    pub fn hostname(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

/// One DOM mutation, as summarized by the bridge. Added subtrees are shipped
/// shallow (the bridge truncates depth); the capture loop only inspects
/// class/id strings near the surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    #[serde(default)]
    pub added: Vec<DomNode>,
    /// The mutation target element, without children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<DomElement>,
}

/// Latest page snapshot, shared between the bridge reader and the capture
/// loop. The bridge replaces the snapshot wholesale; the loop clones it at
/// scan time.
#[derive(Clone)]
pub struct SharedDom {
    inner: Arc<RwLock<Page>>,
}

impl SharedDom {
    pub fn new(page: Page) -> Self {
        Self {
            inner: Arc::new(RwLock::new(page)),
        }
    }

    pub fn snapshot(&self) -> Page {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, page: Page) {
        match self.inner.write() {
            Ok(mut guard) => *guard = page,
            Err(poisoned) => *poisoned.into_inner() = page,
        }
    }
}
