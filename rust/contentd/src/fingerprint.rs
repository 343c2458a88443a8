use crate::problem::ProblemNode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content hash of a responder sub-tree. Positional attributes do not
/// contribute, so the same responder keeps its fingerprint when moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_stored(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attributes that encode position rather than content.
pub fn is_positional_attribute(name: &str) -> bool {
    name.ends_with("id") || name == "size"
}

pub fn fingerprint(node: &ProblemNode) -> Fingerprint {
    let text = canonical_text(&sanitize(node));
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    Fingerprint(format!("{:x}", hasher.finalize()))
}

/// Deep copy with every positional attribute removed at every depth.
pub fn sanitize(node: &ProblemNode) -> ProblemNode {
    let mut copy = node.clone();
    strip_positional(&mut copy);
    copy
}

fn strip_positional(node: &mut ProblemNode) {
    node.attrs.retain(|name, _| !is_positional_attribute(name));
    for child in node.children.iter_mut() {
        strip_positional(child);
    }
}

/// XML-style rendering with attributes in sorted order.
pub fn canonical_text(node: &ProblemNode) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

fn write_node(node: &ProblemNode, out: &mut String) {
    out.push('<');
    out.push_str(&node.tag);
    for (name, value) in &node.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        push_escaped(value, out);
        out.push('"');
    }

    if node.text.is_none() && node.children.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        if let Some(text) = &node.text {
            push_escaped(text, out);
        }
        for child in &node.children {
            write_node(child, out);
        }
        out.push_str("</");
        out.push_str(&node.tag);
        out.push('>');
    }

    if let Some(tail) = &node.tail {
        push_escaped(tail, out);
    }
}

fn push_escaped(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
