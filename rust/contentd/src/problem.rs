use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Element tags that collect a single student answer.
pub const INPUT_TAGS: &[&str] = &[
    "textline",
    "textbox",
    "formulaequationinput",
    "numericalinput",
    "optioninput",
    "choicegroup",
    "checkboxgroup",
    "radiogroup",
    "schematic",
    "imageinput",
    "jsinput",
    "javascriptinput",
    "codeinput",
    "matlabinput",
    "filesubmission",
    "chemicalequationinput",
    "crystallography",
    "vsepr_input",
    "drag_and_drop_input",
    "annotationinput",
    "editamoleculeinput",
    "editageneinput",
    "designprotein2dinput",
];

const FIRST_RESPONSE_INDEX: usize = 2;
const FIRST_INPUT_INDEX: usize = 1;

/// One element of a problem definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemNode {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ProblemNode>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidName {
    #[error("invalid element name `{0}`")]
    Tag(String),
    #[error("invalid attribute name `{name}` on <{tag}>")]
    Attribute { tag: String, name: String },
}

impl InvalidName {
    pub fn name(&self) -> &str {
        match self {
            InvalidName::Tag(name) | InvalidName::Attribute { name, .. } => name,
        }
    }
}

/// XML `Name` production: a letter, `_` or `:` first, then letters, digits,
/// `.`, `-`, `_` or `:`.
pub fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_' || first == ':')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
}

impl ProblemNode {
    /// Rejects tags and attribute names that could not appear in XML. The
    /// canonical text behind fingerprints writes names unescaped.
    pub fn validate_names(&self) -> Result<(), InvalidName> {
        if !is_xml_name(&self.tag) {
            return Err(InvalidName::Tag(self.tag.clone()));
        }
        if let Some(name) = self.attrs.keys().find(|n| !is_xml_name(n)) {
            return Err(InvalidName::Attribute {
                tag: self.tag.clone(),
                name: name.clone(),
            });
        }
        self.children.iter().try_for_each(ProblemNode::validate_names)
    }
}

#[cfg(test)]
impl ProblemNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            text: None,
            tail: None,
            children: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: ProblemNode) -> Self {
        self.children.push(child);
        self
    }
}

pub fn is_responder_tag(tag: &str) -> bool {
    tag.ends_with("response")
}

pub fn is_input_tag(tag: &str) -> bool {
    INPUT_TAGS.contains(&tag)
}

/// `i4x://MITx/999/problem/P4` -> `i4x-MITx-999-problem-P4`
pub fn id_base(location: &str) -> String {
    location.replace("://", "-").replace('/', "-")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputField {
    pub id: String,
    pub response_index: usize,
    pub input_index: usize,
    pub node: ProblemNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responder {
    pub id: String,
    pub response_index: usize,
    /// Sub-tree with positional ids written in.
    pub xml: ProblemNode,
    pub inputs: Vec<InputField>,
}

impl Responder {
    pub fn tag(&self) -> &str {
        &self.xml.tag
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("no responder with id `{0}` in problem")]
pub struct ResponderLookupError(pub String);

/// Responders of a problem in document order, with ids assigned for this call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemTree {
    pub problem_id: String,
    pub responders: Vec<Responder>,
}

impl ProblemTree {
    pub fn build(location: &str, root: &ProblemNode) -> Self {
        let base = id_base(location);
        let mut found: Vec<&ProblemNode> = Vec::new();
        collect_responders(root, &mut found);

        let responders = found
            .into_iter()
            .enumerate()
            .map(|(pos, node)| annotate_responder(&base, pos + FIRST_RESPONSE_INDEX, node))
            .collect();

        Self {
            problem_id: base,
            responders,
        }
    }

    pub fn responder_by_id(&self, id: &str) -> Result<&Responder, ResponderLookupError> {
        self.responders
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| ResponderLookupError(id.to_string()))
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&Responder, &InputField)> {
        self.responders
            .iter()
            .flat_map(|r| r.inputs.iter().map(move |i| (r, i)))
    }
}

fn collect_responders<'a>(node: &'a ProblemNode, out: &mut Vec<&'a ProblemNode>) {
    if is_responder_tag(&node.tag) {
        out.push(node);
        return;
    }
    for child in &node.children {
        collect_responders(child, out);
    }
}

fn annotate_responder(base: &str, response_index: usize, node: &ProblemNode) -> Responder {
    let id = format!("{}_{}", base, response_index);
    let mut xml = node.clone();
    xml.attrs.insert("id".to_string(), id.clone());

    let mut inputs = Vec::new();
    annotate_inputs(&mut xml, &id, response_index, &mut inputs);

    Responder {
        id,
        response_index,
        xml,
        inputs,
    }
}

fn annotate_inputs(
    node: &mut ProblemNode,
    responder_id: &str,
    response_index: usize,
    out: &mut Vec<InputField>,
) {
    for child in node.children.iter_mut() {
        if is_input_tag(&child.tag) {
            let input_index = out.len() + FIRST_INPUT_INDEX;
            let id = format!("{}_{}", responder_id, input_index);
            child
                .attrs
                .insert("response_id".to_string(), response_index.to_string());
            child
                .attrs
                .insert("answer_id".to_string(), input_index.to_string());
            child.attrs.insert("id".to_string(), id.clone());
            out.push(InputField {
                id,
                response_index,
                input_index,
                node: child.clone(),
            });
        } else {
            annotate_inputs(child, responder_id, response_index, out);
        }
    }
}
