//! Parsed document tree consumed by the layout walker.
//!
//! The tree is produced by an external markup parser; the engine only reads
//! it. Kinds are a closed set, with [`NodeKind::Unrecognized`] carrying the
//! name of anything the producer emitted that this engine does not handle.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Article,
    Chapter,
    /// First child is the title; remaining children are the section body.
    Heading,
    Paragraph,
    Text,
    Emphasized,
    Strong,
    Underline,
    Strike,
    Sub,
    Sup,
    Small,
    Big,
    Teletype,
    Span,
    Link,
    Url,
    NamedUrl,
    CategoryLink,
    BreakingReturn,
    Center,
    Div,
    Blockquote,
    Indented,
    DefinitionList,
    DefinitionTerm,
    DefinitionDescription,
    List,
    ListItem,
    Table,
    Row,
    Cell,
    Caption,
    Image,
    Gallery,
    Preformatted,
    Source,
    Reference,
    ReferenceList,
    Math,
    HorizontalRule,
    Control,
    Unrecognized(String),
}

impl NodeKind {
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Unrecognized(name) => name,
            NodeKind::Article => "Article",
            NodeKind::Chapter => "Chapter",
            NodeKind::Heading => "Heading",
            NodeKind::Paragraph => "Paragraph",
            NodeKind::Text => "Text",
            NodeKind::Emphasized => "Emphasized",
            NodeKind::Strong => "Strong",
            NodeKind::Underline => "Underline",
            NodeKind::Strike => "Strike",
            NodeKind::Sub => "Sub",
            NodeKind::Sup => "Sup",
            NodeKind::Small => "Small",
            NodeKind::Big => "Big",
            NodeKind::Teletype => "Teletype",
            NodeKind::Span => "Span",
            NodeKind::Link => "Link",
            NodeKind::Url => "Url",
            NodeKind::NamedUrl => "NamedUrl",
            NodeKind::CategoryLink => "CategoryLink",
            NodeKind::BreakingReturn => "BreakingReturn",
            NodeKind::Center => "Center",
            NodeKind::Div => "Div",
            NodeKind::Blockquote => "Blockquote",
            NodeKind::Indented => "Indented",
            NodeKind::DefinitionList => "DefinitionList",
            NodeKind::DefinitionTerm => "DefinitionTerm",
            NodeKind::DefinitionDescription => "DefinitionDescription",
            NodeKind::List => "List",
            NodeKind::ListItem => "ListItem",
            NodeKind::Table => "Table",
            NodeKind::Row => "Row",
            NodeKind::Cell => "Cell",
            NodeKind::Caption => "Caption",
            NodeKind::Image => "Image",
            NodeKind::Gallery => "Gallery",
            NodeKind::Preformatted => "Preformatted",
            NodeKind::Source => "Source",
            NodeKind::Reference => "Reference",
            NodeKind::ReferenceList => "ReferenceList",
            NodeKind::Math => "Math",
            NodeKind::HorizontalRule => "HorizontalRule",
            NodeKind::Control => "Control",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Right,
    Center,
    Justify,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListNumbering {
    Decimal,
    LowerAlpha,
    UpperAlpha,
}

/// Kind-specific attributes. Every field is optional so one struct can
/// describe any node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAttrs {
    /// Heading level (1 = article title level).
    pub level: Option<u8>,
    pub numbered: Option<ListNumbering>,
    pub colspan: Option<usize>,
    pub align: Option<Align>,
    /// Reference name, used to share footnote indices.
    pub name: Option<String>,
    /// Link or image target.
    pub target: Option<String>,
    pub url: Option<String>,
    /// Declared table column count.
    pub columns: Option<usize>,
    /// Gallery images per row.
    pub per_row: Option<usize>,
    pub caption: Option<String>,
    pub is_header: bool,
    pub thumb: bool,
    pub frame: bool,
    pub inline: bool,
    /// Category/lang links written with a leading colon render inline.
    pub colon: bool,
    pub lang: Option<String>,
    pub indent: Option<usize>,
    pub height: Option<f32>,
    pub border: bool,
    pub no_display: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attrs: NodeAttrs,
    #[serde(default)]
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            text: None,
            attrs: NodeAttrs::default(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        let mut node = Self::new(NodeKind::Text);
        node.text = Some(text.into());
        node
    }

    pub fn with_children(mut self, children: Vec<DocumentNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_child(mut self, child: DocumentNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_attrs(mut self, attrs: NodeAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn colspan(&self) -> usize {
        self.attrs.colspan.unwrap_or(1).max(1)
    }

    /// All text in the subtree, in document order.
    pub fn display_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    pub fn contains_kind(&self, kind: &NodeKind) -> bool {
        self.children
            .iter()
            .any(|child| &child.kind == kind || child.contains_kind(kind))
    }

    pub fn descendants_of_kind<'a>(&'a self, kind: &NodeKind, out: &mut Vec<&'a DocumentNode>) {
        for child in &self.children {
            if &child.kind == kind {
                out.push(child);
            }
            child.descendants_of_kind(kind, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_text_walks_in_order() {
        let node = DocumentNode::new(NodeKind::Paragraph).with_children(vec![
            DocumentNode::text("Hello "),
            DocumentNode::new(NodeKind::Strong).with_child(DocumentNode::text("big")),
            DocumentNode::text(" world"),
        ]);
        assert_eq!(node.display_text(), "Hello big world");
        assert!(node.contains_kind(&NodeKind::Text));
        assert!(!node.contains_kind(&NodeKind::Table));
    }

    #[test]
    fn deserializes_from_json() {
        let raw = r#"{
            "kind": "Table",
            "attrs": {"columns": 2},
            "children": [
                {"kind": "Row", "children": [
                    {"kind": "Cell", "attrs": {"colspan": 2}, "children": [
                        {"kind": "Text", "text": "wide"}
                    ]}
                ]}
            ]
        }"#;
        let node: DocumentNode = serde_json::from_str(raw).expect("valid tree");
        assert_eq!(node.attrs.columns, Some(2));
        assert_eq!(node.children[0].children[0].colspan(), 2);
        let unknown: DocumentNode =
            serde_json::from_str(r#"{"kind": {"Unrecognized": "Timeline"}}"#).expect("valid");
        assert_eq!(unknown.kind.name(), "Timeline");
    }
}
