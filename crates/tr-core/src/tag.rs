use std::collections::BTreeMap;

use crate::types::SourceSpan;

/// A named node of a script tree.
///
/// Attribute values are `None` when an attribute was declared without a value
/// (as opposed to an empty string). Trees are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub attrs: BTreeMap<String, Option<String>>,
    pub content: Vec<TagNode>,
    pub location: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagNode {
    Tag(Tag),
    Text(String),
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
            content: Vec::new(),
            location: SourceSpan::synthetic(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), Some(value.into()));
        self
    }

    pub fn with_null_attr(mut self, name: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), None);
        self
    }

    pub fn with_child(mut self, child: Tag) -> Self {
        self.content.push(TagNode::Tag(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.content.push(TagNode::Text(text.into()));
        self
    }

    pub fn with_location(mut self, location: SourceSpan) -> Self {
        self.location = location;
        self
    }

    /// Value of an attribute; absent and valueless attributes both read as `None`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(|value| value.as_deref())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Child nodes that are tags, skipping text.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.content.iter().filter_map(|node| match node {
            TagNode::Tag(tag) => Some(tag),
            TagNode::Text(_) => None,
        })
    }

    pub fn first_tag(&self) -> Option<&Tag> {
        self.tags().next()
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|node| match node {
                TagNode::Text(text) => Some(text.as_str()),
                TagNode::Tag(_) => None,
            })
            .collect()
    }

    /// Renders attributes for diagnostics, e.g. `{"key": "x", "global": None}`.
    pub fn attrs_repr(&self) -> String {
        let entries = self
            .attrs
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{:?}: {:?}", name, value),
                None => format!("{:?}: None", name),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("{{{}}}", entries)
    }
}
