use std::fs;
use std::path::Path;

use roxmltree::{Document, Node, NodeType};
use tr_core::{SourceLocation, SourceSpan, Tag, TagNode, TagRunError};

/// Builds a tag tree from an XML script. The document element becomes the root tag.
pub fn parse_tag_document(source: &str) -> Result<Tag, TagRunError> {
    let document = Document::parse(source)
        .map_err(|error| TagRunError::new("XML_PARSE_ERROR", error.to_string()))?;

    let Some(root) = document.root().children().find(|node| node.is_element()) else {
        return Err(TagRunError::new(
            "XML_PARSE_ERROR",
            "XML document must contain a root element.",
        ));
    };

    Ok(parse_element(&document, root))
}

pub fn parse_tag_file(path: &Path) -> Result<Tag, TagRunError> {
    let source = fs::read(path).map_err(|error| {
        TagRunError::new(
            "IO_READ",
            format!("Cannot read script \"{}\": {}", path.display(), error),
        )
    })?;
    let source = String::from_utf8(source).map_err(|error| {
        TagRunError::new(
            "IO_DECODE",
            format!("Script \"{}\" is not valid UTF-8: {}", path.display(), error),
        )
    })?;
    parse_tag_document(source.trim_start_matches('\u{feff}'))
}

fn parse_element(document: &Document<'_>, node: Node<'_, '_>) -> Tag {
    let mut tag = Tag::new(node.tag_name().name())
        .with_location(node_span(document, node.range().start, node.range().end));
    for attribute in node.attributes() {
        tag = tag.with_attr(attribute.name(), attribute.value());
    }

    for child in node.children() {
        match child.node_type() {
            NodeType::Element => tag
                .content
                .push(TagNode::Tag(parse_element(document, child))),
            NodeType::Text => {
                let value = child.text().unwrap_or_default();
                if value.trim().is_empty() {
                    continue;
                }
                tag.content.push(TagNode::Text(value.to_string()));
            }
            _ => {}
        }
    }

    tag
}

fn node_span(document: &Document<'_>, start: usize, end: usize) -> SourceSpan {
    let start_pos = document.text_pos_at(start);
    let end_pos = document.text_pos_at(end);
    SourceSpan {
        start: SourceLocation {
            line: start_pos.row as usize,
            column: start_pos.col as usize,
        },
        end: SourceLocation {
            line: end_pos.row as usize,
            column: end_pos.col as usize,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tag_document_builds_tree_with_attributes_and_text() {
        let source = r#"<root><set key="x" value="1"/><template key="t">Hello</template></root>"#;
        let root = parse_tag_document(source).expect("xml should parse");
        assert_eq!(root.name, "root");
        assert_eq!(root.tags().count(), 2);

        let set = root.first_tag().expect("set tag");
        assert_eq!(set.name, "set");
        assert_eq!(set.attr("key"), Some("x"));
        assert_eq!(set.attr("value"), Some("1"));

        let template = root.tags().nth(1).expect("template tag");
        assert_eq!(template.text(), "Hello");
        assert!(template.location.start.line >= 1);
    }

    #[test]
    fn whitespace_and_comments_are_not_kept() {
        let source = "<root>\n  <!-- note -->\n  <sub>\n    <get key=\"a\"/>\n  </sub>\n</root>";
        let root = parse_tag_document(source).expect("xml should parse");
        assert_eq!(root.content.len(), 1);
        let sub = root.first_tag().expect("sub tag");
        assert_eq!(sub.content.len(), 1);
        assert_eq!(sub.first_tag().map(|tag| tag.location.start.line), Some(4));
    }

    #[test]
    fn parse_tag_document_returns_parse_error_for_invalid_xml() {
        let error = parse_tag_document("<root>").expect_err("invalid xml should fail");
        assert_eq!(error.code, "XML_PARSE_ERROR");
    }

    #[test]
    fn parse_tag_document_requires_a_root_element() {
        let error = parse_tag_document("<?xml version=\"1.0\"?><!---->")
            .expect_err("missing root element should fail");
        assert_eq!(error.code, "XML_PARSE_ERROR");
    }

    #[test]
    fn parse_tag_file_reports_missing_files() {
        let error = parse_tag_file(Path::new("/definitely/not/here.xml"))
            .expect_err("missing file should fail");
        assert_eq!(error.code, "IO_READ");
    }
}
