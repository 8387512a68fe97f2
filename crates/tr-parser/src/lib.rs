mod xml;

pub use xml::{parse_tag_document, parse_tag_file};
