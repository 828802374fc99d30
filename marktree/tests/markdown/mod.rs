mod detect;
mod normalize;
mod round_trip;

use marktree::formats::markdown::{parse_markdown, serialize_markdown, MarkdownOptions, SerializeOptions};
use marktree::Node;

pub fn parse(text: &str) -> Node {
    parse_markdown(text, &MarkdownOptions::default()).expect("markdown to parse")
}

pub fn serialize(doc: &Node) -> String {
    serialize_markdown(doc, &SerializeOptions::default()).expect("tree to serialize")
}
