//! Multi-document YAML splitting.

use crate::document::YamlDocument;

const SEPARATOR: &[u8] = b"---\n";

/// Split raw bytes into individual documents on the literal `---` separator
/// line. Zero-length sections are discarded; the remainder keeps input
/// order. A separator-free input yields the input itself (or nothing, when
/// it is empty).
pub fn split_documents(raw: &[u8]) -> Vec<YamlDocument> {
    let mut docs = Vec::new();
    let mut rest = raw;
    while let Some(at) = find_separator(rest) {
        push_section(&mut docs, &rest[..at]);
        rest = &rest[at + SEPARATOR.len()..];
    }
    push_section(&mut docs, rest);
    docs
}

fn push_section(docs: &mut Vec<YamlDocument>, section: &[u8]) {
    if !section.is_empty() {
        docs.push(YamlDocument::from(section));
    }
}

fn find_separator(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(SEPARATOR.len())
        .position(|window| window == SEPARATOR)
}
