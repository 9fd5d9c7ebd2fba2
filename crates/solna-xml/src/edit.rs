#![forbid(unsafe_code)]

//! Splice-based XML editing.
//!
//! `roxmltree` is a read-only tree, so writes are expressed as byte-range
//! replacements against the original document text. Handlers produce
//! [`NodeEdit`] values; the driver applies them right-to-left so earlier
//! ranges stay valid.

use crate::node::escape_text;
use std::ops::Range;

/// A single replacement of a byte range in the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEdit {
    pub range: Range<usize>,
    pub replacement: String,
}

/// Apply a set of non-overlapping edits to the document text.
pub fn apply_edits(text: &str, mut edits: Vec<NodeEdit>) -> String {
    edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    let mut out = text.to_string();
    let mut last_start = usize::MAX;
    for edit in edits {
        debug_assert!(edit.range.end <= last_start, "overlapping node edits");
        last_start = edit.range.start;
        out.replace_range(edit.range.clone(), &edit.replacement);
    }
    out
}

/// Byte index one past the `>` of the start tag, and whether the tag is
/// self-closing. Quote-aware so `>` inside attribute values is skipped.
fn start_tag_end(slice: &str) -> Option<(usize, bool)> {
    let bytes = slice.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => {
                    let self_closing = i > 0 && bytes[i - 1] == b'/';
                    return Some((i + 1, self_closing));
                }
                _ => {}
            },
        }
    }
    None
}

/// Qualified name as it appears in the start tag (prefix included).
fn element_qname(slice: &str) -> &str {
    let rest = &slice[1..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Replace the content of an element with raw XML, preserving the start
/// tag (name, prefix, attributes). A self-closing element is expanded to
/// an open/close pair.
pub fn set_element_content(
    doc: &roxmltree::Document<'_>,
    node: roxmltree::Node<'_, '_>,
    content: &str,
) -> NodeEdit {
    let range = node.range();
    let slice = &doc.input_text()[range.clone()];
    let qname = element_qname(slice);
    let replacement = match start_tag_end(slice) {
        Some((tag_end, true)) => {
            let open = slice[..tag_end - 2].trim_end();
            format!("{open}>{content}</{qname}>")
        }
        Some((tag_end, false)) => {
            let close_start = slice.rfind("</").unwrap_or(slice.len());
            format!("{}{}{}", &slice[..tag_end], content, &slice[close_start..])
        }
        None => format!("<{qname}>{content}</{qname}>"),
    };
    NodeEdit { range, replacement }
}

/// Replace the content of an element with escaped text.
pub fn set_element_text(
    doc: &roxmltree::Document<'_>,
    node: roxmltree::Node<'_, '_>,
    text: &str,
) -> NodeEdit {
    set_element_content(doc, node, &escape_text(text))
}

/// Replace a whole element with new XML.
pub fn replace_node(node: roxmltree::Node<'_, '_>, xml: impl Into<String>) -> NodeEdit {
    NodeEdit {
        range: node.range(),
        replacement: xml.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit_on(xml: &str, text: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let node = doc.root_element();
        let edit = set_element_text(&doc, node, text);
        apply_edits(doc.input_text(), vec![edit])
    }

    #[test]
    fn test_set_text_on_self_closing() {
        assert_eq!(edit_on("<KeyName/>", "alice"), "<KeyName>alice</KeyName>");
        assert_eq!(edit_on("<KeyName />", "alice"), "<KeyName>alice</KeyName>");
    }

    #[test]
    fn test_set_text_preserves_attributes() {
        assert_eq!(
            edit_on(r#"<KeyName Id="k1"/>"#, "alice"),
            r#"<KeyName Id="k1">alice</KeyName>"#
        );
    }

    #[test]
    fn test_set_text_replaces_existing_content() {
        assert_eq!(
            edit_on("<KeyName>bob</KeyName>", "alice"),
            "<KeyName>alice</KeyName>"
        );
    }

    #[test]
    fn test_set_text_keeps_prefix() {
        let xml = r#"<ds:KeyName xmlns:ds="http://www.w3.org/2000/09/xmldsig#">old</ds:KeyName>"#;
        let out = edit_on(xml, "new");
        assert!(out.contains("<ds:KeyName"), "{out}");
        assert!(out.ends_with("new</ds:KeyName>"), "{out}");
    }

    #[test]
    fn test_set_text_escapes() {
        assert_eq!(edit_on("<a/>", "x<y&z"), "<a>x&lt;y&amp;z</a>");
    }

    #[test]
    fn test_quote_aware_start_tag_scan() {
        let doc = roxmltree::Document::parse(r#"<a b=">"><c/></a>"#).unwrap();
        let edit = set_element_content(&doc, doc.root_element(), "<d/>");
        let out = apply_edits(doc.input_text(), vec![edit]);
        assert_eq!(out, r#"<a b=">"><d/></a>"#);
    }

    #[test]
    fn test_apply_edits_right_to_left() {
        let doc = roxmltree::Document::parse("<r><a/><b/></r>").unwrap();
        let mut kids = doc.root_element().children().filter(|n| n.is_element());
        let a = kids.next().unwrap();
        let b = kids.next().unwrap();
        let edits = vec![
            set_element_text(&doc, a, "1"),
            set_element_text(&doc, b, "2"),
        ];
        assert_eq!(
            apply_edits(doc.input_text(), edits),
            "<r><a>1</a><b>2</b></r>"
        );
    }
}
