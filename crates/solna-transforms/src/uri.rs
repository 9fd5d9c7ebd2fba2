#![forbid(unsafe_code)]

//! URI classification and same-document resolution.
//!
//! Handles:
//! - Empty URI ("") — the entire document
//! - Same-document references ("#id", "#xpointer(id('id'))")
//! - External references (not dereferenced at this layer)

use solna_core::{Error, Result};

bitflags::bitflags! {
    /// Categories of reference URIs a context is willing to dereference.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UriType: u32 {
        const EMPTY = 1 << 0;
        const SAME_DOCUMENT = 1 << 1;
        const LOCAL = 1 << 2;
        const REMOTE = 1 << 3;
    }
}

impl UriType {
    pub const ANY: UriType = UriType::all();
}

/// Classify a reference URI.
pub fn classify(uri: &str) -> UriType {
    if uri.is_empty() {
        UriType::EMPTY
    } else if uri.starts_with('#') {
        UriType::SAME_DOCUMENT
    } else if uri.contains("://") {
        UriType::REMOTE
    } else {
        UriType::LOCAL
    }
}

/// Extract the target ID from a same-document reference.
///
/// Accepts both the shorthand (`#id`) and the xpointer form
/// (`#xpointer(id('id'))`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    let fragment = uri.strip_prefix('#')?;
    if let Some(rest) = fragment.strip_prefix("xpointer(id(") {
        let inner = rest.strip_suffix("))")?;
        return inner
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
    }
    Some(fragment)
}

/// Find the element carrying the given ID attribute value.
///
/// The default registered ID attribute names are `Id`, `ID` and `id`.
pub fn resolve_id<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    id: &str,
) -> Result<roxmltree::Node<'a, 'input>> {
    for node in doc.descendants() {
        if !node.is_element() {
            continue;
        }
        for attr_name in ["Id", "ID", "id"] {
            if node.attribute(attr_name) == Some(id) {
                return Ok(node);
            }
        }
    }
    Err(Error::InvalidUri(format!("no element with id={id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), UriType::EMPTY);
        assert_eq!(classify("#x"), UriType::SAME_DOCUMENT);
        assert_eq!(classify("https://example.com/k"), UriType::REMOTE);
        assert_eq!(classify("keys.xml"), UriType::LOCAL);
    }

    #[test]
    fn test_parse_same_document_ref() {
        assert_eq!(parse_same_document_ref("#x"), Some("x"));
        assert_eq!(parse_same_document_ref("#xpointer(id('x'))"), Some("x"));
        assert_eq!(parse_same_document_ref("other"), None);
    }

    #[test]
    fn test_resolve_id() {
        let doc = roxmltree::Document::parse(r#"<r><a Id="x"/><b id="y"/></r>"#).unwrap();
        assert_eq!(resolve_id(&doc, "x").unwrap().tag_name().name(), "a");
        assert_eq!(resolve_id(&doc, "y").unwrap().tag_name().name(), "b");
        assert!(resolve_id(&doc, "z").is_err());
    }
}
