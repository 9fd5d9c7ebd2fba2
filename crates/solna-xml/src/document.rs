#![forbid(unsafe_code)]

//! Document parsing, including the lenient path used for dereferenced
//! content.

use solna_core::{Error, Result};

/// Parsing options used throughout the library.
///
/// DTDs are tolerated because real-world KeyInfo payloads (SAML, WS-Security)
/// occasionally carry internal subsets.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    }
}

/// Parse an XML document from a string.
pub fn parse_document(text: &str) -> Result<roxmltree::Document<'_>> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| Error::XmlParse(e.to_string()))
}

/// Convert dereferenced bytes to text, tolerating minor damage.
///
/// Retrieval results come from transform pipelines and remote stores and
/// are parsed in recovery mode for interoperability: invalid UTF-8 is
/// replaced rather than rejected, a BOM is stripped, and leading bytes
/// before the first `<` are discarded.
pub fn recovered_text(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    let text = text.trim_start_matches('\u{feff}');
    match text.find('<') {
        Some(pos) => text[pos..].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovered_text_strips_bom_and_garbage() {
        let data = b"\xef\xbb\xbf  <a/>";
        assert_eq!(recovered_text(data), "<a/>");
    }

    #[test]
    fn test_recovered_text_lossy_utf8() {
        let data = b"<a>\xff</a>";
        let text = recovered_text(data);
        assert!(parse_document(&text).is_ok());
    }

    #[test]
    fn test_parse_document_with_dtd() {
        let xml = "<!DOCTYPE a [<!ATTLIST e Id ID #IMPLIED>]><a/>";
        assert!(parse_document(xml).is_ok());
    }
}
