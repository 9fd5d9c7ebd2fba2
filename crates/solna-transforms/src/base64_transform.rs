#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::pipeline::{Transform, TransformData};
use solna_core::{algorithm, Error, Result};

/// Extract the text content of an XML fragment.
fn extract_text_content(xml_text: &str) -> Result<String> {
    let doc = solna_xml::parse_document(xml_text)
        .map_err(|e| Error::Transform(format!("base64: {e}")))?;
    let mut text = String::new();
    for node in doc.descendants() {
        if node.is_text() {
            text.push_str(node.text().unwrap_or(""));
        }
    }
    Ok(text)
}

/// Base64 decode transform — decodes Base64-encoded data.
///
/// XML input has its tags removed first, per the W3C transform definition:
/// "removes the tags and extracts the content".
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(&self, input: TransformData) -> Result<TransformData> {
        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;

        let text = match &input {
            TransformData::Binary(data) => std::str::from_utf8(data)
                .map_err(|e| Error::Transform(format!("base64 input not UTF-8: {e}")))?
                .to_owned(),
            TransformData::Xml { xml_text } => extract_text_content(xml_text)?,
        };

        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();

        let decoded = engine
            .decode(&cleaned)
            .map_err(|e| Error::Base64(format!("decode error: {e}")))?;

        Ok(TransformData::Binary(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_xml_text_content() {
        let input = TransformData::Xml {
            xml_text: "<Data>SGVs\n bG8=</Data>".to_string(),
        };
        let out = Base64DecodeTransform.execute(input).unwrap();
        assert_eq!(out.into_bytes(), b"Hello");
    }

    #[test]
    fn test_decode_binary_input() {
        let input = TransformData::Binary(b"SGVsbG8=".to_vec());
        let out = Base64DecodeTransform.execute(input).unwrap();
        assert_eq!(out.into_bytes(), b"Hello");
    }

    #[test]
    fn test_invalid_base64_is_an_error() {
        let input = TransformData::Binary(b"not base64!".to_vec());
        assert!(matches!(
            Base64DecodeTransform.execute(input),
            Err(Error::Base64(_))
        ));
    }
}
