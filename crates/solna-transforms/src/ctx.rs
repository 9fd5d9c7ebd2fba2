#![forbid(unsafe_code)]

//! Dereference context driving the transform pipeline.
//!
//! The processing sequence mirrors the reference processing model:
//! reset, install the start URI, read the `<Transforms>` children, then
//! execute against the containing document to obtain the result bytes.

use crate::base64_transform::Base64DecodeTransform;
use crate::pipeline::{Transform, TransformData, TransformPipeline};
use crate::uri::{self, UriType};
use solna_core::{algorithm, ns, Error, Result};
use solna_xml::node::{check_node_name, describe, element_children};

/// Where a transform list appears; constrains which algorithms are
/// acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformUsage {
    /// Transforms inside a `<dsig:Transforms>` list.
    DSigTransform,
    /// Any usage.
    Any,
}

/// Context for dereferencing a single reference URI.
pub struct TransformCtx {
    /// URI categories this context is willing to dereference.
    pub enabled_uris: UriType,
    uri: Option<String>,
    pipeline: TransformPipeline,
}

impl TransformCtx {
    pub fn new() -> Self {
        Self {
            enabled_uris: UriType::ANY,
            uri: None,
            pipeline: TransformPipeline::new(),
        }
    }

    /// Clear per-run state. User preferences are not changed.
    pub fn reset(&mut self) {
        self.uri = None;
        self.pipeline.clear();
    }

    /// Install the start URI, checking it against the enabled categories.
    pub fn set_uri(&mut self, uri: Option<&str>) -> Result<()> {
        let uri_type = uri::classify(uri.unwrap_or(""));
        if !self.enabled_uris.contains(uri_type) {
            return Err(Error::InvalidUri(format!(
                "uri type {uri_type:?} is not enabled: {}",
                uri.unwrap_or("")
            )));
        }
        self.uri = uri.map(|u| u.to_owned());
        Ok(())
    }

    /// Read a `<Transforms>` element and append its transforms.
    pub fn parse_transforms(
        &mut self,
        transforms_node: roxmltree::Node<'_, '_>,
        usage: TransformUsage,
    ) -> Result<()> {
        for child in element_children(transforms_node) {
            if !check_node_name(child, ns::node::TRANSFORM, ns::DSIG) {
                return Err(Error::UnexpectedNode(describe(child)));
            }
            let uri = child.attribute(ns::attr::ALGORITHM).ok_or_else(|| {
                Error::InvalidAttribute("Algorithm on Transform".to_string())
            })?;
            self.pipeline.push(transform_from_uri(uri, usage)?);
        }
        Ok(())
    }

    /// Dereference the URI against the document and run the transforms.
    pub fn execute(&mut self, doc: &roxmltree::Document<'_>) -> Result<Vec<u8>> {
        let initial = match self.uri.as_deref() {
            None | Some("") => TransformData::Xml {
                xml_text: doc.input_text().to_string(),
            },
            Some(u) => match uri::parse_same_document_ref(u) {
                Some(id) => {
                    let node = uri::resolve_id(doc, id)?;
                    TransformData::Xml {
                        xml_text: doc.input_text()[node.range()].to_string(),
                    }
                }
                None => {
                    return Err(Error::InvalidUri(format!(
                        "external URI not supported: {u}"
                    )))
                }
            },
        };
        let result = self.pipeline.execute(initial)?;
        Ok(result.into_bytes())
    }

    /// Copy user preferences from another context. Per-run state (URI,
    /// parsed transforms) is not copied.
    pub fn copy_user_pref(&mut self, src: &TransformCtx) {
        self.enabled_uris = src.enabled_uris;
    }
}

impl Default for TransformCtx {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a transform implementation by algorithm URI.
fn transform_from_uri(uri: &str, _usage: TransformUsage) -> Result<Box<dyn Transform>> {
    match uri {
        algorithm::BASE64 => Ok(Box::new(Base64DecodeTransform)),
        _ => Err(Error::UnsupportedAlgorithm(uri.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

    #[test]
    fn test_execute_whole_document() {
        let doc = roxmltree::Document::parse("<r><a/></r>").unwrap();
        let mut ctx = TransformCtx::new();
        ctx.set_uri(None).unwrap();
        assert_eq!(ctx.execute(&doc).unwrap(), b"<r><a/></r>");
    }

    #[test]
    fn test_execute_same_document_ref() {
        let doc = roxmltree::Document::parse(r#"<r><a Id="x">hi</a></r>"#).unwrap();
        let mut ctx = TransformCtx::new();
        ctx.set_uri(Some("#x")).unwrap();
        assert_eq!(ctx.execute(&doc).unwrap(), br#"<a Id="x">hi</a>"#);
    }

    #[test]
    fn test_execute_missing_id() {
        let doc = roxmltree::Document::parse("<r/>").unwrap();
        let mut ctx = TransformCtx::new();
        ctx.set_uri(Some("#nope")).unwrap();
        assert!(matches!(ctx.execute(&doc), Err(Error::InvalidUri(_))));
    }

    #[test]
    fn test_execute_external_uri_rejected() {
        let doc = roxmltree::Document::parse("<r/>").unwrap();
        let mut ctx = TransformCtx::new();
        ctx.set_uri(Some("https://example.com/key")).unwrap();
        assert!(matches!(ctx.execute(&doc), Err(Error::InvalidUri(_))));
    }

    #[test]
    fn test_disabled_uri_type_rejected_at_set() {
        let mut ctx = TransformCtx::new();
        ctx.enabled_uris = UriType::SAME_DOCUMENT;
        assert!(ctx.set_uri(Some("#x")).is_ok());
        assert!(matches!(ctx.set_uri(None), Err(Error::InvalidUri(_))));
    }

    #[test]
    fn test_parse_and_run_base64_transform() {
        let xml = format!(
            r#"<r xmlns:ds="{DSIG}"><Secret Id="x">SGVsbG8=</Secret><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#base64"/></ds:Transforms></r>"#
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let transforms = doc
            .descendants()
            .find(|n| n.tag_name().name() == "Transforms")
            .unwrap();

        let mut ctx = TransformCtx::new();
        ctx.set_uri(Some("#x")).unwrap();
        ctx.parse_transforms(transforms, TransformUsage::DSigTransform)
            .unwrap();
        assert_eq!(ctx.execute(&doc).unwrap(), b"Hello");
    }

    #[test]
    fn test_unknown_transform_algorithm() {
        let xml = format!(
            r#"<ds:Transforms xmlns:ds="{DSIG}"><ds:Transform Algorithm="urn:nope"/></ds:Transforms>"#
        );
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let mut ctx = TransformCtx::new();
        let err = ctx
            .parse_transforms(doc.root_element(), TransformUsage::DSigTransform)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_stray_child_in_transforms_list() {
        let xml = format!(r#"<ds:Transforms xmlns:ds="{DSIG}"><ds:Stray/></ds:Transforms>"#);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let mut ctx = TransformCtx::new();
        let err = ctx
            .parse_transforms(doc.root_element(), TransformUsage::DSigTransform)
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedNode(_)));
    }

    #[test]
    fn test_reset_preserves_prefs() {
        let mut ctx = TransformCtx::new();
        ctx.enabled_uris = UriType::SAME_DOCUMENT;
        ctx.set_uri(Some("#x")).unwrap();
        ctx.reset();
        assert_eq!(ctx.enabled_uris, UriType::SAME_DOCUMENT);
        assert!(matches!(ctx.set_uri(None), Err(Error::InvalidUri(_))));
    }
}
