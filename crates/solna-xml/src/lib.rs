#![forbid(unsafe_code)]

//! XML tree helpers for the Solna KeyInfo engine.
//!
//! Read access goes through `roxmltree`; writes are expressed as
//! [`NodeEdit`] values (byte range plus replacement text) spliced into
//! the original document string.

pub mod document;
pub mod edit;
pub mod node;

pub use document::{parse_document, parsing_options, recovered_text};
pub use edit::{apply_edits, replace_node, set_element_content, set_element_text, NodeEdit};
