#![forbid(unsafe_code)]

//! Transform pipeline engine for dereferencing `<RetrievalMethod>` and
//! `<KeyInfoReference>` URIs.
//!
//! Each reference carries an optional sequence of transforms applied in
//! order to the dereferenced data.

pub mod base64_transform;
pub mod ctx;
pub mod pipeline;
pub mod uri;

pub use ctx::{TransformCtx, TransformUsage};
pub use pipeline::{Transform, TransformData, TransformPipeline};
pub use uri::UriType;
