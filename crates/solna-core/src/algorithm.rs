#![forbid(unsafe_code)]

//! Algorithm URI constants for the transforms recognized by the
//! dereference pipeline.

pub const BASE64: &str = "http://www.w3.org/2000/09/xmldsig#base64";
