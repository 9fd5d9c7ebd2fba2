#![forbid(unsafe_code)]

//! Core vocabulary for the Solna KeyInfo processing engine.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
