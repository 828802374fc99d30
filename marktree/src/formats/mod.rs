//! Format implementations
//!
//! This module contains all format implementations that convert between the document tree and
//! text representations.

pub mod json;
pub mod markdown;
pub mod treeviz;

pub use json::JsonFormat;
pub use markdown::MarkdownFormat;
pub use treeviz::TreevizFormat;
