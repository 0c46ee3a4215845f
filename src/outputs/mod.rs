//! Rendering of read-side results.
//!
//! - [`json`]: a listing page as pretty JSON, to stdout or a file

pub mod json;
