//! Agent command protocol: tag grammar, incremental extraction, and display stripping.

pub mod command;
pub mod extractor;
pub mod fingerprint;
pub mod grammar;
pub mod strip;
