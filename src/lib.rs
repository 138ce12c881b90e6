//! Root crate for htrw.
//!
//! htrw parses HTTP/1.x byte streams incrementally and rewrites them in
//! flight. The [`parser::MessageParser`] turns arbitrarily fragmented bytes
//! into a sequence of synchronous events (headers complete, body fragment,
//! message complete) while resolving the three body framing strategies
//! (fixed `Content-Length`, chunked transfer encoding, close-delimited).
//! The [`filter::RewriteFilter`] sits on those events and mutates headers
//! and body content without desynchronizing the wire framing, re-emitting
//! length-changed bodies under chunked encoding. Parser instances are kept
//! per transaction id and direction and live until the host releases them.

#![deny(missing_docs)]
#![deny(unused_lifetimes)]
#![allow(non_camel_case_types)]

/// Module for providing logging functions.
#[macro_use]
pub mod log;
/// Module for bstr functions.
pub mod bstr;
/// Module for parser and filter configuration.
pub mod config;
/// Module for all errors.
pub mod error;
/// Module for the rewrite filter.
pub mod filter;
/// Module for message metadata types.
pub mod message;
/// Module for the incremental message parser.
pub mod parser;
/// Module for field-level parsers.
mod parsers;
/// Module to track per-transaction parser instances.
mod registry;
/// Module for utility functions.
mod util;
