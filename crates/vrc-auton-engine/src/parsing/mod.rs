//! Recognising action calls in source text.

pub mod patterns;
pub mod scanner;

pub use patterns::{ActionPattern, Composition, Fragment, ParamDescriptor, ParamType, PatternLibrary};
pub use scanner::{scan, scan_with_offset};
