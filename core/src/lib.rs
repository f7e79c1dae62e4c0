#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

// Re-export for convenience so other modules don't need alloc:: prefix
#[allow(unused_imports)]
pub(crate) use alloc::{boxed::Box, format, string::String, string::ToString, vec, vec::Vec};

pub mod analyzer;
pub mod api;
pub mod ast;
pub mod compiler;
pub mod program;
pub mod qname;
pub mod syntax;
pub mod types;
pub mod vm;

pub use qname::QName;
