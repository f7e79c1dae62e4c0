//! xpathc - a compiler for XPath expressions and XSLT match patterns
//!
//! # Overview
//!
//! xpathc takes the expression trees of a stylesheet (global variables and
//! parameters, template match patterns and bodies), type-checks them and
//! compiles them to code for a small stack machine.
//!
//! - Boolean expressions compile to short-circuit jumps
//! - `element-available()` and `function-available()` fold at compile time,
//!   and conditionals on them drop their dead branch
//! - Each match pattern is compiled once and reused by the template's own
//!   test and by the match dispatcher
//!
//! # Quick Start
//!
//! ```
//! use xpathc::{CompilationOptions, Compiler, ExecutionOptions, QName, Value};
//! use xpathc::program::Program;
//! use xpathc::vm::Document;
//!
//! let mut program = Program::new();
//! let ast = program.ast_mut();
//! let haystack = ast.string("xpathc");
//! let prefix = ast.string("xpath");
//! let test = ast.call("starts-with", [haystack, prefix]).unwrap();
//! let flag = program.add_variable(QName::local("flag"), test).unwrap();
//!
//! let executable = Compiler::new(CompilationOptions::default())
//!     .compile(&mut program)
//!     .unwrap();
//!
//! let document = Document::new();
//! let mut machine = executable.machine(&document, &ExecutionOptions::default());
//! executable.initialize(&mut machine, &[]).unwrap();
//! assert_eq!(machine.global(flag.index() as u32), Some(&Value::Boolean(true)));
//! ```
//!
//! # Diagnostics
//!
//! Type errors from every top-level construct are reported together. The
//! [`error_renderer`] module formats them against the stylesheet source
//! with ariadne.

pub mod error_renderer;

// Re-export public API from xpathc_core
pub use xpathc_core::api::{
    CompilationOptions, Compiler, Diagnostic, Error, ExecutionOptions, RelatedInfo, Severity,
};

pub use xpathc_core::QName;
pub use xpathc_core::ast::{self, Ast, ExprId};
pub use xpathc_core::compiler::{CompileError, Executable};
pub use xpathc_core::program::{self, Program, TopLevelId};
pub use xpathc_core::syntax::{self, Span};
pub use xpathc_core::types::{self, Type};
pub use xpathc_core::vm::{self, Document, RuntimeError, Value};

pub use error_renderer::{
    render_diagnostics_to_string, render_diagnostics_to_string_no_color, render_error,
    render_error_to_string, render_error_to_string_no_color,
};
