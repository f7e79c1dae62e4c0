//! Public API of the xpathc compiler.
//!
//! A [`Program`](crate::program::Program) is built through its expression
//! arena, then handed to a [`Compiler`], which type-checks it and produces
//! an [`Executable`](crate::compiler::Executable).
//!
//! # Example
//!
//! ```
//! use xpathc_core::QName;
//! use xpathc_core::api::{CompilationOptions, Compiler, ExecutionOptions};
//! use xpathc_core::program::Program;
//! use xpathc_core::vm::{Document, Value};
//!
//! let mut program = Program::new();
//! let ast = program.ast_mut();
//! let haystack = ast.string("abc");
//! let prefix = ast.string("ab");
//! let call = ast.call("starts-with", [haystack, prefix]).unwrap();
//! program.add_variable(QName::local("found"), call).unwrap();
//!
//! let executable = Compiler::new(CompilationOptions::default())
//!     .compile(&mut program)
//!     .unwrap();
//!
//! let document = Document::new();
//! let mut machine = executable.machine(&document, &ExecutionOptions::default());
//! executable.initialize(&mut machine, &[]).unwrap();
//! assert_eq!(machine.global(0), Some(&Value::Boolean(true)));
//! ```

pub mod compiler;
pub mod error;
pub mod options;

pub use compiler::Compiler;
pub use error::{Diagnostic, Error, RelatedInfo, Severity};
pub use options::{CompilationOptions, ExecutionOptions};
