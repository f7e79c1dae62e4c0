//! The compilation driver.

use tracing::debug;

use super::{CompilationOptions, Error};
use crate::{analyzer, compiler::Executable, program::Program};

/// Runs the two compilation passes over a [`Program`].
///
/// Type resolution runs over every top-level construct first and collects
/// all errors. Code generation only starts when it found none.
///
/// # Example
///
/// ```
/// use xpathc_core::QName;
/// use xpathc_core::api::{CompilationOptions, Compiler};
/// use xpathc_core::program::Program;
///
/// let mut program = Program::new();
/// let ast = program.ast_mut();
/// let one = ast.int(1);
/// program.add_variable(QName::local("one"), one).unwrap();
///
/// let compiler = Compiler::new(CompilationOptions::default());
/// let executable = compiler.compile(&mut program).unwrap();
/// assert_eq!(executable.globals().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilationOptions,
}

impl Compiler {
    pub fn new(options: CompilationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    /// Type-check `program` without generating code.
    pub fn check(&self, program: &mut Program) -> Result<(), Error> {
        analyzer::check_program(program, self.options.max_errors)?;
        Ok(())
    }

    /// Type-check and compile `program`.
    ///
    /// Type checking rewrites the program's tree (coercion wrappers,
    /// resolved references), hence the mutable borrow.
    pub fn compile(&self, program: &mut Program) -> Result<Executable, Error> {
        debug!(top_levels = program.len(), "Compiling program");
        self.check(program)?;
        let executable = Executable::compile(program, &self.options)?;
        Ok(executable)
    }
}
