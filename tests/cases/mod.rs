#![allow(dead_code)]

use xpathc::{
    Ast, CompilationOptions, Compiler, Document, Error, ExecutionOptions, ExprId, QName, Value,
    program::Program,
};

/// Compile `build` as the initializer of a single global and return the
/// value it computes over an empty document.
pub fn evaluate(build: impl FnOnce(&mut Ast) -> ExprId) -> Value {
    evaluate_with(CompilationOptions::default(), build)
}

pub fn evaluate_with(options: CompilationOptions, build: impl FnOnce(&mut Ast) -> ExprId) -> Value {
    let mut program = Program::new();
    let root = build(program.ast_mut());
    let result = program.add_variable(QName::local("result"), root).unwrap();

    let executable = match Compiler::new(options).compile(&mut program) {
        Ok(executable) => executable,
        Err(e) => panic!("compilation failed: {:?}", e.diagnostics()),
    };
    let document = Document::new();
    let mut machine = executable.machine(&document, &ExecutionOptions::default());
    executable.initialize(&mut machine, &[]).unwrap();
    machine.global(result.index() as u32).cloned().unwrap()
}

/// Compile `build` and return the error codes it was rejected with.
pub fn error_codes(build: impl FnOnce(&mut Program)) -> Vec<String> {
    let mut program = Program::new();
    build(&mut program);
    match Compiler::new(CompilationOptions::default()).compile(&mut program) {
        Ok(_) => Vec::new(),
        Err(Error::Compilation { diagnostics }) => diagnostics
            .into_iter()
            .filter_map(|diagnostic| diagnostic.code)
            .collect(),
        Err(other) => panic!("expected type errors, got {}", other),
    }
}

/// Compile `build` and render its errors against `source`.
pub fn rendered_errors(source: &str, build: impl FnOnce(&mut Program)) -> String {
    let mut program = Program::new();
    build(&mut program);
    match Compiler::new(CompilationOptions::default()).compile(&mut program) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(e) => xpathc::render_error_to_string_no_color(&e, source),
    }
}

/// Defines a test over a single expression.
///
/// `value:` runs the expression as a global initializer and compares the
/// result; `errors:` compiles a whole program and compares the error codes.
macro_rules! test_case {
    (
        name: $name:ident,
        build: $build:expr,
        value: $value:expr $(,)?
    ) => {
        #[test]
        fn $name() {
            let value = crate::cases::evaluate($build);
            pretty_assertions::assert_eq!(value, $value);
        }
    };
    (
        name: $name:ident,
        program: $build:expr,
        errors: [$($code:literal),* $(,)?] $(,)?
    ) => {
        #[test]
        fn $name() {
            let codes = crate::cases::error_codes($build);
            let expected: Vec<String> = vec![$($code.to_string()),*];
            pretty_assertions::assert_eq!(codes, expected);
        }
    };
}
