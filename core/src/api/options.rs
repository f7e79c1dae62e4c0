//! Configuration options for the xpathc compiler.

/// Configuration options for compilation.
///
/// These options control compile-time behavior and optimizations.
///
/// # Example
///
/// ```
/// use xpathc_core::api::CompilationOptions;
///
/// let options = CompilationOptions {
///     max_errors: Some(20),
///     ..CompilationOptions::default()
/// };
/// assert!(options.eliminate_dead_branches);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationOptions {
    /// Emit only the live branch of a conditional whose test is known at
    /// compile time, such as `if (element-available('xsl:foo')) ...`.
    ///
    /// Both branches are type-checked either way.
    ///
    /// Default: true
    pub eliminate_dead_branches: bool,

    /// Stop checking further top-level constructs once this many errors
    /// have been recorded.
    ///
    /// Default: None (report everything). `Some(0)` also reports everything.
    pub max_errors: Option<usize>,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            eliminate_dead_branches: true,
            max_errors: None,
        }
    }
}

/// Configuration options for running compiled code.
///
/// # Example
///
/// ```
/// use xpathc_core::api::ExecutionOptions;
///
/// let options = ExecutionOptions {
///     max_steps: Some(10_000),
/// };
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Maximum number of instructions a single unit may execute.
    ///
    /// Pattern loops over ancestors are bounded by the document depth, so
    /// this only matters for untrusted documents of unusual shape.
    ///
    /// Default: None (unlimited)
    pub max_steps: Option<usize>,
}
