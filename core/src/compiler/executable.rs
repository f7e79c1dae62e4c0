//! Whole-program code generation.

use core::cmp::Ordering;

use tracing::debug;

use crate::{
    QName, Vec,
    api::{CompilationOptions, ExecutionOptions},
    ast::{Ast, ExprId},
    compiler::{CodeGenerator, CompileError, PatternCache, codegen::compile_expression},
    program::{Program, TopLevelId, TopLevelKind},
    types::{self, Type},
    vm::{Code, ConstantPool, Document, Frame, Instruction, Machine, NodeId, RuntimeError, Value},
};

/// Initializer of a global variable or parameter.
#[derive(Debug, Clone)]
pub struct GlobalUnit {
    pub id: TopLevelId,
    pub name: QName,
    pub is_parameter: bool,
    pub code: Code,
}

#[derive(Debug, Clone)]
pub struct TemplateUnit {
    pub id: TopLevelId,
    pub priority: f64,
    /// Returns whether the context node matches the template's pattern.
    pub pattern: Code,
    pub body: Code,
}

/// The compiled form of a [`Program`].
///
/// Global initializers are stored in the order they must run. The
/// dispatcher returns the index in [`Executable::templates`] of the
/// template that wins for the context node, or -1 when none matches.
#[derive(Debug, Clone)]
pub struct Executable {
    pool: ConstantPool,
    globals: Vec<GlobalUnit>,
    templates: Vec<TemplateUnit>,
    dispatcher: Code,
}

impl Executable {
    /// Generate code for a program that type-checked without errors.
    pub fn compile(program: &Program, options: &CompilationOptions) -> Result<Self, CompileError> {
        let ast = program.ast();
        let mut pool = ConstantPool::new();
        let mut cache = PatternCache::new();

        let mut globals = Vec::new();
        for id in program.global_order() {
            let top_level = program.top_level(id);
            let (name, root, is_parameter) = match &top_level.kind {
                TopLevelKind::Variable { name, value } => (name, *value, false),
                TopLevelKind::Parameter { name, default } => (name, *default, true),
                TopLevelKind::Template { .. } => continue,
            };
            debug!(global = %name, "Generating initializer");
            let code = if is_parameter {
                Self::parameter_default(ast, &mut pool, options, root)?
            } else {
                compile_expression(ast, &mut pool, options, root)?
            };
            globals.push(GlobalUnit {
                id,
                name: name.clone(),
                is_parameter,
                code,
            });
        }

        let mut templates = Vec::new();
        for (id, top_level) in program.top_levels() {
            let TopLevelKind::Template { pattern, body, .. } = &top_level.kind else {
                continue;
            };
            let priority = program.template_priority(id).unwrap_or(0.5);
            debug!(template = id.index(), priority, "Generating template");

            let mut generator = CodeGenerator::new(ast, &mut pool, options);
            let exits = generator.translate_cached_pattern(&mut cache, *pattern)?;
            generator.materialize(exits);
            generator.emit(Instruction::Return);
            let pattern = generator.finish()?;

            templates.push(TemplateUnit {
                id,
                priority,
                pattern,
                body: compile_expression(ast, &mut pool, options, *body)?,
            });
        }

        let dispatcher = Self::dispatcher(program, &templates, &mut pool, &mut cache, options)?;
        debug!(
            globals = globals.len(),
            templates = templates.len(),
            cached_patterns = cache.len(),
            "Generated executable"
        );
        Ok(Self {
            pool,
            globals,
            templates,
            dispatcher,
        })
    }

    /// The default of a parameter, stored as a reference like a supplied
    /// value would be.
    fn parameter_default(
        ast: &Ast,
        pool: &mut ConstantPool,
        options: &CompilationOptions,
        root: ExprId,
    ) -> Result<Code, CompileError> {
        let ty = ast.ty(root).ok_or(CompileError::NotTypeChecked { node: root })?;
        let mut generator = CodeGenerator::new(ast, pool, options);
        generator.translate(root)?;
        types::coerce(ty, &Type::Reference, generator.buffer_mut());
        generator.emit(Instruction::Return);
        generator.finish()
    }

    /// Try the patterns from the highest priority down; among equal
    /// priorities the template declared last wins.
    fn dispatcher(
        program: &Program,
        templates: &[TemplateUnit],
        pool: &mut ConstantPool,
        cache: &mut PatternCache,
        options: &CompilationOptions,
    ) -> Result<Code, CompileError> {
        let mut order: Vec<usize> = (0..templates.len()).collect();
        order.sort_by(|a, b| {
            templates[*b]
                .priority
                .partial_cmp(&templates[*a].priority)
                .unwrap_or(Ordering::Equal)
                .then(b.cmp(a))
        });

        let mut generator = CodeGenerator::new(program.ast(), pool, options);
        for index in order {
            let TopLevelKind::Template { pattern, .. } = &program.top_level(templates[index].id).kind else {
                continue;
            };
            generator.emit(Instruction::LoadContextNode);
            generator.emit(Instruction::SetCurrentNode);
            let mut exits = generator.translate_cached_pattern(cache, *pattern)?;
            let here = generator.buffer().position();
            exits.true_list.backpatch(generator.buffer_mut(), here);
            generator.emit(Instruction::ConstInt(index as i64));
            generator.emit(Instruction::Return);
            let next = generator.buffer().position();
            exits.false_list.backpatch(generator.buffer_mut(), next);
        }
        generator.emit(Instruction::ConstInt(-1));
        generator.emit(Instruction::Return);
        generator.finish()
    }

    pub fn pool(&self) -> &ConstantPool {
        &self.pool
    }

    /// Global initializers, in the order they run.
    pub fn globals(&self) -> &[GlobalUnit] {
        &self.globals
    }

    /// Templates, in declaration order.
    pub fn templates(&self) -> &[TemplateUnit] {
        &self.templates
    }

    pub fn dispatcher_code(&self) -> &Code {
        &self.dispatcher
    }

    /// A machine over `document` sharing this executable's constants.
    pub fn machine<'a>(&'a self, document: &'a Document, options: &ExecutionOptions) -> Machine<'a> {
        Machine::new(document, &self.pool).with_max_steps(options.max_steps)
    }

    /// Run the global initializers. A parameter named in `parameters` takes
    /// the supplied value instead of running its default; parameters are
    /// stored as references whatever their value's type.
    pub fn initialize(&self, machine: &mut Machine<'_>, parameters: &[(QName, Value)]) -> Result<(), RuntimeError> {
        let frame = Frame::new(machine.document().root());
        for global in &self.globals {
            let supplied = parameters
                .iter()
                .find(|(name, _)| global.is_parameter && *name == global.name)
                .map(|(_, value)| value.clone());
            let value = match supplied {
                Some(value) => value.into_reference(),
                None => machine.run(&global.code, &frame)?,
            };
            debug!(global = %global.name, %value, "Initialized");
            machine.set_global(global.id.0, value);
        }
        Ok(())
    }

    /// Whether template `index` matches `node`.
    pub fn matches(&self, machine: &mut Machine<'_>, index: usize, node: NodeId) -> Result<bool, RuntimeError> {
        match self.templates.get(index) {
            Some(template) => machine.run(&template.pattern, &Frame::new(node))?.as_bool(),
            None => Ok(false),
        }
    }

    /// Index of the template selected for `node`.
    pub fn select_template(&self, machine: &mut Machine<'_>, node: NodeId) -> Result<Option<usize>, RuntimeError> {
        let selected = machine.run(&self.dispatcher, &Frame::new(node))?.as_int()?;
        Ok(usize::try_from(selected).ok())
    }

    /// Run the body of the template selected for `node`, if any.
    pub fn apply(&self, machine: &mut Machine<'_>, node: NodeId) -> Result<Option<Value>, RuntimeError> {
        let selected = self.select_template(machine, node)?;
        let Some(template) = selected.and_then(|index| self.templates.get(index)) else {
            return Ok(None);
        };
        machine.run(&template.body, &Frame::new(node)).map(Some)
    }
}
