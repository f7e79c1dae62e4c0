use pretty_assertions::assert_eq;

use super::*;
use crate::{
    QName,
    syntax::{Axis, BinaryOp, NodeKind, NodeTest},
    types::TypeTag,
    vec,
};

fn code(instructions: crate::Vec<Instruction>) -> Code {
    Code {
        instructions,
        num_locals: 2,
    }
}

fn run(pool: &ConstantPool, doc: &Document, instructions: crate::Vec<Instruction>) -> Result<Value, RuntimeError> {
    let mut machine = Machine::new(doc, pool);
    machine.run(&code(instructions), &Frame::new(doc.root()))
}

#[test]
fn test_arithmetic() {
    let doc = Document::new();
    let pool = ConstantPool::new();
    let result = run(
        &pool,
        &doc,
        vec![
            Instruction::ConstInt(6),
            Instruction::ConstInt(7),
            Instruction::IntBinOp(BinaryOp::Mul),
            Instruction::Return,
        ],
    );
    assert_eq!(result, Ok(Value::Int(42)));
}

#[test]
fn test_integer_modulo_by_zero() {
    let doc = Document::new();
    let pool = ConstantPool::new();
    let result = run(
        &pool,
        &doc,
        vec![
            Instruction::ConstInt(1),
            Instruction::ConstInt(0),
            Instruction::IntBinOp(BinaryOp::Mod),
            Instruction::Return,
        ],
    );
    assert_eq!(result, Err(RuntimeError::DivisionByZero));
}

#[test]
fn test_conditional_jump() {
    let doc = Document::new();
    let pool = ConstantPool::new();
    let result = run(
        &pool,
        &doc,
        vec![
            Instruction::ConstBool(false),
            Instruction::JumpIfFalse(Label(4)),
            Instruction::ConstInt(1),
            Instruction::Return,
            Instruction::ConstInt(2),
            Instruction::Return,
        ],
    );
    assert_eq!(result, Ok(Value::Int(2)));
}

#[test]
fn test_pending_jump_is_an_error() {
    let doc = Document::new();
    let pool = ConstantPool::new();
    let result = run(&pool, &doc, vec![Instruction::Goto(Label::PENDING)]);
    assert_eq!(result, Err(RuntimeError::UnpatchedJump(0)));
}

#[test]
fn test_falling_off_the_end() {
    let doc = Document::new();
    let pool = ConstantPool::new();
    let result = run(&pool, &doc, vec![Instruction::ConstInt(1)]);
    assert_eq!(result, Err(RuntimeError::FellOffEnd));
}

#[test]
fn test_step_limit() {
    let doc = Document::new();
    let pool = ConstantPool::new();
    let mut machine = Machine::new(&doc, &pool).with_max_steps(Some(10));
    let looping = code(vec![Instruction::Goto(Label(0))]);
    let result = machine.run(&looping, &Frame::new(doc.root()));
    assert_eq!(result, Err(RuntimeError::StepLimitExceeded(10)));
}

#[test]
fn test_nan_comparisons() {
    let doc = Document::new();
    let mut pool = ConstantPool::new();
    let nan = pool.add(Constant::Real(f64::NAN));
    for (op, expected) in [(BinaryOp::Eq, false), (BinaryOp::Ne, true), (BinaryOp::Lt, false)] {
        let result = run(
            &pool,
            &doc,
            vec![
                Instruction::ConstLoad(nan),
                Instruction::ConstLoad(nan),
                Instruction::Compare {
                    op,
                    operands: TypeTag::Real,
                },
                Instruction::Return,
            ],
        );
        assert_eq!(result, Ok(Value::Boolean(expected)), "{:?}", op);
    }
}

#[test]
fn test_axis_step_and_starts_with() {
    let mut doc = Document::new();
    let root = doc.root();
    let list = doc.add_element(root, "list");
    let item = doc.add_element(list, "item");
    doc.add_text(item, "apple");

    let mut pool = ConstantPool::new();
    let list_test = pool.add_test(StepTest {
        principal: NodeKind::Element,
        test: NodeTest::Name(QName::local("list")),
    });
    let item_test = pool.add_test(StepTest {
        principal: NodeKind::Element,
        test: NodeTest::Name(QName::local("item")),
    });
    let prefix = pool.add(Constant::String("app".into()));

    let result = run(
        &pool,
        &doc,
        vec![
            Instruction::LoadContextNode,
            Instruction::AxisStep {
                axis: Axis::Child,
                test: list_test,
            },
            Instruction::AxisStep {
                axis: Axis::Child,
                test: item_test,
            },
            Instruction::Convert {
                from: TypeTag::NodeSet,
                to: TypeTag::String,
            },
            Instruction::ConstLoad(prefix),
            Instruction::CallRuntime(RuntimeFunction::StartsWith),
            Instruction::Return,
        ],
    );
    assert_eq!(result, Ok(Value::Boolean(true)));
}

#[test]
fn test_step_context_counts_matching_siblings() {
    let mut doc = Document::new();
    let root = doc.root();
    let list = doc.add_element(root, "list");
    doc.add_element(list, "item");
    doc.add_element(list, "other");
    let second = doc.add_element(list, "item");

    let mut pool = ConstantPool::new();
    let item_test = pool.add_test(StepTest {
        principal: NodeKind::Element,
        test: NodeTest::Name(QName::local("item")),
    });

    let mut machine = Machine::new(&doc, &pool);
    let program = code(vec![
        Instruction::StepContext(item_test),
        Instruction::StoreLocal(1),
        Instruction::StoreLocal(0),
        Instruction::LoadLocal(0),
        Instruction::ConstInt(10),
        Instruction::IntBinOp(BinaryOp::Mul),
        Instruction::LoadLocal(1),
        Instruction::IntBinOp(BinaryOp::Add),
        Instruction::Return,
    ]);
    assert_eq!(machine.run(&program, &Frame::new(second)), Ok(Value::Int(22)));
}

#[test]
fn test_filtered_step_context_skips_rejected_siblings() {
    // <list><item/><item keep=""/><other/><item keep=""/></list>
    let mut doc = Document::new();
    let root = doc.root();
    let list = doc.add_element(root, "list");
    let plain = doc.add_element(list, "item");
    let first = doc.add_element(list, "item");
    doc.add_attribute(first, "keep", "");
    doc.add_element(list, "other");
    let second = doc.add_element(list, "item");
    doc.add_attribute(second, "keep", "");

    let mut pool = ConstantPool::new();
    let item_test = pool.add_test(StepTest {
        principal: NodeKind::Element,
        test: NodeTest::Name(QName::local("item")),
    });
    let keep_test = pool.add_test(StepTest {
        principal: NodeKind::Attribute,
        test: NodeTest::Name(QName::local("keep")),
    });
    // @keep
    let has_keep = Code {
        instructions: vec![
            Instruction::LoadCurrentNode,
            Instruction::AxisStep {
                axis: Axis::Attribute,
                test: keep_test,
            },
            Instruction::Convert {
                from: TypeTag::NodeSet,
                to: TypeTag::Boolean,
            },
            Instruction::Return,
        ],
        num_locals: 0,
    };
    let filter = pool.add_filter(PredicateFilter { units: vec![has_keep] });

    let program = code(vec![
        Instruction::FilteredStepContext {
            test: item_test,
            filter,
        },
        Instruction::StoreLocal(1),
        Instruction::StoreLocal(0),
        Instruction::LoadLocal(0),
        Instruction::ConstInt(10),
        Instruction::IntBinOp(BinaryOp::Mul),
        Instruction::LoadLocal(1),
        Instruction::IntBinOp(BinaryOp::Add),
        Instruction::Return,
    ]);
    let mut machine = Machine::new(&doc, &pool).with_trace();
    let results = [plain, first, second].map(|node| machine.run(&program, &Frame::new(node)));
    assert_eq!(results, [Ok(Value::Int(2)), Ok(Value::Int(12)), Ok(Value::Int(22))]);
    // Only the outer unit's instructions are traced.
    assert_eq!(machine.trace().map(<[usize]>::len), Some(program.instructions.len()));
}

#[test]
fn test_missing_filter() {
    let mut doc = Document::new();
    let root = doc.root();
    let child = doc.add_element(root, "a");
    let mut pool = ConstantPool::new();
    let test = pool.add_test(StepTest {
        principal: NodeKind::Element,
        test: NodeTest::Wildcard,
    });
    let mut machine = Machine::new(&doc, &pool);
    let program = code(vec![
        Instruction::FilteredStepContext { test, filter: 3 },
        Instruction::Return,
    ]);
    assert_eq!(machine.run(&program, &Frame::new(child)), Err(RuntimeError::MissingFilter(3)));
}

#[test]
fn test_check_cast() {
    let doc = Document::new();
    let mut pool = ConstantPool::new();
    let class = pool.add(Constant::Class("org.example.Counter".into()));
    let result = run(
        &pool,
        &doc,
        vec![
            Instruction::ConstInt(3),
            Instruction::Convert {
                from: TypeTag::Int,
                to: TypeTag::Reference,
            },
            Instruction::CheckCast(class),
            Instruction::Return,
        ],
    );
    assert_eq!(
        result,
        Ok(Value::Object {
            class: "org.example.Counter".into(),
            value: crate::Box::new(Value::Int(3)),
        })
    );
}

#[test]
fn test_trace_records_executed_instructions() {
    let doc = Document::new();
    let pool = ConstantPool::new();
    let mut machine = Machine::new(&doc, &pool).with_trace();
    let program = code(vec![
        Instruction::Goto(Label(2)),
        Instruction::ConstInt(1),
        Instruction::ConstInt(2),
        Instruction::Return,
    ]);
    machine.run(&program, &Frame::new(doc.root())).unwrap();
    assert_eq!(machine.trace(), Some(&[0, 2, 3][..]));
}
