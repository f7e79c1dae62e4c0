//! The operator table.
//!
//! Every primitive operator is declared with the list of signatures it
//! supports. Resolution picks the signature whose parameters the operands
//! can be converted to at the lowest total cost; ties go to the signature
//! declared first.

use smallvec::SmallVec;

use super::{Type, TypeTag};

struct Signature {
    symbol: &'static str,
    params: &'static [TypeTag],
    result: TypeTag,
}

const fn sig(symbol: &'static str, params: &'static [TypeTag], result: TypeTag) -> Signature {
    Signature {
        symbol,
        params,
        result,
    }
}

use TypeTag::{Boolean, Int, Real, String};

static OPERATORS: &[Signature] = &[
    // Arithmetic
    sig("+", &[Int, Int], Int),
    sig("+", &[Real, Real], Real),
    sig("-", &[Int, Int], Int),
    sig("-", &[Real, Real], Real),
    sig("*", &[Int, Int], Int),
    sig("*", &[Real, Real], Real),
    sig("div", &[Real, Real], Real),
    sig("mod", &[Int, Int], Int),
    sig("mod", &[Real, Real], Real),
    // Unary minus
    sig("-", &[Int], Int),
    sig("-", &[Real], Real),
    // Equality
    sig("=", &[Boolean, Boolean], Boolean),
    sig("=", &[Int, Int], Boolean),
    sig("=", &[Real, Real], Boolean),
    sig("=", &[String, String], Boolean),
    sig("!=", &[Boolean, Boolean], Boolean),
    sig("!=", &[Int, Int], Boolean),
    sig("!=", &[Real, Real], Boolean),
    sig("!=", &[String, String], Boolean),
    // Relational
    sig("<", &[Int, Int], Boolean),
    sig("<", &[Real, Real], Boolean),
    sig("<=", &[Int, Int], Boolean),
    sig("<=", &[Real, Real], Boolean),
    sig(">", &[Int, Int], Boolean),
    sig(">", &[Real, Real], Boolean),
    sig(">=", &[Int, Int], Boolean),
    sig(">=", &[Real, Real], Boolean),
];

/// Result of a successful operator lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorMatch {
    pub result: Type,
    /// The type each operand must be converted to, in operand order.
    pub operands: SmallVec<[Type; 2]>,
}

impl OperatorMatch {
    /// True when operand `index` needs a conversion from `actual`.
    pub fn needs_coercion(&self, index: usize, actual: &Type) -> bool {
        self.operands[index] != *actual
    }
}

/// Look up `symbol` applied to operands of the given types.
pub fn lookup_operator(symbol: &str, operands: &[Type]) -> Option<OperatorMatch> {
    let mut best: Option<(u32, &Signature)> = None;

    for signature in OPERATORS.iter() {
        if signature.symbol != symbol || signature.params.len() != operands.len() {
            continue;
        }
        let cost = operands
            .iter()
            .zip(signature.params.iter())
            .map(|(actual, param)| actual.coercion_distance(&Type::from(*param)))
            .try_fold(0u32, |total, distance| Some(total + distance?));
        let Some(cost) = cost else {
            continue;
        };
        if best.is_none_or(|(best_cost, _)| cost < best_cost) {
            best = Some((cost, signature));
        }
    }

    best.map(|(_, signature)| OperatorMatch {
        result: Type::from(signature.result),
        operands: signature.params.iter().map(|p| Type::from(*p)).collect(),
    })
}
