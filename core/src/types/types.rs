use core::fmt;

use ecow::EcoString;

/// Static types of expressions.
///
/// The set is deliberately small: the primitive XPath types, the node types
/// produced by location paths, result trees, and the two "opaque" types used
/// by extension code: [`Type::Reference`] (a value of statically unknown type)
/// and [`Type::Object`] (a value of a named host class).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Boolean,
    Int,
    Real,
    String,
    Node,
    NodeSet,
    ResultTree,
    Reference,
    Object(EcoString),
}

/// Type tag without payload, cheap enough to live inside an instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Void,
    Boolean,
    Int,
    Real,
    String,
    Node,
    NodeSet,
    ResultTree,
    Reference,
    Object,
}

impl Type {
    pub fn tag(&self) -> TypeTag {
        match self {
            Type::Void => TypeTag::Void,
            Type::Boolean => TypeTag::Boolean,
            Type::Int => TypeTag::Int,
            Type::Real => TypeTag::Real,
            Type::String => TypeTag::String,
            Type::Node => TypeTag::Node,
            Type::NodeSet => TypeTag::NodeSet,
            Type::ResultTree => TypeTag::ResultTree,
            Type::Reference => TypeTag::Reference,
            Type::Object(_) => TypeTag::Object,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Real)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Type::Object(_))
    }

    /// Cost of converting a value of this type into `target`, or `None` when
    /// no implicit conversion exists. Zero means the types are identical.
    ///
    /// The operator table picks the signature with the lowest total cost, so
    /// the relative order of these numbers decides which overload wins.
    pub fn coercion_distance(&self, target: &Type) -> Option<u32> {
        if self == target {
            return Some(0);
        }
        use Type::*;
        let distance = match (self, target) {
            (Void, _) | (_, Void) => return None,
            (Object(_), Object(_)) => return None,

            (Int, Real) => 1,
            (Node, NodeSet) => 1,
            (ResultTree, String) => 1,

            (String, Real) => 2,
            (Node, String) => 2,
            (NodeSet, Node) => 2,
            (NodeSet, String) => 2,
            (NodeSet, Boolean) => 2,
            (ResultTree, Boolean) => 2,

            (Int, String) | (Real, String) | (Boolean, String) => 3,
            (Int, Boolean) | (Real, Boolean) | (String, Boolean) | (Node, Boolean) => 3,
            (Boolean, Real) | (Node, Real) | (NodeSet, Real) | (ResultTree, Real) => 3,

            (Real, Int) => 4,
            (ResultTree, NodeSet) => 4,
            (Object(_), String) => 4,

            (_, Reference) => 5,
            (Reference, Boolean | Int | Real | String | Node | NodeSet) => 5,

            _ => return None,
        };
        Some(distance)
    }

    pub fn can_coerce_to(&self, target: &Type) -> bool {
        self.coercion_distance(target).is_some()
    }

    /// The type both branches of a conditional are converted to.
    pub fn join(&self, other: &Type) -> Type {
        if self == other {
            self.clone()
        } else if self.is_numeric() && other.is_numeric() {
            Type::Real
        } else {
            Type::Reference
        }
    }
}

impl From<TypeTag> for Type {
    /// Object tags lose their class name; they map to `Reference`.
    fn from(tag: TypeTag) -> Self {
        match tag {
            TypeTag::Void => Type::Void,
            TypeTag::Boolean => Type::Boolean,
            TypeTag::Int => Type::Int,
            TypeTag::Real => Type::Real,
            TypeTag::String => Type::String,
            TypeTag::Node => Type::Node,
            TypeTag::NodeSet => Type::NodeSet,
            TypeTag::ResultTree => Type::ResultTree,
            TypeTag::Reference | TypeTag::Object => Type::Reference,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Object(class) => write!(f, "object({})", class),
            other => write!(f, "{}", other.tag()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Void => "void",
            TypeTag::Boolean => "boolean",
            TypeTag::Int => "int",
            TypeTag::Real => "real",
            TypeTag::String => "string",
            TypeTag::Node => "node",
            TypeTag::NodeSet => "node-set",
            TypeTag::ResultTree => "result-tree",
            TypeTag::Reference => "reference",
            TypeTag::Object => "object",
        };
        f.write_str(name)
    }
}
