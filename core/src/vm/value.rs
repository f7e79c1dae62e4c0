use core::fmt;

use ecow::EcoString;

use crate::{
    Box, String, ToString, Vec, format,
    types::TypeTag,
    vm::{Document, NodeId, RuntimeError},
};

/// Runtime values manipulated by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Int(i64),
    Real(f64),
    String(EcoString),
    Node(NodeId),
    /// Nodes in document order, without duplicates.
    NodeSet(Vec<NodeId>),
    /// A value whose static type was unknown at compile time.
    Reference(Box<Value>),
    /// A value that passed a reference cast to `class`.
    Object { class: EcoString, value: Box<Value> },
}

impl Value {
    /// The runtime tag of the value. References report their own tag, not
    /// the tag of what they wrap.
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Int(_) => TypeTag::Int,
            Value::Real(_) => TypeTag::Real,
            Value::String(_) => TypeTag::String,
            Value::Node(_) => TypeTag::Node,
            Value::NodeSet(_) => TypeTag::NodeSet,
            Value::Reference(_) => TypeTag::Reference,
            Value::Object { .. } => TypeTag::Object,
        }
    }

    pub fn as_bool(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            other => Err(RuntimeError::type_mismatch(TypeTag::Boolean, other)),
        }
    }

    pub fn as_int(&self) -> Result<i64, RuntimeError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(RuntimeError::type_mismatch(TypeTag::Int, other)),
        }
    }

    pub fn as_real(&self) -> Result<f64, RuntimeError> {
        match self {
            Value::Real(r) => Ok(*r),
            other => Err(RuntimeError::type_mismatch(TypeTag::Real, other)),
        }
    }

    pub fn as_str(&self) -> Result<&str, RuntimeError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(RuntimeError::type_mismatch(TypeTag::String, other)),
        }
    }

    pub fn as_node(&self) -> Result<NodeId, RuntimeError> {
        match self {
            Value::Node(id) => Ok(*id),
            other => Err(RuntimeError::type_mismatch(TypeTag::Node, other)),
        }
    }

    /// Wrap the value in a reference unless it already is one.
    pub fn into_reference(self) -> Value {
        match self {
            Value::Reference(_) => self,
            other => Value::Reference(Box::new(other)),
        }
    }

    /// Strip any number of reference wrappers.
    fn unwrap_reference(self) -> Value {
        let mut value = self;
        while let Value::Reference(inner) = value {
            value = *inner;
        }
        value
    }

    /// Convert to `to` following the XPath conversion rules. `from` is the
    /// static type the compiler assumed; it must agree with the value.
    pub fn convert(self, from: TypeTag, to: TypeTag, document: &Document) -> Result<Value, RuntimeError> {
        if from != self.tag() {
            return Err(RuntimeError::type_mismatch(from, &self));
        }
        if from == to {
            return Ok(self);
        }
        if to == TypeTag::Reference {
            return Ok(Value::Reference(Box::new(self)));
        }

        let value = match self {
            Value::Reference(_) => self.unwrap_reference(),
            Value::Object { value, .. } if to == TypeTag::String => *value,
            other => other,
        };
        if value.tag() == to {
            return Ok(value);
        }

        let converted = match to {
            TypeTag::Boolean => Value::Boolean(value.to_boolean()),
            TypeTag::Real => Value::Real(value.to_real(document)?),
            TypeTag::Int => Value::Int(real_to_int(value.to_real(document)?)),
            TypeTag::String => Value::String(value.to_xpath_string(document)?),
            TypeTag::Node => match value {
                Value::NodeSet(nodes) => match nodes.first() {
                    Some(node) => Value::Node(*node),
                    None => return Err(RuntimeError::EmptyNodeSet),
                },
                other => return Err(RuntimeError::type_mismatch(TypeTag::NodeSet, &other)),
            },
            TypeTag::NodeSet => match value {
                Value::Node(node) => Value::NodeSet(crate::vec![node]),
                other => return Err(RuntimeError::type_mismatch(TypeTag::Node, &other)),
            },
            TypeTag::Void | TypeTag::ResultTree | TypeTag::Object | TypeTag::Reference => {
                return Err(RuntimeError::UnsupportedConversion { from, to });
            }
        };
        Ok(converted)
    }

    fn to_boolean(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Real(r) => *r != 0.0 && !r.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Node(_) => true,
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::Reference(inner) => inner.to_boolean(),
            Value::Object { .. } => true,
        }
    }

    fn to_real(&self, document: &Document) -> Result<f64, RuntimeError> {
        Ok(match self {
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Int(n) => *n as f64,
            Value::Real(r) => *r,
            Value::String(s) => parse_number(s),
            Value::Node(_) | Value::NodeSet(_) => parse_number(&self.to_xpath_string(document)?),
            Value::Reference(inner) => inner.to_real(document)?,
            Value::Object { .. } => {
                return Err(RuntimeError::UnsupportedConversion {
                    from: TypeTag::Object,
                    to: TypeTag::Real,
                });
            }
        })
    }

    fn to_xpath_string(&self, document: &Document) -> Result<EcoString, RuntimeError> {
        Ok(match self {
            Value::Boolean(b) => (if *b { "true" } else { "false" }).into(),
            Value::Int(n) => format!("{}", n).into(),
            Value::Real(r) => format_number(*r),
            Value::String(s) => s.clone(),
            Value::Node(node) => document.string_value(*node),
            Value::NodeSet(nodes) => match nodes.first() {
                Some(node) => document.string_value(*node),
                None => EcoString::new(),
            },
            Value::Reference(inner) => inner.to_xpath_string(document)?,
            Value::Object { value, .. } => value.to_xpath_string(document)?,
        })
    }
}

/// XPath `number()` applied to a string: surrounding whitespace is ignored,
/// anything that is not a plain decimal number is NaN.
fn parse_number(text: &str) -> f64 {
    let text = text.trim();
    let valid = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-')
        && !text[1..].contains('-');
    if !valid {
        return f64::NAN;
    }
    text.parse().unwrap_or(f64::NAN)
}

fn real_to_int(r: f64) -> i64 {
    if r.is_nan() { 0 } else { r as i64 }
}

fn format_number(r: f64) -> EcoString {
    if r.is_nan() {
        return "NaN".into();
    }
    if r.is_infinite() {
        return (if r > 0.0 { "Infinity" } else { "-Infinity" }).into();
    }
    if r > -1e15 && r < 1e15 && r == (r as i64) as f64 {
        return format!("{}", r as i64).into();
    }
    r.to_string().into()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Real(r) => write!(f, "{}", format_number(*r)),
            Value::String(s) => write!(f, "{:?}", s.as_str()),
            Value::Node(node) => write!(f, "node#{}", node.0),
            Value::NodeSet(nodes) => {
                let ids: Vec<String> = nodes.iter().map(|n| format!("#{}", n.0)).collect();
                write!(f, "{{{}}}", ids.join(", "))
            }
            Value::Reference(inner) => write!(f, "ref({})", inner),
            Value::Object { class, value } => write!(f, "{}({})", class, value),
        }
    }
}
