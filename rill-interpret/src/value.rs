#![forbid(unsafe_code)]

use std::rc::Rc;

use rill_ast::Stmt;

use crate::env::Env;

/// A runtime value. The explicit kind discriminant replaces the original
/// design's instanceof dispatch; evaluation matches exhaustively over it and
/// operand pairs the checker excluded are internal errors.
#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Struct {
        name: String,
        fields: Vec<(String, Value)>,
    },
    /// A struct under construction; fields in declared order, unset as None.
    Builder {
        name: String,
        fields: Vec<(String, Option<Value>)>,
    },
    Procedure(Rc<ProcedureValue>),
}

/// A callable runtime value: the body paired with a reference to its
/// defining scope chain. This is the model's one back-reference; the chain
/// itself is shared via reference counting.
#[derive(Debug)]
pub struct ProcedureValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Vec<Stmt>>,
    pub env: Env,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Struct { fields: a, .. }, Value::Struct { fields: b, .. }) => a == b,
            (Value::Builder { fields: a, .. }, Value::Builder { fields: b, .. }) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    pub fn display(&self) -> String {
        match self {
            Value::Unit => "unit".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Double(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{v:.1}")
                } else {
                    v.to_string()
                }
            }
            Value::Bool(v) => v.to_string(),
            Value::Str(v) => v.clone(),
            Value::Struct { name, fields } => {
                let body = fields
                    .iter()
                    .map(|(f, v)| format!("{f} = {}", v.display()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{name} {{{body}}}")
            }
            Value::Builder { name, .. } => format!("{name}::builder"),
            Value::Procedure(p) => format!("<procedure {}>", p.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_display_keeps_a_fraction_digit() {
        assert_eq!(Value::Double(3.0).display(), "3.0");
        assert_eq!(Value::Double(2.5).display(), "2.5");
    }

    #[test]
    fn test_struct_equality_is_by_fields() {
        let a = Value::Struct {
            name: "P".to_string(),
            fields: vec![("x".to_string(), Value::Int(1))],
        };
        let b = Value::Struct {
            name: "Q".to_string(),
            fields: vec![("x".to_string(), Value::Int(1))],
        };
        assert_eq!(a, b);
    }
}
