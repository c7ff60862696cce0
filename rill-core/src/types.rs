#![forbid(unsafe_code)]

use std::collections::HashMap;

use rill_ast::TypeExpr;

/// The full Rill type lattice.
///
/// Struct types compare structurally over their field mapping; the name is
/// kept for diagnostics and nominal lookup only. Procedure types compare by
/// parameter sequence, return type and blocking annotation.
#[derive(Clone, Debug)]
pub enum Type {
    Unit,
    Int,
    Double,
    Bool,
    Str,
    Struct {
        name: String,
        fields: Vec<(String, Type)>,
        immutable: bool,
    },
    Function {
        params: Vec<Type>,
        ret: Box<Type>,
        blocking: bool,
    },
    Consumer {
        params: Vec<Type>,
        blocking: bool,
    },
    Provider {
        ret: Box<Type>,
        blocking: bool,
    },
    /// Generic type-parameter placeholder. Only meaningful within a contract
    /// resolution context; escaping into validated non-generic code is a
    /// compile error.
    GenericParam(String),
    /// A struct under incremental construction. `set` records which fields
    /// have been statically assigned, so `build` can check completeness even
    /// when the builder value flowed through a variable.
    Builder {
        of: Box<Type>,
        set: Vec<String>,
    },
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use Type::*;
        match (self, other) {
            (Unit, Unit) | (Int, Int) | (Double, Double) | (Bool, Bool) | (Str, Str) => true,
            // Structural: the name is not part of equality.
            (
                Struct {
                    fields: a,
                    immutable: ia,
                    ..
                },
                Struct {
                    fields: b,
                    immutable: ib,
                    ..
                },
            ) => ia == ib && a == b,
            (
                Function {
                    params: pa,
                    ret: ra,
                    blocking: ba,
                },
                Function {
                    params: pb,
                    ret: rb,
                    blocking: bb,
                },
            ) => pa == pb && ra == rb && ba == bb,
            (
                Consumer {
                    params: pa,
                    blocking: ba,
                },
                Consumer {
                    params: pb,
                    blocking: bb,
                },
            ) => pa == pb && ba == bb,
            (
                Provider {
                    ret: ra,
                    blocking: ba,
                },
                Provider {
                    ret: rb,
                    blocking: bb,
                },
            ) => ra == rb && ba == bb,
            (GenericParam(a), GenericParam(b)) => a == b,
            (Builder { of: a, set: sa }, Builder { of: b, set: sb }) => a == b && sa == sb,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Type {
    pub fn display(&self) -> String {
        match self {
            Type::Unit => "unit".to_string(),
            Type::Int => "int".to_string(),
            Type::Double => "double".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Str => "string".to_string(),
            Type::Struct {
                name, immutable, ..
            } => {
                if *immutable {
                    format!("immutable struct {name}")
                } else {
                    format!("struct {name}")
                }
            }
            Type::Function { params, ret, .. } => {
                format!("function<{} -> {}>", display_list(params), ret.display())
            }
            Type::Consumer { params, .. } => {
                format!("consumer<{}>", display_list(params))
            }
            Type::Provider { ret, .. } => format!("provider<{}>", ret.display()),
            Type::GenericParam(name) => name.clone(),
            Type::Builder { of, .. } => format!("builder<{}>", of.display()),
        }
    }

    /// Rendering used for implementation dispatch keys. Structs render by
    /// their fields, so two structurally equal types always produce the same
    /// key even under different names; dispatch agrees with type equality.
    pub fn mangle(&self) -> String {
        match self {
            Type::Struct {
                fields, immutable, ..
            } => {
                let body = fields
                    .iter()
                    .map(|(f, t)| format!("{f}:{}", t.mangle()))
                    .collect::<Vec<_>>()
                    .join(",");
                if *immutable {
                    format!("immutable struct{{{body}}}")
                } else {
                    format!("struct{{{body}}}")
                }
            }
            Type::Function { params, ret, .. } => {
                format!("function<{} -> {}>", mangle_list(params), ret.mangle())
            }
            Type::Consumer { params, .. } => format!("consumer<{}>", mangle_list(params)),
            Type::Provider { ret, .. } => format!("provider<{}>", ret.mangle()),
            Type::Builder { of, .. } => format!("builder<{}>", of.mangle()),
            other => other.display(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Double)
    }

    pub fn is_procedure(&self) -> bool {
        matches!(
            self,
            Type::Function { .. } | Type::Consumer { .. } | Type::Provider { .. }
        )
    }

    /// Whether an unresolved generic placeholder occurs anywhere in the type.
    pub fn contains_generic(&self) -> bool {
        match self {
            Type::GenericParam(_) => true,
            Type::Struct { fields, .. } => fields.iter().any(|(_, t)| t.contains_generic()),
            Type::Function { params, ret, .. } => {
                params.iter().any(Type::contains_generic) || ret.contains_generic()
            }
            Type::Consumer { params, .. } => params.iter().any(Type::contains_generic),
            Type::Provider { ret, .. } => ret.contains_generic(),
            Type::Builder { of, .. } => of.contains_generic(),
            _ => false,
        }
    }

    /// Substitute generic placeholders by name. Names absent from `bindings`
    /// stay generic (nested genericity) rather than erroring.
    pub fn substitute(&self, bindings: &HashMap<String, Type>) -> Type {
        match self {
            Type::GenericParam(name) => bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Type::Struct {
                name,
                fields,
                immutable,
            } => Type::Struct {
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|(f, t)| (f.clone(), t.substitute(bindings)))
                    .collect(),
                immutable: *immutable,
            },
            Type::Function {
                params,
                ret,
                blocking,
            } => Type::Function {
                params: params.iter().map(|t| t.substitute(bindings)).collect(),
                ret: Box::new(ret.substitute(bindings)),
                blocking: *blocking,
            },
            Type::Consumer { params, blocking } => Type::Consumer {
                params: params.iter().map(|t| t.substitute(bindings)).collect(),
                blocking: *blocking,
            },
            Type::Provider { ret, blocking } => Type::Provider {
                ret: Box::new(ret.substitute(bindings)),
                blocking: *blocking,
            },
            Type::Builder { of, set } => Type::Builder {
                of: Box::new(of.substitute(bindings)),
                set: set.clone(),
            },
            other => other.clone(),
        }
    }
}

fn display_list(types: &[Type]) -> String {
    types
        .iter()
        .map(Type::display)
        .collect::<Vec<_>>()
        .join(", ")
}

fn mangle_list(types: &[Type]) -> String {
    types
        .iter()
        .map(Type::mangle)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a syntactic type reference against an already-validated set of
/// type definitions. Used by the execution backends, which run strictly after
/// the check phases; an unknown name here is a type-system defect.
pub fn type_from_expr(expr: &TypeExpr, types: &HashMap<String, Type>) -> Type {
    match expr {
        TypeExpr::Int => Type::Int,
        TypeExpr::Double => Type::Double,
        TypeExpr::Bool => Type::Bool,
        TypeExpr::Str => Type::Str,
        TypeExpr::Named(name) => types
            .get(&name.node)
            .cloned()
            .unwrap_or_else(|| panic!("internal error: unknown type `{}` survived validation", name.node)),
        TypeExpr::Function { params, output } => Type::Function {
            params: params.iter().map(|p| type_from_expr(p, types)).collect(),
            ret: Box::new(type_from_expr(output, types)),
            blocking: false,
        },
        TypeExpr::Consumer { params } => Type::Consumer {
            params: params.iter().map(|p| type_from_expr(p, types)).collect(),
            blocking: false,
        },
        TypeExpr::Provider { output } => Type::Provider {
            ret: Box::new(type_from_expr(output, types)),
            blocking: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(name: &str) -> Type {
        Type::Struct {
            name: name.to_string(),
            fields: vec![
                ("x".to_string(), Type::Int),
                ("y".to_string(), Type::Int),
            ],
            immutable: false,
        }
    }

    #[test]
    fn test_struct_equality_is_structural() {
        assert_eq!(point("Point"), point("Coord"));
    }

    #[test]
    fn test_procedure_equality_requires_same_params_and_ret() {
        let f = Type::Function {
            params: vec![Type::Int],
            ret: Box::new(Type::Double),
            blocking: false,
        };
        let g = Type::Function {
            params: vec![Type::Int],
            ret: Box::new(Type::Int),
            blocking: false,
        };
        assert_ne!(f, g);
    }

    #[test]
    fn test_substitute_leaves_unbound_generics() {
        let bindings = HashMap::from([("T".to_string(), Type::Int)]);
        let ty = Type::Function {
            params: vec![
                Type::GenericParam("T".to_string()),
                Type::GenericParam("U".to_string()),
            ],
            ret: Box::new(Type::GenericParam("T".to_string())),
            blocking: false,
        };
        let got = ty.substitute(&bindings);
        assert_eq!(
            got,
            Type::Function {
                params: vec![Type::Int, Type::GenericParam("U".to_string())],
                ret: Box::new(Type::Int),
                blocking: false,
            }
        );
    }

    #[test]
    fn test_mangle_renders_structs_structurally() {
        assert_eq!(point("Point").mangle(), point("Coord").mangle());
        assert_eq!(point("Point").mangle(), "struct{x:int,y:int}");
    }

    #[test]
    fn test_display() {
        let f = Type::Function {
            params: vec![Type::Int, Type::Str],
            ret: Box::new(Type::Bool),
            blocking: false,
        };
        assert_eq!(f.display(), "function<int, string -> bool>");
    }
}
