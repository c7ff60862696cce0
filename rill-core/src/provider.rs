#![forbid(unsafe_code)]

use rill_ast::{Span, TypeExpr};

use crate::error::SemanticError;
use crate::scope::SymbolTable;
use crate::types::Type;

/// Lazy type resolution: a deferred `resolve(table) -> Type` registered
/// wherever a type must be nameable before its definition has been processed
/// (forward references, mutual recursion). Resolution is idempotent; the
/// symbol table memoizes the result on first lookup.
#[derive(Clone, Debug)]
pub enum TypeProvider {
    Immediate(Type),
    OfExpr { expr: TypeExpr, span: Span },
    StructDef {
        name: String,
        fields: Vec<(String, TypeExpr, Span)>,
        immutable: bool,
    },
}

impl TypeProvider {
    pub fn resolve(&self, table: &mut SymbolTable) -> Result<Type, SemanticError> {
        match self {
            TypeProvider::Immediate(ty) => Ok(ty.clone()),
            TypeProvider::OfExpr { expr, span } => resolve_type_expr(expr, *span, table),
            TypeProvider::StructDef {
                name,
                fields,
                immutable,
            } => {
                let mut resolved = Vec::with_capacity(fields.len());
                for (field, expr, span) in fields {
                    resolved.push((field.clone(), resolve_type_expr(expr, *span, table)?));
                }
                Ok(Type::Struct {
                    name: name.clone(),
                    fields: resolved,
                    immutable: *immutable,
                })
            }
        }
    }
}

/// Resolve a syntactic type reference through the symbol table. Named types
/// must denote declared type definitions; resolving them marks them used.
pub fn resolve_type_expr(
    expr: &TypeExpr,
    span: Span,
    table: &mut SymbolTable,
) -> Result<Type, SemanticError> {
    match expr {
        TypeExpr::Int => Ok(Type::Int),
        TypeExpr::Double => Ok(Type::Double),
        TypeExpr::Bool => Ok(Type::Bool),
        TypeExpr::Str => Ok(Type::Str),
        TypeExpr::Named(name) => table.lookup_type_definition(&name.node, name.span),
        TypeExpr::Function { params, output } => Ok(Type::Function {
            params: params
                .iter()
                .map(|p| resolve_type_expr(p, span, table))
                .collect::<Result<_, _>>()?,
            ret: Box::new(resolve_type_expr(output, span, table)?),
            blocking: false,
        }),
        TypeExpr::Consumer { params } => Ok(Type::Consumer {
            params: params
                .iter()
                .map(|p| resolve_type_expr(p, span, table))
                .collect::<Result<_, _>>()?,
            blocking: false,
        }),
        TypeExpr::Provider { output } => Ok(Type::Provider {
            ret: Box::new(resolve_type_expr(output, span, table)?),
            blocking: false,
        }),
    }
}
