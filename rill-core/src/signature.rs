#![forbid(unsafe_code)]

use rill_ast::ProcedureDefStmt;

use crate::error::SemanticError;
use crate::provider::resolve_type_expr;
use crate::scope::SymbolTable;
use crate::types::Type;

/// A procedure signature with its types resolved. Produced during the
/// procedure discovery phase so that bodies anywhere in the program can call
/// the procedure regardless of declaration order.
#[derive(Clone, Debug)]
pub struct ResolvedSignature {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub output: Option<Type>,
    pub blocking: bool,
}

impl ResolvedSignature {
    pub fn resolve(
        def: &ProcedureDefStmt,
        table: &mut SymbolTable,
    ) -> Result<Self, SemanticError> {
        let mut params = Vec::with_capacity(def.params.len());
        for (name, expr) in &def.params {
            params.push((name.node.clone(), resolve_type_expr(expr, name.span, table)?));
        }
        let output = match &def.output {
            Some(expr) => Some(resolve_type_expr(expr, def.span, table)?),
            None => None,
        };
        Ok(Self {
            name: def.name.node.clone(),
            params,
            output,
            blocking: def.blocking,
        })
    }

    /// The procedure's type; the calling convention falls out of shape.
    /// Params + output = function, output only = provider, otherwise consumer.
    pub fn ty(&self) -> Type {
        let params: Vec<Type> = self.params.iter().map(|(_, t)| t.clone()).collect();
        match (&params[..], &self.output) {
            ([], Some(ret)) => Type::Provider {
                ret: Box::new(ret.clone()),
                blocking: self.blocking,
            },
            (_, Some(ret)) => Type::Function {
                params,
                ret: Box::new(ret.clone()),
                blocking: self.blocking,
            },
            (_, None) => Type::Consumer {
                params,
                blocking: self.blocking,
            },
        }
    }
}
