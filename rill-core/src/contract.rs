#![forbid(unsafe_code)]

use std::collections::HashMap;

use rill_ast::{ContractDefStmt, ContractSignatureDef};

use crate::error::SemanticError;
use crate::provider::resolve_type_expr;
use crate::scope::SymbolTable;
use crate::types::Type;

/// Symbol-table key for a contract member signature.
pub fn member_key(contract: &str, member: &str) -> String {
    format!("${contract}::{member}")
}

/// Symbol-table key for one member of a concrete contract implementation.
/// Type arguments render via [`Type::mangle`], so dispatch follows the same
/// structural equality the type lattice uses.
pub fn impl_key(contract: &str, type_args: &[Type], member: &str) -> String {
    let args = type_args
        .iter()
        .map(Type::mangle)
        .collect::<Vec<_>>()
        .join("$");
    format!("${contract}${args}::{member}")
}

/// One stored signature type: either fully resolved, or a generic parameter
/// name to be made concrete at implementation time.
#[derive(Clone, Debug, PartialEq)]
pub enum SignatureType {
    Resolved(Type),
    Generic(String),
}

impl SignatureType {
    pub fn to_type(&self) -> Type {
        match self {
            SignatureType::Resolved(ty) => ty.clone(),
            SignatureType::Generic(name) => Type::GenericParam(name.clone()),
        }
    }

    fn concretize(&self, bindings: &HashMap<String, Type>) -> Type {
        match self {
            // Generics can still be nested inside a resolved type, e.g.
            // `function<T -> int>`.
            SignatureType::Resolved(ty) => ty.substitute(bindings),
            SignatureType::Generic(name) => bindings
                .get(name)
                .cloned()
                .unwrap_or_else(|| Type::GenericParam(name.clone())),
        }
    }
}

/// One registered member of a contract capability group.
#[derive(Clone, Debug)]
pub struct ContractMember {
    pub name: String,
    pub param_names: Vec<String>,
    pub params: Vec<SignatureType>,
    pub output: Option<SignatureType>,
    pub blocking: bool,
    /// Member-level generic parameter names, beyond the contract's own.
    pub generics: Vec<String>,
}

impl ContractMember {
    /// Register a member signature under its mangled `$<contract>::<member>`
    /// key. The contract's own type parameters are expected to already be
    /// bound as placeholder type definitions in the table; this additionally
    /// binds the member-level generics for the duration of resolution, then
    /// deletes them again.
    pub fn register(
        def: &ContractSignatureDef,
        contract: &str,
        table: &mut SymbolTable,
    ) -> Result<Self, SemanticError> {
        let key = member_key(contract, &def.name.node);
        if table.is_declared(&key) {
            return Err(SemanticError::new(
                format!(
                    "unexpected redeclaration of contract procedure {contract}::{}",
                    def.name.node
                ),
                def.name.span,
            ));
        }

        for generic in &def.generics {
            if table.is_declared(&generic.node) {
                return Err(SemanticError::new(
                    format!(
                        "generic parameter name `{}` already in use for {}::{}",
                        generic.node, contract, def.name.node
                    ),
                    generic.span,
                ));
            }
            table.declare(
                &generic.node,
                Type::GenericParam(generic.node.clone()),
                generic.span,
            )?;
            table.mark_type_definition(&generic.node);
        }

        let resolve_one = |table: &mut SymbolTable, expr, span| -> Result<SignatureType, SemanticError> {
            Ok(match resolve_type_expr(expr, span, table)? {
                Type::GenericParam(name) => SignatureType::Generic(name),
                resolved => SignatureType::Resolved(resolved),
            })
        };

        let mut param_names = Vec::with_capacity(def.params.len());
        let mut params = Vec::with_capacity(def.params.len());
        let resolved = (|| {
            for (name, expr) in &def.params {
                param_names.push(name.node.clone());
                params.push(resolve_one(table, expr, name.span)?);
            }
            match &def.output {
                Some(expr) => Ok(Some(resolve_one(table, expr, def.span)?)),
                None => Ok(None),
            }
        })();
        // The transient stand-ins come out of the table no matter how
        // resolution went; leaving them behind would corrupt later members.
        for generic in &def.generics {
            table.delete(&generic.node);
        }
        let output = resolved?;

        let member = Self {
            name: def.name.node.clone(),
            param_names,
            params,
            output,
            blocking: def.blocking,
            generics: def.generics.iter().map(|g| g.node.clone()).collect(),
        };

        table.declare(&key, member.signature_type(), def.span)?;
        table.initialize(&key);
        table.mark_used(&key);
        Ok(member)
    }

    /// The (possibly still generic) procedure type of this signature.
    pub fn signature_type(&self) -> Type {
        self.procedure_type(
            self.params.iter().map(SignatureType::to_type).collect(),
            self.output.as_ref().map(SignatureType::to_type),
        )
    }

    /// Substitute concrete types for generic parameter names. Names absent
    /// from `bindings` (member-level generics at a partially generic call
    /// site) stay generic rather than erroring.
    pub fn concretize(&self, bindings: &HashMap<String, Type>) -> Type {
        self.procedure_type(
            self.params
                .iter()
                .map(|p| p.concretize(bindings))
                .collect(),
            self.output.as_ref().map(|o| o.concretize(bindings)),
        )
    }

    fn procedure_type(&self, params: Vec<Type>, output: Option<Type>) -> Type {
        match (&params[..], output) {
            ([], Some(ret)) => Type::Provider {
                ret: Box::new(ret),
                blocking: self.blocking,
            },
            (_, Some(ret)) => Type::Function {
                params,
                ret: Box::new(ret),
                blocking: self.blocking,
            },
            (_, None) => Type::Consumer {
                params,
                blocking: self.blocking,
            },
        }
    }
}

/// A contract capability group: a named, ordered set of generic procedure
/// signatures, concretized per implementation site.
#[derive(Clone, Debug)]
pub struct ContractGroup {
    pub name: String,
    pub type_params: Vec<String>,
    pub members: Vec<ContractMember>,
}

impl ContractGroup {
    /// Register a whole contract definition: bind the contract-level type
    /// parameters as placeholders, register every member, then drop the
    /// placeholders again.
    pub fn register(
        def: &ContractDefStmt,
        table: &mut SymbolTable,
    ) -> Result<Self, SemanticError> {
        for param in &def.type_params {
            if table.is_declared(&param.node) {
                return Err(SemanticError::new(
                    format!(
                        "type parameter name `{}` already in use for contract {}",
                        param.node, def.name.node
                    ),
                    param.span,
                ));
            }
            table.declare(
                &param.node,
                Type::GenericParam(param.node.clone()),
                param.span,
            )?;
            table.mark_type_definition(&param.node);
        }

        let mut members = Vec::with_capacity(def.signatures.len());
        let registered = (|| {
            for sig in &def.signatures {
                members.push(ContractMember::register(sig, &def.name.node, table)?);
            }
            Ok(())
        })();
        for param in &def.type_params {
            table.delete(&param.node);
        }
        registered?;

        Ok(Self {
            name: def.name.node.clone(),
            type_params: def.type_params.iter().map(|p| p.node.clone()).collect(),
            members,
        })
    }

    pub fn member(&self, name: &str) -> Option<&ContractMember> {
        self.members.iter().find(|m| m.name == name)
    }
}
