#![forbid(unsafe_code)]

use std::collections::HashMap;

use rill_ast::{
    AssignStmt, BinOp, ContractDefStmt, ContractImplStmt, DeclStmt, Expr, ExprKind, IfStmt,
    PrintStmt, ProcedureDefStmt, ReturnStmt, Span, Stmt, TypeDefStmt, UnaryOp, WhileStmt,
};

use crate::contract::{impl_key, ContractGroup};
use crate::error::SemanticError;
use crate::provider::{resolve_type_expr, TypeProvider};
use crate::scope::SymbolTable;
use crate::signature::ResolvedSignature;
use crate::types::Type;

/// Hidden binding placed in every value-returning procedure's body scope.
/// Return statements initialize it; the scope-exit audit then doubles as the
/// missing-return detector.
pub const RETURN_FLAG: &str = "$RETURNS";

/// Everything the execution backends need from a completed check: resolved
/// type definitions, procedure signatures and contract groups.
#[derive(Clone, Debug, Default)]
pub struct ProgramInfo {
    pub types: HashMap<String, Type>,
    pub procedures: HashMap<String, ResolvedSignature>,
    pub contracts: HashMap<String, ContractGroup>,
}

#[derive(Clone, Debug)]
struct ProcContext {
    blocking: bool,
    output: Option<Type>,
}

/// The type-checking walker. Checking a node is what mutates the symbol
/// table (declaring locals, marking usage), so the pipeline invokes it
/// exactly once per node.
pub struct Checker {
    pub table: SymbolTable,
    types: HashMap<String, Type>,
    procedures: HashMap<String, ResolvedSignature>,
    contracts: HashMap<String, ContractGroup>,
    // Stack: contract impl members check while their enclosing context is
    // still the file scope.
    current: Vec<ProcContext>,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new()
    }
}

impl Checker {
    pub fn new() -> Self {
        Self {
            table: SymbolTable::new(),
            types: HashMap::new(),
            procedures: HashMap::new(),
            contracts: HashMap::new(),
            current: Vec::new(),
        }
    }

    pub fn info(&self) -> ProgramInfo {
        ProgramInfo {
            types: self.types.clone(),
            procedures: self.procedures.clone(),
            contracts: self.contracts.clone(),
        }
    }

    // ---- Phase 1: type discovery ----

    /// Register a user-defined type's lazy resolver, so any statement may
    /// reference the type name regardless of declaration order.
    pub fn register_type_def(&mut self, def: &TypeDefStmt) -> Result<(), SemanticError> {
        let provider = TypeProvider::StructDef {
            name: def.name.node.clone(),
            fields: def
                .fields
                .iter()
                .map(|(f, t)| (f.node.clone(), t.clone(), f.span))
                .collect(),
            immutable: def.immutable,
        };
        self.table.declare_lazy(&def.name.node, provider, def.name.span)?;
        self.table.mark_type_definition(&def.name.node);
        self.table.initialize(&def.name.node);
        Ok(())
    }

    /// Register a contract capability group and its member signatures.
    pub fn register_contract_def(&mut self, def: &ContractDefStmt) -> Result<(), SemanticError> {
        if self.contracts.contains_key(&def.name.node) {
            return Err(SemanticError::new(
                format!("unexpected redeclaration of contract `{}`", def.name.node),
                def.name.span,
            ));
        }
        let group = ContractGroup::register(def, &mut self.table)?;
        self.contracts.insert(group.name.clone(), group);
        Ok(())
    }

    // ---- Phase 2: procedure discovery ----

    /// Resolve and declare a procedure's signature type in the shared
    /// file-level scope, enabling mutual recursion in any order.
    pub fn declare_procedure(&mut self, def: &ProcedureDefStmt) -> Result<(), SemanticError> {
        let sig = ResolvedSignature::resolve(def, &mut self.table)?;
        self.table.declare(&def.name.node, sig.ty(), def.name.span)?;
        self.table.initialize(&def.name.node);
        self.procedures.insert(sig.name.clone(), sig);
        Ok(())
    }

    /// Declare the mangled member keys of a contract implementation, so
    /// contract calls are forward-reference-safe like plain procedures.
    pub fn declare_contract_impl(&mut self, imp: &ContractImplStmt) -> Result<(), SemanticError> {
        let group = self.lookup_contract(&imp.contract.node, imp.contract.span)?.clone();
        let (type_args, bindings) = self.resolve_impl_type_args(&group, imp)?;
        if imp.procedures.len() != group.members.len() {
            return Err(SemanticError::new(
                format!(
                    "contract `{}` has {} members but this implementation defines {}",
                    group.name,
                    group.members.len(),
                    imp.procedures.len()
                ),
                imp.span,
            ));
        }
        for proc in &imp.procedures {
            let Some(member) = group.member(&proc.name.node) else {
                return Err(SemanticError::new(
                    format!(
                        "`{}` is not a member of contract `{}`",
                        proc.name.node, group.name
                    ),
                    proc.name.span,
                ));
            };
            let key = impl_key(&group.name, &type_args, &member.name);
            let concrete = member.concretize(&bindings);
            self.table.declare(&key, concrete, proc.name.span)?;
            self.table.initialize(&key);
            // Implementations are reachable through contract calls only;
            // they are not subject to the plain unused audit.
            self.table.mark_used(&key);
        }
        Ok(())
    }

    // ---- Phase 3: procedure signature validation ----

    /// Type-check a procedure's signature (not yet its body). Signature
    /// types were resolved during discovery; this pass rejects generic
    /// placeholders escaping into plain procedure signatures.
    pub fn validate_procedure_signature(
        &mut self,
        def: &ProcedureDefStmt,
    ) -> Result<(), SemanticError> {
        let sig = self
            .procedures
            .get(&def.name.node)
            .unwrap_or_else(|| {
                panic!(
                    "internal error: `{}` missed the discovery phase",
                    def.name.node
                )
            });
        if sig.ty().contains_generic() {
            return Err(SemanticError::new(
                format!(
                    "procedure `{}` uses a generic type parameter outside a contract",
                    def.name.node
                ),
                def.name.span,
            ));
        }
        Ok(())
    }

    // ---- Phase 4: full-body type assertion ----

    pub fn check_stmt(&mut self, stmt: &Stmt) -> Result<(), SemanticError> {
        match stmt {
            Stmt::TypeDef(def) => self.check_type_def(def),
            Stmt::ProcedureDef(def) => self.check_procedure_def(def),
            // Contract signatures were fully validated at registration.
            Stmt::ContractDef(_) => Ok(()),
            Stmt::ContractImpl(imp) => self.check_contract_impl(imp),
            Stmt::Decl(decl) => self.check_decl(decl),
            Stmt::Assign(assign) => self.check_assign(assign),
            Stmt::If(stmt) => self.check_if(stmt),
            Stmt::While(stmt) => self.check_while(stmt),
            Stmt::Return(stmt) => self.check_return(stmt),
            Stmt::Print(PrintStmt { expr, .. }) => self.check_expr(expr).map(|_| ()),
            Stmt::ExprStmt(expr) => self.check_expr(expr).map(|_| ()),
        }
    }

    fn check_type_def(&mut self, def: &TypeDefStmt) -> Result<(), SemanticError> {
        // Force the lazy resolver; this is where bad field types surface.
        let ty = self.table.lookup_type(&def.name.node, def.name.span)?;
        if ty.contains_generic() {
            return Err(SemanticError::new(
                format!(
                    "type `{}` contains an unresolved generic parameter",
                    def.name.node
                ),
                def.name.span,
            ));
        }
        self.types.insert(def.name.node.clone(), ty);
        Ok(())
    }

    fn check_procedure_def(&mut self, def: &ProcedureDefStmt) -> Result<(), SemanticError> {
        // Top-level procedures were declared during discovery. A definition
        // nested in a procedure body always declares here, so reusing a
        // taken name surfaces as a redeclaration rather than being mistaken
        // for a new body of the existing procedure.
        let nested = !self.current.is_empty();
        if nested
            || !self.procedures.contains_key(&def.name.node)
            || !self.table.is_declared(&def.name.node)
        {
            self.declare_procedure(def)?;
            self.validate_procedure_signature(def)?;
        }
        let sig = self.procedures[&def.name.node].clone();
        self.check_procedure_body(def, &sig)
    }

    fn check_procedure_body(
        &mut self,
        def: &ProcedureDefStmt,
        sig: &ResolvedSignature,
    ) -> Result<(), SemanticError> {
        self.table.enter_scope();
        if sig.output.is_some() {
            // The return-completeness marker; see RETURN_FLAG. Hiding-aware
            // so nested procedure definitions get their own marker.
            self.table
                .declare_allowing_hiding(RETURN_FLAG, Type::Bool, def.span)?;
        }
        for (i, (name, ty)) in sig.params.iter().enumerate() {
            let span = def.params.get(i).map(|(n, _)| n.span).unwrap_or(def.span);
            self.table.declare_allowing_hiding(name, ty.clone(), span)?;
            self.table.initialize(name);
        }
        self.current.push(ProcContext {
            blocking: sig.blocking,
            output: sig.output.clone(),
        });
        let body_result = (|| {
            for stmt in &def.body {
                self.check_stmt(stmt)?;
            }
            Ok(())
        })();
        self.current.pop();
        body_result?;

        if sig.output.is_some() {
            if !self.table.is_initialized(RETURN_FLAG) {
                return Err(SemanticError::new(
                    format!(
                        "missing return in {} `{}`",
                        sig.ty().display(),
                        def.name.node
                    ),
                    def.span,
                ));
            }
            self.table.mark_used(RETURN_FLAG);
        }
        self.table.exit_scope(true)
    }

    fn check_contract_impl(&mut self, imp: &ContractImplStmt) -> Result<(), SemanticError> {
        let group = self.lookup_contract(&imp.contract.node, imp.contract.span)?.clone();
        let (_, bindings) = self.resolve_impl_type_args(&group, imp)?;
        for proc in &imp.procedures {
            let member = group.member(&proc.name.node).unwrap_or_else(|| {
                panic!(
                    "internal error: impl member `{}` missed the discovery phase",
                    proc.name.node
                )
            });
            let expected = member.concretize(&bindings);
            let actual = ResolvedSignature::resolve(proc, &mut self.table)?;
            if actual.ty() != expected {
                return Err(SemanticError::new(
                    format!(
                        "signature mismatch for {}::{}: expected {}, found {}",
                        group.name,
                        member.name,
                        expected.display(),
                        actual.ty().display()
                    ),
                    proc.name.span,
                ));
            }
            self.check_procedure_body(proc, &actual)?;
        }
        Ok(())
    }

    fn check_decl(&mut self, decl: &DeclStmt) -> Result<(), SemanticError> {
        let init_ty = self.check_expr(&decl.init)?;
        let ty = match &decl.ty {
            Some(annotated) => {
                let declared = resolve_type_expr(annotated, decl.span, &mut self.table)?;
                if declared != init_ty {
                    return Err(SemanticError::new(
                        format!(
                            "`{}` declared as {} but initialized with {}",
                            decl.name.node,
                            declared.display(),
                            init_ty.display()
                        ),
                        decl.span,
                    ));
                }
                declared
            }
            None => init_ty,
        };
        if ty.contains_generic() {
            return Err(SemanticError::new(
                format!(
                    "`{}` has a generic type outside a contract",
                    decl.name.node
                ),
                decl.span,
            ));
        }
        self.table.declare(&decl.name.node, ty, decl.name.span)?;
        self.table.initialize(&decl.name.node);
        Ok(())
    }

    fn check_assign(&mut self, assign: &AssignStmt) -> Result<(), SemanticError> {
        let name = &assign.target.node;
        let target_ty = self.table.lookup_type(name, assign.target.span)?;
        if self.table.is_type_definition(name) {
            return Err(SemanticError::new(
                format!("cannot assign to type `{name}`"),
                assign.target.span,
            ));
        }
        let expr_ty = self.check_expr(&assign.expr)?;
        if expr_ty != target_ty {
            return Err(SemanticError::new(
                format!(
                    "cannot assign {} to `{name}` of type {}",
                    expr_ty.display(),
                    target_ty.display()
                ),
                assign.span,
            ));
        }
        self.table.initialize(name);
        Ok(())
    }

    fn check_if(&mut self, stmt: &IfStmt) -> Result<(), SemanticError> {
        self.expect_bool(&stmt.cond, "if condition")?;
        let tracked = self.tracking_returns();
        let before = tracked && self.table.is_initialized(RETURN_FLAG);

        self.check_block(&stmt.then_body)?;
        let after_then = tracked && self.table.is_initialized(RETURN_FLAG);
        if tracked {
            self.table.set_initialized(RETURN_FLAG, before);
        }

        let after_else = match &stmt.else_body {
            Some(body) => {
                self.check_block(body)?;
                tracked && self.table.is_initialized(RETURN_FLAG)
            }
            // No else: the statement may fall through without returning.
            None => before,
        };
        if tracked {
            self.table
                .set_initialized(RETURN_FLAG, after_then && after_else);
        }
        Ok(())
    }

    fn check_while(&mut self, stmt: &WhileStmt) -> Result<(), SemanticError> {
        self.expect_bool(&stmt.cond, "while condition")?;
        let tracked = self.tracking_returns();
        let before = tracked && self.table.is_initialized(RETURN_FLAG);
        self.check_block(&stmt.body)?;
        // The loop body may run zero times.
        if tracked {
            self.table.set_initialized(RETURN_FLAG, before);
        }
        Ok(())
    }

    fn check_return(&mut self, stmt: &ReturnStmt) -> Result<(), SemanticError> {
        let Some(ctx) = self.current.last().cloned() else {
            return Err(SemanticError::new(
                "return outside of a procedure",
                stmt.span,
            ));
        };
        match (&ctx.output, &stmt.expr) {
            (Some(expected), Some(expr)) => {
                let actual = self.check_expr(expr)?;
                if actual != *expected {
                    return Err(SemanticError::new(
                        format!(
                            "expected return of {}, found {}",
                            expected.display(),
                            actual.display()
                        ),
                        stmt.span,
                    ));
                }
                self.table.initialize(RETURN_FLAG);
                Ok(())
            }
            (Some(expected), None) => Err(SemanticError::new(
                format!("missing return value of type {}", expected.display()),
                stmt.span,
            )),
            (None, Some(_)) => Err(SemanticError::new(
                "cannot return a value from a consumer",
                stmt.span,
            )),
            (None, None) => Ok(()),
        }
    }

    fn check_block(&mut self, body: &[Stmt]) -> Result<(), SemanticError> {
        self.table.enter_scope();
        let result = (|| {
            for stmt in body {
                self.check_stmt(stmt)?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => self.table.exit_scope(true),
            Err(e) => Err(e),
        }
    }

    pub fn check_expr(&mut self, expr: &Expr) -> Result<Type, SemanticError> {
        match &expr.kind {
            ExprKind::IntLit(_) => Ok(Type::Int),
            ExprKind::DoubleLit(_) => Ok(Type::Double),
            ExprKind::BoolLit(_) => Ok(Type::Bool),
            ExprKind::StrLit(_) => Ok(Type::Str),
            ExprKind::Ident(name) => {
                let ty = self.table.lookup_type(&name.node, name.span)?;
                if self.table.is_type_definition(&name.node) {
                    return Err(SemanticError::new(
                        format!("type `{}` used as a value", name.node),
                        name.span,
                    ));
                }
                self.table.mark_used(&name.node);
                Ok(ty)
            }
            ExprKind::Unary { op, expr: inner } => {
                let ty = self.check_expr(inner)?;
                match (op, &ty) {
                    (UnaryOp::Neg, Type::Int) | (UnaryOp::Neg, Type::Double) => Ok(ty),
                    (UnaryOp::Not, Type::Bool) => Ok(Type::Bool),
                    (UnaryOp::Neg, other) => Err(SemanticError::new(
                        format!("cannot negate {}", other.display()),
                        expr.span,
                    )),
                    (UnaryOp::Not, other) => Err(SemanticError::new(
                        format!("`!` requires bool, found {}", other.display()),
                        expr.span,
                    )),
                }
            }
            ExprKind::Binary { left, op, right } => {
                let lt = self.check_expr(left)?;
                let rt = self.check_expr(right)?;
                self.check_binary(*op, &lt, &rt, expr.span)
            }
            ExprKind::Log { value, base } => {
                let vt = self.check_expr(value)?;
                let bt = self.check_expr(base)?;
                if vt.is_numeric() && bt.is_numeric() {
                    Ok(Type::Double)
                } else {
                    Err(SemanticError::new(
                        format!(
                            "log requires numeric operands, found {} and {}",
                            vt.display(),
                            bt.display()
                        ),
                        expr.span,
                    ))
                }
            }
            ExprKind::Call { callee, args } => {
                let ty = self.table.lookup_type(&callee.node, callee.span)?;
                self.table.mark_used(&callee.node);
                self.check_call(&callee.node, &ty, args, expr.span)
            }
            ExprKind::ContractCall {
                contract,
                type_args,
                member,
                args,
            } => self.check_contract_call(contract, type_args, member, args, expr.span),
            ExprKind::StructLit { name, fields } => {
                let ty = self
                    .table
                    .lookup_type_definition(&name.node, name.span)?;
                let Type::Struct {
                    fields: declared, ..
                } = &ty
                else {
                    return Err(SemanticError::new(
                        format!("`{}` is not a struct type", name.node),
                        name.span,
                    ));
                };
                let declared = declared.clone();
                if fields.len() != declared.len() {
                    return Err(SemanticError::new(
                        format!(
                            "struct `{}` has {} fields but {} were supplied",
                            name.node,
                            declared.len(),
                            fields.len()
                        ),
                        expr.span,
                    ));
                }
                let mut seen = Vec::with_capacity(fields.len());
                for (field, value) in fields {
                    if seen.contains(&field.node) {
                        return Err(SemanticError::new(
                            format!("field `{}` set twice", field.node),
                            field.span,
                        ));
                    }
                    let expected = self.field_type(&declared, &name.node, field)?;
                    let actual = self.check_expr(value)?;
                    if actual != expected {
                        return Err(self.field_mismatch(&name.node, field, &expected, &actual));
                    }
                    seen.push(field.node.clone());
                }
                Ok(ty)
            }
            ExprKind::Builder { name, fields } => {
                let ty = self
                    .table
                    .lookup_type_definition(&name.node, name.span)?;
                let Type::Struct {
                    fields: declared, ..
                } = &ty
                else {
                    return Err(SemanticError::new(
                        format!("`{}` is not a buildable struct type", name.node),
                        name.span,
                    ));
                };
                let declared = declared.clone();
                let mut set = Vec::with_capacity(fields.len());
                for (field, value) in fields {
                    if set.contains(&field.node) {
                        return Err(SemanticError::new(
                            format!("field `{}` set twice", field.node),
                            field.span,
                        ));
                    }
                    let expected = self.field_type(&declared, &name.node, field)?;
                    let actual = self.check_expr(value)?;
                    if actual != expected {
                        return Err(self.field_mismatch(&name.node, field, &expected, &actual));
                    }
                    set.push(field.node.clone());
                }
                Ok(Type::Builder {
                    of: Box::new(ty),
                    set,
                })
            }
            ExprKind::Build(inner) => match self.check_expr(inner)? {
                Type::Builder { of, set } => {
                    let Type::Struct { name, fields, .. } = of.as_ref() else {
                        panic!("internal error: builder of non-struct type");
                    };
                    for (field, _) in fields {
                        if !set.contains(field) {
                            return Err(SemanticError::new(
                                format!("missing field `{field}` building struct `{name}`"),
                                expr.span,
                            ));
                        }
                    }
                    Ok(*of)
                }
                other => Err(SemanticError::new(
                    format!("cannot build {}", other.display()),
                    expr.span,
                )),
            },
            ExprKind::FieldAccess { base, field } => {
                let base_ty = self.check_expr(base)?;
                let Type::Struct { name, fields, .. } = &base_ty else {
                    return Err(SemanticError::new(
                        format!("{} has no fields", base_ty.display()),
                        expr.span,
                    ));
                };
                let declared = fields.clone();
                let name = name.clone();
                self.field_type(&declared, &name, field)
            }
        }
    }

    fn check_binary(
        &mut self,
        op: BinOp,
        lt: &Type,
        rt: &Type,
        span: Span,
    ) -> Result<Type, SemanticError> {
        use BinOp::*;
        match op {
            Add | Sub | Mul | Div => match (lt, rt) {
                (Type::Int, Type::Int) => Ok(Type::Int),
                (Type::Double, Type::Double)
                | (Type::Int, Type::Double)
                | (Type::Double, Type::Int) => Ok(Type::Double),
                _ => Err(SemanticError::new(
                    format!(
                        "arithmetic requires numeric operands, found {} and {}",
                        lt.display(),
                        rt.display()
                    ),
                    span,
                )),
            },
            Lt | Gt | Le | Ge => {
                if lt.is_numeric() && rt.is_numeric() {
                    Ok(Type::Bool)
                } else {
                    Err(SemanticError::new(
                        format!(
                            "comparison requires numeric operands, found {} and {}",
                            lt.display(),
                            rt.display()
                        ),
                        span,
                    ))
                }
            }
            Eq | Ne => {
                if lt == rt && !lt.is_procedure() {
                    Ok(Type::Bool)
                } else {
                    Err(SemanticError::new(
                        format!("cannot compare {} and {}", lt.display(), rt.display()),
                        span,
                    ))
                }
            }
            And | Or => {
                if matches!((lt, rt), (Type::Bool, Type::Bool)) {
                    Ok(Type::Bool)
                } else {
                    Err(SemanticError::new(
                        format!(
                            "logical operator requires bool operands, found {} and {}",
                            lt.display(),
                            rt.display()
                        ),
                        span,
                    ))
                }
            }
        }
    }

    fn check_call(
        &mut self,
        name: &str,
        ty: &Type,
        args: &[Expr],
        span: Span,
    ) -> Result<Type, SemanticError> {
        let (params, ret, blocking): (&[Type], Type, bool) = match ty {
            Type::Function {
                params,
                ret,
                blocking,
            } => (params, (**ret).clone(), *blocking),
            Type::Consumer { params, blocking } => (params, Type::Unit, *blocking),
            Type::Provider { ret, blocking } => (&[], (**ret).clone(), *blocking),
            _ => {
                return Err(SemanticError::new(
                    format!("`{name}` of type {} is not callable", ty.display()),
                    span,
                ))
            }
        };
        if ret.contains_generic() || params.iter().any(Type::contains_generic) {
            return Err(SemanticError::new(
                format!("cannot call `{name}` with unresolved generic types"),
                span,
            ));
        }
        if blocking {
            if let Some(ctx) = self.current.last() {
                if !ctx.blocking {
                    return Err(SemanticError::new(
                        format!(
                            "blocking call to `{name}` from a non-blocking procedure; annotate the caller as blocking"
                        ),
                        span,
                    ));
                }
            }
        }
        if args.len() != params.len() {
            return Err(SemanticError::new(
                format!(
                    "`{name}` expects {} arguments, got {}",
                    params.len(),
                    args.len()
                ),
                span,
            ));
        }
        let params = params.to_vec();
        for (arg, param) in args.iter().zip(&params) {
            let actual = self.check_expr(arg)?;
            if actual != *param {
                return Err(SemanticError::new(
                    format!(
                        "argument type mismatch calling `{name}`: expected {}, found {}",
                        param.display(),
                        actual.display()
                    ),
                    arg.span,
                ));
            }
        }
        Ok(ret)
    }

    fn check_contract_call(
        &mut self,
        contract: &rill_ast::Ident,
        type_args: &[rill_ast::TypeExpr],
        member: &rill_ast::Ident,
        args: &[Expr],
        span: Span,
    ) -> Result<Type, SemanticError> {
        let group = self.lookup_contract(&contract.node, contract.span)?.clone();
        let Some(found) = group.member(&member.node) else {
            return Err(SemanticError::new(
                format!(
                    "`{}` is not a member of contract `{}`",
                    member.node, group.name
                ),
                member.span,
            ));
        };
        if type_args.len() != group.type_params.len() {
            return Err(SemanticError::new(
                format!(
                    "contract `{}` takes {} type arguments, got {}",
                    group.name,
                    group.type_params.len(),
                    type_args.len()
                ),
                span,
            ));
        }
        let mut resolved_args = Vec::with_capacity(type_args.len());
        for expr in type_args {
            resolved_args.push(resolve_type_expr(expr, span, &mut self.table)?);
        }
        let bindings: HashMap<String, Type> = group
            .type_params
            .iter()
            .cloned()
            .zip(resolved_args.iter().cloned())
            .collect();
        let concrete = found.concretize(&bindings);

        let key = impl_key(&group.name, &resolved_args, &member.node);
        if !self.table.is_declared(&key) {
            let shown = resolved_args
                .iter()
                .map(Type::display)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SemanticError::new(
                format!(
                    "no implementation of contract `{}` for <{shown}>",
                    group.name
                ),
                span,
            ));
        }
        self.table.mark_used(&key);
        self.check_call(&member.node, &concrete, args, span)
    }

    fn lookup_contract(&self, name: &str, span: Span) -> Result<&ContractGroup, SemanticError> {
        self.contracts.get(name).ok_or_else(|| {
            SemanticError::new(format!("unresolved contract `{name}`"), span)
        })
    }

    fn resolve_impl_type_args(
        &mut self,
        group: &ContractGroup,
        imp: &ContractImplStmt,
    ) -> Result<(Vec<Type>, HashMap<String, Type>), SemanticError> {
        if imp.type_args.len() != group.type_params.len() {
            return Err(SemanticError::new(
                format!(
                    "contract `{}` takes {} type arguments, got {}",
                    group.name,
                    group.type_params.len(),
                    imp.type_args.len()
                ),
                imp.span,
            ));
        }
        let mut resolved = Vec::with_capacity(imp.type_args.len());
        for expr in &imp.type_args {
            resolved.push(resolve_type_expr(expr, imp.span, &mut self.table)?);
        }
        let bindings = group
            .type_params
            .iter()
            .cloned()
            .zip(resolved.iter().cloned())
            .collect();
        Ok((resolved, bindings))
    }

    fn tracking_returns(&self) -> bool {
        self.current
            .last()
            .is_some_and(|ctx| ctx.output.is_some())
            && self.table.is_declared(RETURN_FLAG)
    }

    fn expect_bool(&mut self, expr: &Expr, what: &str) -> Result<(), SemanticError> {
        let ty = self.check_expr(expr)?;
        if ty == Type::Bool {
            Ok(())
        } else {
            Err(SemanticError::new(
                format!("{what} must be bool, found {}", ty.display()),
                expr.span,
            ))
        }
    }

    fn field_type(
        &self,
        declared: &[(String, Type)],
        struct_name: &str,
        field: &rill_ast::Ident,
    ) -> Result<Type, SemanticError> {
        declared
            .iter()
            .find(|(f, _)| *f == field.node)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| {
                SemanticError::new(
                    format!("no field `{}` on struct `{struct_name}`", field.node),
                    field.span,
                )
            })
    }

    fn field_mismatch(
        &self,
        struct_name: &str,
        field: &rill_ast::Ident,
        expected: &Type,
        actual: &Type,
    ) -> SemanticError {
        SemanticError::new(
            format!(
                "field `{}` of struct `{struct_name}` expects {}, found {}",
                field.node,
                expected.display(),
                actual.display()
            ),
            field.span,
        )
    }
}
