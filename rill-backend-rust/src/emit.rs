#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::mem;

use rill_ast::{BinOp, Expr, ExprKind, ProcedureDefStmt, Program, Stmt, UnaryOp};
use rill_core::{type_from_expr, ProgramInfo, Type};

use crate::fragment::Fragment;

/// The source-emission walker. Produces a `Fragment` per tree; the caller
/// feeds the accumulated fragment to [`wrap_module`] for the fixed scaffolding.
///
/// Runs strictly after the check phases, so type questions are answered by
/// local inference over already-validated nodes; a shape the checker excluded
/// is an internal error.
pub struct Emitter {
    info: ProgramInfo,
    // Lexical scopes of local variable types, innermost last.
    locals: Vec<HashMap<String, Type>>,
    depth: usize,
}

/// The boilerplate hook: the only place the fixed Rust module text lives.
/// Hoisted items land at module scope, the body inside `fn main`.
pub fn wrap_module(package: &str, module: &str, fragment: &Fragment) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "// Generated by rill for package `{package}`, module `{module}`. Do not edit.\n"
    ));
    out.push_str("#![allow(dead_code, unused_mut, unused_parens, unused_variables)]\n\n");
    out.push_str("fn fmt_double(v: f64) -> String {\n");
    out.push_str("    if v.fract() == 0.0 && v.is_finite() {\n");
    out.push_str("        format!(\"{v:.1}\")\n");
    out.push_str("    } else {\n");
    out.push_str("        v.to_string()\n");
    out.push_str("    }\n");
    out.push_str("}\n\n");
    out.push_str(&fragment.hoisted);
    out.push_str("\nfn main() {\n");
    out.push_str(&fragment.body);
    out.push_str("}\n");
    out
}

impl Emitter {
    pub fn new(info: ProgramInfo) -> Self {
        Self {
            info,
            locals: vec![HashMap::new()],
            depth: 1,
        }
    }

    pub fn emit_program(&mut self, program: &Program) -> Fragment {
        let mut acc = Fragment::default();
        for stmt in &program.stmts {
            acc.push(self.emit_stmt(stmt));
        }
        acc
    }

    fn emit_stmt(&mut self, stmt: &Stmt) -> Fragment {
        match stmt {
            Stmt::TypeDef(def) => {
                let Some(Type::Struct { fields, .. }) = self.info.types.get(&def.name.node) else {
                    panic!(
                        "internal error: type `{}` not validated as a struct",
                        def.name.node
                    );
                };
                Fragment::hoisted(emit_struct_items(&def.name.node, fields))
            }
            // Contract definitions are type-level only; implementations carry
            // the generated functions.
            Stmt::ContractDef(_) => Fragment::default(),
            Stmt::ContractImpl(imp) => {
                let type_args: Vec<Type> = imp
                    .type_args
                    .iter()
                    .map(|t| type_from_expr(t, &self.info.types))
                    .collect();
                let mut acc = Fragment::default();
                for proc in &imp.procedures {
                    let name = mangle_impl(&imp.contract.node, &type_args, &proc.name.node);
                    acc.push(self.emit_procedure(&name, proc));
                }
                acc
            }
            Stmt::ProcedureDef(def) => self.emit_procedure(&def.name.node, def),
            Stmt::Decl(decl) => {
                let ty = self.infer(&decl.init);
                let init = self.emit_expr(&decl.init);
                let line = self.line(&format!(
                    "let mut {}: {} = {};",
                    decl.name.node,
                    rust_type(&ty),
                    init
                ));
                self.bind_local(&decl.name.node, ty);
                Fragment::body(line)
            }
            Stmt::Assign(assign) => {
                let expr = self.emit_expr(&assign.expr);
                Fragment::body(self.line(&format!("{} = {};", assign.target.node, expr)))
            }
            Stmt::If(stmt) => {
                let cond = self.emit_expr(&stmt.cond);
                let mut acc = Fragment::body(self.line(&format!("if {cond} {{")));
                acc.push(self.emit_block(&stmt.then_body));
                if let Some(else_body) = &stmt.else_body {
                    acc.push(Fragment::body(self.line("} else {")));
                    acc.push(self.emit_block(else_body));
                }
                acc.push(Fragment::body(self.line("}")));
                acc
            }
            Stmt::While(stmt) => {
                let cond = self.emit_expr(&stmt.cond);
                let mut acc = Fragment::body(self.line(&format!("while {cond} {{")));
                acc.push(self.emit_block(&stmt.body));
                acc.push(Fragment::body(self.line("}")));
                acc
            }
            Stmt::Return(stmt) => match &stmt.expr {
                Some(expr) => {
                    let expr = self.emit_expr(expr);
                    Fragment::body(self.line(&format!("return {expr};")))
                }
                None => Fragment::body(self.line("return;")),
            },
            Stmt::Print(stmt) => {
                let rendered = match self.infer(&stmt.expr) {
                    Type::Double => {
                        format!("println!(\"{{}}\", fmt_double({}));", self.emit_expr(&stmt.expr))
                    }
                    Type::Int | Type::Bool | Type::Str => {
                        format!("println!(\"{{}}\", {});", self.emit_expr(&stmt.expr))
                    }
                    _ => format!("println!(\"{{:?}}\", {});", self.emit_expr(&stmt.expr)),
                };
                Fragment::body(self.line(&rendered))
            }
            Stmt::ExprStmt(expr) => {
                let expr = self.emit_expr(expr);
                Fragment::body(self.line(&format!("{expr};")))
            }
        }
    }

    /// A statement list in a fresh lexical scope, one indent level deeper.
    fn emit_block(&mut self, stmts: &[Stmt]) -> Fragment {
        self.locals.push(HashMap::new());
        self.depth += 1;
        let mut acc = Fragment::default();
        for stmt in stmts {
            acc.push(self.emit_stmt(stmt));
        }
        self.depth -= 1;
        self.locals.pop();
        acc
    }

    /// Procedures hoist to module scope as plain `fn`s: the interpreter's
    /// closure chains have no emitted counterpart, and discovery-phase
    /// declaration makes forward and mutual references just work.
    fn emit_procedure(&mut self, name: &str, def: &ProcedureDefStmt) -> Fragment {
        let mut params = HashMap::new();
        let mut sig = String::new();
        sig.push_str(&format!("fn {name}("));
        for (i, (param, texpr)) in def.params.iter().enumerate() {
            if i > 0 {
                sig.push_str(", ");
            }
            let ty = type_from_expr(texpr, &self.info.types);
            // Parameters are assignable like any other binding, so they are
            // mutable in the generated signature too.
            sig.push_str(&format!("mut {}: {}", param.node, rust_type(&ty)));
            params.insert(param.node.clone(), ty);
        }
        sig.push(')');
        if let Some(output) = &def.output {
            let ty = type_from_expr(output, &self.info.types);
            sig.push_str(&format!(" -> {}", rust_type(&ty)));
        }

        // Hoisted functions do not see enclosing locals.
        let saved_locals = mem::replace(&mut self.locals, vec![params]);
        let saved_depth = mem::replace(&mut self.depth, 1);
        let mut body = Fragment::default();
        for stmt in &def.body {
            body.push(self.emit_stmt(stmt));
        }
        self.locals = saved_locals;
        self.depth = saved_depth;

        let mut acc = Fragment::hoisted(format!("{sig} {{\n{}}}\n\n", body.body));
        acc.push(Fragment::hoisted(body.hoisted));
        acc
    }

    fn emit_expr(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::IntLit(v) => format!("{v}"),
            ExprKind::DoubleLit(v) => format!("{v:?}"),
            ExprKind::BoolLit(v) => format!("{v}"),
            ExprKind::StrLit(v) => format!("\"{}\".to_string()", v.escape_default()),
            ExprKind::Ident(name) => {
                if needs_clone(&self.infer(expr)) {
                    format!("{}.clone()", name.node)
                } else {
                    name.node.clone()
                }
            }
            ExprKind::Unary { op, expr: inner } => {
                let inner = self.emit_expr(inner);
                match op {
                    UnaryOp::Neg => format!("(-{inner})"),
                    UnaryOp::Not => format!("(!{inner})"),
                }
            }
            ExprKind::Binary { left, op, right } => self.emit_binary(left, *op, right),
            ExprKind::Log { value, base } => {
                let value = self.emit_coerced(value);
                let base = self.emit_coerced(base);
                format!("(({value}).ln() / ({base}).ln())")
            }
            ExprKind::Call { callee, args } => {
                let args = self.emit_args(args);
                format!("{}({args})", callee.node)
            }
            ExprKind::ContractCall {
                contract,
                type_args,
                member,
                args,
            } => {
                let resolved: Vec<Type> = type_args
                    .iter()
                    .map(|t| type_from_expr(t, &self.info.types))
                    .collect();
                let name = mangle_impl(&contract.node, &resolved, &member.node);
                let args = self.emit_args(args);
                format!("{name}({args})")
            }
            ExprKind::StructLit { name, fields } => {
                let fields = fields
                    .iter()
                    .map(|(f, e)| format!("{}: {}", f.node, self.emit_expr(e)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} {{ {fields} }}", name.node)
            }
            ExprKind::Builder { name, fields } => {
                let mut out = format!("{}Builder::new()", name.node);
                for (field, value) in fields {
                    out.push_str(&format!(".{}({})", field.node, self.emit_expr(value)));
                }
                out
            }
            ExprKind::Build(inner) => format!("({}).build()", self.emit_expr(inner)),
            ExprKind::FieldAccess { base, field } => {
                let ty = self.infer(expr);
                let base = self.emit_expr(base);
                if needs_clone(&ty) {
                    format!("({base}).{}.clone()", field.node)
                } else {
                    format!("({base}).{}", field.node)
                }
            }
        }
    }

    fn emit_binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> String {
        use BinOp::*;
        let token = match op {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            And => "&&",
            Or => "||",
        };
        match op {
            And | Or => {
                let l = self.emit_expr(left);
                let r = self.emit_expr(right);
                format!("({l} {token} {r})")
            }
            _ => {
                let lt = self.infer(left);
                let rt = self.infer(right);
                // Mixed int/double operands compute in double.
                if lt.is_numeric() && rt.is_numeric() && lt != rt {
                    let l = self.emit_coerced(left);
                    let r = self.emit_coerced(right);
                    format!("({l} {token} {r})")
                } else {
                    let l = self.emit_expr(left);
                    let r = self.emit_expr(right);
                    format!("({l} {token} {r})")
                }
            }
        }
    }

    /// A numeric operand as an `f64` expression.
    fn emit_coerced(&mut self, expr: &Expr) -> String {
        let rendered = self.emit_expr(expr);
        match self.infer(expr) {
            Type::Int => format!("({rendered} as f64)"),
            Type::Double => rendered,
            other => panic!(
                "internal error: {} operand past type-checking",
                other.display()
            ),
        }
    }

    fn emit_args(&mut self, args: &[Expr]) -> String {
        args.iter()
            .map(|a| self.emit_expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Local type inference over validated nodes, for cast and clone
    /// placement. Mirrors the checker's result without re-running it.
    fn infer(&self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::DoubleLit(_) => Type::Double,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::StrLit(_) => Type::Str,
            ExprKind::Ident(name) => self.lookup(&name.node),
            ExprKind::Unary { op, expr: inner } => match op {
                UnaryOp::Neg => self.infer(inner),
                UnaryOp::Not => Type::Bool,
            },
            ExprKind::Binary { left, op, right } => {
                use BinOp::*;
                match op {
                    Add | Sub | Mul | Div => {
                        if self.infer(left) == Type::Int && self.infer(right) == Type::Int {
                            Type::Int
                        } else {
                            Type::Double
                        }
                    }
                    _ => Type::Bool,
                }
            }
            ExprKind::Log { .. } => Type::Double,
            ExprKind::Call { callee, args: _ } => output_of(&self.lookup(&callee.node)),
            ExprKind::ContractCall {
                contract,
                type_args,
                member,
                ..
            } => {
                let group = self.info.contracts.get(&contract.node).unwrap_or_else(|| {
                    panic!(
                        "internal error: contract `{}` survived validation unregistered",
                        contract.node
                    )
                });
                let resolved: Vec<Type> = type_args
                    .iter()
                    .map(|t| type_from_expr(t, &self.info.types))
                    .collect();
                let bindings: HashMap<String, Type> = group
                    .type_params
                    .iter()
                    .cloned()
                    .zip(resolved)
                    .collect();
                let member = group.member(&member.node).unwrap_or_else(|| {
                    panic!(
                        "internal error: contract member `{}::{}` survived validation",
                        contract.node, member.node
                    )
                });
                output_of(&member.concretize(&bindings))
            }
            ExprKind::StructLit { name, .. } => self
                .info
                .types
                .get(&name.node)
                .cloned()
                .unwrap_or_else(|| {
                    panic!(
                        "internal error: struct `{}` survived validation unregistered",
                        name.node
                    )
                }),
            ExprKind::Builder { name, fields } => {
                let of = self.info.types.get(&name.node).cloned().unwrap_or_else(|| {
                    panic!(
                        "internal error: struct `{}` survived validation unregistered",
                        name.node
                    )
                });
                Type::Builder {
                    of: Box::new(of),
                    set: fields.iter().map(|(f, _)| f.node.clone()).collect(),
                }
            }
            ExprKind::Build(inner) => match self.infer(inner) {
                Type::Builder { of, .. } => *of,
                other => panic!(
                    "internal error: build of {} past type-checking",
                    other.display()
                ),
            },
            ExprKind::FieldAccess { base, field } => match self.infer(base) {
                Type::Struct { fields, .. } => fields
                    .into_iter()
                    .find(|(f, _)| *f == field.node)
                    .map(|(_, t)| t)
                    .unwrap_or_else(|| {
                        panic!(
                            "internal error: field `{}` missing past type-checking",
                            field.node
                        )
                    }),
                other => panic!(
                    "internal error: field access on {} past type-checking",
                    other.display()
                ),
            },
        }
    }

    fn lookup(&self, name: &str) -> Type {
        for scope in self.locals.iter().rev() {
            if let Some(ty) = scope.get(name) {
                return ty.clone();
            }
        }
        self.info
            .procedures
            .get(name)
            .map(|sig| sig.ty())
            .unwrap_or_else(|| panic!("internal error: `{name}` unbound at emission time"))
    }

    fn bind_local(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn line(&self, text: &str) -> String {
        format!("{}{text}\n", "    ".repeat(self.depth))
    }
}

/// What a call to a procedure of type `ty` evaluates to.
fn output_of(ty: &Type) -> Type {
    match ty {
        Type::Function { ret, .. } | Type::Provider { ret, .. } => (**ret).clone(),
        Type::Consumer { .. } => Type::Unit,
        other => panic!(
            "internal error: call of {} past type-checking",
            other.display()
        ),
    }
}

/// The struct definition plus its builder companion. The companion's `build`
/// unwraps unconditionally: completeness was proven at type-check time.
fn emit_struct_items(name: &str, fields: &[(String, Type)]) -> String {
    let mut out = String::new();
    out.push_str("#[derive(Clone, Debug, PartialEq)]\n");
    out.push_str(&format!("struct {name} {{\n"));
    for (field, ty) in fields {
        out.push_str(&format!("    {field}: {},\n", rust_type(ty)));
    }
    out.push_str("}\n\n");

    out.push_str("#[derive(Clone, Debug)]\n");
    out.push_str(&format!("struct {name}Builder {{\n"));
    for (field, ty) in fields {
        out.push_str(&format!("    {field}: Option<{}>,\n", rust_type(ty)));
    }
    out.push_str("}\n\n");

    out.push_str(&format!("impl {name}Builder {{\n"));
    out.push_str("    fn new() -> Self {\n");
    out.push_str("        Self {\n");
    for (field, _) in fields {
        out.push_str(&format!("            {field}: None,\n"));
    }
    out.push_str("        }\n");
    out.push_str("    }\n\n");
    for (field, ty) in fields {
        out.push_str(&format!(
            "    fn {field}(mut self, value: {}) -> Self {{\n",
            rust_type(ty)
        ));
        out.push_str(&format!("        self.{field} = Some(value);\n"));
        out.push_str("        self\n");
        out.push_str("    }\n\n");
    }
    out.push_str(&format!("    fn build(self) -> {name} {{\n"));
    out.push_str(&format!("        {name} {{\n"));
    for (field, _) in fields {
        out.push_str(&format!(
            "            {field}: self.{field}.unwrap(),\n"
        ));
    }
    out.push_str("        }\n");
    out.push_str("    }\n");
    out.push_str("}\n\n");
    out
}

/// Generated function name for one member of a concrete contract
/// implementation: monomorphization keys the name on the type arguments.
/// Uses the structural `Type::mangle` rendering so impl definitions and call
/// sites agree even when they name structurally equal types differently.
fn mangle_impl(contract: &str, type_args: &[Type], member: &str) -> String {
    let args = type_args
        .iter()
        .map(|t| sanitize(&t.mangle()))
        .collect::<Vec<_>>()
        .join("_");
    format!("{contract}_{args}_{member}")
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn rust_type(ty: &Type) -> String {
    match ty {
        Type::Unit => "()".to_string(),
        Type::Int => "i64".to_string(),
        Type::Double => "f64".to_string(),
        Type::Bool => "bool".to_string(),
        Type::Str => "String".to_string(),
        Type::Struct { name, .. } => name.clone(),
        Type::Function { params, ret, .. } => {
            format!("fn({}) -> {}", rust_type_list(params), rust_type(ret))
        }
        Type::Consumer { params, .. } => format!("fn({})", rust_type_list(params)),
        Type::Provider { ret, .. } => format!("fn() -> {}", rust_type(ret)),
        Type::Builder { of, .. } => match of.as_ref() {
            Type::Struct { name, .. } => format!("{name}Builder"),
            other => panic!(
                "internal error: builder of {} past type-checking",
                other.display()
            ),
        },
        Type::GenericParam(name) => {
            panic!("internal error: generic parameter `{name}` survived validation")
        }
    }
}

fn rust_type_list(types: &[Type]) -> String {
    types
        .iter()
        .map(rust_type)
        .collect::<Vec<_>>()
        .join(", ")
}

fn needs_clone(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Str | Type::Struct { .. } | Type::Builder { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_ast::{span, Spanned, TypeDefStmt, TypeExpr};

    fn sp() -> rill_ast::Span {
        span(0, 0)
    }

    fn ident(name: &str) -> Spanned<String> {
        Spanned::new(sp(), name.to_string())
    }

    fn expr(kind: ExprKind) -> Expr {
        Expr { span: sp(), kind }
    }

    fn point_info() -> ProgramInfo {
        let mut info = ProgramInfo::default();
        info.types.insert(
            "Point".to_string(),
            Type::Struct {
                name: "Point".to_string(),
                fields: vec![
                    ("x".to_string(), Type::Int),
                    ("y".to_string(), Type::Int),
                ],
                immutable: false,
            },
        );
        info
    }

    #[test]
    fn test_struct_def_hoists_type_and_builder_companion() {
        let mut emitter = Emitter::new(point_info());
        let frag = emitter.emit_stmt(&Stmt::TypeDef(TypeDefStmt {
            span: sp(),
            name: ident("Point"),
            fields: vec![
                (ident("x"), TypeExpr::Int),
                (ident("y"), TypeExpr::Int),
            ],
            immutable: false,
        }));
        assert!(frag.body.is_empty());
        assert!(frag.hoisted.contains("struct Point {"));
        assert!(frag.hoisted.contains("struct PointBuilder {"));
        assert!(frag.hoisted.contains("fn build(self) -> Point {"));
    }

    #[test]
    fn test_log_casts_integer_operands() {
        let mut emitter = Emitter::new(ProgramInfo::default());
        let rendered = emitter.emit_expr(&expr(ExprKind::Log {
            value: Box::new(expr(ExprKind::IntLit(8))),
            base: Box::new(expr(ExprKind::IntLit(2))),
        }));
        assert_eq!(rendered, "(((8 as f64)).ln() / ((2 as f64)).ln())");
    }

    #[test]
    fn test_mixed_arithmetic_casts_only_the_integer_side() {
        let mut emitter = Emitter::new(ProgramInfo::default());
        let rendered = emitter.emit_expr(&expr(ExprKind::Binary {
            left: Box::new(expr(ExprKind::IntLit(1))),
            op: BinOp::Add,
            right: Box::new(expr(ExprKind::DoubleLit(0.5))),
        }));
        assert_eq!(rendered, "((1 as f64) + 0.5)");
    }

    #[test]
    fn test_impl_mangling_is_a_valid_identifier() {
        let name = mangle_impl("Shower", &[Type::Int, Type::Str], "wash");
        assert_eq!(name, "Shower_int_string_wash");
    }

    #[test]
    fn test_wrap_module_places_hoisted_items_before_main() {
        let fragment = Fragment {
            body: "    println!(\"hi\");\n".to_string(),
            hoisted: "fn helper() {}\n".to_string(),
        };
        let module = wrap_module("demo/pkg", "demo", &fragment);
        let helper_at = module.find("fn helper").unwrap();
        let main_at = module.find("fn main").unwrap();
        assert!(helper_at < main_at);
        assert!(module.ends_with("}\n"));
    }
}
