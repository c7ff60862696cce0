#![forbid(unsafe_code)]

use std::rc::Rc;

use rill_ast::{BinOp, Expr, ExprKind, Program, Stmt, UnaryOp};
use rill_core::{impl_key, type_from_expr, ProgramInfo, Type};

use crate::env::Env;
use crate::value::{ProcedureValue, Value};

/// Statement outcome: either fall through, or unwind to the enclosing call
/// with a return value.
enum Flow {
    Normal,
    Return(Value),
}

/// The tree-walking backend. Runs strictly after the check phases; any
/// value/operand shape the checker excluded is an internal error here, not a
/// user-facing one.
pub struct Vm {
    info: ProgramInfo,
    globals: Env,
    stdout: String,
}

impl Vm {
    pub fn new(info: ProgramInfo) -> Self {
        Self {
            info,
            globals: Env::new(),
            stdout: String::new(),
        }
    }

    /// Interactive sessions re-run the check phases per snippet; the runtime
    /// environment persists, the program info is refreshed.
    pub fn set_info(&mut self, info: ProgramInfo) {
        self.info = info;
    }

    pub fn run(&mut self, program: &Program) {
        let globals = self.globals.clone();
        for stmt in &program.stmts {
            if let Flow::Return(_) = self.exec_stmt(stmt, &globals) {
                panic!("internal error: return at top level survived validation");
            }
        }
    }

    pub fn take_stdout(&mut self) -> String {
        std::mem::take(&mut self.stdout)
    }

    /// Evaluate a single expression against the global environment. Used by
    /// interactive sessions and tests.
    pub fn eval_in_globals(&mut self, expr: &Expr) -> Value {
        let env = self.globals.clone();
        self.eval_expr(expr, &env)
    }

    fn exec_stmts(&mut self, stmts: &[Stmt], env: &Env) -> Flow {
        for stmt in stmts {
            if let Flow::Return(v) = self.exec_stmt(stmt, env) {
                return Flow::Return(v);
            }
        }
        Flow::Normal
    }

    fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Flow {
        match stmt {
            // Type-level statements have no runtime effect.
            Stmt::TypeDef(_) | Stmt::ContractDef(_) => Flow::Normal,
            Stmt::ProcedureDef(def) => {
                env.define(
                    &def.name.node,
                    self.procedure_value(&def.name.node, def, env),
                );
                Flow::Normal
            }
            Stmt::ContractImpl(imp) => {
                let type_args: Vec<Type> = imp
                    .type_args
                    .iter()
                    .map(|t| type_from_expr(t, &self.info.types))
                    .collect();
                for proc in &imp.procedures {
                    let key = impl_key(&imp.contract.node, &type_args, &proc.name.node);
                    env.define(&key, self.procedure_value(&key, proc, env));
                }
                Flow::Normal
            }
            Stmt::Decl(decl) => {
                let value = self.eval_expr(&decl.init, env);
                env.define(&decl.name.node, value);
                Flow::Normal
            }
            Stmt::Assign(assign) => {
                let value = self.eval_expr(&assign.expr, env);
                env.assign(&assign.target.node, value);
                Flow::Normal
            }
            Stmt::If(stmt) => {
                if self.eval_bool(&stmt.cond, env) {
                    self.exec_stmts(&stmt.then_body, &env.child())
                } else if let Some(else_body) = &stmt.else_body {
                    self.exec_stmts(else_body, &env.child())
                } else {
                    Flow::Normal
                }
            }
            Stmt::While(stmt) => {
                while self.eval_bool(&stmt.cond, env) {
                    if let Flow::Return(v) = self.exec_stmts(&stmt.body, &env.child()) {
                        return Flow::Return(v);
                    }
                }
                Flow::Normal
            }
            Stmt::Return(stmt) => {
                let value = match &stmt.expr {
                    Some(expr) => self.eval_expr(expr, env),
                    None => Value::Unit,
                };
                Flow::Return(value)
            }
            Stmt::Print(stmt) => {
                let value = self.eval_expr(&stmt.expr, env);
                self.stdout.push_str(&value.display());
                self.stdout.push('\n');
                Flow::Normal
            }
            Stmt::ExprStmt(expr) => {
                self.eval_expr(expr, env);
                Flow::Normal
            }
        }
    }

    fn procedure_value(
        &self,
        name: &str,
        def: &rill_ast::ProcedureDefStmt,
        env: &Env,
    ) -> Value {
        Value::Procedure(Rc::new(ProcedureValue {
            name: name.to_string(),
            params: def.params.iter().map(|(p, _)| p.node.clone()).collect(),
            body: Rc::new(def.body.clone()),
            env: env.clone(),
        }))
    }

    fn eval_bool(&mut self, expr: &Expr, env: &Env) -> bool {
        match self.eval_expr(expr, env) {
            Value::Bool(b) => b,
            other => panic!(
                "internal error: condition evaluated to {} past type-checking",
                other.display()
            ),
        }
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Env) -> Value {
        match &expr.kind {
            ExprKind::IntLit(v) => Value::Int(*v),
            ExprKind::DoubleLit(v) => Value::Double(*v),
            ExprKind::BoolLit(v) => Value::Bool(*v),
            ExprKind::StrLit(v) => Value::Str(v.clone()),
            ExprKind::Ident(name) => env.get(&name.node).unwrap_or_else(|| {
                panic!(
                    "internal error: `{}` unbound at evaluation time",
                    name.node
                )
            }),
            ExprKind::Unary { op, expr: inner } => {
                let value = self.eval_expr(inner, env);
                match (op, value) {
                    (UnaryOp::Neg, Value::Int(v)) => Value::Int(-v),
                    (UnaryOp::Neg, Value::Double(v)) => Value::Double(-v),
                    (UnaryOp::Not, Value::Bool(v)) => Value::Bool(!v),
                    (_, other) => panic!(
                        "internal error: unary operand {} past type-checking",
                        other.display()
                    ),
                }
            }
            ExprKind::Binary { left, op, right } => self.eval_binary(left, *op, right, env),
            ExprKind::Log { value, base } => {
                // Integer operands promote to double; the checker restricted
                // operands to int/double pairs, anything else is a defect.
                let value = self.eval_expr(value, env);
                let base = self.eval_expr(base, env);
                let (value, base) = match (value, base) {
                    (Value::Int(v), Value::Int(b)) => (v as f64, b as f64),
                    (Value::Double(v), Value::Double(b)) => (v, b),
                    (Value::Int(v), Value::Double(b)) => (v as f64, b),
                    (Value::Double(v), Value::Int(b)) => (v, b as f64),
                    (v, b) => panic!(
                        "internal error: log of {} base {} past type-checking",
                        v.display(),
                        b.display()
                    ),
                };
                Value::Double(value.ln() / base.ln())
            }
            ExprKind::Call { callee, args } => {
                let value = env.get(&callee.node).unwrap_or_else(|| {
                    panic!(
                        "internal error: procedure `{}` unbound at call time",
                        callee.node
                    )
                });
                self.call(value, args, env)
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
                let key = impl_key(&contract.node, &resolved, &member.node);
                let value = env.get(&key).unwrap_or_else(|| {
                    panic!("internal error: contract impl `{key}` unbound at call time")
                });
                self.call(value, args, env)
            }
            ExprKind::StructLit { name, fields } => {
                let declared = self.declared_fields(&name.node);
                // Evaluate in source order, store in declared order.
                let mut evaluated: Vec<(String, Value)> = fields
                    .iter()
                    .map(|(f, e)| (f.node.clone(), self.eval_expr(e, env)))
                    .collect();
                let ordered = declared
                    .iter()
                    .map(|(f, _)| {
                        let at = evaluated
                            .iter()
                            .position(|(g, _)| g == f)
                            .unwrap_or_else(|| {
                                panic!("internal error: field `{f}` missing past type-checking")
                            });
                        evaluated.remove(at)
                    })
                    .collect();
                Value::Struct {
                    name: name.node.clone(),
                    fields: ordered,
                }
            }
            ExprKind::Builder { name, fields } => {
                let declared = self.declared_fields(&name.node);
                let mut slots: Vec<(String, Option<Value>)> = declared
                    .iter()
                    .map(|(f, _)| (f.clone(), None))
                    .collect();
                for (field, value) in fields {
                    let value = self.eval_expr(value, env);
                    let slot = slots
                        .iter_mut()
                        .find(|(f, _)| *f == field.node)
                        // Statically invalid fields never get this far.
                        .unwrap_or_else(|| {
                            panic!(
                                "internal error: builder field `{}` should have been caught at type-checking",
                                field.node
                            )
                        });
                    slot.1 = Some(value);
                }
                Value::Builder {
                    name: name.node.clone(),
                    fields: slots,
                }
            }
            ExprKind::Build(inner) => match self.eval_expr(inner, env) {
                Value::Builder { name, fields } => Value::Struct {
                    name,
                    fields: fields
                        .into_iter()
                        .map(|(f, v)| {
                            let v = v.unwrap_or_else(|| {
                                panic!(
                                    "internal error: unset field `{f}` should have been caught at type-checking"
                                )
                            });
                            (f, v)
                        })
                        .collect(),
                },
                other => panic!(
                    "internal error: build of {} past type-checking",
                    other.display()
                ),
            },
            ExprKind::FieldAccess { base, field } => match self.eval_expr(base, env) {
                Value::Struct { fields, .. } => fields
                    .into_iter()
                    .find(|(f, _)| *f == field.node)
                    .map(|(_, v)| v)
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

    fn eval_binary(&mut self, left: &Expr, op: BinOp, right: &Expr, env: &Env) -> Value {
        use BinOp::*;
        // Short-circuit before evaluating the right operand.
        if matches!(op, And | Or) {
            let l = match self.eval_expr(left, env) {
                Value::Bool(b) => b,
                other => panic!(
                    "internal error: logical operand {} past type-checking",
                    other.display()
                ),
            };
            return match (op, l) {
                (And, false) => Value::Bool(false),
                (Or, true) => Value::Bool(true),
                _ => self.eval_expr(right, env),
            };
        }

        let l = self.eval_expr(left, env);
        let r = self.eval_expr(right, env);
        match op {
            Add | Sub | Mul | Div => match (l, r) {
                (Value::Int(a), Value::Int(b)) => Value::Int(match op {
                    Add => a + b,
                    Sub => a - b,
                    Mul => a * b,
                    // Defined fatal runtime errors, not checker-excluded
                    // states: the type system cannot rule these out.
                    Div => {
                        if b == 0 {
                            panic!("runtime error: division by zero");
                        }
                        a.checked_div(b).unwrap_or_else(|| {
                            panic!("runtime error: integer division overflow")
                        })
                    }
                    _ => unreachable!(),
                }),
                (a, b) => {
                    let (a, b) = promote_pair(a, b);
                    Value::Double(match op {
                        Add => a + b,
                        Sub => a - b,
                        Mul => a * b,
                        Div => a / b,
                        _ => unreachable!(),
                    })
                }
            },
            Lt | Gt | Le | Ge => {
                let (a, b) = match (l, r) {
                    (Value::Int(a), Value::Int(b)) => (a as f64, b as f64),
                    (a, b) => promote_pair(a, b),
                };
                Value::Bool(match op {
                    Lt => a < b,
                    Gt => a > b,
                    Le => a <= b,
                    Ge => a >= b,
                    _ => unreachable!(),
                })
            }
            Eq => Value::Bool(l == r),
            Ne => Value::Bool(l != r),
            And | Or => unreachable!(),
        }
    }

    fn call(&mut self, value: Value, args: &[Expr], env: &Env) -> Value {
        let Value::Procedure(procedure) = value else {
            panic!(
                "internal error: call of {} past type-checking",
                value.display()
            );
        };
        // Arguments evaluate in the caller's environment, in order; the body
        // runs on a fresh frame over the *captured* chain.
        let arg_values: Vec<Value> = args.iter().map(|a| self.eval_expr(a, env)).collect();
        let frame = procedure.env.child();
        for (param, value) in procedure.params.iter().zip(arg_values) {
            frame.define(param, value);
        }
        match self.exec_stmts(&procedure.body, &frame) {
            Flow::Return(v) => v,
            Flow::Normal => Value::Unit,
        }
    }

    fn declared_fields(&self, name: &str) -> Vec<(String, Type)> {
        match self.info.types.get(name) {
            Some(Type::Struct { fields, .. }) => fields.clone(),
            _ => panic!("internal error: `{name}` is not a validated struct type"),
        }
    }
}

fn promote_pair(a: Value, b: Value) -> (f64, f64) {
    match (a, b) {
        (Value::Int(a), Value::Double(b)) => (a as f64, b),
        (Value::Double(a), Value::Int(b)) => (a, b as f64),
        (Value::Double(a), Value::Double(b)) => (a, b),
        (a, b) => panic!(
            "internal error: numeric operands {} and {} past type-checking",
            a.display(),
            b.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_ast::{span, Spanned};

    fn sp() -> rill_ast::Span {
        span(0, 0)
    }

    fn expr(kind: ExprKind) -> Expr {
        Expr { span: sp(), kind }
    }

    fn int(v: i64) -> Expr {
        expr(ExprKind::IntLit(v))
    }

    fn vm() -> Vm {
        Vm::new(ProgramInfo::default())
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_double() {
        let e = expr(ExprKind::Binary {
            left: Box::new(int(1)),
            op: BinOp::Add,
            right: Box::new(expr(ExprKind::DoubleLit(0.5))),
        });
        assert_eq!(vm().eval_in_globals(&e), Value::Double(1.5));
    }

    #[test]
    fn test_log_int_operands_compute_in_double() {
        let e = expr(ExprKind::Log {
            value: Box::new(int(8)),
            base: Box::new(int(2)),
        });
        assert_eq!(vm().eval_in_globals(&e), Value::Double(3.0));
    }

    #[test]
    #[should_panic(expected = "runtime error: division by zero")]
    fn test_integer_division_by_zero_is_a_fatal_runtime_error() {
        let e = expr(ExprKind::Binary {
            left: Box::new(int(1)),
            op: BinOp::Div,
            right: Box::new(int(0)),
        });
        vm().eval_in_globals(&e);
    }

    #[test]
    #[should_panic(expected = "runtime error: integer division overflow")]
    fn test_integer_division_overflow_is_a_fatal_runtime_error() {
        let e = expr(ExprKind::Binary {
            left: Box::new(int(i64::MIN)),
            op: BinOp::Div,
            right: Box::new(int(-1)),
        });
        vm().eval_in_globals(&e);
    }

    #[test]
    fn test_and_short_circuits_right_operand() {
        // The right operand would crash the vm if it were ever evaluated.
        let e = expr(ExprKind::Binary {
            left: Box::new(expr(ExprKind::BoolLit(false))),
            op: BinOp::And,
            right: Box::new(expr(ExprKind::Ident(Spanned::new(
                sp(),
                "unbound".to_string(),
            )))),
        });
        assert_eq!(vm().eval_in_globals(&e), Value::Bool(false));
    }

    #[test]
    fn test_procedure_call_returns_body_value() {
        let mut vm = vm();
        vm.run(&Program {
            stmts: vec![Stmt::ProcedureDef(rill_ast::ProcedureDefStmt {
                span: sp(),
                name: Spanned::new(sp(), "double_it".to_string()),
                params: vec![(Spanned::new(sp(), "n".to_string()), rill_ast::TypeExpr::Int)],
                output: Some(rill_ast::TypeExpr::Int),
                blocking: false,
                body: vec![Stmt::Return(rill_ast::ReturnStmt {
                    span: sp(),
                    expr: Some(expr(ExprKind::Binary {
                        left: Box::new(expr(ExprKind::Ident(Spanned::new(
                            sp(),
                            "n".to_string(),
                        )))),
                        op: BinOp::Mul,
                        right: Box::new(int(2)),
                    })),
                })],
            })],
        });
        let call = expr(ExprKind::Call {
            callee: Spanned::new(sp(), "double_it".to_string()),
            args: vec![int(21)],
        });
        assert_eq!(vm.eval_in_globals(&call), Value::Int(42));
    }
}
