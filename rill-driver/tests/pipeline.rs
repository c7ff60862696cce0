//! End-to-end pipeline behavior: the four check passes feeding each backend.

use proptest::prelude::*;
use rill_ast::{
    span, AssignStmt, BinOp, ContractDefStmt, ContractImplStmt, ContractSignatureDef, DeclStmt,
    Expr, ExprKind, Ident, IfStmt, PrintStmt, ProcedureDefStmt, Program, ReturnStmt, Span,
    Spanned, Stmt, TypeDefStmt, TypeExpr, WhileStmt,
};
use rill_driver::{compile_and_run, Backend, PackageMetadata, RunOutput, SemanticError, Session};

fn sp() -> Span {
    span(0, 1)
}

fn id(name: &str) -> Ident {
    Spanned::new(sp(), name.to_string())
}

fn e(kind: ExprKind) -> Expr {
    Expr { span: sp(), kind }
}

fn int(v: i64) -> Expr {
    e(ExprKind::IntLit(v))
}

fn dbl(v: f64) -> Expr {
    e(ExprKind::DoubleLit(v))
}

fn var(name: &str) -> Expr {
    e(ExprKind::Ident(id(name)))
}

fn bin(left: Expr, op: BinOp, right: Expr) -> Expr {
    e(ExprKind::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}

fn log(value: Expr, base: Expr) -> Expr {
    e(ExprKind::Log {
        value: Box::new(value),
        base: Box::new(base),
    })
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    e(ExprKind::Call {
        callee: id(name),
        args,
    })
}

fn print(expr: Expr) -> Stmt {
    Stmt::Print(PrintStmt { span: sp(), expr })
}

fn decl(name: &str, init: Expr) -> Stmt {
    Stmt::Decl(DeclStmt {
        span: sp(),
        name: id(name),
        ty: None,
        init,
    })
}

fn ret(expr: Expr) -> Stmt {
    Stmt::Return(ReturnStmt {
        span: sp(),
        expr: Some(expr),
    })
}

fn func(
    name: &str,
    params: Vec<(&str, TypeExpr)>,
    output: Option<TypeExpr>,
    body: Vec<Stmt>,
) -> Stmt {
    Stmt::ProcedureDef(procedure(name, params, output, false, body))
}

fn procedure(
    name: &str,
    params: Vec<(&str, TypeExpr)>,
    output: Option<TypeExpr>,
    blocking: bool,
    body: Vec<Stmt>,
) -> ProcedureDefStmt {
    ProcedureDefStmt {
        span: sp(),
        name: id(name),
        params: params.into_iter().map(|(n, t)| (id(n), t)).collect(),
        output,
        blocking,
        body,
    }
}

fn point_def() -> Stmt {
    Stmt::TypeDef(TypeDefStmt {
        span: sp(),
        name: id("Point"),
        fields: vec![(id("x"), TypeExpr::Int), (id("y"), TypeExpr::Int)],
        immutable: false,
    })
}

fn point_lit(x: i64, y: i64) -> Expr {
    e(ExprKind::StructLit {
        name: id("Point"),
        fields: vec![(id("x"), int(x)), (id("y"), int(y))],
    })
}

fn run(stmts: Vec<Stmt>) -> Result<RunOutput, SemanticError> {
    compile_and_run(
        &Program { stmts },
        Backend::Interpreted,
        &PackageMetadata::default(),
    )
}

// One half of a mutually recursive pair, parameterized by its partner.
fn parity_fn(name: &str, partner: &str, base_case: bool) -> Stmt {
    func(
        name,
        vec![("n", TypeExpr::Int)],
        Some(TypeExpr::Bool),
        vec![
            Stmt::If(IfStmt {
                span: sp(),
                cond: bin(var("n"), BinOp::Eq, int(0)),
                then_body: vec![ret(e(ExprKind::BoolLit(base_case)))],
                else_body: None,
            }),
            ret(call(partner, vec![bin(var("n"), BinOp::Sub, int(1))])),
        ],
    )
}

#[test]
fn test_mutual_recursion_in_either_declaration_order() {
    let even = parity_fn("is_even", "is_odd", true);
    let odd = parity_fn("is_odd", "is_even", false);
    let main = print(call("is_even", vec![int(10)]));

    for stmts in [
        vec![even.clone(), odd.clone(), main.clone()],
        vec![odd, even, main],
    ] {
        let out = run(stmts).unwrap();
        assert_eq!(out.stdout, "true\n");
    }
}

#[test]
fn test_nested_procedure_with_a_fresh_name_is_callable() {
    let outer = func(
        "outer",
        vec![],
        Some(TypeExpr::Int),
        vec![
            func(
                "helper",
                vec![("n", TypeExpr::Int)],
                Some(TypeExpr::Int),
                vec![ret(bin(var("n"), BinOp::Mul, int(2)))],
            ),
            ret(call("helper", vec![int(21)])),
        ],
    );
    let out = run(vec![outer, print(call("outer", vec![]))]).unwrap();
    assert_eq!(out.stdout, "42\n");
}

#[test]
fn test_nested_procedure_reusing_a_name_is_a_redeclaration() {
    let twice = || {
        func(
            "twice",
            vec![("n", TypeExpr::Int)],
            Some(TypeExpr::Int),
            vec![ret(bin(var("n"), BinOp::Mul, int(2)))],
        )
    };
    let outer = func(
        "outer",
        vec![],
        Some(TypeExpr::Int),
        vec![twice(), ret(call("twice", vec![int(2)]))],
    );
    let err = run(vec![twice(), outer]).unwrap_err();
    assert!(
        err.message.contains("redeclaration of `twice`"),
        "{}",
        err.message
    );
}

#[test]
fn test_missing_return_on_the_fallthrough_path() {
    let err = run(vec![func(
        "sign",
        vec![("n", TypeExpr::Int)],
        Some(TypeExpr::Int),
        vec![Stmt::If(IfStmt {
            span: sp(),
            cond: bin(var("n"), BinOp::Gt, int(0)),
            then_body: vec![ret(int(1))],
            else_body: None,
        })],
    )])
    .unwrap_err();
    assert!(err.message.contains("missing return"), "{}", err.message);
}

#[test]
fn test_full_if_else_coverage_satisfies_the_return_audit() {
    let out = run(vec![
        func(
            "sign",
            vec![("n", TypeExpr::Int)],
            Some(TypeExpr::Int),
            vec![Stmt::If(IfStmt {
                span: sp(),
                cond: bin(var("n"), BinOp::Gt, int(0)),
                then_body: vec![ret(int(1))],
                else_body: Some(vec![ret(int(-1))]),
            })],
        ),
        print(call("sign", vec![int(-5)])),
    ])
    .unwrap();
    assert_eq!(out.stdout, "-1\n");
}

#[test]
fn test_while_body_does_not_count_as_returning() {
    // The loop may run zero times, so its returns cannot satisfy the audit.
    let err = run(vec![func(
        "stuck",
        vec![],
        Some(TypeExpr::Int),
        vec![Stmt::While(WhileStmt {
            span: sp(),
            cond: e(ExprKind::BoolLit(true)),
            body: vec![ret(int(1))],
        })],
    )])
    .unwrap_err();
    assert!(err.message.contains("missing return"), "{}", err.message);
}

#[test]
fn test_unused_identifier_fails_the_batch_pipeline() {
    let err = run(vec![decl("x", int(1))]).unwrap_err();
    assert!(
        err.message.contains("unused identifier `x`"),
        "{}",
        err.message
    );
}

#[test]
fn test_unused_identifier_tolerated_interactively() {
    let out = compile_and_run(
        &Program {
            stmts: vec![decl("x", int(1))],
        },
        Backend::InteractiveSession,
        &PackageMetadata::default(),
    )
    .unwrap();
    assert_eq!(out.stdout, "");
}

#[test]
fn test_log_promotes_every_operand_combination() {
    for (value, base) in [
        (int(8), int(2)),
        (dbl(8.0), dbl(2.0)),
        (int(8), dbl(2.0)),
        (dbl(8.0), int(2)),
    ] {
        let out = run(vec![print(log(value, base))]).unwrap();
        assert_eq!(out.stdout, "3.0\n");
    }
}

#[test]
fn test_builder_equals_direct_construction() {
    let built = e(ExprKind::Build(Box::new(e(ExprKind::Builder {
        name: id("Point"),
        fields: vec![(id("x"), int(1)), (id("y"), int(2))],
    }))));
    let out = run(vec![
        point_def(),
        decl("a", point_lit(1, 2)),
        decl("b", built),
        print(bin(var("a"), BinOp::Eq, var("b"))),
    ])
    .unwrap();
    assert_eq!(out.stdout, "true\n");
}

#[test]
fn test_build_with_a_missing_field_is_a_compile_error() {
    let built = e(ExprKind::Build(Box::new(e(ExprKind::Builder {
        name: id("Point"),
        fields: vec![(id("x"), int(1))],
    }))));
    let err = run(vec![point_def(), print(built)]).unwrap_err();
    assert!(
        err.message.contains("missing field `y`"),
        "{}",
        err.message
    );
}

#[test]
fn test_duplicate_contract_member_fails_at_registration() {
    let sig = ContractSignatureDef {
        span: sp(),
        name: id("wash"),
        params: vec![(id("v"), TypeExpr::Named(id("T")))],
        output: None,
        blocking: false,
        generics: vec![],
    };
    let err = run(vec![Stmt::ContractDef(ContractDefStmt {
        span: sp(),
        name: id("Shower"),
        type_params: vec![id("T")],
        signatures: vec![sig.clone(), sig],
    })])
    .unwrap_err();
    assert!(
        err.message.contains("redeclaration of contract procedure"),
        "{}",
        err.message
    );
}

fn shower_contract() -> Stmt {
    Stmt::ContractDef(ContractDefStmt {
        span: sp(),
        name: id("Shower"),
        type_params: vec![id("T")],
        signatures: vec![ContractSignatureDef {
            span: sp(),
            name: id("describe"),
            params: vec![(id("v"), TypeExpr::Named(id("T")))],
            output: Some(TypeExpr::Named(id("T"))),
            blocking: false,
            generics: vec![],
        }],
    })
}

fn shower_int_impl() -> Stmt {
    Stmt::ContractImpl(ContractImplStmt {
        span: sp(),
        contract: id("Shower"),
        type_args: vec![TypeExpr::Int],
        procedures: vec![procedure(
            "describe",
            vec![("v", TypeExpr::Int)],
            Some(TypeExpr::Int),
            false,
            vec![ret(bin(var("v"), BinOp::Mul, int(2)))],
        )],
    })
}

#[test]
fn test_contract_call_dispatches_to_the_concrete_impl() {
    let out = run(vec![
        shower_contract(),
        shower_int_impl(),
        print(e(ExprKind::ContractCall {
            contract: id("Shower"),
            type_args: vec![TypeExpr::Int],
            member: id("describe"),
            args: vec![int(21)],
        })),
    ])
    .unwrap();
    assert_eq!(out.stdout, "42\n");
}

#[test]
fn test_contract_dispatch_ignores_struct_names() {
    // Struct equality is structural, so an implementation registered for one
    // named shape must serve every structurally equal type.
    let wrap_def = |name: &str| {
        Stmt::TypeDef(TypeDefStmt {
            span: sp(),
            name: id(name),
            fields: vec![(id("v"), TypeExpr::Int)],
            immutable: false,
        })
    };
    let impl_for_a = Stmt::ContractImpl(ContractImplStmt {
        span: sp(),
        contract: id("Shower"),
        type_args: vec![TypeExpr::Named(id("A"))],
        procedures: vec![procedure(
            "describe",
            vec![("v", TypeExpr::Named(id("A")))],
            Some(TypeExpr::Named(id("A"))),
            false,
            vec![ret(var("v"))],
        )],
    });
    let out = run(vec![
        wrap_def("A"),
        wrap_def("B"),
        shower_contract(),
        impl_for_a,
        print(e(ExprKind::ContractCall {
            contract: id("Shower"),
            type_args: vec![TypeExpr::Named(id("B"))],
            member: id("describe"),
            args: vec![e(ExprKind::StructLit {
                name: id("B"),
                fields: vec![(id("v"), int(7))],
            })],
        })),
    ])
    .unwrap();
    assert_eq!(out.stdout, "B {v = 7}\n");
}

#[test]
fn test_contract_call_without_an_impl_is_a_compile_error() {
    let err = run(vec![
        shower_contract(),
        shower_int_impl(),
        print(e(ExprKind::ContractCall {
            contract: id("Shower"),
            type_args: vec![TypeExpr::Double],
            member: id("describe"),
            args: vec![dbl(1.0)],
        })),
    ])
    .unwrap_err();
    assert!(
        err.message.contains("no implementation of contract `Shower`"),
        "{}",
        err.message
    );
}

#[test]
fn test_impl_signature_mismatch_is_rejected() {
    let bad_impl = Stmt::ContractImpl(ContractImplStmt {
        span: sp(),
        contract: id("Shower"),
        type_args: vec![TypeExpr::Int],
        procedures: vec![procedure(
            "describe",
            vec![("v", TypeExpr::Int)],
            Some(TypeExpr::Bool),
            false,
            vec![ret(bin(var("v"), BinOp::Eq, int(0)))],
        )],
    });
    let err = run(vec![shower_contract(), bad_impl]).unwrap_err();
    assert!(
        err.message.contains("signature mismatch"),
        "{}",
        err.message
    );
}

#[test]
fn test_blocking_call_requires_a_blocking_caller() {
    let pause = Stmt::ProcedureDef(procedure(
        "pause",
        vec![("n", TypeExpr::Int)],
        None,
        true,
        vec![print(var("n"))],
    ));
    let hasty = func(
        "hasty",
        vec![],
        None,
        vec![Stmt::ExprStmt(call("pause", vec![int(1)]))],
    );
    let err = run(vec![pause, hasty]).unwrap_err();
    assert!(
        err.message.contains("blocking call to `pause`"),
        "{}",
        err.message
    );
}

#[test]
fn test_emission_hoists_structs_and_procedures() {
    let out = compile_and_run(
        &Program {
            stmts: vec![
                point_def(),
                func(
                    "origin",
                    vec![],
                    Some(TypeExpr::Named(id("Point"))),
                    vec![ret(point_lit(0, 0))],
                ),
                decl("p", call("origin", vec![])),
                print(e(ExprKind::FieldAccess {
                    base: Box::new(var("p")),
                    field: id("x"),
                })),
            ],
        },
        Backend::SourceEmission,
        &PackageMetadata::default(),
    )
    .unwrap();
    let generated = out.generated.unwrap();
    assert!(generated.contains("struct Point {"));
    assert!(generated.contains("struct PointBuilder {"));
    assert!(generated.contains("fn origin() -> Point {"));
    assert!(generated.contains("fn main() {"));
    assert!(generated.contains("let mut p: Point = origin();"));
    // Hoisted items come before the entry point.
    assert!(generated.find("struct Point {").unwrap() < generated.find("fn main() {").unwrap());
}

#[test]
fn test_emission_monomorphizes_contract_impls() {
    let out = compile_and_run(
        &Program {
            stmts: vec![
                shower_contract(),
                shower_int_impl(),
                print(e(ExprKind::ContractCall {
                    contract: id("Shower"),
                    type_args: vec![TypeExpr::Int],
                    member: id("describe"),
                    args: vec![int(21)],
                })),
            ],
        },
        Backend::SourceEmission,
        &PackageMetadata::default(),
    )
    .unwrap();
    let generated = out.generated.unwrap();
    assert!(generated.contains("fn Shower_int_describe(mut v: i64) -> i64 {"));
    assert!(generated.contains("Shower_int_describe(21)"));
}

#[test]
fn test_emitted_parameters_allow_reassignment() {
    // Parameters are ordinary bindings, so a body may reassign them. The
    // generated signature has to make them mutable for that to compile.
    let set = Stmt::ProcedureDef(procedure(
        "set",
        vec![("n", TypeExpr::Int)],
        None,
        false,
        vec![
            Stmt::Assign(AssignStmt {
                span: sp(),
                target: id("n"),
                expr: int(5),
            }),
            print(var("n")),
        ],
    ));
    let program = Program {
        stmts: vec![set, Stmt::ExprStmt(call("set", vec![int(1)]))],
    };

    let interpreted =
        compile_and_run(&program, Backend::Interpreted, &PackageMetadata::default()).unwrap();
    assert_eq!(interpreted.stdout, "5\n");

    let emitted =
        compile_and_run(&program, Backend::SourceEmission, &PackageMetadata::default()).unwrap();
    let generated = emitted.generated.unwrap();
    assert!(generated.contains("fn set(mut n: i64) {"), "{generated}");
    assert!(generated.contains("n = 5;"), "{generated}");
}

#[test]
fn test_session_retains_declarations_across_snippets() {
    let mut session = Session::new();
    let first = session
        .run(&Program {
            stmts: vec![decl("x", int(1))],
        })
        .unwrap();
    assert_eq!(first, "");

    let second = session
        .run(&Program {
            stmts: vec![print(bin(var("x"), BinOp::Add, int(1)))],
        })
        .unwrap();
    assert_eq!(second, "2\n");
}

#[test]
fn test_session_retains_procedures_and_their_captures() {
    let mut session = Session::new();
    session
        .run(&Program {
            stmts: vec![func(
                "shout",
                vec![("s", TypeExpr::Str)],
                None,
                vec![print(var("s"))],
            )],
        })
        .unwrap();
    let out = session
        .run(&Program {
            stmts: vec![Stmt::ExprStmt(call(
                "shout",
                vec![e(ExprKind::StrLit("hi".to_string()))],
            ))],
        })
        .unwrap();
    assert_eq!(out, "hi\n");
}

proptest! {
    // Integer-operand logarithms and their all-double rendition go through
    // the same promotion, so the printed results must agree exactly.
    #[test]
    fn prop_int_log_matches_double_log(value in 2i64..512, base in 2i64..64) {
        let ints = run(vec![print(log(int(value), int(base)))]).unwrap().stdout;
        let doubles = run(vec![print(log(dbl(value as f64), dbl(base as f64)))])
            .unwrap()
            .stdout;
        prop_assert_eq!(ints, doubles);
    }
}
