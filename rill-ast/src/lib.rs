#![forbid(unsafe_code)]

//! AST node model for Rill.
//!
//! Pure data: the parser (an external collaborator) produces these nodes.
//! The three per-node operations (type-checking, interpretation, source
//! emission) live in walker structs in `rill-core`, `rill-interpret` and
//! `rill-backend-rust`. Ownership is a strict tree.

use miette::SourceSpan;

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub type Ident = Spanned<String>;

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    TypeDef(TypeDefStmt),
    ProcedureDef(ProcedureDefStmt),
    ContractDef(ContractDefStmt),
    ContractImpl(ContractImplStmt),
    Decl(DeclStmt),
    Assign(AssignStmt),
    If(IfStmt),
    While(WhileStmt),
    Return(ReturnStmt),
    Print(PrintStmt),
    ExprStmt(Expr),
}

/// A user-defined (possibly immutable) struct type.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeDefStmt {
    pub span: Span,
    pub name: Ident,
    pub fields: Vec<(Ident, TypeExpr)>,
    pub immutable: bool,
}

/// A procedure definition. The calling convention is derived from shape:
/// params + output = function, params only = consumer, output only = provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcedureDefStmt {
    pub span: Span,
    pub name: Ident,
    pub params: Vec<(Ident, TypeExpr)>,
    pub output: Option<TypeExpr>,
    pub blocking: bool,
    pub body: Vec<Stmt>,
}

/// A contract: a named group of generic procedure signatures.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractDefStmt {
    pub span: Span,
    pub name: Ident,
    pub type_params: Vec<Ident>,
    pub signatures: Vec<ContractSignatureDef>,
}

/// One member signature inside a contract definition. Carries unresolved
/// type expressions; resolution happens at registration time.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractSignatureDef {
    pub span: Span,
    pub name: Ident,
    pub params: Vec<(Ident, TypeExpr)>,
    pub output: Option<TypeExpr>,
    pub blocking: bool,
    /// Member-level generic params, beyond the contract's own type params.
    pub generics: Vec<Ident>,
}

/// A concrete implementation of a contract for specific type bindings.
#[derive(Clone, Debug, PartialEq)]
pub struct ContractImplStmt {
    pub span: Span,
    pub contract: Ident,
    pub type_args: Vec<TypeExpr>,
    pub procedures: Vec<ProcedureDefStmt>,
}

/// Variable declaration. Rill declarations always carry an initializer.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclStmt {
    pub span: Span,
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub init: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub span: Span,
    pub target: Ident,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub then_body: Vec<Stmt>,
    pub else_body: Option<Vec<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WhileStmt {
    pub span: Span,
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReturnStmt {
    pub span: Span,
    pub expr: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrintStmt {
    pub span: Span,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    IntLit(i64),
    DoubleLit(f64),
    BoolLit(bool),
    StrLit(String),
    Ident(Ident),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// `log_b(x)`: logarithm of `value` in base `base`.
    Log {
        value: Box<Expr>,
        base: Box<Expr>,
    },
    /// Direct call of a named procedure value.
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    /// `Contract::<TypeArgs>::member(args)`: dispatch to a contract impl.
    ContractCall {
        contract: Ident,
        type_args: Vec<TypeExpr>,
        member: Ident,
        args: Vec<Expr>,
    },
    /// Direct struct construction with every field supplied.
    StructLit {
        name: Ident,
        fields: Vec<(Ident, Expr)>,
    },
    /// `Name::builder().a(..).b(..)`: incremental field assignment.
    Builder {
        name: Ident,
        fields: Vec<(Ident, Expr)>,
    },
    /// `.build()`: finalize a builder into its struct value.
    Build(Box<Expr>),
    FieldAccess {
        base: Box<Expr>,
        field: Ident,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,

    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    And,
    Or,
}

/// Syntactic type reference, resolved against the symbol table by
/// `rill-core`'s lazy type providers.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Int,
    Double,
    Bool,
    Str,
    Named(Ident),
    Function {
        params: Vec<TypeExpr>,
        output: Box<TypeExpr>,
    },
    Consumer {
        params: Vec<TypeExpr>,
    },
    Provider {
        output: Box<TypeExpr>,
    },
}
