#![forbid(unsafe_code)]

use rill_ast::{Program, Stmt};
use rill_backend_rust::{wrap_module, Emitter};
use rill_core::{Checker, SemanticError};
use rill_interpret::Vm;

/// Which execution backend consumes the validated tree. Exactly one runs per
/// compilation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Interpreted,
    SourceEmission,
    /// Interpreted, with usage checking disabled. One-shot form of what
    /// [`crate::Session`] does across calls.
    InteractiveSession,
}

/// Compile options for the emission backend: where the generated module
/// claims to live. Threaded explicitly; there is no global configuration.
#[derive(Clone, Debug)]
pub struct PackageMetadata {
    pub package: String,
    pub module: String,
}

impl Default for PackageMetadata {
    fn default() -> Self {
        Self {
            package: "main".to_string(),
            module: "main".to_string(),
        }
    }
}

/// What one pipeline run produced: interpreter output, or generated source.
#[derive(Clone, Debug, Default)]
pub struct RunOutput {
    pub stdout: String,
    pub generated: Option<String>,
}

/// Validate `program` through the four check passes, then run one backend.
/// Any semantic error aborts the whole pipeline; nothing executes partially.
pub fn compile_and_run(
    program: &Program,
    backend: Backend,
    metadata: &PackageMetadata,
) -> Result<RunOutput, SemanticError> {
    let mut checker = Checker::new();
    if backend == Backend::InteractiveSession {
        checker.table.set_usage_checking(false);
    }
    check_program(&mut checker, program, true)?;
    // The final scope stays alive (sessions keep extending it), so this is
    // an audit rather than a scope exit. No-op with usage checking disabled.
    checker.table.audit_current_scope()?;

    match backend {
        Backend::Interpreted | Backend::InteractiveSession => {
            let mut vm = Vm::new(checker.info());
            vm.run(program);
            Ok(RunOutput {
                stdout: vm.take_stdout(),
                generated: None,
            })
        }
        Backend::SourceEmission => {
            let mut emitter = Emitter::new(checker.info());
            let fragment = emitter.emit_program(program);
            Ok(RunOutput {
                stdout: String::new(),
                generated: Some(wrap_module(&metadata.package, &metadata.module, &fragment)),
            })
        }
    }
}

/// The four strictly ordered passes over the flattened statement list.
///
/// 1. Type discovery: register a lazy resolver per type definition and the
///    contract capability groups, so later passes may reference any type
///    name regardless of declaration order.
/// 2. Procedure discovery: resolve and declare every procedure signature in
///    the shared file-level scope (mutual recursion), plus the mangled
///    member keys of every contract implementation.
/// 3. Signature validation, after which a fresh scope is pushed so top-level
///    procedure bodies cannot see file-scope locals declared after them.
/// 4. Full-body type assertion over every statement.
pub(crate) fn check_program(
    checker: &mut Checker,
    program: &Program,
    push_body_scope: bool,
) -> Result<(), SemanticError> {
    for stmt in &program.stmts {
        match stmt {
            Stmt::TypeDef(def) => checker.register_type_def(def)?,
            Stmt::ContractDef(def) => checker.register_contract_def(def)?,
            _ => {}
        }
    }
    for stmt in &program.stmts {
        match stmt {
            Stmt::ProcedureDef(def) => checker.declare_procedure(def)?,
            Stmt::ContractImpl(imp) => checker.declare_contract_impl(imp)?,
            _ => {}
        }
    }
    for stmt in &program.stmts {
        if let Stmt::ProcedureDef(def) = stmt {
            checker.validate_procedure_signature(def)?;
        }
    }
    if push_body_scope {
        checker.table.enter_scope();
    }
    for stmt in &program.stmts {
        checker.check_stmt(stmt)?;
    }
    Ok(())
}
