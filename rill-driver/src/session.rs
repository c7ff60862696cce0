#![forbid(unsafe_code)]

use rill_ast::Program;
use rill_core::{Checker, SemanticError};
use rill_interpret::Vm;

use crate::pipeline::check_program;

/// An interactive session: the checker's symbol table and the interpreter's
/// environment persist across successive snippets, so one snippet can use
/// what an earlier one declared. Usage checking is disabled for the session's
/// lifetime; everything lives in one long-lived scope.
pub struct Session {
    checker: Checker,
    vm: Vm,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let mut checker = Checker::new();
        checker.table.set_usage_checking(false);
        let vm = Vm::new(checker.info());
        Self { checker, vm }
    }

    /// Check one snippet through the full phase pipeline, then interpret it.
    /// On error the snippet does not execute; declarations the failing
    /// snippet already made remain visible, as in the batch pipeline there
    /// is no rollback.
    pub fn run(&mut self, program: &Program) -> Result<String, SemanticError> {
        check_program(&mut self.checker, program, false)?;
        self.vm.set_info(self.checker.info());
        self.vm.run(program);
        Ok(self.vm.take_stdout())
    }
}
