#![forbid(unsafe_code)]

use rill_ast::Span;

use crate::error::SemanticError;
use crate::provider::TypeProvider;
use crate::types::Type;

/// How a binding's type is stored. Lazy entries are registered during the
/// type discovery phase and resolved on first lookup; the in-progress marker
/// turns recursive type definitions into an error instead of unbounded
/// recursion.
#[derive(Clone, Debug)]
enum TypeEntry {
    Resolved(Type),
    Lazy(TypeProvider),
    InProgress,
}

#[derive(Clone, Debug)]
struct Binding {
    entry: TypeEntry,
    span: Span,
    initialized: bool,
    used: bool,
    is_type_definition: bool,
}

/// A stack of lexical scopes tracking, per identifier, its type,
/// initialization state and usage state. Mutated exclusively by the single
/// compilation thread; independent compilations use independent tables.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    // Per scope, insertion-ordered so diagnostics are deterministic.
    scopes: Vec<Vec<(String, Binding)>>,
    check_unused: bool,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Vec::new()],
            check_unused: true,
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Pop the current scope. With `check_unused` (and usage checking not
    /// globally disabled), fail if any binding in the scope was never used.
    pub fn exit_scope(&mut self, check_unused: bool) -> Result<(), SemanticError> {
        if check_unused {
            self.audit_current_scope()?;
        }
        self.scopes
            .pop()
            .unwrap_or_else(|| panic!("internal error: exited more scopes than entered"));
        Ok(())
    }

    /// The unused-identifier audit for the current scope, without tearing the
    /// scope down. The pipeline runs this on the global scope, which must
    /// stay alive for interactive sessions.
    pub fn audit_current_scope(&self) -> Result<(), SemanticError> {
        if !self.check_unused {
            return Ok(());
        }
        let scope = self
            .scopes
            .last()
            .unwrap_or_else(|| panic!("internal error: no open scope"));
        for (name, binding) in scope {
            if !binding.used {
                return Err(SemanticError::new(
                    format!("unused identifier `{name}`"),
                    binding.span,
                ));
            }
        }
        Ok(())
    }

    /// Disabled in interactive mode, where forward code may reference
    /// identifiers the session has not seen yet.
    pub fn set_usage_checking(&mut self, enabled: bool) {
        self.check_unused = enabled;
    }

    pub fn usage_checking(&self) -> bool {
        self.check_unused
    }

    pub fn declare(&mut self, name: &str, ty: Type, span: Span) -> Result<(), SemanticError> {
        self.declare_entry(name, TypeEntry::Resolved(ty), span, false)
    }

    /// Permits shadowing an outer-scope binding of the same name. Used for
    /// procedure parameters.
    pub fn declare_allowing_hiding(
        &mut self,
        name: &str,
        ty: Type,
        span: Span,
    ) -> Result<(), SemanticError> {
        self.declare_entry(name, TypeEntry::Resolved(ty), span, true)
    }

    /// Register a deferred type computation under `name`. Resolution happens
    /// on first `lookup_type` and is memoized.
    pub fn declare_lazy(
        &mut self,
        name: &str,
        provider: TypeProvider,
        span: Span,
    ) -> Result<(), SemanticError> {
        self.declare_entry(name, TypeEntry::Lazy(provider), span, false)
    }

    fn declare_entry(
        &mut self,
        name: &str,
        entry: TypeEntry,
        span: Span,
        allow_hiding: bool,
    ) -> Result<(), SemanticError> {
        let already = if allow_hiding {
            self.scopes
                .last()
                .is_some_and(|scope| scope.iter().any(|(n, _)| n == name))
        } else {
            self.is_declared(name)
        };
        if already {
            return Err(SemanticError::new(
                format!("unexpected redeclaration of `{name}`"),
                span,
            ));
        }
        self.scopes
            .last_mut()
            .unwrap_or_else(|| panic!("internal error: no open scope"))
            .push((
                name.to_string(),
                Binding {
                    entry,
                    span,
                    initialized: false,
                    used: false,
                    is_type_definition: false,
                },
            ));
        Ok(())
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn initialize(&mut self, name: &str) {
        self.binding_mut(name).initialized = true;
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.binding(name).initialized
    }

    /// Branch-join support for the hidden return-completion marker: a branch
    /// initializes it only if every sibling branch does too.
    pub fn set_initialized(&mut self, name: &str, initialized: bool) {
        self.binding_mut(name).initialized = initialized;
    }

    pub fn mark_used(&mut self, name: &str) {
        self.binding_mut(name).used = true;
    }

    pub fn mark_type_definition(&mut self, name: &str) {
        self.binding_mut(name).is_type_definition = true;
    }

    pub fn is_type_definition(&self, name: &str) -> bool {
        self.binding(name).is_type_definition
    }

    /// Remove a binding without any usage audit. Used for the transient
    /// generic-parameter stand-ins of contract registration.
    pub fn delete(&mut self, name: &str) {
        let Some((si, bi)) = self.find(name) else {
            panic!("internal error: deleting undeclared identifier `{name}`");
        };
        self.scopes[si].remove(bi);
    }

    /// Look up an identifier's type, walking from the top scope outward and
    /// resolving (then memoizing) lazy entries.
    pub fn lookup_type(&mut self, name: &str, span: Span) -> Result<Type, SemanticError> {
        let Some((si, bi)) = self.find(name) else {
            return Err(SemanticError::new(
                format!("unresolved identifier `{name}`"),
                span,
            ));
        };
        match &self.scopes[si][bi].1.entry {
            TypeEntry::Resolved(ty) => Ok(ty.clone()),
            TypeEntry::InProgress => Err(SemanticError::new(
                format!("recursive type definition `{name}`"),
                span,
            )),
            TypeEntry::Lazy(_) => {
                let TypeEntry::Lazy(provider) =
                    std::mem::replace(&mut self.scopes[si][bi].1.entry, TypeEntry::InProgress)
                else {
                    unreachable!()
                };
                let resolved = provider.resolve(self)?;
                // Re-find: resolution may have mutated the scope stack.
                if let Some((si, bi)) = self.find(name) {
                    self.scopes[si][bi].1.entry = TypeEntry::Resolved(resolved.clone());
                }
                Ok(resolved)
            }
        }
    }

    /// Look up a name that must denote a type definition, marking it used.
    pub fn lookup_type_definition(
        &mut self,
        name: &str,
        span: Span,
    ) -> Result<Type, SemanticError> {
        let ty = self.lookup_type(name, span)?;
        if !self.is_type_definition(name) {
            return Err(SemanticError::new(
                format!("`{name}` is not a type"),
                span,
            ));
        }
        self.mark_used(name);
        Ok(ty)
    }

    fn find(&self, name: &str) -> Option<(usize, usize)> {
        for (si, scope) in self.scopes.iter().enumerate().rev() {
            if let Some(bi) = scope.iter().position(|(n, _)| n == name) {
                return Some((si, bi));
            }
        }
        None
    }

    fn binding(&self, name: &str) -> &Binding {
        let Some((si, bi)) = self.find(name) else {
            panic!("internal error: undeclared identifier `{name}`");
        };
        &self.scopes[si][bi].1
    }

    fn binding_mut(&mut self, name: &str) -> &mut Binding {
        let Some((si, bi)) = self.find(name) else {
            panic!("internal error: undeclared identifier `{name}`");
        };
        &mut self.scopes[si][bi].1
    }
}
