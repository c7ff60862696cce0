#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

/// A runtime scope chain. Frames are reference-counted because a procedure
/// value keeps its defining chain alive past the structural scope exit; the
/// chain is released once no closure or active call frame references it.
#[derive(Clone, Debug)]
pub struct Env(Rc<RefCell<Frame>>);

#[derive(Debug)]
struct Frame {
    vars: HashMap<String, Value>,
    parent: Option<Env>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            parent: None,
        })))
    }

    /// A fresh frame whose parent is this environment.
    pub fn child(&self) -> Env {
        Self(Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn define(&self, name: &str, value: Value) {
        self.0.borrow_mut().vars.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let frame = self.0.borrow();
        if let Some(value) = frame.vars.get(name) {
            return Some(value.clone());
        }
        frame.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Overwrite an existing binding somewhere along the chain. Assigning to
    /// a name the checker never declared is a type-system defect.
    pub fn assign(&self, name: &str, value: Value) {
        let mut frame = self.0.borrow_mut();
        if let Some(slot) = frame.vars.get_mut(name) {
            *slot = value;
            return;
        }
        match &frame.parent {
            Some(parent) => parent.assign(name, value),
            None => panic!("internal error: assignment to undeclared `{name}`"),
        }
    }

    pub fn same_frame(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parent_chain() {
        let root = Env::new();
        root.define("x", Value::Int(1));
        let inner = root.child();
        inner.define("y", Value::Int(2));
        assert_eq!(inner.get("x"), Some(Value::Int(1)));
        assert_eq!(inner.get("y"), Some(Value::Int(2)));
        assert_eq!(root.get("y"), None);
    }

    #[test]
    fn test_assign_reaches_outer_frame() {
        let root = Env::new();
        root.define("x", Value::Int(1));
        let inner = root.child();
        inner.assign("x", Value::Int(7));
        assert_eq!(root.get("x"), Some(Value::Int(7)));
    }

    #[test]
    fn test_chain_survives_structural_exit() {
        // A closure's captured chain outlives the frame that created it.
        let captured = {
            let call_frame = Env::new().child();
            call_frame.define("n", Value::Int(42));
            call_frame
        };
        assert_eq!(captured.get("n"), Some(Value::Int(42)));
    }
}
